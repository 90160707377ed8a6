use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::CheckpointError;

/// Per-shard progress record: the last sequence handed to the processor plus the lease owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShardCheckpoint {
    pub shard_id: String,
    // last sequence fully processed; None until the first batch commits
    pub sequence: Option<u64>,
    // stream incarnation `sequence` refers to
    pub stream_incarnation: Option<u64>,
    // worker currently holding the shard, None once released
    pub lease_owner: Option<String>,
    // ms since epoch of the last write
    pub updated_at: u64,
}

impl ShardCheckpoint {
    fn touched(mut self) -> Self {
        self.updated_at = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self
    }
}

/// Durable storage for shard checkpoints and leases.
///
/// Implementors only provide `read` and `write`; the lease rules are shared.
/// Single-writer assumption per shard: leases guard against a second worker
/// id, not against concurrent writers racing on the same record.
#[async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    async fn read(&self, shard_id: &str) -> Result<Option<ShardCheckpoint>, CheckpointError>;

    async fn write(&self, checkpoint: &ShardCheckpoint) -> Result<(), CheckpointError>;

    /// Take the shard lease for `owner` and return the current checkpoint.
    ///
    /// A lease still held by the same owner (restart after a crash) is taken over.
    async fn acquire_lease(
        &self,
        shard_id: &str,
        owner: &str,
    ) -> Result<ShardCheckpoint, CheckpointError> {
        let current = self.read(shard_id).await?.unwrap_or_else(|| ShardCheckpoint {
            shard_id: shard_id.to_string(),
            ..Default::default()
        });
        if let Some(holder) = &current.lease_owner {
            if holder != owner {
                return Err(CheckpointError::LeaseHeld {
                    shard_id: shard_id.to_string(),
                    owner: holder.clone(),
                });
            }
        }
        let leased = ShardCheckpoint {
            lease_owner: Some(owner.to_string()),
            ..current
        }
        .touched();
        self.write(&leased).await?;
        Ok(leased)
    }

    /// Record `sequence` as processed. Fails if `owner` no longer holds the lease.
    async fn commit(
        &self,
        shard_id: &str,
        owner: &str,
        sequence: u64,
    ) -> Result<(), CheckpointError> {
        let current = self.read(shard_id).await?;
        let current = match current {
            Some(c) if c.lease_owner.as_deref() == Some(owner) => c,
            _ => {
                return Err(CheckpointError::LeaseLost {
                    shard_id: shard_id.to_string(),
                    owner: owner.to_string(),
                })
            }
        };
        let next = ShardCheckpoint {
            sequence: Some(sequence),
            ..current
        }
        .touched();
        self.write(&next).await
    }

    /// Point the checkpoint at a new stream incarnation, dropping the sequence committed
    /// against the previous one. Fails if `owner` no longer holds the lease.
    async fn rebind(
        &self,
        shard_id: &str,
        owner: &str,
        incarnation: u64,
    ) -> Result<ShardCheckpoint, CheckpointError> {
        let current = match self.read(shard_id).await? {
            Some(c) if c.lease_owner.as_deref() == Some(owner) => c,
            _ => {
                return Err(CheckpointError::LeaseLost {
                    shard_id: shard_id.to_string(),
                    owner: owner.to_string(),
                })
            }
        };
        let rebound = ShardCheckpoint {
            sequence: None,
            stream_incarnation: Some(incarnation),
            ..current
        }
        .touched();
        self.write(&rebound).await?;
        Ok(rebound)
    }

    /// Give the lease up, keeping the committed sequence.
    async fn release_lease(&self, shard_id: &str, owner: &str) -> Result<(), CheckpointError> {
        match self.read(shard_id).await? {
            Some(current) if current.lease_owner.as_deref() == Some(owner) => {
                let released = ShardCheckpoint {
                    lease_owner: None,
                    ..current
                }
                .touched();
                self.write(&released).await
            }
            _ => Ok(()),
        }
    }
}

/// In-process checkpoint store. Progress is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<DashMap<String, ShardCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn read(&self, shard_id: &str) -> Result<Option<ShardCheckpoint>, CheckpointError> {
        Ok(self.records.get(shard_id).map(|r| r.clone()))
    }

    async fn write(&self, checkpoint: &ShardCheckpoint) -> Result<(), CheckpointError> {
        self.records
            .insert(checkpoint.shard_id.clone(), checkpoint.clone());
        Ok(())
    }
}

/// Checkpoint store keeping one bincode file per shard under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a crash
/// leaves either the previous or the new checkpoint on disk.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (and create if needed) the checkpoint directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            warn!(target = "consumer", path = %dir.display(), error = %e, "create checkpoint dir failed");
            CheckpointError::Io(format!("create checkpoint dir failed: {}", e))
        })?;
        Ok(FileCheckpointStore { dir })
    }

    fn path_for(&self, shard_id: &str) -> PathBuf {
        self.dir.join(format!("{}.ckpt", shard_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self, shard_id: &str) -> Result<Option<ShardCheckpoint>, CheckpointError> {
        let path = self.path_for(shard_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let ckpt: ShardCheckpoint = bincode::deserialize(&bytes).map_err(|e| {
                    warn!(target = "consumer", path = %path.display(), error = %e, "checkpoint parse failed");
                    CheckpointError::Corrupt(format!("{}: {}", path.display(), e))
                })?;
                debug!(target = "consumer", path = %path.display(), size = bytes.len(), "read checkpoint");
                Ok(Some(ckpt))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(target = "consumer", path = %path.display(), error = %e, "read checkpoint failed");
                Err(CheckpointError::Io(format!("read checkpoint failed: {}", e)))
            }
        }
    }

    async fn write(&self, checkpoint: &ShardCheckpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.shard_id);
        let bytes = bincode::serialize(checkpoint)
            .map_err(|e| CheckpointError::Io(format!("checkpoint serialize failed: {}", e)))?;

        let tmp = path.with_extension("ckpt.tmp");
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await
            .map_err(|e| {
                warn!(target = "consumer", path = %tmp.display(), error = %e, "open checkpoint tmp failed");
                CheckpointError::Io(format!("open checkpoint tmp failed: {}", e))
            })?;
        f.write_all(&bytes).await.map_err(|e| {
            warn!(target = "consumer", path = %tmp.display(), error = %e, "write checkpoint failed");
            CheckpointError::Io(format!("write checkpoint failed: {}", e))
        })?;
        f.sync_all().await.map_err(|e| {
            warn!(target = "consumer", path = %tmp.display(), error = %e, "sync checkpoint failed");
            CheckpointError::Io(format!("sync checkpoint failed: {}", e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            warn!(target = "consumer", from = %tmp.display(), to = %path.display(), error = %e, "rename checkpoint failed");
            CheckpointError::Io(format!("rename checkpoint failed: {}", e))
        })?;
        debug!(target = "consumer", path = %path.display(), sequence = ?checkpoint.sequence, "wrote checkpoint");
        Ok(())
    }
}
