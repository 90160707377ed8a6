use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tweetamo_core::{ReadinessOptions, RetryPolicy};
use tweetamo_pipeline::{ConsumerConfig, InitialPosition, PublisherConfig};

const MEMORY_ENDPOINT_SCHEME: &str = "memory://";

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Application name, also the lease owner id of this node's shard workers
    pub(crate) application_name: String,
    /// Partitioned log configuration
    pub(crate) log: LogConfig,
    /// Indexed store configuration
    #[serde(default)]
    pub(crate) store: StoreConfig,
    /// Shard worker settings
    #[serde(default)]
    pub(crate) consumer: ConsumerSettings,
    /// Publisher settings
    #[serde(default)]
    pub(crate) publisher: PublisherSettings,
    /// Prometheus exporter address
    #[serde(default)]
    pub(crate) prom_exporter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LogConfig {
    pub(crate) stream_name: String,
    #[serde(default = "default_endpoint")]
    pub(crate) endpoint: String,
    #[serde(default = "default_shard_count")]
    pub(crate) shard_count: u32,
    #[serde(default)]
    pub(crate) initial_position: InitialPosition,
    #[serde(default = "ReadinessConfig::for_log")]
    pub(crate) readiness: ReadinessConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreConfig {
    #[serde(default = "default_table_name")]
    pub(crate) table_name: String,
    #[serde(default = "ReadinessConfig::for_table")]
    pub(crate) readiness: ReadinessConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            table_name: default_table_name(),
            readiness: ReadinessConfig::for_table(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct ReadinessConfig {
    pub(crate) poll_interval_secs: u64,
    pub(crate) timeout_secs: u64,
}

impl ReadinessConfig {
    fn for_log() -> Self {
        ReadinessConfig {
            poll_interval_secs: 5,
            timeout_secs: 300,
        }
    }

    fn for_table() -> Self {
        ReadinessConfig {
            poll_interval_secs: 20,
            timeout_secs: 600,
        }
    }

    fn to_options(self, what: &str) -> Result<ReadinessOptions> {
        if self.poll_interval_secs == 0 || self.timeout_secs == 0 {
            return Err(anyhow!(
                "{} readiness poll_interval_secs and timeout_secs must be positive",
                what
            ));
        }
        Ok(ReadinessOptions::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.timeout_secs),
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ConsumerSettings {
    pub(crate) batch_size: usize,
    pub(crate) idle_interval_ms: u64,
    pub(crate) max_retries: usize,
    pub(crate) base_backoff_ms: u64,
    pub(crate) max_backoff_ms: u64,
    pub(crate) checkpoint_dir: Option<PathBuf>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        ConsumerSettings {
            batch_size: 100,
            idle_interval_ms: 1_000,
            max_retries: 5,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            checkpoint_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PublisherSettings {
    pub(crate) queue_capacity: usize,
    pub(crate) max_attempts: usize,
    pub(crate) base_backoff_ms: u64,
    pub(crate) max_backoff_ms: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        PublisherSettings {
            queue_capacity: 1_024,
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

fn default_endpoint() -> String {
    "memory://local".to_string()
}

fn default_shard_count() -> u32 {
    2
}

fn default_table_name() -> String {
    "tweetamo_status".to_string()
}

/// validated settings the service runs with
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfiguration {
    pub(crate) application_name: String,
    pub(crate) stream_name: String,
    pub(crate) endpoint: String,
    pub(crate) shard_count: u32,
    pub(crate) log_readiness: ReadinessOptions,
    pub(crate) table_name: String,
    pub(crate) store_readiness: ReadinessOptions,
    pub(crate) consumer: ConsumerConfig,
    pub(crate) checkpoint_dir: Option<PathBuf>,
    pub(crate) publisher: PublisherConfig,
    pub(crate) prom_exporter: Option<SocketAddr>,
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        if config.application_name.trim().is_empty() {
            return Err(anyhow!("application_name must not be empty"));
        }
        if config.log.stream_name.trim().is_empty() {
            return Err(anyhow!("log.stream_name must not be empty"));
        }
        if !config.log.endpoint.starts_with(MEMORY_ENDPOINT_SCHEME) {
            return Err(anyhow!(
                "unsupported log endpoint {:?}, only {}... is available",
                config.log.endpoint,
                MEMORY_ENDPOINT_SCHEME
            ));
        }
        if config.log.shard_count == 0 {
            return Err(anyhow!("log.shard_count must be at least 1"));
        }
        if config.consumer.batch_size == 0 {
            return Err(anyhow!("consumer.batch_size must be at least 1"));
        }

        let log_readiness = config.log.readiness.to_options("log")?;
        let store_readiness = config.store.readiness.to_options("store")?;

        let prom_exporter = match &config.prom_exporter {
            Some(addr) => Some(
                addr.parse()
                    .context(format!("Failed to parse prom_exporter address: {}", addr))?,
            ),
            None => None,
        };

        let consumer = ConsumerConfig {
            stream_name: config.log.stream_name.clone(),
            worker_id: config.application_name.clone(),
            batch_size: config.consumer.batch_size,
            idle_interval: Duration::from_millis(config.consumer.idle_interval_ms),
            initial_position: config.log.initial_position,
            retry: RetryPolicy::new(
                config.consumer.max_retries,
                config.consumer.base_backoff_ms,
                config.consumer.max_backoff_ms,
            ),
            readiness: log_readiness,
        };

        let publisher = PublisherConfig {
            stream_name: config.log.stream_name.clone(),
            queue_capacity: config.publisher.queue_capacity.max(1),
            max_attempts: config.publisher.max_attempts.max(1),
            backoff: RetryPolicy::new(
                config.publisher.max_attempts.saturating_sub(1),
                config.publisher.base_backoff_ms,
                config.publisher.max_backoff_ms,
            ),
        };

        Ok(ServiceConfiguration {
            application_name: config.application_name,
            stream_name: config.log.stream_name,
            endpoint: config.log.endpoint,
            shard_count: config.log.shard_count,
            log_readiness,
            table_name: config.store.table_name,
            store_readiness,
            consumer,
            checkpoint_dir: config.consumer.checkpoint_dir,
            publisher,
            prom_exporter,
        })
    }
}
