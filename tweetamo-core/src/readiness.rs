use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ReadinessError;

/// Lifecycle status reported by a backend for a named resource (stream or table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Creating,
    Updating,
    Active,
    Deleting,
    NotFound,
}

/// Polling parameters for [`wait_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl ReadinessOptions {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        ReadinessOptions {
            poll_interval,
            timeout,
        }
    }

    /// Tables can take minutes to provision: poll every 20s for up to 10 minutes.
    pub fn for_table() -> Self {
        Self::new(Duration::from_secs(20), Duration::from_secs(10 * 60))
    }

    /// Streams: poll every 5s for up to 5 minutes.
    pub fn for_log() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(5 * 60))
    }
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self::for_table()
    }
}

/// Block the calling task until `status_check` reports the resource as [`ResourceStatus::Active`].
///
/// The check runs immediately and then every `poll_interval`; the last sleep is clipped so
/// that a final probe happens exactly at the deadline. Transient check failures are logged and
/// retried. A definitive [`ResourceStatus::NotFound`] is returned at once: creating the
/// resource is the caller's job. Cancelling `cancel` aborts the wait.
pub async fn wait_until_ready<F, Fut, E>(
    resource_id: &str,
    options: ReadinessOptions,
    cancel: &CancellationToken,
    mut status_check: F,
) -> Result<(), ReadinessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ResourceStatus, E>>,
    E: Display,
{
    info!(
        target = "readiness",
        resource = %resource_id,
        poll_interval = ?options.poll_interval,
        timeout = ?options.timeout,
        "waiting for resource to become ACTIVE"
    );

    let started = Instant::now();
    let deadline = started + options.timeout;

    loop {
        match status_check().await {
            Ok(ResourceStatus::Active) => {
                info!(
                    target = "readiness",
                    resource = %resource_id,
                    waited = ?started.elapsed(),
                    "resource is ACTIVE"
                );
                return Ok(());
            }
            Ok(ResourceStatus::NotFound) => {
                return Err(ReadinessError::NotFound(resource_id.to_string()));
            }
            Ok(status) => {
                debug!(target = "readiness", resource = %resource_id, ?status, "current state");
            }
            Err(e) => {
                warn!(
                    target = "readiness",
                    resource = %resource_id,
                    error = %e,
                    "status check failed, will retry"
                );
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReadinessError::Timeout {
                resource: resource_id.to_string(),
                waited: now.duration_since(started),
            });
        }

        let nap = options.poll_interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ReadinessError::Cancelled(resource_id.to_string()));
            }
            _ = tokio::time::sleep(nap) => {}
        }
    }
}
