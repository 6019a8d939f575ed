//! Eventual consistency helpers for cluster state changes.
//!
//! This module provides retry logic with exponential backoff for waits on
//! asynchronous cluster operations like pod startup or namespace teardown.
//! Reachability checks do not use it; they have their own fixed-interval
//! policies in `segmentation_probe::probe`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Categories of eventual consistency with documented budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyCategory {
    /// Image pull plus container start for agnhost pods
    PodStartup,

    /// DaemonSet controller recreating a deleted pod (ovnkube-node takes a while to sync)
    PodReplacement,

    /// Namespace finalizers tearing down pods, services and NADs
    NamespaceDeletion,

    /// NodePort and cluster IP allocation on a freshly created service
    ServiceAllocation,
}

impl ConsistencyCategory {
    /// Get the maximum timeout for this consistency category.
    pub fn timeout(&self) -> Duration {
        match self {
            ConsistencyCategory::PodStartup => Duration::from_secs(120),
            ConsistencyCategory::PodReplacement => Duration::from_secs(300),
            ConsistencyCategory::NamespaceDeletion => Duration::from_secs(120),
            ConsistencyCategory::ServiceAllocation => Duration::from_secs(30),
        }
    }

    fn initial_delay(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_secs(5)
    }
}

#[derive(Debug, Error)]
pub enum EventualError {
    #[error("{description}: not met within {timeout:?} (category: {category:?})")]
    Timeout {
        description: String,
        timeout: Duration,
        category: ConsistencyCategory,
    },

    #[error("{description}: {message}")]
    Failed {
        description: String,
        message: String,
    },
}

/// Wait until `condition` reports `Ok(true)`.
///
/// `Ok(false)` retries with exponential backoff (500ms doubling, capped at
/// 5s and at the remaining budget). `Err` stops waiting immediately.
pub async fn assert_eventually<F, Fut, E>(
    category: ConsistencyCategory,
    description: &str,
    mut condition: F,
) -> Result<(), EventualError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let timeout = category.timeout();
    let mut delay = category.initial_delay();
    let start = Instant::now();

    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                return Err(EventualError::Failed {
                    description: description.to_string(),
                    message: e.to_string(),
                })
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(EventualError::Timeout {
                description: description.to_string(),
                timeout,
                category,
            });
        }

        let remaining = timeout.saturating_sub(elapsed);
        sleep(delay.min(remaining)).await;

        delay = (delay * 2).min(category.max_delay());
    }
}
