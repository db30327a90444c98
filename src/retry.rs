//! Fixed-interval retry with cooperative cancellation.
//!
//! Every call against an external collaborator (metadata register, topology
//! source) goes through one of these primitives so no task blocks on I/O
//! without also selecting on its cancellation token.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Constant-interval backoff. No jitter.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The delay before the next attempt.
    pub fn next(&self) -> Duration {
        self.interval
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Retry `op` until it succeeds or `cancel` fires.
///
/// The operation is a value producing a future per attempt; failures are
/// logged and absorbed here, so callers only ever see success or
/// `Error::Cancelled`.
pub async fn retry<T, F, Fut>(backoff: FixedBackoff, cancel: &CancellationToken, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                warn!(attempt, %err, "operation failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(backoff.next()) => {}
        }
    }
}

/// Retry `op` at most `attempts` times, returning the last error when the
/// budget runs out. Used where the caller has its own fallback, e.g. the
/// topology snapshot store.
pub async fn retry_n<T, F, Fut>(backoff: FixedBackoff, attempts: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(attempts > 0);
    let mut last = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                warn!(attempt, attempts, %err, "operation failed");
                last = Some(err);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(backoff.next()).await;
        }
    }
    Err(last.unwrap_or(Error::Cancelled))
}
