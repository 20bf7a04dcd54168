//! Exponential backoff shared by every retrying call site.
//!
//! Delays grow as `factor * base^n` milliseconds, are capped at `max_delay` and are
//! jittered. Retries never give up: the caller decides which errors are eligible.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{info, warn};

/// Default growth base of the backoff.
const DEFAULT_BASE: u64 = 2;

/// Default multiplier applied to every delay, in milliseconds.
const DEFAULT_FACTOR_MILLIS: u64 = 500;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Growth base of the exponential sequence.
    pub base: u64,
    /// Multiplier of each delay, in milliseconds.
    pub factor: u64,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
    /// Randomize each delay within `[0, delay)`.
    pub jitter: bool,
}

impl BackoffPolicy {
    /// Policy with the default base and factor, capped at `max_delay`.
    pub fn new(max_delay: Duration) -> Self {
        Self {
            base: DEFAULT_BASE,
            factor: DEFAULT_FACTOR_MILLIS,
            max_delay,
            jitter: true,
        }
    }

    /// The unbounded sequence of delays for successive attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + 'static {
        let jittered = self.jitter;
        ExponentialBackoff::from_millis(self.base)
            .factor(self.factor)
            .max_delay(self.max_delay)
            .map(move |delay| if jittered { jitter(delay) } else { delay })
    }
}

/// Run `action` until it succeeds or fails with an error `is_eligible` rejects.
///
/// Each eligible failure is logged with the attempt number before sleeping.
pub async fn retry_with_backoff<T, E, A, Fut, P>(
    policy: &BackoffPolicy,
    operation: &str,
    action: A,
    mut is_eligible: P,
) -> Result<T, E>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 0;

    RetryIf::start(policy.delays(), action, |error: &E| {
        attempt += 1;
        let eligible = is_eligible(error);
        if eligible {
            warn!(
                operation = %operation,
                attempt = attempt,
                error = %error,
                "Operation failed, backing off"
            );
        }
        eligible
    })
    .await
}

/// Like [`retry_with_backoff`], but gives up as soon as `shutdown` turns true.
///
/// Returns `None` when stopped. The pending attempt is dropped, so callers must only use
/// this where abandoning the operation leaves no partial progress recorded.
pub async fn retry_until_stopped<T, E, A, Fut, P>(
    policy: &BackoffPolicy,
    operation: &str,
    shutdown: &watch::Receiver<bool>,
    action: A,
    is_eligible: P,
) -> Option<Result<T, E>>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: Display,
{
    let mut shutdown = shutdown.clone();
    let stop_requested = async move {
        // A dropped sender can never request a stop
        if shutdown.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        biased;
        result = retry_with_backoff(policy, operation, action, is_eligible) => Some(result),
        _ = stop_requested => {
            info!(operation = %operation, "Stop requested, abandoning retries");
            None
        }
    }
}
