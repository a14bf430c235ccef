use std::{sync::PoisonError, time::Duration};

pub mod balance;
pub mod history;

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for ErasedPoisonError {
    fn from(err: PoisonError<T>) -> Self {
        Self(err.to_string())
    }
}

/// Wait for the configured latency, if any
///
/// Used by the in-memory adapters to behave like a remote store.
async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}
