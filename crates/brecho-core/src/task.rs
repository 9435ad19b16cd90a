//! Offloading CPU-bound and blocking work from async request handlers.

use crate::errors::BrechoError;

/// Run `f` on tokio's blocking pool and wait for it.
///
/// The closure runs to completion even when the awaiting future is
/// dropped, so index writes are never cut off half-way by a deadline.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, BrechoError>
where
    F: FnOnce() -> Result<T, BrechoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrechoError::Internal(format!("blocking task failed: {}", e)))?
}
