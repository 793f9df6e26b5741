//! Cancellable delay shared by every polling loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `interval` unless `cancel` fires first.
///
/// Returns `false` if cancelled. Cancellation wins when both are ready.
pub async fn pause(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(interval) => true,
    }
}
