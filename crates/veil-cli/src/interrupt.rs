//! Turning an interrupt signal into cancellation.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `cancel` once `signal` resolves successfully.
///
/// In the binary `signal` is `tokio::signal::ctrl_c()`. If listening fails the
/// token is left alone and the command runs to completion.
pub fn cancel_on<F>(signal: F, cancel: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("interrupt received, cancelling");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
    })
}
