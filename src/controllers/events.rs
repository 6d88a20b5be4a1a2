//! Serial event loop feeding the driver

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::driver::{Driver, Trigger};
use crate::adapters::oci_image::ImageResolver;
use crate::certs::CertificateStore;
use crate::reconcilers::StateApplier;

/// Dispatch triggers one at a time until the stream ends or `shutdown` fires
///
/// Shutdown is only checked between triggers; a dispatch in progress always
/// runs to completion.
pub async fn run_events<S, R, A, E>(
    driver: &mut Driver<S, R, A>,
    mut events: E,
    shutdown: CancellationToken,
) where
    S: CertificateStore + Send + Sync + 'static,
    R: ImageResolver + Send + Sync + 'static,
    A: StateApplier + Send + Sync + 'static,
    E: Stream<Item = Trigger> + Unpin,
{
    loop {
        let trigger = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no further events");
                break;
            }
            next = events.next() => match next {
                Some(trigger) => trigger,
                None => break,
            },
        };

        // Failures are logged by the driver; the next trigger retries
        let _ = driver.dispatch(trigger).await;
    }
}
