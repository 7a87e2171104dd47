//! Readiness checks for started servers.

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use url::Url;

use super::{Readiness, RunningServer, ServerStartError};
use crate::transport::{HttpTransport, Transport};

/// Poll `probe` until the server answers with any HTTP response.
///
/// The delay between probes starts at `initial_backoff` and doubles up to
/// `max_backoff`. Returns the number of probes sent.
///
/// # Errors
///
/// Returns [`ServerStartError::Exited`] if the server stops first, or
/// [`ServerStartError::NotReady`] once `timeout` elapses.
pub(super) async fn wait_until_ready(
    server: &mut dyn RunningServer,
    probe: &Url,
    settings: &Readiness,
) -> Result<u32, ServerStartError> {
    let transport =
        HttpTransport::new(settings.request_timeout, 0).map_err(ServerStartError::Probe)?;
    let started = Instant::now();
    let mut backoff = settings.initial_backoff;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match transport.get(probe).await {
            Ok(response) => {
                debug!(status = response.status, attempts, "readiness probe answered");
                return Ok(attempts);
            }
            Err(error) => debug!(%error, attempts, "readiness probe failed"),
        }
        if let Some(status) = server.exited() {
            return Err(ServerStartError::Exited { status });
        }
        let elapsed = started.elapsed();
        if elapsed >= settings.timeout {
            warn!(url = %probe, attempts, "server did not answer before timeout");
            return Err(ServerStartError::NotReady {
                url: probe.to_string(),
                attempts,
                timeout: settings.timeout,
            });
        }
        sleep(backoff.min(settings.timeout.saturating_sub(elapsed))).await;
        backoff = backoff.saturating_mul(2).min(settings.max_backoff);
    }
}
