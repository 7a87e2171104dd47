//! Server lifecycle: start, wait for readiness, run a body, tear down.
//!
//! [`with_servant_server`] brackets a body with a running server. It picks a
//! free port unless one is configured, starts the server through a
//! [`ServerFactory`], polls a readiness probe with exponential backoff and
//! guarantees the server is terminated on every exit path, including when
//! the body panics.

mod process;
mod readiness;
mod task;

use std::{
    net::TcpListener,
    panic::{AssertUnwindSafe, resume_unwind},
    time::Duration,
};

use async_trait::async_trait;
use futures_util::FutureExt;
pub use process::CommandServer;
pub use task::TaskServer;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{api::ApiDescription, transport::TransportError};

/// A running server reachable at a base URL.
///
/// Handles only live inside [`with_servant_server`]; the server is torn down
/// when the bracketed body returns.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerHandle {
    base_url: Url,
}

impl ServerHandle {
    /// Base URL requests are sent to.
    #[must_use]
    pub const fn base_url(&self) -> &Url { &self.base_url }

    /// Port the server listens on.
    #[must_use]
    pub fn port(&self) -> Option<u16> { self.base_url.port() }
}

/// Failures to bring a server up.
#[derive(Debug, Error)]
pub enum ServerStartError {
    /// No free port could be reserved.
    #[error("failed to reserve a port: {0}")]
    Port(#[source] std::io::Error),
    /// The server could not be started.
    #[error("failed to start server: {0}")]
    Spawn(#[source] std::io::Error),
    /// The server stopped before answering the readiness probe.
    #[error("server exited before becoming ready ({status})")]
    Exited {
        /// Exit status as reported by the platform.
        status: String,
    },
    /// The readiness probe never got a response within the timeout.
    #[error("server at {url} not ready after {attempts} probes in {timeout:?}")]
    NotReady {
        /// Probe URL.
        url: String,
        /// Probes attempted.
        attempts: u32,
        /// The readiness timeout.
        timeout: Duration,
    },
    /// The base or probe URL is malformed.
    #[error("invalid server URL: {0}")]
    Url(#[from] url::ParseError),
    /// The probe client could not be built.
    #[error("failed to build readiness probe client: {0}")]
    Probe(#[source] TransportError),
}

/// A server instance started by a [`ServerFactory`].
#[async_trait]
pub trait RunningServer: Send {
    /// Exit status, if the server has already stopped.
    fn exited(&mut self) -> Option<String>;

    /// Stop the server and release its resources.
    async fn terminate(self: Box<Self>);
}

/// Starts servers on a given port.
#[async_trait]
pub trait ServerFactory: Send + Sync {
    /// Start a server listening on `port` of the loopback interface.
    async fn spawn(&self, port: u16) -> Result<Box<dyn RunningServer>, ServerStartError>;
}

/// How readiness is detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Probe path; defaults to the description's health path, then `/`.
    pub path: Option<String>,
    /// Total time allowed for the server to answer.
    pub timeout: Duration,
    /// Delay after the first failed probe.
    pub initial_backoff: Duration,
    /// Ceiling for the doubling delay between probes.
    pub max_backoff: Duration,
    /// Timeout of each probe request.
    pub request_timeout: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            path: None,
            timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_millis(200),
        }
    }
}

/// Where and how a server is started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    /// Fixed port; an ephemeral one is chosen when absent.
    pub port: Option<u16>,
    /// Readiness probe settings.
    pub readiness: Readiness,
}

fn free_port() -> Result<u16, ServerStartError> {
    let socket = TcpListener::bind("127.0.0.1:0").map_err(ServerStartError::Port)?;
    let port = socket.local_addr().map_err(ServerStartError::Port)?.port();
    drop(socket);
    Ok(port)
}

/// Run `body` against a server started by `factory`, tearing the server down
/// afterwards whatever the outcome.
///
/// A panic in `body` is re-raised after teardown.
///
/// # Errors
///
/// Returns [`ServerStartError`] when the server cannot be started or does
/// not become ready; any partially started server is terminated first.
pub async fn with_servant_server<F, T>(
    description: &ApiDescription,
    factory: &dyn ServerFactory,
    options: &ServerOptions,
    body: F,
) -> Result<T, ServerStartError>
where
    F: AsyncFnOnce(&ServerHandle) -> T,
{
    let port = match options.port {
        Some(port) => port,
        None => free_port()?,
    };
    let base_url = Url::parse(&format!("http://127.0.0.1:{port}/"))?;
    let probe_path = options
        .readiness
        .path
        .clone()
        .or_else(|| description.health_path())
        .unwrap_or_else(|| "/".to_owned());
    let probe = base_url.join(&probe_path)?;

    info!(port, probe = %probe, "starting server");
    let mut server = factory.spawn(port).await?;
    if let Err(error) = readiness::wait_until_ready(server.as_mut(), &probe, &options.readiness).await
    {
        warn!(%error, "server failed to become ready; tearing down");
        server.terminate().await;
        return Err(error);
    }
    info!(port, "server ready");

    let handle = ServerHandle { base_url };
    let outcome = AssertUnwindSafe(body(&handle)).catch_unwind().await;
    server.terminate().await;
    info!(port, "server stopped");
    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => resume_unwind(panic),
    }
}
