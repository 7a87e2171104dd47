//! Servers run as tasks inside the current Tokio runtime.

use std::future::Future;

use async_trait::async_trait;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::debug;

use super::{RunningServer, ServerFactory, ServerStartError};

/// Starts an in-process server, such as an `axum` app, on a bound listener.
///
/// `serve` receives a listener bound to `127.0.0.1`; the returned future runs
/// on a spawned task that is aborted on teardown, or when the bracket is
/// dropped before it completes.
pub struct TaskServer<F> {
    serve: F,
}

impl<F, Fut> TaskServer<F>
where
    F: Fn(TcpListener) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Serve with `serve`.
    #[must_use]
    pub const fn new(serve: F) -> Self { Self { serve } }
}

#[async_trait]
impl<F, Fut> ServerFactory for TaskServer<F>
where
    F: Fn(TcpListener) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn spawn(&self, port: u16) -> Result<Box<dyn RunningServer>, ServerStartError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(ServerStartError::Spawn)?;
        let task = tokio::spawn((self.serve)(listener));
        debug!(port, "spawned server task");
        Ok(Box::new(TaskHandle { task }))
    }
}

struct TaskHandle {
    task: JoinHandle<()>,
}

#[async_trait]
impl RunningServer for TaskHandle {
    fn exited(&mut self) -> Option<String> {
        self.task
            .is_finished()
            .then(|| "server task finished".to_owned())
    }

    async fn terminate(mut self: Box<Self>) {
        self.task.abort();
        match (&mut self.task).await {
            Ok(()) => debug!("server task had already finished"),
            Err(error) if error.is_cancelled() => debug!("server task aborted"),
            Err(error) => debug!(%error, "server task panicked"),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) { self.task.abort(); }
}
