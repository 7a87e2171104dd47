//! Servers run as external processes.

use std::{ffi::OsString, process::Stdio, time::Duration};

use async_trait::async_trait;
#[cfg(unix)]
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{RunningServer, ServerFactory, ServerStartError};

/// Placeholder replaced by the chosen port in arguments and environment
/// values.
const PORT_PLACEHOLDER: &str = "{port}";

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Starts a server by running a program.
///
/// Every occurrence of `{port}` in the arguments and environment values is
/// replaced with the port chosen for the run. On teardown the process gets
/// `SIGTERM` (a hard kill on other platforms), and is killed outright if it
/// has not exited within the grace period.
#[derive(Debug, Clone)]
pub struct CommandServer {
    program: OsString,
    args: Vec<String>,
    env: Vec<(String, String)>,
    grace: Duration,
}

impl CommandServer {
    /// Run `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            grace: DEFAULT_GRACE,
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Time allowed between the termination signal and a hard kill.
    #[must_use]
    pub const fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn command(&self, port: u16) -> Command {
        let port = port.to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| arg.replace(PORT_PLACEHOLDER, &port)))
            .envs(
                self.env
                    .iter()
                    .map(|(key, value)| (key, value.replace(PORT_PLACEHOLDER, &port))),
            )
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ServerFactory for CommandServer {
    async fn spawn(&self, port: u16) -> Result<Box<dyn RunningServer>, ServerStartError> {
        let child = self.command(port).spawn().map_err(ServerStartError::Spawn)?;
        debug!(pid = child.id(), port, program = ?self.program, "spawned server process");
        Ok(Box::new(ChildServer {
            child,
            grace: self.grace,
        }))
    }
}

struct ChildServer {
    child: Child,
    grace: Duration,
}

impl ChildServer {
    fn signal_stop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) {
            if let Err(error) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                warn!(pid, %error, "failed to signal server process");
            }
            return;
        }
        if let Err(error) = self.child.start_kill() {
            warn!(%error, "failed to kill server process");
        }
    }
}

#[async_trait]
impl RunningServer for ChildServer {
    fn exited(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(status) => status.map(|status| status.to_string()),
            Err(error) => Some(error.to_string()),
        }
    }

    async fn terminate(mut self: Box<Self>) {
        if self.exited().is_some() {
            return;
        }
        self.signal_stop();
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "server process exited"),
            Ok(Err(error)) => warn!(%error, "failed to reap server process"),
            Err(_) => {
                warn!(grace = ?self.grace, "server ignored termination; killing");
                if let Err(error) = self.child.kill().await {
                    warn!(%error, "failed to kill server process");
                }
            }
        }
    }
}
