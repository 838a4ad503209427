//! Plugin process lifecycle.
//!
//! # Responsibilities
//! - Spawn the plugin executable with the magic cookie in its environment
//! - Read and validate the handshake line within the start timeout
//! - Connect the RPC channel and hand out a `RemoteComparator`
//! - Terminate the child exactly once, on shutdown or on drop
//!
//! # Design Decisions
//! - Any failure before `Ready` kills the child and is fatal to startup
//! - Plugin stderr, and stdout after the handshake, are forwarded to tracing
//! - One process and one connection serve the whole proxy lifetime

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::client::{RemoteComparator, RpcClient};
use super::error::PluginError;
use super::handshake::{Handshake, HandshakeConfig};
use super::state::PluginState;

/// Owner of a running comparator plugin process.
pub struct PluginHost {
    path: PathBuf,
    state: PluginState,
    child: Option<Child>,
}

impl PluginHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: PluginState::Unstarted,
            child: None,
        }
    }

    /// Launch the plugin at `path` and connect to it.
    pub async fn launch(
        path: impl Into<PathBuf>,
        handshake: &HandshakeConfig,
        start_timeout: Duration,
    ) -> Result<(Self, RemoteComparator), PluginError> {
        let mut host = Self::new(path);
        match host.start(handshake, start_timeout).await {
            Ok(comparator) => Ok((host, comparator)),
            Err(e) => {
                tracing::error!(plugin = %host.path.display(), error = %e, "Plugin failed to start");
                host.terminate().await;
                Err(e)
            }
        }
    }

    async fn start(
        &mut self,
        handshake: &HandshakeConfig,
        start_timeout: Duration,
    ) -> Result<RemoteComparator, PluginError> {
        self.state.transition(PluginState::Launching)?;

        let mut child = Command::new(&self.path)
            .env(&handshake.magic_cookie_key, &handshake.magic_cookie_value)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Launch {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(plugin = %self.path.display(), pid = ?child.id(), "Plugin process started");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, self.path.clone(), "stderr"));
        }
        let stdout = child.stdout.take();
        self.child = Some(child);

        self.state.transition(PluginState::Handshaking)?;

        let mut stdout = BufReader::new(stdout.ok_or_else(|| {
            PluginError::Io(std::io::Error::other("plugin stdout was not captured"))
        })?);
        let mut line = String::new();
        let read = tokio::time::timeout(start_timeout, stdout.read_line(&mut line))
            .await
            .map_err(|_| PluginError::HandshakeTimeout(start_timeout))??;

        if read == 0 {
            return Err(PluginError::ExitedBeforeHandshake {
                status: self.exit_status().await,
            });
        }

        let negotiated = Handshake::negotiate(&line, handshake)?;
        tracing::debug!(
            plugin = %self.path.display(),
            address = %negotiated.address,
            protocol_version = negotiated.protocol_version,
            "Plugin handshake accepted"
        );

        tokio::spawn(forward_output(stdout, self.path.clone(), "stdout"));

        let client = RpcClient::connect(negotiated.address)
            .await
            .map_err(|source| PluginError::Connect {
                addr: negotiated.address,
                source,
            })?;

        self.state.transition(PluginState::Ready)?;
        tracing::info!(plugin = %self.path.display(), "Plugin ready");

        Ok(RemoteComparator::new(client))
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the plugin process. Calling this again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        self.terminate().await;
        tracing::info!(plugin = %self.path.display(), "Plugin terminated");
    }

    async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Plugin process already gone");
            }
        }
        // Terminated is reachable from every other state.
        let _ = self.state.transition(PluginState::Terminated);
    }

    /// Describe how the child ended, waiting briefly for it to be reaped.
    async fn exit_status(&mut self) -> String {
        let Some(child) = self.child.as_mut() else {
            return "not running".to_string();
        };
        match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("unknown exit status: {e}"),
            Err(_) => "stdout closed, process still running".to_string(),
        }
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

async fn forward_output<R>(output: R, path: PathBuf, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(plugin = %path.display(), stream, "{}", line);
    }
}
