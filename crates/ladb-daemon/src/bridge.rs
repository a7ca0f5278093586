//! Bridge subcommands with bounded waits
//!
//! Each method spawns one `adb`-compatible subcommand through the shared
//! [`ProcessLauncher`]. Every wait used while connecting or pairing is bounded;
//! a process that outlives its limit is force-killed and reported as timed out.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use ladb_core::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::time::timeout;

use crate::devices::{parse_device_list, DeviceSelection};
use crate::launcher::{ProcessLauncher, Redirect};
use crate::shell::ShellProcess;

/// Default timeout for the `devices` listing
const DEVICES_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the `kill-server` that follows a pairing attempt
const POST_PAIR_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin async wrapper around the bridge binary.
#[derive(Debug, Clone)]
pub struct Bridge {
    launcher: Arc<ProcessLauncher>,
}

impl Bridge {
    pub fn new(launcher: Arc<ProcessLauncher>) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    /// `start-server`. Returns `false` when the limit elapsed.
    pub async fn start_server(&self, limit: Duration) -> Result<bool> {
        let child = self.launcher.bridge(&["start-server"], Redirect::Discard)?;
        Ok(wait_bounded(child, limit, "start-server").await?.is_some())
    }

    /// `connect <target>`. Returns `false` when the limit elapsed.
    ///
    /// The exit code is not inspected; whether the connect took effect is
    /// decided by the device listing that follows.
    pub async fn connect(&self, target: &str, limit: Duration) -> Result<bool> {
        let child = self
            .launcher
            .bridge(&["connect", target], Redirect::Discard)?;
        let status = wait_bounded(child, limit, "connect").await?;
        if let Some(status) = status {
            debug!("connect {} exited with {:?}", target, status.code());
        }
        Ok(status.is_some())
    }

    pub async fn disconnect(&self, limit: Duration) -> Result<bool> {
        let child = self.launcher.bridge(&["disconnect"], Redirect::Discard)?;
        Ok(wait_bounded(child, limit, "disconnect").await?.is_some())
    }

    pub async fn kill_server(&self, limit: Duration) -> Result<bool> {
        let child = self.launcher.bridge(&["kill-server"], Redirect::Discard)?;
        Ok(wait_bounded(child, limit, "kill-server").await?.is_some())
    }

    /// List attached device serials.
    pub async fn devices(&self) -> Result<Vec<String>> {
        let child = self.launcher.bridge(&["devices"], Redirect::Piped)?;

        let output = timeout(DEVICES_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::timeout("devices", DEVICES_TIMEOUT))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("devices stdout: {}", stdout);

        let devices = parse_device_list(&stdout);
        info!("Bridge lists {} device(s)", devices.len());
        Ok(devices)
    }

    /// `pair <target>`, feeding `code` on stdin after `settle`.
    ///
    /// Success is exit code 0 within `limit`. The pairing process is killed if
    /// it is still running, and the background server is stopped afterwards
    /// either way.
    pub async fn pair(
        &self,
        target: &str,
        code: &str,
        settle: Duration,
        limit: Duration,
    ) -> Result<bool> {
        let mut child = self.launcher.bridge(&["pair", target], Redirect::Output)?;

        tokio::time::sleep(settle).await;

        if let Some(mut stdin) = child.stdin.take() {
            let line = format!("{}\n", code);
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!("Failed to write pairing code: {}", e);
            } else if let Err(e) = stdin.flush().await {
                warn!("Failed to flush pairing code: {}", e);
            }
        }

        let status = wait_bounded(child, limit, "pair").await?;

        if let Err(e) = self.kill_server(POST_PAIR_KILL_TIMEOUT).await {
            warn!("kill-server after pairing failed: {}", e);
        }

        let success = status.and_then(|s| s.code()) == Some(0);
        info!(
            "Pairing with {} was {}",
            target,
            if success { "successful" } else { "unsuccessful" }
        );
        Ok(success)
    }

    /// Spawn `[-s serial] shell` with output appended to the output buffer.
    pub fn spawn_shell(&self, selection: &DeviceSelection) -> Result<ShellProcess> {
        let child = self
            .launcher
            .bridge(selection.shell_args().as_slice(), Redirect::Output)?;
        ShellProcess::from_child(child)
    }

    /// Spawn a plain login shell without going through the bridge.
    pub fn spawn_local_shell(&self) -> Result<ShellProcess> {
        let child = self.launcher.shell(&["sh", "-l"], Redirect::Output)?;
        ShellProcess::from_child(child)
    }
}

/// Wait for `child` up to `limit`; kill it and return `None` on timeout.
async fn wait_bounded(
    mut child: Child,
    limit: Duration,
    operation: &'static str,
) -> Result<Option<ExitStatus>> {
    match timeout(limit, child.wait()).await {
        Ok(status) => Ok(Some(status?)),
        Err(_) => {
            warn!("{} did not finish within {:?}, killing it", operation, limit);
            if let Err(e) = child.kill().await {
                debug!("Failed to kill {}: {}", operation, e);
            }
            Ok(None)
        }
    }
}
