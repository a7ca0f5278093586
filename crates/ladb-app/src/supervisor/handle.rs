//! Caller-side handle to the supervisor worker

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ladb_core::prelude::*;
use ladb_core::{InitResult, PairingRequest, SessionStatus};
use ladb_daemon::ShellInput;
use tokio::sync::{mpsc, oneshot, watch};

use super::Control;
use crate::output::OutputBuffer;

/// Cloneable handle for driving and observing the supervisor.
///
/// Queries read published state and return immediately. Requests that need
/// the worker wait only for its reply.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    control_tx: mpsc::Sender<Control>,
    reset_tx: mpsc::Sender<oneshot::Sender<()>>,
    status_rx: watch::Receiver<SessionStatus>,
    output_rx: watch::Receiver<String>,
    shell_input: Arc<Mutex<Option<ShellInput>>>,
    output: Arc<OutputBuffer>,
    script_path: PathBuf,
    /// Held for the duration of one pairing attempt
    pair_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SupervisorHandle {
    pub(super) fn new(
        control_tx: mpsc::Sender<Control>,
        reset_tx: mpsc::Sender<oneshot::Sender<()>>,
        status_rx: watch::Receiver<SessionStatus>,
        output_rx: watch::Receiver<String>,
        shell_input: Arc<Mutex<Option<ShellInput>>>,
        output: Arc<OutputBuffer>,
        script_path: PathBuf,
    ) -> Self {
        Self {
            control_tx,
            reset_tx,
            status_rx,
            output_rx,
            shell_input,
            output,
            script_path,
            pair_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Start the handshake.
    ///
    /// Answers `Success` straight away when a shell is attached or an attempt
    /// is already running, and `Failure` once the session is closed.
    pub async fn start(&self) -> InitResult {
        let status = self.status();
        if status.closed {
            return InitResult::Failure;
        }
        if status.ready || status.phase.is_orchestrating() {
            return InitResult::Success;
        }

        let (reply, rx) = oneshot::channel();
        if self.control_tx.send(Control::Start { reply }).await.is_err() {
            return InitResult::Failure;
        }
        rx.await.unwrap_or(InitResult::Failure)
    }

    /// Pair using the code shown on-device.
    ///
    /// On success the supervisor goes on to connect; watch the status for the
    /// outcome. Only one attempt may be in flight.
    pub async fn pair(&self, request: PairingRequest) -> Result<bool> {
        let _guard = self
            .pair_lock
            .try_lock()
            .map_err(|_| Error::PairingInFlight)?;

        let (reply, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Pair { request, reply })
            .await
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Connect with the port shown on the device's wireless debugging screen.
    pub async fn resume_with_port(&self, port: u16) -> InitResult {
        let (reply, rx) = oneshot::channel();
        if self
            .control_tx
            .send(Control::ResumeWithPort { port, reply })
            .await
            .is_err()
        {
            return InitResult::Failure;
        }
        rx.await.unwrap_or(InitResult::Failure)
    }

    /// Send one line to the shell.
    ///
    /// Returns `false` without writing anything when no shell is attached.
    pub async fn send_command(&self, command: &str) -> bool {
        let input = self
            .shell_input
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let Some(input) = input else {
            debug!("No shell attached, dropping command");
            return false;
        };

        match input.send(command).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Shell input closed: {}", e);
                false
            }
        }
    }

    /// Write `script` to the script file and run it in the shell.
    pub async fn run_script(&self, script: &str) -> Result<bool> {
        if let Some(parent) = self.script_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.script_path, script).await?;
        Ok(self
            .send_command(&format!("sh {}", self.script_path.display()))
            .await)
    }

    /// Hard-reset the session. Returns once the worker has finished.
    pub async fn reset(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        if self.reset_tx.send(ack).await.is_err() {
            debug!("Supervisor already stopped, nothing to reset");
            return Ok(());
        }
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub fn clear_output(&self) -> Result<()> {
        self.output.clear()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn subscribe_output(&self) -> watch::Receiver<String> {
        self.output_rx.clone()
    }

    /// Latest published output tail.
    pub fn output_snapshot(&self) -> String {
        self.output_rx.borrow().clone()
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}
