//! Supervisor worker task: sole owner of the session

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ladb_core::prelude::*;
use ladb_core::{InitResult, PairingRequest, Phase, SessionStatus};
use ladb_daemon::{select_device, Bridge, PortDiscovery, ShellExit, ShellInput, ShellProcess};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;

use super::Control;
use crate::config::{save_preferences, AppPaths, Preferences, Settings};
use crate::debugging::DebugToggle;
use crate::output::OutputBuffer;
use crate::session::Session;

type ResetRx = mpsc::Receiver<oneshot::Sender<()>>;

/// Where an orchestration attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Entry {
    /// Fresh start from `Idle` or a halt phase
    Full,
    /// After a shell death, following the cool-down
    Restart,
    /// Straight to `Connecting` (after pairing or with a manual port)
    Connect,
}

/// Outcome of one wait in the main loop.
enum Step {
    Reset(oneshot::Sender<()>),
    ShellExited(ShellExit),
    Control(Control),
    Shutdown,
}

pub(super) struct Worker<D> {
    settings: Settings,
    paths: AppPaths,
    bridge: Bridge,
    toggle: D,
    discovery: PortDiscovery,
    output: Arc<OutputBuffer>,
    prefs: Preferences,
    session: Session,
    status_tx: watch::Sender<SessionStatus>,
    /// Filled and emptied here; `send_command` only clones from it
    shell_input: Arc<Mutex<Option<ShellInput>>>,
    output_shutdown_tx: watch::Sender<bool>,
}

impl<D> Worker<D>
where
    D: DebugToggle + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        settings: Settings,
        paths: AppPaths,
        bridge: Bridge,
        toggle: D,
        discovery: PortDiscovery,
        output: Arc<OutputBuffer>,
        prefs: Preferences,
        status_tx: watch::Sender<SessionStatus>,
        shell_input: Arc<Mutex<Option<ShellInput>>>,
        output_shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        let session = Session::new(prefs.last_connected_port);
        Self {
            settings,
            paths,
            bridge,
            toggle,
            discovery,
            output,
            prefs,
            session,
            status_tx,
            shell_input,
            output_shutdown_tx,
        }
    }

    /// Main loop. Ends when every handle is dropped.
    pub(super) async fn run(mut self, mut control_rx: mpsc::Receiver<Control>, mut reset_rx: ResetRx) {
        debug!("Supervisor worker started");

        loop {
            let shell_exit = self.session.shell.as_ref().map(ShellProcess::exited);

            let step = tokio::select! {
                biased;
                Some(ack) = reset_rx.recv() => Step::Reset(ack),
                exit = wait_for_exit(shell_exit) => Step::ShellExited(exit),
                message = control_rx.recv() => match message {
                    Some(message) => Step::Control(message),
                    None => Step::Shutdown,
                },
            };

            match step {
                Step::Reset(ack) => {
                    self.reset().await;
                    let _ = ack.send(());
                }
                Step::ShellExited(exit) => {
                    let death = Error::from(exit);
                    self.on_shell_death(&death).await;
                    if death.is_transient() {
                        self.run_attempt(Entry::Restart, &mut reset_rx).await;
                    }
                }
                Step::Control(message) => self.handle_control(message, &mut reset_rx).await,
                Step::Shutdown => break,
            }
        }

        self.detach_shell();
        let _ = self.output_shutdown_tx.send(true);
        debug!("Supervisor worker stopped");
    }

    async fn handle_control(&mut self, message: Control, reset_rx: &mut ResetRx) {
        match message {
            Control::Start { reply } => {
                let result = if self.session.closed {
                    InitResult::Failure
                } else if self.session.is_busy() {
                    InitResult::Success
                } else {
                    self.run_attempt(Entry::Full, reset_rx).await
                };
                let _ = reply.send(result);
            }
            Control::Pair { request, reply } => {
                let paired = match self.pair(request).await {
                    Ok(paired) => paired,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                let _ = reply.send(Ok(paired));
                if paired {
                    self.run_attempt(Entry::Connect, reset_rx).await;
                }
            }
            Control::ResumeWithPort { port, reply } => {
                let result = if self.session.closed {
                    InitResult::Failure
                } else if self.session.is_ready() {
                    InitResult::Success
                } else {
                    info!("Resuming with manual port {}", port);
                    self.session.manual_port = Some(port);
                    self.session.last_connected_port = Some(port);
                    self.run_attempt(Entry::Connect, reset_rx).await
                };
                let _ = reply.send(result);
            }
        }
    }

    /// Run one orchestration attempt, abandoning it if a reset arrives.
    async fn run_attempt(&mut self, entry: Entry, reset_rx: &mut ResetRx) -> InitResult {
        let interrupted = tokio::select! {
            biased;
            Some(ack) = reset_rx.recv() => Err(ack),
            result = self.orchestrate(entry) => Ok(result),
        };

        match interrupted {
            Ok(result) => result,
            Err(ack) => {
                info!("Orchestration interrupted by reset");
                self.reset().await;
                let _ = ack.send(());
                InitResult::Failure
            }
        }
    }

    async fn orchestrate(&mut self, entry: Entry) -> InitResult {
        self.session.pairing_in_flight = true;

        let result = match self.attempt(entry).await {
            Ok(result) => result,
            Err(e) => {
                self.output.debug(&e.to_string());
                halt_for(&e)
            }
        };

        self.session.pairing_in_flight = false;
        if result.is_success() {
            self.publish();
        } else {
            info!("Orchestration halted: {:?}", result);
            self.set_phase(result.halt_phase());
        }
        result
    }

    async fn attempt(&mut self, entry: Entry) -> Result<InitResult> {
        if entry == Entry::Restart {
            sleep(self.settings.timing.restart_cooldown()).await;
        }

        if !self.settings.behavior.auto_shell {
            return self.open_local_shell().await;
        }

        if entry != Entry::Connect {
            if self.settings.behavior.pairing_required && !self.prefs.paired {
                self.output
                    .debug("This device has not been paired yet. Enter the pairing port and code shown on the device.");
                return Ok(InitResult::NeedsPairing);
            }
            self.enable_debugging().await;
            self.await_discovery().await;
        }

        self.connect().await
    }

    async fn enable_debugging(&mut self) {
        self.set_phase(Phase::EnablingDebugging);

        if self.toggle.is_privileged().await {
            if self.session.last_connected_port.is_none() {
                // A fresh port is only broadcast after two off/on cycles
                self.output.debug("Cycling wireless debugging, please wait...");
                if self.toggle.is_enabled().await {
                    self.flip_debugging(false).await;
                }
                for enabled in [true, false, true] {
                    self.flip_debugging(enabled).await;
                }
            } else if !self.toggle.is_enabled().await {
                self.flip_debugging(true).await;
            }
        }

        if self.toggle.is_enabled().await {
            return;
        }

        self.output.debug("Wireless debugging is not enabled!");
        self.output
            .debug("Settings -> Developer options -> Wireless debugging");
        let poll = self.settings.timing.enable_poll();
        while !self.toggle.is_enabled().await {
            self.output.debug("Waiting for wireless debugging...");
            sleep(poll).await;
        }
    }

    async fn flip_debugging(&self, enabled: bool) {
        self.output.debug(if enabled {
            "Turning on wireless debugging..."
        } else {
            "Turning off wireless debugging..."
        });
        if let Err(e) = self.toggle.set_enabled(enabled).await {
            warn!("Failed to set wireless debugging to {}: {}", enabled, e);
        }
        sleep(self.settings.timing.toggle_settle()).await;
    }

    /// Wait for pending resolutions to drain, at least the minimum dwell after
    /// discovery started and at most the ceiling from now.
    async fn await_discovery(&mut self) {
        self.set_phase(Phase::AwaitingDiscovery);

        let Some(started_at) = self.discovery.started_at() else {
            debug!("Port discovery not running, skipping wait");
            return;
        };

        let timing = &self.settings.timing;
        let min_until = started_at + timing.discovery_min_dwell();
        let max_until = Instant::now() + timing.discovery_ceiling();
        let poll = timing.discovery_poll();

        loop {
            let now = Instant::now();
            if now >= min_until && !self.discovery.is_resolving() {
                self.output.debug("DNS resolver done...");
                break;
            }
            if now >= max_until {
                self.output.debug("DNS resolver took too long! Skipping...");
                break;
            }
            self.output.debug("Awaiting DNS resolver...");
            sleep(poll).await;
        }

        match self.discovery.best_port() {
            Some(port) => self.output.debug(&format!("Best ADB port discovered: {}", port)),
            None => self.output.debug("No ADB port discovered, fallback..."),
        }
    }

    async fn connect(&mut self) -> Result<InitResult> {
        self.set_phase(Phase::Connecting);
        let timing = self.settings.timing.clone();

        self.output.debug("Starting ADB server...");
        if !self.bridge.start_server(timing.start_server_timeout()).await? {
            warn!("start-server did not finish in time, continuing");
        }

        let Some(port) = self.session.connect_port(self.discovery.best_port()) else {
            self.output.debug("No debug port found. Please enter the debug port (ADB connect port) shown in your device's Wireless Debugging screen.");
            return Ok(InitResult::NeedsPort);
        };

        let target = format!("{}:{}", self.settings.bridge.connect_host, port);
        self.output.debug(&format!("Connecting to {}...", target));
        if !self.bridge.connect(&target, timing.connect_timeout()).await? {
            self.output.debug("Your device didn't connect to LADB");
            self.output
                .debug("If a reboot doesn't work, please contact support");
            return Ok(InitResult::Failure);
        }

        self.open_device_shell(port).await
    }

    async fn open_device_shell(&mut self, port: u16) -> Result<InitResult> {
        self.set_phase(Phase::SelectingDevice);

        let devices = self.bridge.devices().await?;
        let Some(selection) = select_device(&devices) else {
            self.output.debug(
                "No devices found after connect. Please check your port and pairing code.",
            );
            self.forget_port();
            return Ok(InitResult::NeedsPort);
        };
        debug!(
            "Selected device {} ({:?}) from {:?}",
            selection.serial, selection.reason, devices
        );

        let shell = self.bridge.spawn_shell(&selection)?;
        self.attach_shell(shell, true).await?;

        self.session.last_connected_port = Some(port);
        self.prefs.last_connected_port = Some(port);
        self.prefs.paired = true;
        self.save_prefs();
        Ok(InitResult::Success)
    }

    async fn open_local_shell(&mut self) -> Result<InitResult> {
        self.set_phase(Phase::SelectingDevice);
        let shell = self.bridge.spawn_local_shell()?;
        self.attach_shell(shell, false).await?;
        Ok(InitResult::Success)
    }

    /// Queue the bootstrap commands and publish the shell as ready.
    async fn attach_shell(&mut self, shell: ShellProcess, via_bridge: bool) -> Result<()> {
        let bridge_path = self.bridge.launcher().bridge_path().display().to_string();
        let behavior = &self.settings.behavior;
        let grant = &self.settings.bridge.grant_command;

        shell.send(&format!("alias adb=\"{}\"", bridge_path)).await?;
        if !grant.is_empty() && !self.toggle.is_privileged().await {
            shell.send(grant).await?;
        }
        shell
            .send(if via_bridge {
                "echo 'Entered adb shell'"
            } else {
                "echo 'Entered non-adb shell'"
            })
            .await?;
        if !behavior.startup_command.is_empty() {
            shell.send(&behavior.startup_command).await?;
        }

        self.set_shell_input(Some(shell.input()));
        self.session.shell = Some(shell);
        self.session.phase = Phase::Shelling;
        self.publish();
        info!("Shell ready");
        Ok(())
    }

    async fn on_shell_death(&mut self, death: &Error) {
        info!("{}", death);
        self.session.shell = None;
        self.set_shell_input(None);
        self.set_phase(Phase::Dead);

        self.output.debug("Shell is dead, resetting...");
        if let Err(e) = self
            .bridge
            .kill_server(self.settings.timing.kill_server_timeout())
            .await
        {
            warn!("kill-server after shell death failed: {}", e);
        }
    }

    async fn pair(&mut self, request: PairingRequest) -> Result<bool> {
        let port = match self.pairing_port(&request) {
            Ok(port) => port,
            Err(e) => {
                self.output.debug(&e.to_string());
                return Err(e);
            }
        };

        self.session.pairing_in_flight = true;
        self.set_phase(Phase::Pairing);

        let target = format!("{}:{}", self.settings.bridge.connect_host, port);
        let timing = &self.settings.timing;
        let result = self
            .bridge
            .pair(&target, &request.code, timing.pair_settle(), timing.pair_timeout())
            .await;
        self.session.pairing_in_flight = false;

        let paired = match result {
            Ok(paired) => paired,
            Err(e) => {
                self.output.debug(&format!("Pairing failed: {}", e));
                self.set_phase(Phase::NeedsPairing);
                return Err(e);
            }
        };

        self.output.debug(if paired {
            "Pairing was successful"
        } else {
            "Pairing was unsuccessful"
        });

        if paired {
            self.prefs.paired = true;
            self.save_prefs();
            self.set_phase(Phase::Connecting);
        } else {
            self.set_phase(Phase::NeedsPairing);
        }
        Ok(paired)
    }

    fn pairing_port(&self, request: &PairingRequest) -> Result<u16> {
        if self.session.closed {
            return Err(Error::SessionClosed);
        }
        if self.session.is_ready() {
            return Err(Error::pairing("a shell is already attached"));
        }
        request
            .port
            .or_else(|| self.discovery.pairing_port())
            .ok_or(Error::NoPort)
    }

    /// Hard reset. Safe to repeat.
    async fn reset(&mut self) {
        info!("Resetting session");
        self.session.pairing_in_flight = false;
        self.detach_shell();

        let limit = self.settings.timing.kill_server_timeout();
        if let Err(e) = self.bridge.disconnect(limit).await {
            warn!("disconnect during reset failed: {}", e);
        }
        if let Err(e) = self.bridge.kill_server(limit).await {
            warn!("kill-server during reset failed: {}", e);
        }

        if let Err(e) = self.output.clear() {
            warn!("Failed to clear output during reset: {}", e);
        }

        self.prefs = Preferences::default();
        self.save_prefs();
        self.session.last_connected_port = None;
        self.session.manual_port = None;

        let files_dir = &self.paths.files_dir;
        match std::fs::remove_dir_all(files_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {:?}: {}", files_dir, e),
        }
        if let Err(e) = self.bridge.launcher().ensure_dirs() {
            warn!("Failed to recreate working directories: {}", e);
        }

        self.session.closed = true;
        self.set_phase(Phase::Closed);
    }

    /// Kill and drop the shell, if any.
    fn detach_shell(&mut self) {
        self.set_shell_input(None);
        if let Some(mut shell) = self.session.shell.take() {
            shell.kill();
        }
    }

    fn forget_port(&mut self) {
        self.session.last_connected_port = None;
        if self.prefs.last_connected_port.take().is_some() {
            self.save_prefs();
        }
    }

    fn save_prefs(&self) {
        if let Err(e) = save_preferences(&self.paths.state_file, &self.prefs) {
            warn!("Failed to save preferences: {}", e);
        }
    }

    fn set_shell_input(&self, input: Option<ShellInput>) {
        let mut slot = self
            .shell_input
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = input;
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.session.phase != phase {
            debug!("Phase: {} -> {}", self.session.phase, phase);
        }
        self.session.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.session.status());
    }
}

/// Where a failed attempt leaves the session.
fn halt_for(e: &Error) -> InitResult {
    if e.is_user_actionable() {
        return match e {
            Error::Pairing { .. } | Error::PairingInFlight => InitResult::NeedsPairing,
            _ => InitResult::NeedsPort,
        };
    }
    if e.is_fatal() {
        error!("Attempt failed: {}", e);
    } else if e.is_transient() {
        warn!("Attempt failed, :start may recover: {}", e);
    } else {
        warn!("Attempt failed: {}", e);
    }
    InitResult::Failure
}

async fn wait_for_exit<F>(exit: Option<F>) -> ShellExit
where
    F: Future<Output = ShellExit>,
{
    match exit {
        Some(exit) => exit.await,
        None => std::future::pending().await,
    }
}
