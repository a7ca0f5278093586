//! Connection supervisor
//!
//! One worker task owns the [`Session`](crate::session::Session) and drives
//! the handshake: enable debugging, wait for discovery, connect, pair when
//! needed, select a device and open the shell. It then waits on the shell's
//! exit and starts over after a cool-down, forever.
//!
//! Callers talk to the worker through a [`SupervisorHandle`]. Requests that
//! need the worker (`start`, `pair`, `resume_with_port`, `reset`) go over
//! channels and are answered through a oneshot reply; everything else reads
//! published state directly.

mod handle;
mod worker;

pub use handle::SupervisorHandle;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ladb_core::prelude::*;
use ladb_core::{InitResult, PairingRequest, SessionStatus};
use ladb_daemon::{
    detect_local_address, Bridge, MdnsBrowser, PortDiscovery, ProcessLauncher, ServiceBrowser,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{load_preferences, AppPaths, DiscoverySettings, Settings};
use crate::debugging::DebugToggle;
use crate::output::{OutputBridge, OutputBuffer};

use worker::Worker;

/// Requests handled by the supervisor worker.
#[derive(Debug)]
pub(crate) enum Control {
    /// Begin (or report on) the handshake
    Start { reply: oneshot::Sender<InitResult> },
    /// Pair with the code shown on-device, then continue connecting
    Pair {
        request: PairingRequest,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Connect with a port typed in by the user
    ResumeWithPort {
        port: u16,
        reply: oneshot::Sender<InitResult>,
    },
}

/// Spawn the supervisor worker and the output poller.
///
/// `discovery` should already be started (see [`start_discovery`]); an
/// unstarted discovery is skipped during the discovery wait.
pub fn spawn<D>(
    settings: Settings,
    paths: AppPaths,
    bridge_path: PathBuf,
    toggle: D,
    discovery: PortDiscovery,
) -> Result<SupervisorHandle>
where
    D: DebugToggle + Sync + 'static,
{
    let launcher = Arc::new(ProcessLauncher::new(
        bridge_path,
        &paths.files_dir,
        &paths.cache_dir,
        &paths.output_file,
    )?);
    let bridge = Bridge::new(launcher);

    let output = Arc::new(OutputBuffer::new(&paths.output_file)?);
    let (output_bridge, output_rx) = OutputBridge::new(output.clone(), settings.output.window());
    let (output_shutdown_tx, output_shutdown_rx) = watch::channel(false);
    output_bridge.spawn(settings.timing.output_poll(), output_shutdown_rx);

    let prefs = load_preferences(&paths.state_file);
    info!(
        "Supervisor starting (paired: {}, last port: {:?})",
        prefs.paired, prefs.last_connected_port
    );

    let (control_tx, control_rx) = mpsc::channel::<Control>(16);
    let (reset_tx, reset_rx) = mpsc::channel::<oneshot::Sender<()>>(4);
    let (status_tx, status_rx) = watch::channel(SessionStatus::default());
    let shell_input = Arc::new(Mutex::new(None));

    let script_path = paths.script_file();
    let worker = Worker::new(
        settings,
        paths,
        bridge,
        toggle,
        discovery,
        output.clone(),
        prefs,
        status_tx,
        shell_input.clone(),
        output_shutdown_tx,
    );
    tokio::spawn(worker.run(control_rx, reset_rx));

    Ok(SupervisorHandle::new(
        control_tx,
        reset_tx,
        status_rx,
        output_rx,
        shell_input,
        output,
        script_path,
    ))
}

/// Start mDNS port discovery as configured.
///
/// Returns an unstarted [`PortDiscovery`] when discovery is disabled or the
/// mDNS daemon cannot be created; the supervisor then relies on remembered
/// and manual ports.
pub fn start_discovery(settings: &DiscoverySettings) -> PortDiscovery {
    let local_address: Option<IpAddr> = settings.local_address.or_else(detect_local_address);
    let discovery = PortDiscovery::new(local_address);

    if !settings.enabled {
        info!("Port discovery disabled");
        return discovery;
    }

    match MdnsBrowser::new() {
        Ok(browser) => start_with_browser(&discovery, Arc::new(browser)),
        Err(e) => warn!("mDNS unavailable, port discovery disabled: {}", e),
    }
    discovery
}

fn start_with_browser<B: ServiceBrowser>(discovery: &PortDiscovery, browser: Arc<B>) {
    match discovery.start(browser) {
        Ok(()) => debug!(
            "Port discovery started (local address: {:?})",
            discovery.local_address()
        ),
        Err(e) => warn!("Port discovery failed to start: {}", e),
    }
}

#[cfg(test)]
mod tests;
