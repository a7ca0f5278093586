//! LADB shell
//!
//! Command-line front ends for the LADB connection supervisor: an
//! interactive console and a headless NDJSON mode sharing one command
//! grammar.

pub mod commands;
pub mod console;
pub mod headless;
pub mod input;
pub mod signals;

use std::path::PathBuf;

use ladb_app::config::{default_config_path, default_data_dir, load_settings};
use ladb_app::{start_discovery, supervisor, AppPaths, PlatformToggle, Settings, SupervisorHandle};
use ladb_core::prelude::*;
use ladb_daemon::find_bridge;

pub use commands::Startup;
pub use console::run_console;
pub use headless::runner::run_headless;

/// Everything the binary collects from the command line
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// `config.toml` location; the platform config dir when unset
    pub config_path: Option<PathBuf>,
    /// Sandbox root; the platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Bridge binary, taking precedence over `[bridge] path`
    pub bridge: Option<PathBuf>,
    pub startup: Startup,
    /// Reset the session and exit
    pub reset: bool,
    pub headless: bool,
}

/// Application entry point
pub async fn run(options: Options) -> Result<()> {
    color_eyre::install().map_err(|e| Error::process(e.to_string()))?;
    ladb_core::logging::init()?;

    let result = run_session(options).await;
    if let Err(ref e) = result {
        error!("Application error: {:?}", e);
    }

    info!("LADB exiting");
    result
}

async fn run_session(options: Options) -> Result<()> {
    let settings = match options.config_path.or_else(default_config_path) {
        Some(path) => load_settings(&path),
        None => Settings::default(),
    };

    let data_dir = options
        .data_dir
        .or_else(default_data_dir)
        .ok_or_else(|| Error::config("No data directory available, pass --data-dir"))?;
    let paths = AppPaths::new(data_dir);
    info!("Data directory: {}", paths.data_dir.display());

    let explicit = options.bridge.or_else(|| settings.bridge.path.clone());
    let bridge_path = match find_bridge(explicit.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            if options.headless {
                headless::HeadlessEvent::error(e.to_string(), e.is_fatal()).emit();
            }
            return Err(e);
        }
    };
    info!("Bridge: {}", bridge_path.display());

    let handle = launch(settings, paths, bridge_path).await?;

    if options.reset {
        handle.reset().await?;
        if options.headless {
            headless::HeadlessEvent::from_outcome(commands::Outcome::Reset).emit();
        } else {
            eprintln!("Session reset");
        }
        return Ok(());
    }

    if options.headless {
        run_headless(handle, options.startup).await
    } else {
        run_console(handle, options.startup).await
    }
}

/// Detect the debug toggle, start discovery and spawn the supervisor.
pub async fn launch(
    settings: Settings,
    paths: AppPaths,
    bridge_path: PathBuf,
) -> Result<SupervisorHandle> {
    let toggle = PlatformToggle::detect().await;
    debug!("Debug toggle: {:?}", toggle);

    let discovery = start_discovery(&settings.discovery);
    supervisor::spawn(settings, paths, bridge_path, toggle, discovery)
}
