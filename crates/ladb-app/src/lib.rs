//! # ladb-app - Connection Supervisor
//!
//! Session orchestration for LADB: configuration, persisted preferences, the
//! output transcript and its tailing bridge, the debug toggle seam and the
//! supervisor that turns the multi-step bridge handshake into one observable
//! ready/not-ready session.
//!
//! Depends on [`ladb_core`] for domain types and [`ladb_daemon`] for the
//! bridge, shell and discovery plumbing.
//!
//! ## Public API
//!
//! ### Supervisor
//! - [`supervisor::spawn()`] - Start the worker and output poller
//! - [`SupervisorHandle`] - `start`, `pair`, `resume_with_port`, `send_command`,
//!   `run_script`, `reset` and the status/output subscriptions
//! - [`start_discovery()`] - Start mDNS port discovery from settings
//!
//! ### Output
//! - [`OutputBuffer`] - Append-only transcript file
//! - [`OutputBridge`] - Polls the transcript tail and publishes changes
//!
//! ### Configuration (`config`)
//! - [`Settings`] - `config.toml`
//! - [`Preferences`] - `state.toml`
//! - [`AppPaths`] - Data directory layout
//!
//! ### Debugging
//! - [`DebugToggle`] - Wireless debugging switch, [`PlatformToggle`] in production

pub mod config;
pub mod debugging;
pub mod output;
pub mod session;
pub mod supervisor;

pub use config::{AppPaths, Preferences, Settings};
pub use debugging::{DebugToggle, PlatformToggle};
pub use output::{OutputBridge, OutputBuffer};
pub use session::Session;
pub use supervisor::{start_discovery, SupervisorHandle};
