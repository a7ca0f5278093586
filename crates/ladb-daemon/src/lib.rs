//! # ladb-daemon - Bridge Process Management
//!
//! Everything that touches the `adb`-compatible bridge binary or the local
//! network: sandboxed process launching, bridge subcommands, device listing,
//! the long-lived shell handle and mDNS port discovery.
//!
//! Depends on [`ladb_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Processes
//! - [`ProcessLauncher`] - Spawn processes under the sandbox invocation contract
//! - [`Bridge`] - `start-server`, `connect`, `pair`, `devices`, `shell` and friends
//! - [`ShellProcess`] - Shell child with an input queue and an exit watch
//!
//! ### Devices
//! - [`parse_device_list()`] - Parse `adb devices` output
//! - [`select_device()`] - Deterministic tie-break between listed devices
//!
//! ### Port Discovery
//! - [`PortDiscovery`] - Elects the best connect and pairing ports
//! - [`ServiceBrowser`] - Registered-service browser seam, [`MdnsBrowser`] in production
//!
//! ### Tooling
//! - [`find_bridge()`] - Locate the bridge binary

pub mod bridge;
pub mod devices;
pub mod discovery;
pub mod launcher;
pub mod shell;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

pub use bridge::Bridge;
pub use devices::{parse_device_list, select_device, DeviceSelection, SelectionReason};
pub use discovery::{
    detect_local_address, BrowseEvent, DiscoveredService, MdnsBrowser, PortDiscovery,
    ResolveFailure, ServiceBrowser, ServiceKind,
};
pub use launcher::{ProcessLauncher, Redirect};
pub use shell::{ShellExit, ShellInput, ShellProcess};
pub use tool_availability::find_bridge;
