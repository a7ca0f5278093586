//! Configuration types for LADB
//!
//! Defines:
//! - `Settings` - Global settings loaded from `config.toml`
//! - `Preferences` - Session memory persisted in `state.toml`
//! - `AppPaths` - Sandbox directory layout

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fallback tail window for the output view, in bytes
pub const DEFAULT_OUTPUT_WINDOW: usize = 16 * 1024;

/// Global settings (`config.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub behavior: BehaviorSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub timing: TimingSettings,
}

/// Bridge binary settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Explicit bridge binary; looked up on `PATH` when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Host part of the `connect` / `pair` target
    #[serde(default = "default_connect_host")]
    pub connect_host: String,

    /// Sent into a fresh shell when the debug toggle is not privileged.
    /// Empty disables it.
    #[serde(default = "default_grant_command")]
    pub grant_command: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            path: None,
            connect_host: default_connect_host(),
            grant_command: default_grant_command(),
        }
    }
}

fn default_connect_host() -> String {
    "localhost".to_string()
}

fn default_grant_command() -> String {
    "pm grant com.draco.ladb android.permission.WRITE_SECURE_SETTINGS &> /dev/null".to_string()
}

/// Behavior settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BehaviorSettings {
    /// Shell through the bridge. When false a plain local `sh -l` is used.
    #[serde(default = "default_true")]
    pub auto_shell: bool,

    /// Ask for a pairing code until one pairing has succeeded
    #[serde(default = "default_true")]
    pub pairing_required: bool,

    /// Sent after the bootstrap commands; empty disables it
    #[serde(default = "default_startup_command")]
    pub startup_command: String,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            auto_shell: true,
            pairing_required: true,
            startup_command: default_startup_command(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_startup_command() -> String {
    "echo 'Success! ※\\(^o^)/※'".to_string()
}

/// Service discovery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address advertisements must come from; detected when unset
    #[serde(default)]
    pub local_address: Option<IpAddr>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            local_address: None,
        }
    }
}

/// Output view settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    /// Tail window in bytes. Kept as text so a bad value falls back to the
    /// default instead of rejecting the whole file.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> String {
    DEFAULT_OUTPUT_WINDOW.to_string()
}

impl OutputSettings {
    /// Parsed tail window; unparsable or zero values give the default.
    pub fn window(&self) -> usize {
        match self.buffer_size.trim().parse::<usize>() {
            Ok(0) | Err(_) => DEFAULT_OUTPUT_WINDOW,
            Ok(size) => size,
        }
    }
}

/// Delays and timeouts, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingSettings {
    pub enable_poll_ms: u64,
    pub toggle_settle_ms: u64,
    pub discovery_min_dwell_ms: u64,
    pub discovery_ceiling_ms: u64,
    pub discovery_poll_ms: u64,
    pub start_server_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub pair_settle_ms: u64,
    pub pair_timeout_ms: u64,
    pub kill_server_timeout_ms: u64,
    pub restart_cooldown_ms: u64,
    pub output_poll_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            enable_poll_ms: 1_000,
            toggle_settle_ms: 3_000,
            discovery_min_dwell_ms: 3_000,
            discovery_ceiling_ms: 10_000,
            discovery_poll_ms: 1_000,
            start_server_timeout_ms: 60_000,
            connect_timeout_ms: 60_000,
            pair_settle_ms: 5_000,
            pair_timeout_ms: 10_000,
            kill_server_timeout_ms: 10_000,
            restart_cooldown_ms: 3_000,
            output_poll_ms: 100,
        }
    }
}

impl TimingSettings {
    pub fn enable_poll(&self) -> Duration {
        Duration::from_millis(self.enable_poll_ms)
    }

    pub fn toggle_settle(&self) -> Duration {
        Duration::from_millis(self.toggle_settle_ms)
    }

    pub fn discovery_min_dwell(&self) -> Duration {
        Duration::from_millis(self.discovery_min_dwell_ms)
    }

    pub fn discovery_ceiling(&self) -> Duration {
        Duration::from_millis(self.discovery_ceiling_ms)
    }

    pub fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms)
    }

    pub fn start_server_timeout(&self) -> Duration {
        Duration::from_millis(self.start_server_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pair_settle(&self) -> Duration {
        Duration::from_millis(self.pair_settle_ms)
    }

    pub fn pair_timeout(&self) -> Duration {
        Duration::from_millis(self.pair_timeout_ms)
    }

    pub fn kill_server_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_server_timeout_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    pub fn output_poll(&self) -> Duration {
        Duration::from_millis(self.output_poll_ms)
    }
}

/// Session memory that survives restarts (`state.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preferences {
    /// Port of the last connect that produced a shell
    #[serde(default)]
    pub last_connected_port: Option<u16>,

    /// A pairing has succeeded on this device
    #[serde(default)]
    pub paired: bool,
}

/// Where the supervisor keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    /// Working directory and `HOME` of every spawned process
    pub files_dir: PathBuf,
    /// `TMPDIR` of every spawned process
    pub cache_dir: PathBuf,
    /// Append-only shell transcript
    pub output_file: PathBuf,
    pub state_file: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            files_dir: data_dir.join("files"),
            cache_dir: data_dir.join("cache"),
            output_file: data_dir.join("output.txt"),
            state_file: data_dir.join("state.toml"),
            data_dir,
        }
    }

    /// Script hand-off location inside the files directory
    pub fn script_file(&self) -> PathBuf {
        self.files_dir.join("script.sh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.bridge.connect_host, "localhost");
        assert!(settings.behavior.auto_shell);
        assert!(settings.behavior.pairing_required);
        assert!(settings.discovery.enabled);
        assert_eq!(settings.output.window(), 16384);
        assert_eq!(settings.timing.restart_cooldown(), Duration::from_secs(3));
        assert_eq!(settings.timing.output_poll(), Duration::from_millis(100));
    }

    #[test]
    fn test_output_window_falls_back_to_default() {
        let mut output = OutputSettings::default();

        output.buffer_size = "4096".to_string();
        assert_eq!(output.window(), 4096);

        output.buffer_size = "lots".to_string();
        assert_eq!(output.window(), DEFAULT_OUTPUT_WINDOW);

        output.buffer_size = "0".to_string();
        assert_eq!(output.window(), DEFAULT_OUTPUT_WINDOW);

        output.buffer_size = "-5".to_string();
        assert_eq!(output.window(), DEFAULT_OUTPUT_WINDOW);
    }

    #[test]
    fn test_partial_timing_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[timing]
restart_cooldown_ms = 50
"#,
        )
        .unwrap();

        assert_eq!(settings.timing.restart_cooldown_ms, 50);
        assert_eq!(settings.timing.connect_timeout_ms, 60_000);
    }

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::new("/data/ladb");

        assert_eq!(paths.files_dir, PathBuf::from("/data/ladb/files"));
        assert_eq!(paths.cache_dir, PathBuf::from("/data/ladb/cache"));
        assert_eq!(paths.output_file, PathBuf::from("/data/ladb/output.txt"));
        assert_eq!(paths.state_file, PathBuf::from("/data/ladb/state.toml"));
        assert_eq!(paths.script_file(), PathBuf::from("/data/ladb/files/script.sh"));
    }
}
