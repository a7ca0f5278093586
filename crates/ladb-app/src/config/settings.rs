//! Settings file loading and default locations

use super::types::Settings;
use ladb_core::prelude::*;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "ladb";
const CONFIG_FILENAME: &str = "config.toml";

/// `<config_dir>/ladb/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// `<data_local_dir>/ladb`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
}

/// Load settings from `config_path`.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config to `config_path` unless one exists.
///
/// Returns `true` when a file was written.
pub fn init_config(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;

    info!("Wrote default config to {:?}", config_path);
    Ok(true)
}

const DEFAULT_CONFIG: &str = r#"# LADB Configuration

[bridge]
# path = "/opt/android-sdk/platform-tools/adb"   # Default: adb on PATH
connect_host = "localhost"
grant_command = "pm grant com.draco.ladb android.permission.WRITE_SECURE_SETTINGS &> /dev/null"

[behavior]
auto_shell = true           # false = plain local shell, no bridge
pairing_required = true     # Ask for a pairing code until one pairing succeeded
startup_command = "echo 'Success! ※\\(^o^)/※'"

[discovery]
enabled = true
# local_address = "192.168.1.5"   # Default: detected

[output]
buffer_size = "16384"       # Bytes of transcript kept in view

[timing]
enable_poll_ms = 1000
toggle_settle_ms = 3000
discovery_min_dwell_ms = 3000
discovery_ceiling_ms = 10000
discovery_poll_ms = 1000
start_server_timeout_ms = 60000
connect_timeout_ms = 60000
pair_settle_ms = 5000
pair_timeout_ms = 10000
kill_server_timeout_ms = 10000
restart_cooldown_ms = 3000
output_poll_ms = 100
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(&temp.path().join("config.toml"));

        assert!(settings.behavior.auto_shell);
        assert_eq!(settings.timing.connect_timeout_ms, 60_000);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");

        let config = r#"
[bridge]
path = "/opt/sdk/adb"

[behavior]
auto_shell = false
startup_command = ""

[discovery]
local_address = "10.0.0.7"

[output]
buffer_size = "2048"
"#;
        std::fs::write(&path, config).unwrap();

        let settings = load_settings(&path);

        assert_eq!(settings.bridge.path, Some(PathBuf::from("/opt/sdk/adb")));
        assert!(!settings.behavior.auto_shell);
        assert!(settings.behavior.startup_command.is_empty());
        assert_eq!(
            settings.discovery.local_address,
            Some("10.0.0.7".parse().unwrap())
        );
        assert_eq!(settings.output.window(), 2048);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "not valid toml {{{{").unwrap();

        let settings = load_settings(&path);
        assert!(settings.behavior.auto_shell);
    }

    #[test]
    fn test_default_config_parses_to_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        assert!(init_config(&path).unwrap());
        assert!(!init_config(&path).unwrap());

        let settings = load_settings(&path);
        let defaults = Settings::default();
        assert_eq!(settings.behavior.startup_command, defaults.behavior.startup_command);
        assert_eq!(settings.bridge.grant_command, defaults.bridge.grant_command);
        assert_eq!(settings.output.window(), defaults.output.window());
    }
}
