//! Wireless debugging toggle
//!
//! The supervisor only needs to ask whether debugging is on and, when the
//! platform lets it, flip it. [`PlatformToggle`] drives the Android `settings`
//! tool when one is on `PATH`; everywhere else debugging is assumed to be
//! managed by the user.

use std::time::Duration;

use ladb_core::prelude::*;
use tokio::process::Command;
use tokio::time::timeout;

/// Settings key behind the wireless debugging switch
const WIRELESS_DEBUGGING_KEY: &str = "adb_wifi_enabled";

/// Bound on one `settings` invocation
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Debug toggle operations
#[trait_variant::make(DebugToggle: Send)]
pub trait LocalDebugToggle {
    /// The toggle can be flipped without the user.
    async fn is_privileged(&self) -> bool;

    /// Wireless debugging is currently on.
    async fn is_enabled(&self) -> bool;

    /// Flip wireless debugging. Only meaningful when privileged.
    async fn set_enabled(&self, enabled: bool) -> Result<()>;
}

/// Toggle backed by the platform, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformToggle {
    /// Android `settings` tool; `privileged` when writes are permitted
    SettingsCli { privileged: bool },
    /// No toggle available; the user is responsible for enabling debugging
    Unmanaged,
}

impl PlatformToggle {
    /// Probe for the `settings` tool and whether it may write.
    ///
    /// Writing the current value back is the cheapest way to learn whether
    /// the secure-settings permission was granted.
    pub async fn detect() -> Self {
        let Some(current) = settings_get(WIRELESS_DEBUGGING_KEY).await else {
            debug!("No settings tool, debugging is user-managed");
            return PlatformToggle::Unmanaged;
        };

        let privileged = settings_put(WIRELESS_DEBUGGING_KEY, &current).await.is_ok();
        info!(
            "Wireless debugging toggle found (privileged: {})",
            privileged
        );
        PlatformToggle::SettingsCli { privileged }
    }
}

impl DebugToggle for PlatformToggle {
    async fn is_privileged(&self) -> bool {
        matches!(self, PlatformToggle::SettingsCli { privileged: true })
    }

    async fn is_enabled(&self) -> bool {
        match self {
            PlatformToggle::SettingsCli { .. } => {
                settings_get(WIRELESS_DEBUGGING_KEY).await.as_deref() == Some("1")
            }
            PlatformToggle::Unmanaged => true,
        }
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        match self {
            PlatformToggle::SettingsCli { privileged: true } => {
                settings_put(WIRELESS_DEBUGGING_KEY, if enabled { "1" } else { "0" }).await
            }
            _ => Err(Error::process("wireless debugging toggle is not writable")),
        }
    }
}

async fn settings_get(key: &str) -> Option<String> {
    let output = timeout(
        SETTINGS_TIMEOUT,
        Command::new("settings")
            .args(["get", "global", key])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn settings_put(key: &str, value: &str) -> Result<()> {
    let status = timeout(
        SETTINGS_TIMEOUT,
        Command::new("settings")
            .args(["put", "global", key, value])
            .kill_on_drop(true)
            .status(),
    )
    .await
    .map_err(|_| Error::timeout("settings put", SETTINGS_TIMEOUT))??;

    if status.success() {
        Ok(())
    } else {
        Err(Error::process(format!(
            "settings put {} exited with {:?}",
            key,
            status.code()
        )))
    }
}
