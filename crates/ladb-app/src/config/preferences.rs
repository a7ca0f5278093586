//! Persisted session memory (`state.toml`)

use super::types::Preferences;
use fs2::FileExt;
use ladb_core::prelude::*;
use std::io::Write;
use std::path::Path;

/// Load preferences; a missing or unreadable file is a first run.
pub fn load_preferences(path: &Path) -> Preferences {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            warn!("Failed to parse {:?}: {}", path, e);
            Preferences::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No state file at {:?}", path);
            Preferences::default()
        }
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Preferences::default()
        }
    }
}

/// Write preferences under an exclusive file lock.
pub fn save_preferences(path: &Path, prefs: &Preferences) -> Result<()> {
    let content = toml::to_string_pretty(prefs)
        .map_err(|e| Error::config(format!("Failed to serialize preferences: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create state dir: {}", e)))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::config(format!("Failed to open state.toml: {}", e)))?;

    // Blocks if another process holds the lock; released when `file` drops
    file.lock_exclusive()
        .map_err(|e| Error::config(format!("Failed to lock state.toml: {}", e)))?;

    file.set_len(0)
        .map_err(|e| Error::config(format!("Failed to truncate state.toml: {}", e)))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write state.toml: {}", e)))?;
    file.flush()
        .map_err(|e| Error::config(format!("Failed to flush state.toml: {}", e)))?;

    debug!("Saved preferences to {:?}", path);
    Ok(())
}
