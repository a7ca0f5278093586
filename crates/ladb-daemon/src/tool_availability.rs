//! Locating the bridge binary
//!
//! The bridge is looked up once at startup: an explicitly configured path
//! first, then `adb` on `PATH`, then the Android SDK `platform-tools`
//! directory under `ANDROID_HOME` or `ANDROID_SDK_ROOT`.

use std::path::{Path, PathBuf};

use ladb_core::prelude::*;

/// Default executable name searched for on `PATH`
pub const BRIDGE_BINARY: &str = "adb";

/// Resolve the bridge binary to a canonical path.
pub fn find_bridge(explicit: Option<&Path>) -> Result<PathBuf> {
    locate(explicit, which::which(BRIDGE_BINARY).ok(), &sdk_roots())
}

fn locate(
    explicit: Option<&Path>,
    on_path: Option<PathBuf>,
    sdk_roots: &[PathBuf],
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return canonical_file(path).ok_or_else(|| Error::BridgeNotFound {
            path: path.to_path_buf(),
        });
    }

    if let Some(path) = on_path.as_deref().and_then(canonical_file) {
        debug!("Found {} on PATH: {}", BRIDGE_BINARY, path.display());
        return Ok(path);
    }

    for root in sdk_roots {
        let candidate = root.join("platform-tools").join(BRIDGE_BINARY);
        if let Some(path) = canonical_file(&candidate) {
            debug!("Found {} in SDK: {}", BRIDGE_BINARY, path.display());
            return Ok(path);
        }
    }

    Err(Error::BridgeNotFound {
        path: PathBuf::from(BRIDGE_BINARY),
    })
}

fn sdk_roots() -> Vec<PathBuf> {
    ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(PathBuf::from)
        .collect()
}

fn canonical_file(path: &Path) -> Option<PathBuf> {
    dunce::canonicalize(path).ok().filter(|p| p.is_file())
}
