//! Test utilities for bridge and discovery code
//!
//! Provides a shell-script stand-in for the bridge binary and an in-memory
//! [`ServiceBrowser`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::discovery::{BrowseEvent, ServiceBrowser, ServiceKind};
use ladb_core::Result;

/// Pairing code the fake bridge accepts.
pub const GOOD_PAIRING_CODE: &str = "123456";

const FAKE_BRIDGE_SCRIPT: &str = r#"#!/bin/sh
DIR="$(dirname "$0")"
echo "$*" >> "$DIR/calls.log"
case "$1" in
    start-server|kill-server|disconnect)
        exit 0
        ;;
    connect)
        if [ -f "$DIR/connect_hangs" ]; then
            sleep 30
        fi
        echo "connected to $2"
        exit 0
        ;;
    devices)
        echo "List of devices attached"
        if [ -f "$DIR/devices.txt" ]; then
            while IFS= read -r serial; do
                [ -n "$serial" ] && printf '%s\tdevice\n' "$serial"
            done < "$DIR/devices.txt"
        fi
        echo ""
        exit 0
        ;;
    pair)
        read -r code
        if [ "$code" = "123456" ]; then
            echo "Successfully paired to $2"
            exit 0
        fi
        echo "Failed: Wrong password or connection was dropped."
        exit 1
        ;;
    -s)
        shift 2
        ;;
esac
if [ "$1" = "shell" ]; then
    exec sh
fi
echo "unknown command: $*" >&2
exit 1
"#;

/// Write an executable fake bridge named `adb` into `dir`.
///
/// Every invocation is appended to `dir/calls.log`. `devices` lists the
/// serials in `dir/devices.txt`; `connect` hangs while `dir/connect_hangs`
/// exists; `shell` execs a plain `sh`.
pub fn write_fake_bridge(dir: &Path) -> PathBuf {
    let path = dir.join("adb");
    std::fs::write(&path, FAKE_BRIDGE_SCRIPT).expect("failed to write fake bridge");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to mark fake bridge executable");
    }
    path
}

/// Replace the device listing served by the fake bridge in `dir`.
pub fn set_fake_devices(dir: &Path, serials: &[&str]) {
    let mut content = serials.join("\n");
    content.push('\n');
    std::fs::write(dir.join("devices.txt"), content).expect("failed to write devices.txt");
}

/// Invocations recorded by the fake bridge in `dir`, oldest first.
pub fn fake_bridge_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// In-memory browser: tests push events, resolve requests are recorded.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    sinks: Mutex<Vec<(ServiceKind, mpsc::UnboundedSender<BrowseEvent>)>>,
    resolves: Mutex<Vec<(ServiceKind, String)>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_browsing(&self, kind: ServiceKind) -> bool {
        self.sinks.lock().unwrap().iter().any(|(k, _)| *k == kind)
    }

    pub fn browse_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Deliver `event` to the sink registered for its service type.
    pub fn emit(&self, event: BrowseEvent) {
        let kind = match &event {
            BrowseEvent::Found { kind, .. }
            | BrowseEvent::ResolveFailed { kind, .. }
            | BrowseEvent::Lost { kind, .. } => *kind,
            BrowseEvent::Resolved(service) => service.kind,
        };
        let sinks = self.sinks.lock().unwrap();
        if let Some((_, sink)) = sinks.iter().find(|(k, _)| *k == kind) {
            let _ = sink.send(event);
        }
    }

    /// Names passed to `resolve`, in call order.
    pub fn resolve_requests(&self) -> Vec<String> {
        self.resolves
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl ServiceBrowser for FakeBrowser {
    fn browse(&self, kind: ServiceKind, sink: mpsc::UnboundedSender<BrowseEvent>) -> Result<()> {
        self.sinks.lock().unwrap().push((kind, sink));
        Ok(())
    }

    fn resolve(&self, kind: ServiceKind, name: &str) -> Result<()> {
        self.resolves.lock().unwrap().push((kind, name.to_string()));
        Ok(())
    }
}
