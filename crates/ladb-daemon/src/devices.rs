//! Device listing parsing and deterministic device selection

/// Header line printed by `adb devices` before the device rows.
const LIST_HEADER: &str = "List of devices attached";

/// Parse the output of `adb devices`.
///
/// The header line and daemon chatter (`* daemon started successfully`) are
/// dropped, then the first whitespace-delimited token of every non-blank line
/// is taken as the device serial.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with(LIST_HEADER))
        .filter(|line| !line.starts_with("* "))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Why a device was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// Exactly one device was listed.
    OnlyDevice,
    /// The serial names the loopback bridge connection.
    Localhost,
    /// First serial that is not an emulator.
    NonEmulator,
    /// Nothing else matched; first in listing order.
    FirstListed,
}

/// The device the shell will attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    pub serial: String,
    pub reason: SelectionReason,
}

impl DeviceSelection {
    /// Arguments for the bridge `shell` subcommand.
    ///
    /// `-s <serial>` is only needed when the bridge has several devices to
    /// choose from.
    pub fn shell_args(&self) -> Vec<String> {
        match self.reason {
            SelectionReason::OnlyDevice => vec!["shell".to_string()],
            _ => vec!["-s".to_string(), self.serial.clone(), "shell".to_string()],
        }
    }
}

fn is_localhost(serial: &str) -> bool {
    serial.contains("localhost")
}

fn is_not_emulator(serial: &str) -> bool {
    !serial.contains("emulator")
}

fn any_device(_: &str) -> bool {
    true
}

/// Tie-break table for multi-device listings, checked in order.
const SELECTION_PRIORITY: &[(SelectionReason, fn(&str) -> bool)] = &[
    (SelectionReason::Localhost, is_localhost),
    (SelectionReason::NonEmulator, is_not_emulator),
    (SelectionReason::FirstListed, any_device),
];

/// Pick the device to shell into, or `None` when the list is empty.
pub fn select_device(serials: &[String]) -> Option<DeviceSelection> {
    match serials {
        [] => None,
        [only] => Some(DeviceSelection {
            serial: only.clone(),
            reason: SelectionReason::OnlyDevice,
        }),
        _ => SELECTION_PRIORITY.iter().find_map(|(reason, matches)| {
            serials
                .iter()
                .find(|serial| matches(serial.as_str()))
                .map(|serial| DeviceSelection {
                    serial: serial.clone(),
                    reason: *reason,
                })
        }),
    }
}
