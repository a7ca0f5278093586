//! Session domain types shared by the supervisor and its callers

use serde::{Deserialize, Serialize};

/// Phase of the connection supervisor's state machine.
///
/// The forward path is
/// `Idle → EnablingDebugging → AwaitingDiscovery → Connecting → SelectingDevice → Shelling`,
/// with `NeedsPairing → Pairing → Connecting` as a detour and
/// `Shelling → Dead → EnablingDebugging` as the restart loop. `NeedsPort`,
/// `Failed` and `Closed` are halt phases the caller has to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    EnablingDebugging,
    AwaitingDiscovery,
    Connecting,
    NeedsPairing,
    Pairing,
    SelectingDevice,
    Shelling,
    Dead,
    NeedsPort,
    Failed,
    Closed,
}

impl Phase {
    /// True while the worker is driving the handshake and not waiting on anyone.
    pub fn is_orchestrating(&self) -> bool {
        matches!(
            self,
            Phase::EnablingDebugging
                | Phase::AwaitingDiscovery
                | Phase::Connecting
                | Phase::Pairing
                | Phase::SelectingDevice
                | Phase::Dead
        )
    }

    /// True when the state machine stopped and needs input from the caller.
    pub fn is_halted(&self) -> bool {
        matches!(
            self,
            Phase::NeedsPairing | Phase::NeedsPort | Phase::Failed | Phase::Closed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::EnablingDebugging => "enabling debugging",
            Phase::AwaitingDiscovery => "awaiting discovery",
            Phase::Connecting => "connecting",
            Phase::NeedsPairing => "needs pairing",
            Phase::Pairing => "pairing",
            Phase::SelectingDevice => "selecting device",
            Phase::Shelling => "shell ready",
            Phase::Dead => "shell dead",
            Phase::NeedsPort => "needs port",
            Phase::Failed => "failed",
            Phase::Closed => "closed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one orchestration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitResult {
    /// The shell is (or already was) ready.
    Success,
    /// No port could be found; ask the user for the one shown on-device.
    NeedsPort,
    /// The device has never been paired; collect a pairing code.
    NeedsPairing,
    /// The attempt ended; a fresh attempt must be started deliberately.
    Failure,
}

impl InitResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InitResult::Success)
    }

    /// Phase the supervisor rests in after reporting this result.
    pub fn halt_phase(&self) -> Phase {
        match self {
            InitResult::Success => Phase::Shelling,
            InitResult::NeedsPort => Phase::NeedsPort,
            InitResult::NeedsPairing => Phase::NeedsPairing,
            InitResult::Failure => Phase::Failed,
        }
    }
}

/// Pairing input supplied by the user while the session is in `NeedsPairing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    /// Pairing port shown on-device. `None` uses the discovered pairing port.
    pub port: Option<u16>,
    /// Numeric pairing code shown on-device.
    pub code: String,
}

impl PairingRequest {
    pub fn new(port: Option<u16>, code: impl Into<String>) -> Self {
        Self {
            port,
            code: code.into(),
        }
    }
}

/// Last-value-wins snapshot of the supervisor, published to any number of readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: Phase,
    /// The shell accepts commands.
    pub ready: bool,
    /// `reset` ran; the process must be restarted to get a new session.
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_default_is_idle() {
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(SessionStatus::default().phase, Phase::Idle);
        assert!(!SessionStatus::default().ready);
    }

    #[test]
    fn test_halt_and_orchestrating_are_disjoint() {
        let all = [
            Phase::Idle,
            Phase::EnablingDebugging,
            Phase::AwaitingDiscovery,
            Phase::Connecting,
            Phase::NeedsPairing,
            Phase::Pairing,
            Phase::SelectingDevice,
            Phase::Shelling,
            Phase::Dead,
            Phase::NeedsPort,
            Phase::Failed,
            Phase::Closed,
        ];
        for phase in all {
            assert!(
                !(phase.is_halted() && phase.is_orchestrating()),
                "{phase:?} is both halted and orchestrating"
            );
        }
    }

    #[test]
    fn test_init_result_halt_phase() {
        assert_eq!(InitResult::Success.halt_phase(), Phase::Shelling);
        assert_eq!(InitResult::NeedsPort.halt_phase(), Phase::NeedsPort);
        assert_eq!(InitResult::NeedsPairing.halt_phase(), Phase::NeedsPairing);
        assert_eq!(InitResult::Failure.halt_phase(), Phase::Failed);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::AwaitingDiscovery).unwrap();
        assert_eq!(json, "\"awaiting_discovery\"");
    }
}
