//! Supervisor-owned session state

use ladb_core::{Phase, SessionStatus};
use ladb_daemon::ShellProcess;

/// Mutable state of one connect/pair/shell lifecycle.
///
/// Owned by the supervisor worker task and never shared; everything other
/// tasks see goes through the published [`SessionStatus`].
#[derive(Debug, Default)]
pub struct Session {
    pub phase: Phase,
    /// Present only while `Shelling`
    pub shell: Option<ShellProcess>,
    /// Port of the last connect that produced a shell, persisted
    pub last_connected_port: Option<u16>,
    /// Port typed in by the user
    pub manual_port: Option<u16>,
    /// Set for the duration of an orchestration or pairing attempt
    pub pairing_in_flight: bool,
    pub closed: bool,
}

impl Session {
    pub fn new(last_connected_port: Option<u16>) -> Self {
        Self {
            last_connected_port,
            ..Self::default()
        }
    }

    /// Port to connect to: last connected, then discovered, then manual.
    pub fn connect_port(&self, discovered: Option<u16>) -> Option<u16> {
        self.last_connected_port.or(discovered).or(self.manual_port)
    }

    /// A shell is attached or an attempt is under way.
    pub fn is_busy(&self) -> bool {
        self.pairing_in_flight || self.phase.is_orchestrating() || self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Shelling && self.shell.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            ready: self.is_ready(),
            closed: self.closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_port_priority() {
        let mut session = Session::new(None);
        assert_eq!(session.connect_port(None), None);

        session.manual_port = Some(3);
        assert_eq!(session.connect_port(None), Some(3));
        assert_eq!(session.connect_port(Some(2)), Some(2));

        session.last_connected_port = Some(1);
        assert_eq!(session.connect_port(Some(2)), Some(1));
    }

    #[test]
    fn test_status_not_ready_without_shell() {
        let mut session = Session::new(Some(40000));
        session.phase = Phase::Shelling;

        let status = session.status();
        assert_eq!(status.phase, Phase::Shelling);
        assert!(!status.ready);
        assert!(!status.closed);
    }

    #[test]
    fn test_busy_while_orchestrating_or_pairing() {
        let mut session = Session::new(None);
        assert!(!session.is_busy());

        session.phase = Phase::Connecting;
        assert!(session.is_busy());

        session.phase = Phase::NeedsPairing;
        assert!(!session.is_busy());

        session.pairing_in_flight = true;
        assert!(session.is_busy());
    }
}
