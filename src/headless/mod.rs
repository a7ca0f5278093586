//! Headless mode - JSON event output for scripting and end-to-end tests
//!
//! Instead of echoing the transcript to the terminal, headless mode writes
//! structured events to stdout and reads the same command grammar as the
//! console from stdin.
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type.
//!
//! # Example Output
//!
//! ```json
//! {"event":"status","phase":"connecting","ready":false,"closed":false,"timestamp":1704700001000}
//! {"event":"init_result","action":"start","result":"success","timestamp":1704700002000}
//! {"event":"output","text":"Entered adb shell\n","timestamp":1704700002100}
//! ```

pub mod runner;

use chrono::Utc;
use ladb_core::{InitResult, Phase, SessionStatus};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use crate::commands::Outcome;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Supervisor status changed
    Status {
        phase: Phase,
        ready: bool,
        closed: bool,
        timestamp: i64,
    },

    /// New transcript text since the previous output event
    Output { text: String, timestamp: i64 },

    /// `start` or `resume` answered
    InitResult {
        action: &'static str,
        result: InitResult,
        timestamp: i64,
    },

    /// Pairing attempt finished
    Paired { success: bool, timestamp: i64 },

    /// A line was offered to the shell
    CommandSent { delivered: bool, timestamp: i64 },

    /// Transcript cleared
    Cleared { timestamp: i64 },

    /// Session reset and closed
    Reset { timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn status(status: SessionStatus) -> Self {
        Self::Status {
            phase: status.phase,
            ready: status.ready,
            closed: status.closed,
            timestamp: Self::now(),
        }
    }

    pub fn output(text: &str) -> Self {
        Self::Output {
            text: text.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        let timestamp = Self::now();
        match outcome {
            Outcome::Started(result) => Self::InitResult {
                action: "start",
                result,
                timestamp,
            },
            Outcome::Resumed(result) => Self::InitResult {
                action: "resume",
                result,
                timestamp,
            },
            Outcome::Paired(success) => Self::Paired { success, timestamp },
            Outcome::Sent(delivered) => Self::CommandSent {
                delivered,
                timestamp,
            },
            Outcome::Cleared => Self::Cleared { timestamp },
            Outcome::Reset => Self::Reset { timestamp },
            Outcome::Failed { message, fatal } => Self::Error {
                message,
                fatal,
                timestamp,
            },
        }
    }
}
