//! Application error types with rich context

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Bridge/Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Bridge binary not found: {path}. Pass --bridge or install adb.")]
    BridgeNotFound { path: PathBuf },

    #[error("Bridge process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn bridge process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Shell process exited with code: {code:?}")]
    ShellExited { code: Option<i32> },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No debug port available. Enter the port shown on the device's Wireless debugging screen.")]
    NoPort,

    #[error("Pairing failed: {message}")]
    Pairing { message: String },

    #[error("A pairing attempt is already in flight")]
    PairingInFlight,

    #[error("Session is closed; restart required")]
    SessionClosed,

    // ─────────────────────────────────────────────────────────────
    // Discovery Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Service discovery error: {message}")]
    Discovery { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    pub fn pairing(message: impl Into<String>) -> Self {
        Self::Pairing {
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Failures a later attempt may get past without new input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ShellExited { .. }
                | Error::Process { .. }
                | Error::Discovery { .. }
                | Error::ChannelSend { .. }
        )
    }

    /// Failures the caller resolves by collecting new input.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::NoPort | Error::Pairing { .. } | Error::PairingInFlight
        )
    }

    /// Failures no retry in this process recovers from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BridgeNotFound { .. }
                | Error::ProcessSpawn { .. }
                | Error::Timeout { .. }
                | Error::SessionClosed
                | Error::ChannelClosed
        )
    }
}
