//! # ladb-core - Core Domain Types
//!
//! Foundation crate for the LADB shell supervisor. Provides session domain
//! types, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing, dirs).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Phase`] - Supervisor state machine phase
//! - [`InitResult`] - Outcome of one orchestration attempt
//! - [`PairingRequest`] - User-supplied pairing port and code
//! - [`SessionStatus`] - Published phase / ready / closed snapshot
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum classified as transient, user-actionable or fatal
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use ladb_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all LADB crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result};
pub use types::{InitResult, PairingRequest, Phase, SessionStatus};
