//! Custom error types for the application.
//!
//! This module defines the primary error type, `OsaError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of the acquisition protocol.
//!
//! ## Error Hierarchy
//!
//! - **`Validation`**: A requested parameter is outside its hardware-enforced
//!   range or not in its enumeration. Validation runs as a pure precondition
//!   check, so a request that fails here never reaches the instrument.
//! - **`DeviceCommunication`**: Transport-level failure (timeout, disconnect,
//!   malformed response) on any query. Carries the command that failed.
//! - **`DataIntegrity`**: The instrument reported a point count that does not
//!   match the parsed payload length, or returned an unrecognized power unit
//!   code.
//! - **`SweepTimeout`**: The sweep-status poll exceeded its configured attempt
//!   cap without the instrument reporting idle.
//! - **`IncompatibleUnit`**: Code attempted to compare or combine quantities
//!   of incompatible physical dimensions. This indicates a programming error,
//!   not a runtime condition to tolerate.
//! - **`AcquisitionInProgress`**: The single shared instrument link already
//!   has an acquisition in flight; concurrent requests are rejected rather
//!   than queued.
//! - **`Config`** / **`Io`**: Configuration parsing and file/terminal I/O
//!   failures in the application shell.
//!
//! The core never retries automatically. Communication and integrity failures
//! abort the in-progress acquisition and leave the coordinator's last-applied
//! parameter state unchanged; retrying is a caller decision because repeating
//! a sweep has real-world time cost.

use crate::quantity::Unit;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, OsaError>;

/// Primary error type for the acquisition core and application shell.
#[derive(Error, Debug)]
pub enum OsaError {
    /// A requested parameter failed its hardware-range precondition.
    #[error("Validation error for '{field}': {reason}")]
    Validation {
        /// Logical name of the offending parameter.
        field: &'static str,
        /// Human-readable reason including the violated bound.
        reason: String,
    },

    /// The underlying transport failed or timed out on a query.
    #[error("Device communication error on '{command}': {reason}")]
    DeviceCommunication {
        /// The device command that was being issued.
        command: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// The decoded response contradicts what the instrument reported.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The instrument never reported an idle sweep within the poll budget.
    #[error("Sweep did not reach idle after {attempts} status polls")]
    SweepTimeout {
        /// Number of `SWEEP?` polls issued before giving up.
        attempts: u32,
    },

    /// Quantities of incompatible physical dimensions were combined.
    #[error("Incompatible units: cannot relate {lhs} to {rhs}")]
    IncompatibleUnit {
        /// Unit on the left-hand side of the operation.
        lhs: Unit,
        /// Unit on the right-hand side of the operation.
        rhs: Unit,
    },

    /// The instrument link is busy with another acquisition.
    #[error("An acquisition is already in progress on this instrument")]
    AcquisitionInProgress,

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error in the application shell.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// VISA transport requested but compiled out.
    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,
}

impl OsaError {
    /// Build a validation error for `field` with a formatted reason.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        OsaError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
