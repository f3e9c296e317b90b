//! Error types for verity-sas.
//!
//! Only caller misuse and malformed raw input surface as errors.
//! Protocol failures caused by the peer become cancellations instead.

use crate::cancel::CancelCode;

/// Unified error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// No transaction with this ID.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    /// The local action is not valid in the transaction's current state.
    #[error("Invalid state: cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    /// The peer user has no devices to send a request to.
    #[error("No devices: {0}")]
    NoDevices(String),

    /// The transaction is already cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(CancelCode),

    /// The transaction expired; it has now been cancelled with `m.timeout`.
    #[error("Expired: {0}")]
    Expired(String),

    /// Configuration failed validation.
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] verity_core::errors::VerityError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
