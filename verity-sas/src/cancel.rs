//! Cancel-code registry.
//!
//! Every `cancel` event carries one of these machine-readable codes.
//! Codes received from peers that are not in the registry are kept
//! verbatim as `CancelCode::Other`.

use crate::methods::string_enum;

string_enum! {
    /// Machine-readable cancellation reason.
    pub enum CancelCode {
        /// The local user aborted.
        User => "m.user",
        /// The transaction expired.
        Timeout => "m.timeout",
        /// Reserved. Events for unknown transactions are ignored, not cancelled.
        UnknownTransaction => "m.unknown_transaction",
        /// No overlap in methods or SAS parameters.
        UnknownMethod => "m.unknown_method",
        /// Event not valid in the current state.
        UnexpectedMessage => "m.unexpected_message",
        /// A peer MAC did not verify.
        MismatchedKeys => "m.key_mismatch",
        /// Event came from a device other than the transaction's peer.
        UserMismatch => "m.user_mismatch",
        /// Malformed field.
        InvalidMessage => "m.invalid_message",
        /// Another device answered the request first.
        Accepted => "m.accepted",
        /// The revealed key does not match the commitment.
        MismatchedCommitment => "m.mismatched_commitment",
        /// The codes differ, or the key agreement was degenerate.
        MismatchedSas => "m.mismatched_sas",
    }
}

impl CancelCode {
    /// Default human-readable reason sent alongside the code.
    pub fn default_reason(&self) -> &'static str {
        match self {
            Self::User => "The user cancelled the verification.",
            Self::Timeout => "The verification timed out.",
            Self::UnknownTransaction => "Unknown transaction.",
            Self::UnknownMethod => "No common verification method or parameters.",
            Self::UnexpectedMessage => "Unexpected message for the current state.",
            Self::MismatchedKeys => "A key MAC did not match.",
            Self::UserMismatch => "The message came from an unexpected device.",
            Self::InvalidMessage => "The message was malformed.",
            Self::Accepted => "The verification was accepted by another device.",
            Self::MismatchedCommitment => "The key did not match the commitment.",
            Self::MismatchedSas => "The short authentication strings did not match.",
            Self::Other(_) => "The verification was cancelled.",
        }
    }
}

/// Canonical cancel-code registry, in declaration order.
pub const CANCEL_CODES: [&str; 11] = [
    "m.user",
    "m.timeout",
    "m.unknown_transaction",
    "m.unknown_method",
    "m.unexpected_message",
    "m.key_mismatch",
    "m.user_mismatch",
    "m.invalid_message",
    "m.accepted",
    "m.mismatched_commitment",
    "m.mismatched_sas",
];

/// Returns `true` if `code` is in [`CANCEL_CODES`].
pub fn is_valid_cancel_code(code: &str) -> bool {
    CANCEL_CODES.contains(&code)
}
