//! Error types for verity-core.
//!
//! One enum covers every primitive. Variants carry a human-readable
//! detail; callers that need a machine-readable reason map the variant
//! to a cancel code at the protocol layer.

/// Unified error type for all verity-core operations.
#[derive(Debug, thiserror::Error)]
pub enum VerityError {
    /// Peer public key is malformed or a low-order point.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Encoding error (base64, hex, key identifiers).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// HKDF expansion failure.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// MAC computation failure.
    #[error("MAC error: {0}")]
    Mac(String),
}
