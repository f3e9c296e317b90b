//! Verity Core: primitives for interactive SAS device verification.
//!
//! This crate holds everything both peers must compute bit-for-bit
//! identically: key agreement, derivations, the commitment and the SAS
//! encodings. It has no I/O, no clocks and no global state; the
//! protocol state machine lives in `verity-sas`.
//!
//! # Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`constants`] | Lengths, offsets, HKDF info prefixes |
//! | [`errors`] | [`errors::VerityError`] |
//! | [`encoding`] | Unpadded base64, hex |
//! | [`hash`] | SHA-256, commitment |
//! | [`crypto`] | X25519, HKDF, HMAC |
//! | [`identity`] | Ed25519 public keys, key IDs |
//! | [`sas`] | Decimal and emoji encodings |

/// Protocol constants shared by both peers.
pub mod constants;

/// Error types for verity-core operations.
pub mod errors;

/// Encoding utilities: base64 and hex.
pub mod encoding;

/// Crypto primitives: X25519, HKDF-SHA256, HMAC-SHA256.
pub mod crypto;

/// Hashing utilities: SHA-256 and commitments.
pub mod hash;

/// Identity: Ed25519 public keys and key identifiers.
pub mod identity;

/// SAS: decimal and emoji encodings.
pub mod sas;
