//! Protocol constants: canonical values shared by both peers.
//!
//! Every constant here is part of the wire contract. Two devices that
//! disagree on any of them derive different SAS codes and fail
//! verification.

/// Curve25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes (device and cross-signing keys).
pub const ED25519_KEY_LENGTH: usize = 32;

/// Length of the derived SAS byte stream.
///
/// 42 bits are needed for seven 6-bit emoji indices, 39 bits for three
/// 13-bit decimal numbers. Both read from the same 6 bytes.
pub const SAS_BYTES_LENGTH: usize = 6;

/// Length of the derived MAC key in bytes.
pub const MAC_KEY_LENGTH: usize = 32;

/// Number of decimal groups shown to the user.
pub const SAS_DECIMAL_COUNT: usize = 3;

/// Offset added to each 13-bit decimal group.
pub const SAS_DECIMAL_OFFSET: u16 = 1000;

/// Number of emoji shown to the user.
pub const SAS_EMOJI_COUNT: usize = 7;

/// Size of the emoji table (one entry per 6-bit index).
pub const SAS_EMOJI_TABLE_SIZE: usize = 64;

/// HKDF info prefix for the SAS byte stream.
pub const SAS_INFO_PREFIX: &str = "MATRIX_KEY_VERIFICATION_SAS";

/// HKDF info prefix for the MAC key. Disjoint from [`SAS_INFO_PREFIX`].
pub const MAC_INFO_PREFIX: &str = "MATRIX_KEY_VERIFICATION_MAC";

/// Field separator inside HKDF info strings.
pub const INFO_SEPARATOR: char = '|';

/// Algorithm prefix of Ed25519 key identifiers (`ed25519:<id>`).
pub const ED25519_KEY_ALGORITHM: &str = "ed25519";

/// Key ID slot under which the MAC of the canonical key list is computed.
pub const KEY_LIST_MAC_ID: &str = "KEY_IDS";
