//! Identity: long-lived Ed25519 public keys and key identifiers.
//!
//! Device signing keys and cross-signing master keys are attested by MAC
//! during verification. This module only models their public halves and
//! the `ed25519:<id>` identifiers they are addressed by.
//!
//! ## Non-goals
//! - No key generation or storage (cross-signing collaborator concern).
//! - No signature creation or checking.

use crate::constants::{ED25519_KEY_ALGORITHM, ED25519_KEY_LENGTH};
use crate::encoding::{from_base64_32, to_base64};
use crate::errors::VerityError;

/// Public half of an Ed25519 key (device signing key or master key).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; ED25519_KEY_LENGTH]);

impl Ed25519PublicKey {
    /// Wrap a raw 32-byte Ed25519 public key.
    pub fn from_bytes(bytes: [u8; ED25519_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse the unpadded base64 form used on the wire.
    pub fn from_base64(encoded: &str) -> Result<Self, VerityError> {
        from_base64_32(encoded).map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ED25519_KEY_LENGTH] {
        &self.0
    }

    /// Unpadded base64, the form MACed and carried on the wire.
    pub fn to_base64(&self) -> String {
        to_base64(&self.0)
    }
}

impl std::fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PublicKey({})", self.to_base64())
    }
}

impl std::fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Key identifier of the form `ed25519:<key name>`.
///
/// Device keys are named by their device ID, cross-signing keys by their
/// own base64 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    /// Identifier of a device signing key.
    pub fn device(device_id: &str) -> Self {
        Self(format!("{ED25519_KEY_ALGORITHM}:{device_id}"))
    }

    /// Identifier of a cross-signing key.
    pub fn cross_signing(key: &Ed25519PublicKey) -> Self {
        Self(format!("{ED25519_KEY_ALGORITHM}:{}", key.to_base64()))
    }

    /// Parse an identifier received from a peer.
    ///
    /// # Errors
    /// Returns `VerityError::Encoding` for a missing or foreign algorithm.
    pub fn parse(raw: &str) -> Result<Self, VerityError> {
        match raw.split_once(':') {
            Some((ED25519_KEY_ALGORITHM, name)) if !name.is_empty() => Ok(Self(raw.to_owned())),
            _ => Err(VerityError::Encoding(format!("unsupported key id: {raw}"))),
        }
    }

    /// The full identifier, `ed25519:<name>`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of a set of key IDs: sorted, comma-joined.
///
/// This is the payload of the `keys` MAC.
pub fn canonical_key_list<'a>(ids: impl IntoIterator<Item = &'a KeyId>) -> String {
    let mut ids: Vec<&str> = ids.into_iter().map(KeyId::as_str).collect();
    ids.sort_unstable();
    ids.join(",")
}

/// A peer MAC did not verify for the given key.
///
/// The verification MUST be aborted; the key is never marked trusted.
#[derive(Debug)]
pub struct KeyMismatchError {
    /// Owner of the offending key.
    pub user_id: String,
    /// Identifier of the key whose MAC failed.
    pub key_id: String,
}

impl std::fmt::Display for KeyMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MAC mismatch for key {} of {}", self.key_id, self.user_id)
    }
}

impl std::error::Error for KeyMismatchError {}
