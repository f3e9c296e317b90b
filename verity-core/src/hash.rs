//! Hashing utilities: SHA-256 and the SAS commitment.
//!
//! The commitment binds the accepting side to its negotiated parameters
//! and ephemeral key before the initiator reveals its own key.
//!
//! ```text
//! commitment = SHA-256(canonical(accept_params) || ephemeral_public_key)
//! ```

use sha2::{Digest, Sha256};

use crate::constants::PUBLIC_KEY_LENGTH;
use crate::encoding;

/// Compute SHA-256 hash of arbitrary data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Commitment over the canonical accept parameters and the committing
/// side's ephemeral public key.
///
/// `accept_params_canonical` must be byte-identical on both peers; the
/// protocol layer produces it as sorted-key JSON.
pub fn commitment(
    accept_params_canonical: &[u8],
    ephemeral_pub: &[u8; PUBLIC_KEY_LENGTH],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(accept_params_canonical);
    hasher.update(ephemeral_pub);
    hasher.finalize().into()
}

/// Commitment encoded as unpadded base64, the form carried on the wire.
pub fn commitment_base64(
    accept_params_canonical: &[u8],
    ephemeral_pub: &[u8; PUBLIC_KEY_LENGTH],
) -> String {
    encoding::to_base64(&commitment(accept_params_canonical, ephemeral_pub))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty() {
        // NIST: SHA-256("") = e3b0c442...
        assert_eq!(
            encoding::to_hex(&sha256(&[])),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_abc() {
        // NIST: SHA-256("abc") = ba7816bf...
        assert_eq!(
            encoding::to_hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn commitment_is_hash_of_concatenation() {
        let params = br#"{"hash":"sha256"}"#;
        let key = [9u8; 32];
        let mut joined = params.to_vec();
        joined.extend_from_slice(&key);
        assert_eq!(commitment(params, &key), sha256(&joined));
    }

    #[test]
    fn commitment_changes_with_key() {
        let params = br#"{"hash":"sha256"}"#;
        assert_ne!(commitment(params, &[1u8; 32]), commitment(params, &[2u8; 32]));
    }

    #[test]
    fn commitment_changes_with_params() {
        let key = [1u8; 32];
        assert_ne!(
            commitment(br#"{"hash":"sha256"}"#, &key),
            commitment(br#"{"hash":"sha512"}"#, &key)
        );
    }

    #[test]
    fn commitment_base64_is_43_chars() {
        // 32 bytes unpadded base64 = 43 chars.
        assert_eq!(commitment_base64(b"", &[0u8; 32]).len(), 43);
    }
}
