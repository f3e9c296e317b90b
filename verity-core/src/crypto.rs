//! Crypto primitives: X25519 agreement, HKDF derivation, HMAC.
//!
//! ## Derivation
//! ```text
//! shared   = X25519(our_secret, their_public)          (must be contributory)
//! sas      = HKDF-SHA256(ikm = shared, salt = "", info = SAS info)[..6]
//! mac_key  = HKDF-SHA256(ikm = shared, salt = "", info = MAC info)[..32]
//! mac(x)   = HMAC-SHA256(mac_key, direction || key_id || x)
//! ```
//!
//! SAS info and MAC info start with distinct prefixes, so the SAS bytes
//! and the MAC key are independent outputs of the same secret. Both
//! list the initiator first, which makes the output role-independent:
//! the two peers agree on who the initiator is.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    INFO_SEPARATOR, MAC_INFO_PREFIX, MAC_KEY_LENGTH, PUBLIC_KEY_LENGTH, SAS_BYTES_LENGTH,
    SAS_INFO_PREFIX,
};
use crate::encoding::to_base64;
use crate::errors::VerityError;

type HmacSha256 = Hmac<Sha256>;

/// Ephemeral X25519 keypair.
///
/// The secret half is zeroized on drop and by [`Zeroize::zeroize`].
pub struct KeyPair {
    secret: StaticSecret,
    /// Curve25519 public key (32 bytes).
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl KeyPair {
    /// X25519 with the peer's public key.
    ///
    /// # Errors
    /// Returns `VerityError::InvalidPublicKey` when the peer key is a
    /// low-order point (the shared secret would be all zeros).
    pub fn agree(&self, their_public: &[u8; PUBLIC_KEY_LENGTH]) -> Result<SharedSecret, VerityError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*their_public));
        if !shared.was_contributory() {
            return Err(VerityError::InvalidPublicKey(
                "peer key is a low-order point".into(),
            ));
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

impl Zeroize for KeyPair {
    fn zeroize(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &to_base64(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Generate a fresh ephemeral X25519 keypair from the OS CSPRNG.
pub fn generate_keypair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public_key = *PublicKey::from(&secret).as_bytes();
    KeyPair { secret, public_key }
}

/// Raw X25519 output. Only ever fed into HKDF.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Derived SAS byte stream, input of the decimal and emoji encoders.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SasBytes([u8; SAS_BYTES_LENGTH]);

impl SasBytes {
    /// Wrap raw bytes (test vectors, fixtures).
    pub fn from_bytes(bytes: [u8; SAS_BYTES_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw SAS bytes, input to the decimal and emoji encodings.
    pub fn as_bytes(&self) -> &[u8; SAS_BYTES_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for SasBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SasBytes(<redacted>)")
    }
}

/// Derived MAC key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; MAC_KEY_LENGTH]);

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MacKey(<redacted>)")
    }
}

/// One side of the key agreement as it appears in HKDF info strings.
#[derive(Debug, Clone, Copy)]
pub struct AgreementParty<'a> {
    pub user_id: &'a str,
    pub device_id: &'a str,
    pub ephemeral_key: &'a [u8; PUBLIC_KEY_LENGTH],
}

fn agreement_info(
    prefix: &str,
    context: Option<&str>,
    initiator: &AgreementParty<'_>,
    responder: &AgreementParty<'_>,
    transaction_id: &str,
) -> String {
    let mut fields: Vec<String> = vec![prefix.to_owned()];
    if let Some(context) = context {
        fields.push(context.to_owned());
    }
    for party in [initiator, responder] {
        fields.push(party.user_id.to_owned());
        fields.push(party.device_id.to_owned());
        fields.push(to_base64(party.ephemeral_key));
    }
    fields.push(transaction_id.to_owned());
    fields.join(&INFO_SEPARATOR.to_string())
}

/// HKDF info for the SAS byte stream.
pub fn sas_info(
    initiator: &AgreementParty<'_>,
    responder: &AgreementParty<'_>,
    transaction_id: &str,
) -> String {
    agreement_info(SAS_INFO_PREFIX, None, initiator, responder, transaction_id)
}

/// HKDF info for the MAC key. `mac_method` is the negotiated MAC method
/// name, bound into the derivation.
pub fn mac_key_info(
    mac_method: &str,
    initiator: &AgreementParty<'_>,
    responder: &AgreementParty<'_>,
    transaction_id: &str,
) -> String {
    agreement_info(
        MAC_INFO_PREFIX,
        Some(mac_method),
        initiator,
        responder,
        transaction_id,
    )
}

fn hkdf_expand<const N: usize>(shared: &SharedSecret, info: &str) -> Result<[u8; N], VerityError> {
    let hk = Hkdf::<Sha256>::new(None, &shared.0);
    let mut okm = [0u8; N];
    hk.expand(info.as_bytes(), &mut okm)
        .map_err(|e| VerityError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Expand the shared secret into the SAS byte stream.
pub fn derive_sas_bytes(shared: &SharedSecret, info: &str) -> Result<SasBytes, VerityError> {
    hkdf_expand::<SAS_BYTES_LENGTH>(shared, info).map(SasBytes)
}

/// Expand the shared secret into the MAC key.
pub fn derive_mac_key(shared: &SharedSecret, info: &str) -> Result<MacKey, VerityError> {
    hkdf_expand::<MAC_KEY_LENGTH>(shared, info).map(MacKey)
}

/// Sender/receiver binding mixed into every MAC so a MAC cannot be
/// reflected back to its author or replayed in another transaction.
#[derive(Debug, Clone, Copy)]
pub struct MacDirection<'a> {
    pub sender_user: &'a str,
    pub sender_device: &'a str,
    pub receiver_user: &'a str,
    pub receiver_device: &'a str,
    pub transaction_id: &'a str,
}

impl MacDirection<'_> {
    /// Bytes authenticated for `key_id` carrying `value`.
    pub fn input(&self, key_id: &str, value: &str) -> Vec<u8> {
        [
            self.sender_user,
            self.sender_device,
            self.receiver_user,
            self.receiver_device,
            self.transaction_id,
            key_id,
            value,
        ]
        .join(&INFO_SEPARATOR.to_string())
        .into_bytes()
    }
}

/// HMAC-SHA256 keyed by the derived MAC key.
pub fn mac(key: &MacKey, data: &[u8]) -> Result<[u8; 32], VerityError> {
    let mut mac = HmacSha256::new_from_slice(&key.0).map_err(|e| VerityError::Mac(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// [`mac`] encoded as unpadded base64.
pub fn mac_base64(key: &MacKey, data: &[u8]) -> Result<String, VerityError> {
    mac(key, data).map(|tag| to_base64(&tag))
}

/// Constant-time check of a base64 MAC received from a peer.
///
/// Malformed base64 counts as a mismatch.
pub fn verify_mac(key: &MacKey, data: &[u8], expected_base64: &str) -> Result<bool, VerityError> {
    let Ok(expected) = crate::encoding::from_base64(expected_base64) else {
        return Ok(false);
    };
    let mut mac = HmacSha256::new_from_slice(&key.0).map_err(|e| VerityError::Mac(e.to_string()))?;
    mac.update(data);
    Ok(mac.verify_slice(&expected).is_ok())
}
