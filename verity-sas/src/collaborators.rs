//! Collaborator interfaces.
//!
//! The coordinator performs no I/O of its own. Delivery, trust storage,
//! cross-signing and user interaction are reached through these traits,
//! injected as [`Collaborators`]. In-memory implementations live in
//! [`crate::memory`].

use std::sync::Arc;

use verity_core::identity::{Ed25519PublicKey, KeyId};

use crate::cancel::CancelCode;
use crate::events::VerificationEvent;
use crate::transaction::ShortAuthString;

/// A send could not be handed to the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// The cross-signing provider refused or failed to sign.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Signing error: {0}")]
pub struct SigningError(pub String);

/// Device-to-device delivery. Sends are fire-and-forget.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        user_id: &str,
        device_id: &str,
        event: &VerificationEvent,
    ) -> Result<(), TransportError>;
}

/// Records which peer keys have been verified.
pub trait TrustStore: Send + Sync {
    fn mark_verified(&self, user_id: &str, key_id: &KeyId);

    fn is_verified(&self, user_id: &str, key_id: &KeyId) -> bool;
}

/// Local cross-signing keys.
pub trait CrossSigning: Send + Sync {
    /// Our master key, if cross-signing is active on this device.
    fn master_key(&self) -> Option<Ed25519PublicKey>;

    /// Sign a verified key of `user_id` with our master key.
    fn sign(&self, user_id: &str, key: &Ed25519PublicKey) -> Result<(), SigningError>;
}

/// Lookup of other users' published device and master keys.
pub trait KeyDirectory: Send + Sync {
    fn devices(&self, user_id: &str) -> Vec<String>;

    fn device_key(&self, user_id: &str, device_id: &str) -> Option<Ed25519PublicKey>;

    fn master_key(&self, user_id: &str) -> Option<Ed25519PublicKey>;
}

/// User-facing notifications.
///
/// Called from inside a transaction's critical section: implementations
/// must not call back into the coordinator for the same transaction.
pub trait VerificationCallbacks: Send + Sync {
    /// A peer asked us to verify. Answer with `accept_verification`.
    fn on_request(&self, _transaction_id: &str, _from_user: &str, _from_device: &str) {}

    /// Both sides derived the codes; show them and ask for confirmation.
    fn on_sas_ready(&self, transaction_id: &str, sas: &ShortAuthString);

    fn on_done(&self, transaction_id: &str);

    fn on_cancelled(&self, transaction_id: &str, code: &CancelCode);

    /// An outbound event could not be sent. The state machine has
    /// already advanced.
    fn on_transport_error(&self, _transaction_id: &str, _error: &TransportError) {}
}

/// This device: owner, ID and long-term signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub user_id: String,
    pub device_id: String,
    pub signing_key: Ed25519PublicKey,
}

impl DeviceIdentity {
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        signing_key: Ed25519PublicKey,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            signing_key,
        }
    }
}

/// Everything the coordinator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub trust_store: Arc<dyn TrustStore>,
    pub directory: Arc<dyn KeyDirectory>,
    /// `None` when this device has no cross-signing keys.
    pub cross_signing: Option<Arc<dyn CrossSigning>>,
    pub callbacks: Arc<dyn VerificationCallbacks>,
}
