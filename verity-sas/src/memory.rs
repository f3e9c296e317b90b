//! In-memory collaborators.
//!
//! A [`MemoryHub`] owns one inbox per `(user, device)`; each device gets a
//! [`MemoryTransport`] that stamps its own user as the sender. Nothing is
//! delivered automatically: the caller drains inboxes into
//! `Coordinator::dispatch`. Used by the integration tests and by embedders
//! wiring two coordinators together in one process.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use verity_core::identity::{Ed25519PublicKey, KeyId};

use crate::cancel::CancelCode;
use crate::collaborators::{
    CrossSigning, KeyDirectory, SigningError, Transport, TransportError, TrustStore,
    VerificationCallbacks,
};
use crate::events::{ToDeviceEvent, VerificationEvent};
use crate::transaction::ShortAuthString;

type Inbox = VecDeque<ToDeviceEvent>;

/// Shared inboxes, keyed by recipient.
#[derive(Debug, Default)]
pub struct MemoryHub {
    inboxes: Mutex<HashMap<(String, String), Inbox>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport sending as `user_id`.
    pub fn transport_for(self: &Arc<Self>, user_id: impl Into<String>) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            hub: Arc::clone(self),
            sender: user_id.into(),
            offline: AtomicBool::new(false),
        })
    }

    fn push(&self, user_id: &str, device_id: &str, event: ToDeviceEvent) {
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((user_id.to_owned(), device_id.to_owned()))
            .or_default()
            .push_back(event);
    }

    /// Oldest pending event for a device.
    pub fn pop(&self, user_id: &str, device_id: &str) -> Option<ToDeviceEvent> {
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&(user_id.to_owned(), device_id.to_owned()))
            .and_then(VecDeque::pop_front)
    }

    /// Every pending event for a device, oldest first.
    pub fn drain(&self, user_id: &str, device_id: &str) -> Vec<ToDeviceEvent> {
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&(user_id.to_owned(), device_id.to_owned()))
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, user_id: &str, device_id: &str) -> usize {
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id.to_owned(), device_id.to_owned()))
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, user_id: &str, device_id: &str) -> bool {
        self.len(user_id, device_id) == 0
    }
}

/// One device's handle on a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    sender: String,
    offline: AtomicBool,
}

impl MemoryTransport {
    /// While offline every send fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn send(
        &self,
        user_id: &str,
        device_id: &str,
        event: &VerificationEvent,
    ) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError(format!("{user_id}/{device_id} unreachable")));
        }
        self.hub.push(
            user_id,
            device_id,
            ToDeviceEvent::new(self.sender.clone(), event.clone()),
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct UserKeys {
    devices: BTreeMap<String, Ed25519PublicKey>,
    master: Option<Ed25519PublicKey>,
}

/// Published keys of every known user.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, UserKeys>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, user_id: &str, device_id: &str, key: Ed25519PublicKey) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_owned())
            .or_default()
            .devices
            .insert(device_id.to_owned(), key);
    }

    pub fn set_master_key(&self, user_id: &str, key: Ed25519PublicKey) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_owned())
            .or_default()
            .master = Some(key);
    }
}

impl KeyDirectory for MemoryDirectory {
    fn devices(&self, user_id: &str) -> Vec<String> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|keys| keys.devices.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn device_key(&self, user_id: &str, device_id: &str) -> Option<Ed25519PublicKey> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .and_then(|keys| keys.devices.get(device_id).copied())
    }

    fn master_key(&self, user_id: &str) -> Option<Ed25519PublicKey> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .and_then(|keys| keys.master)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    verified: RwLock<HashSet<(String, KeyId)>>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verified key IDs of `user_id`, sorted.
    pub fn verified_keys(&self, user_id: &str) -> Vec<KeyId> {
        let mut keys: Vec<KeyId> = self
            .verified
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, key_id)| key_id.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl TrustStore for MemoryTrustStore {
    fn mark_verified(&self, user_id: &str, key_id: &KeyId) {
        self.verified
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((user_id.to_owned(), key_id.clone()));
    }

    fn is_verified(&self, user_id: &str, key_id: &KeyId) -> bool {
        self.verified
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(user_id.to_owned(), key_id.clone()))
    }
}

/// A fixed master key that records what it signs.
#[derive(Debug)]
pub struct StaticCrossSigning {
    master: Ed25519PublicKey,
    signed: Mutex<Vec<(String, Ed25519PublicKey)>>,
}

impl StaticCrossSigning {
    pub fn new(master: Ed25519PublicKey) -> Self {
        Self {
            master,
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn signed(&self) -> Vec<(String, Ed25519PublicKey)> {
        self.signed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CrossSigning for StaticCrossSigning {
    fn master_key(&self) -> Option<Ed25519PublicKey> {
        Some(self.master)
    }

    fn sign(&self, user_id: &str, key: &Ed25519PublicKey) -> Result<(), SigningError> {
        self.signed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_owned(), *key));
        Ok(())
    }
}

/// Callbacks that remember every notification.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    requests: Mutex<Vec<(String, String, String)>>,
    sas: Mutex<HashMap<String, ShortAuthString>>,
    done: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<(String, CancelCode)>>,
    transport_errors: Mutex<Vec<(String, TransportError)>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(transaction_id, from_user, from_device)` per received request.
    pub fn requests(&self) -> Vec<(String, String, String)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sas(&self, transaction_id: &str) -> Option<ShortAuthString> {
        self.sas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(transaction_id)
            .cloned()
    }

    pub fn is_done(&self, transaction_id: &str) -> bool {
        self.done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|id| id == transaction_id)
    }

    pub fn cancelled(&self, transaction_id: &str) -> Option<CancelCode> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(id, _)| id == transaction_id)
            .map(|(_, code)| code.clone())
    }

    pub fn transport_errors(&self) -> Vec<(String, TransportError)> {
        self.transport_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl VerificationCallbacks for RecordingCallbacks {
    fn on_request(&self, transaction_id: &str, from_user: &str, from_device: &str) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((
                transaction_id.to_owned(),
                from_user.to_owned(),
                from_device.to_owned(),
            ));
    }

    fn on_sas_ready(&self, transaction_id: &str, sas: &ShortAuthString) {
        self.sas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction_id.to_owned(), sas.clone());
    }

    fn on_done(&self, transaction_id: &str) {
        self.done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transaction_id.to_owned());
    }

    fn on_cancelled(&self, transaction_id: &str, code: &CancelCode) {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((transaction_id.to_owned(), code.clone()));
    }

    fn on_transport_error(&self, transaction_id: &str, error: &TransportError) {
        self.transport_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((transaction_id.to_owned(), error.clone()));
    }
}
