//! Verification coordinator.
//!
//! Owns the live transactions, keyed by transaction ID, and is the only
//! place that talks to collaborators. Each transaction sits behind its own
//! mutex; the map lock is held only to look up or insert entries, so
//! different transactions proceed independently.
//!
//! Expiry is cooperative: every access checks the deadline first, and
//! [`Coordinator::sweep`] cancels whatever nobody touched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};

use verity_core::encoding::to_hex;

use crate::cancel::CancelCode;
use crate::collaborators::{Collaborators, DeviceIdentity, KeyDirectory};
use crate::config::VerificationConfig;
use crate::errors::VerificationError;
use crate::events::{ToDeviceEvent, VerificationEvent};
use crate::transaction::{Action, Effect, Env, Input, ShortAuthString, State, Transaction};

/// Random bytes in a generated transaction ID.
const TRANSACTION_ID_BYTES: usize = 16;

type Entry = Arc<Mutex<Transaction>>;

fn lock(entry: &Entry) -> MutexGuard<'_, Transaction> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_transaction_id() -> String {
    let mut bytes = [0u8; TRANSACTION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    to_hex(&bytes)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub struct Coordinator {
    own: DeviceIdentity,
    config: VerificationConfig,
    collaborators: Collaborators,
    transactions: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("own", &self.own)
            .field("transactions", &self.transaction_ids())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// # Errors
    /// `VerificationError::Config` if `config` fails validation.
    pub fn new(
        own: DeviceIdentity,
        config: VerificationConfig,
        collaborators: Collaborators,
    ) -> Result<Self, VerificationError> {
        config.validate()?;
        Ok(Self {
            own,
            config,
            collaborators,
            transactions: RwLock::new(HashMap::new()),
        })
    }

    /// This device.
    pub fn own(&self) -> &DeviceIdentity {
        &self.own
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Send a request to every device of `peer_user` except this one.
    ///
    /// Returns the new transaction ID.
    pub fn start_verification(&self, peer_user: &str) -> Result<String, VerificationError> {
        let devices: Vec<String> = self
            .collaborators
            .directory
            .devices(peer_user)
            .into_iter()
            .filter(|device| !(peer_user == self.own.user_id && *device == self.own.device_id))
            .collect();
        if devices.is_empty() {
            return Err(VerificationError::NoDevices(peer_user.to_owned()));
        }

        let transaction_id = new_transaction_id();
        let entry: Entry = Arc::new(Mutex::new(Transaction::new(
            transaction_id.clone(),
            peer_user,
            self.config.timeout(),
            Instant::now(),
        )));
        self.transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction_id.clone(), Arc::clone(&entry));

        info!(transaction_id = %transaction_id, peer = peer_user, devices = devices.len(), "requesting verification");
        let action = Action::Request {
            devices,
            timestamp: now_millis(),
        };
        let mut txn = lock(&entry);
        let effects = txn.handle(Input::Local(action), &self.env())?;
        self.apply(&transaction_id, effects);
        Ok(transaction_id)
    }

    /// Answer a received request with `ready`.
    pub fn accept_verification(&self, transaction_id: &str) -> Result<(), VerificationError> {
        self.act(transaction_id, Action::Accept)
    }

    /// Send `start`; this side becomes the initiator.
    pub fn start_sas(&self, transaction_id: &str) -> Result<(), VerificationError> {
        self.act(transaction_id, Action::StartSas)
    }

    /// The user confirmed the displayed codes match.
    pub fn confirm_sas(&self, transaction_id: &str) -> Result<(), VerificationError> {
        self.act(transaction_id, Action::Confirm)
    }

    /// Abort. A no-op on a finished transaction.
    pub fn cancel_verification(
        &self,
        transaction_id: &str,
        code: CancelCode,
    ) -> Result<(), VerificationError> {
        self.act(transaction_id, Action::Cancel(code))
    }

    /// Route one inbound event.
    ///
    /// Events for unknown transactions are ignored. Protocol failures
    /// cancel the transaction; they are not returned as errors.
    pub fn dispatch(&self, incoming: ToDeviceEvent) -> Result<(), VerificationError> {
        let transaction_id = incoming.event.transaction_id().to_owned();
        let (entry, created) = match self.lookup(&transaction_id) {
            Some(entry) => (entry, false),
            None => match self.create_for(&incoming) {
                Some(entry) => (entry, true),
                None => {
                    debug!(
                        transaction_id = %transaction_id,
                        sender = %incoming.sender,
                        event = incoming.event.event_type(),
                        "ignoring event for unknown transaction"
                    );
                    return Ok(());
                }
            },
        };

        let mut txn = lock(&entry);
        if !created && txn.is_expired(Instant::now()) {
            let effects = txn.expire();
            self.apply(&transaction_id, effects);
            return Ok(());
        }
        let input = Input::Remote {
            sender: incoming.sender,
            event: incoming.event,
        };
        let effects = txn.handle(input, &self.env())?;
        self.apply(&transaction_id, effects);
        Ok(())
    }

    /// Parse a to-device JSON envelope and [`dispatch`](Self::dispatch) it.
    pub fn dispatch_json(&self, raw: &str) -> Result<(), VerificationError> {
        let incoming: ToDeviceEvent = serde_json::from_str(raw)?;
        self.dispatch(incoming)
    }

    /// Cancel every expired live transaction and drop finished ones whose
    /// deadline has passed. Returns how many were cancelled.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let entries: Vec<(String, Entry)> = self
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut cancelled = 0;
        let mut finished = Vec::new();
        for (transaction_id, entry) in entries {
            let mut txn = lock(&entry);
            if txn.is_expired(now) {
                let effects = txn.expire();
                self.apply(&transaction_id, effects);
                cancelled += 1;
            } else if txn.state().is_terminal() && now >= txn.expires_at() {
                finished.push(transaction_id);
            }
        }
        if !finished.is_empty() {
            let mut map = self
                .transactions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for transaction_id in &finished {
                map.remove(transaction_id);
            }
            debug!(pruned = finished.len(), "pruned finished transactions");
        }
        cancelled
    }

    /// Current state, or `None` for an unknown or pruned transaction.
    pub fn state(&self, transaction_id: &str) -> Option<State> {
        self.lookup(transaction_id)
            .map(|entry| lock(&entry).state().clone())
    }

    /// The codes currently shown for `transaction_id`.
    pub fn sas(&self, transaction_id: &str) -> Option<ShortAuthString> {
        self.lookup(transaction_id)
            .and_then(|entry| lock(&entry).sas().cloned())
    }

    /// Known transaction IDs, sorted.
    pub fn transaction_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn env(&self) -> Env<'_> {
        let directory: &dyn KeyDirectory = self.collaborators.directory.as_ref();
        let signing_master = self
            .collaborators
            .cross_signing
            .as_ref()
            .and_then(|signer| signer.master_key());
        Env {
            config: &self.config,
            own: &self.own,
            own_master: signing_master.or_else(|| directory.master_key(&self.own.user_id)),
            signing_master,
            directory,
        }
    }

    fn lookup(&self, transaction_id: &str) -> Option<Entry> {
        self.transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(transaction_id)
            .cloned()
    }

    fn act(&self, transaction_id: &str, action: Action) -> Result<(), VerificationError> {
        let entry = self
            .lookup(transaction_id)
            .ok_or_else(|| VerificationError::UnknownTransaction(transaction_id.to_owned()))?;
        let mut txn = lock(&entry);
        if txn.is_expired(Instant::now()) {
            let effects = txn.expire();
            self.apply(transaction_id, effects);
            return match action {
                Action::Cancel(_) => Ok(()),
                _ => Err(VerificationError::Expired(transaction_id.to_owned())),
            };
        }
        let effects = txn.handle(Input::Local(action), &self.env())?;
        self.apply(transaction_id, effects);
        Ok(())
    }

    /// A transaction for an event with an unknown ID, if it may open one.
    /// The first creator wins; a concurrent loser gets the winner's entry.
    fn create_for(&self, incoming: &ToDeviceEvent) -> Option<Entry> {
        let transaction_id = incoming.event.transaction_id();
        let txn = match &incoming.event {
            VerificationEvent::Request(content) => {
                if incoming.sender == self.own.user_id && content.from_device == self.own.device_id {
                    return None;
                }
                if !self.request_in_window(content.timestamp) {
                    warn!(
                        transaction_id,
                        sender = %incoming.sender,
                        timestamp = content.timestamp,
                        "ignoring request outside the accepted time window"
                    );
                    return None;
                }
                Transaction::new(
                    transaction_id,
                    incoming.sender.clone(),
                    self.config.timeout(),
                    Instant::now(),
                )
            }
            VerificationEvent::Start(content) if self.config.allow_start_without_request => {
                Transaction::new(
                    transaction_id,
                    incoming.sender.clone(),
                    self.config.timeout(),
                    Instant::now(),
                )
                .without_request(content.from_device.clone())
            }
            _ => return None,
        };
        let entry = self
            .transactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(transaction_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(txn)))
            .clone();
        Some(entry)
    }

    fn request_in_window(&self, timestamp: u64) -> bool {
        let now = now_millis();
        let max_age = self.config.request_max_age_secs.saturating_mul(1000);
        let max_future = self.config.request_max_future_secs.saturating_mul(1000);
        timestamp.saturating_add(max_age) >= now && timestamp <= now.saturating_add(max_future)
    }

    /// Apply effects in order, inside the transaction's critical section.
    fn apply(&self, transaction_id: &str, effects: Vec<Effect>) {
        let c = &self.collaborators;
        for effect in effects {
            match effect {
                Effect::Send {
                    user_id,
                    device_id,
                    event,
                } => {
                    debug!(
                        transaction_id,
                        event = event.event_type(),
                        to_user = %user_id,
                        to_device = %device_id,
                        "sending"
                    );
                    if let Err(err) = c.transport.send(&user_id, &device_id, &event) {
                        warn!(transaction_id, %err, event = event.event_type(), "send failed");
                        c.callbacks.on_transport_error(transaction_id, &err);
                    }
                }
                Effect::RequestReceived { user_id, device_id } => {
                    c.callbacks.on_request(transaction_id, &user_id, &device_id);
                }
                Effect::ShowSas(sas) => c.callbacks.on_sas_ready(transaction_id, &sas),
                Effect::MarkVerified { user_id, key_id } => {
                    c.trust_store.mark_verified(&user_id, &key_id);
                }
                Effect::SignKey { user_id, key } => {
                    if let Some(signer) = &c.cross_signing {
                        if let Err(err) = signer.sign(&user_id, &key) {
                            warn!(transaction_id, %err, "cross-signing failed");
                        }
                    }
                }
                Effect::Done => c.callbacks.on_done(transaction_id),
                Effect::Cancelled(code) => c.callbacks.on_cancelled(transaction_id, &code),
            }
        }
    }
}
