//! Per-transaction SAS state machine.
//!
//! A [`Transaction`] performs no I/O. [`Transaction::handle`] consumes one
//! local [`Action`] or one remote event and returns the [`Effect`]s the
//! coordinator applies, in order.
//!
//! ## Happy path
//! ```text
//! initiator                                 responder
//! Requested --request-->                    Requested
//! Ready     <--ready---                     Ready
//! Started   --start---->                    Started  (keypair, commitment)
//! KeySent   <--accept---
//!           --key------>                    SasShown (keypair erased)
//! SasShown  <--key------
//! MacSent   --mac------>  <--mac--          MacSent
//! Done      --done----->  <--done--         Done
//! ```
//! Either side may call `start_sas`; the sender of `start` becomes the
//! initiator. Either side may confirm first.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use verity_core::constants::{KEY_LIST_MAC_ID, PUBLIC_KEY_LENGTH, SAS_DECIMAL_COUNT, SAS_EMOJI_COUNT};
use verity_core::crypto::{self, AgreementParty, KeyPair, MacDirection, MacKey, SasBytes};
use verity_core::encoding::{from_base64_32, to_base64};
use verity_core::errors::VerityError;
use verity_core::hash::commitment_base64;
use verity_core::identity::{canonical_key_list, Ed25519PublicKey, KeyId, KeyMismatchError};
use verity_core::sas::{self, Emoji};

use crate::cancel::CancelCode;
use crate::collaborators::{DeviceIdentity, KeyDirectory};
use crate::config::VerificationConfig;
use crate::errors::VerificationError;
use crate::events::{
    AcceptContent, DoneContent, KeyContent, MacContent, ReadyContent, RequestContent,
    StartContent, VerificationEvent,
};
use crate::methods::{common_methods, negotiate, AcceptParams, Capabilities, SasMethod, VerificationMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent `start`.
    Initiator,
    /// Received `start`.
    Responder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Requested,
    Ready,
    Started,
    KeySent,
    SasShown,
    MacSent,
    Done,
    Cancelled(CancelCode),
}

impl State {
    /// `Done` or `Cancelled`: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled(_))
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => f.write_str("Requested"),
            Self::Ready => f.write_str("Ready"),
            Self::Started => f.write_str("Started"),
            Self::KeySent => f.write_str("KeySent"),
            Self::SasShown => f.write_str("SasShown"),
            Self::MacSent => f.write_str("MacSent"),
            Self::Done => f.write_str("Done"),
            Self::Cancelled(code) => write!(f, "Cancelled({code})"),
        }
    }
}

/// The codes shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortAuthString {
    pub decimal: [u16; SAS_DECIMAL_COUNT],
    /// `None` when emoji display was not negotiated.
    pub emoji: Option<[Emoji; SAS_EMOJI_COUNT]>,
}

impl ShortAuthString {
    fn new(bytes: &SasBytes, methods: &[SasMethod]) -> Self {
        Self {
            decimal: sas::decimal(bytes),
            emoji: methods
                .contains(&SasMethod::Emoji)
                .then(|| sas::emoji_symbols(bytes)),
        }
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionSecrets {
    sas: SasBytes,
    mac_key: MacKey,
}

/// A local user or system action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `request` to each of `devices` of the peer.
    Request { devices: Vec<String>, timestamp: u64 },
    /// Answer a received `request` with `ready`.
    Accept,
    /// Send `start`, becoming the initiator.
    StartSas,
    /// The user attests the codes match.
    Confirm,
    Cancel(CancelCode),
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Accept => "accept",
            Self::StartSas => "start_sas",
            Self::Confirm => "confirm",
            Self::Cancel(_) => "cancel",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Input {
    Local(Action),
    Remote {
        sender: String,
        event: VerificationEvent,
    },
}

/// Work for the coordinator, produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send {
        user_id: String,
        device_id: String,
        event: VerificationEvent,
    },
    RequestReceived {
        user_id: String,
        device_id: String,
    },
    ShowSas(ShortAuthString),
    MarkVerified {
        user_id: String,
        key_id: KeyId,
    },
    SignKey {
        user_id: String,
        key: Ed25519PublicKey,
    },
    Done,
    Cancelled(CancelCode),
}

/// Read-only context for one transition.
pub struct Env<'a> {
    pub config: &'a VerificationConfig,
    pub own: &'a DeviceIdentity,
    /// Our user's master key, attested in our MAC. Taken from the local
    /// signer, or from the directory when this device cannot sign.
    pub own_master: Option<Ed25519PublicKey>,
    /// The master key of the local signer. `None` means no `SignKey`.
    pub signing_master: Option<Ed25519PublicKey>,
    pub directory: &'a dyn KeyDirectory,
}

/// Why a transition stopped early.
enum Halt {
    /// Cancel the transaction and tell the peer.
    Cancel(CancelCode),
    /// Refuse a local action. Nothing was mutated.
    Reject(VerificationError),
}

impl From<VerityError> for Halt {
    fn from(err: VerityError) -> Self {
        Self::Reject(err.into())
    }
}

type Step = Result<(), Halt>;

/// A MAC that cannot be checked counts as a mismatch.
fn verify(key: &MacKey, data: &[u8], expected: &str) -> bool {
    crypto::verify_mac(key, data, expected).unwrap_or(false)
}

pub struct Transaction {
    id: String,
    other_user: String,
    other_device: Option<String>,
    role: Option<Role>,
    state: State,
    we_requested: bool,
    request_received: bool,
    requested_devices: Vec<String>,
    their_methods: Vec<VerificationMethod>,
    /// Capabilities we advertised in our `start`.
    offered: Option<Capabilities>,
    params: Option<AcceptParams>,
    commitment: Option<String>,
    keypair: Option<KeyPair>,
    our_public: Option<[u8; PUBLIC_KEY_LENGTH]>,
    their_public: Option<[u8; PUBLIC_KEY_LENGTH]>,
    secrets: Option<SessionSecrets>,
    sas: Option<ShortAuthString>,
    confirmed_locally: bool,
    mac_received: bool,
    peer_done: bool,
    verified_keys: Vec<(KeyId, Ed25519PublicKey)>,
    created_at: Instant,
    expires_at: Instant,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("other_user", &self.other_user)
            .field("other_device", &self.other_device)
            .field("role", &self.role)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// A fresh transaction in `Requested`, before any event.
    pub fn new(
        id: impl Into<String>,
        other_user: impl Into<String>,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id: id.into(),
            other_user: other_user.into(),
            other_device: None,
            role: None,
            state: State::Requested,
            we_requested: false,
            request_received: false,
            requested_devices: Vec::new(),
            their_methods: Vec::new(),
            offered: None,
            params: None,
            commitment: None,
            keypair: None,
            our_public: None,
            their_public: None,
            secrets: None,
            sas: None,
            confirmed_locally: false,
            mac_received: false,
            peer_done: false,
            verified_keys: Vec::new(),
            created_at: now,
            expires_at: now + timeout,
        }
    }

    /// Skip the request handshake: the transaction starts in `Ready` with
    /// the peer device fixed, waiting for a `start`.
    pub fn without_request(mut self, other_device: impl Into<String>) -> Self {
        self.state = State::Ready;
        self.other_device = Some(other_device.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn other_user(&self) -> &str {
        &self.other_user
    }

    pub fn other_device(&self) -> Option<&str> {
        self.other_device.as_deref()
    }

    /// Displayed codes, between `SasShown` and the terminal state.
    pub fn sas(&self) -> Option<&ShortAuthString> {
        self.sas.as_ref()
    }

    pub fn confirmed_locally(&self) -> bool {
        self.confirmed_locally
    }

    pub fn mac_received(&self) -> bool {
        self.mac_received
    }

    /// The peer reported Done.
    pub fn peer_done(&self) -> bool {
        self.peer_done
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// `true` once a live transaction is past its expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.state.is_terminal() && now >= self.expires_at
    }

    /// `true` while any ephemeral or derived secret is held.
    pub fn holds_secrets(&self) -> bool {
        self.keypair.is_some() || self.secrets.is_some()
    }

    /// The single transition entry point.
    ///
    /// Protocol failures become a cancellation in the returned effects.
    /// `Err` means a local action was refused and nothing changed.
    pub fn handle(&mut self, input: Input, env: &Env<'_>) -> Result<Vec<Effect>, VerificationError> {
        let from = self.state.clone();
        let mut effects = Vec::new();
        let step = match input {
            Input::Local(action) => self.on_action(action, env, &mut effects),
            Input::Remote { sender, event } => self.on_event(&sender, event, env, &mut effects),
        };
        match step {
            Ok(()) => {}
            Err(Halt::Cancel(code)) => effects = self.cancel(code, true),
            Err(Halt::Reject(err)) => return Err(err),
        }
        if self.state != from {
            debug!(transaction_id = %self.id, from = %from, to = %self.state, "state transition");
        }
        Ok(effects)
    }

    /// Cancel with `m.timeout` if live. Returns the effects to apply.
    pub fn expire(&mut self) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        warn!(transaction_id = %self.id, state = %self.state, "verification expired");
        self.cancel(CancelCode::Timeout, true)
    }

    fn on_action(&mut self, action: Action, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let state = self.state.clone();
        if let State::Cancelled(code) = state {
            return match action {
                Action::Cancel(_) => Ok(()),
                _ => Err(Halt::Reject(VerificationError::Cancelled(code))),
            };
        }
        match (action, state) {
            (Action::Cancel(_), State::Done) => Ok(()),
            (Action::Cancel(code), _) => Err(Halt::Cancel(code)),
            (Action::Request { devices, timestamp }, State::Requested)
                if !self.we_requested && !self.request_received =>
            {
                self.send_requests(devices, timestamp, env, out);
                Ok(())
            }
            (Action::Accept, State::Requested) if self.request_received => self.send_ready(env, out),
            (Action::StartSas, State::Ready) => self.send_start(env, out),
            // Their start got here first.
            (Action::StartSas, State::Started) => Err(Halt::Cancel(CancelCode::UnexpectedMessage)),
            (Action::Confirm, State::SasShown) => self.send_mac(env, out),
            (action, state) => Err(Halt::Reject(VerificationError::InvalidState {
                action: action.name(),
                state: state.to_string(),
            })),
        }
    }

    fn on_event(
        &mut self,
        sender: &str,
        event: VerificationEvent,
        env: &Env<'_>,
        out: &mut Vec<Effect>,
    ) -> Step {
        if sender != self.other_user {
            warn!(
                transaction_id = %self.id,
                sender,
                expected = %self.other_user,
                event = event.event_type(),
                "ignoring event from unexpected user"
            );
            return Ok(());
        }
        if self.state.is_terminal() && !matches!(event, VerificationEvent::Done(_)) {
            debug!(transaction_id = %self.id, event = event.event_type(), "ignoring event for finished transaction");
            return Ok(());
        }
        match event {
            VerificationEvent::Request(content) => self.on_request(content, out),
            VerificationEvent::Ready(content) => self.on_ready(content, env, out),
            VerificationEvent::Start(content) => self.on_start(content, env, out),
            VerificationEvent::Accept(content) => self.on_accept(content, out),
            VerificationEvent::Key(content) => self.on_key(content, env, out),
            VerificationEvent::Mac(content) => self.on_mac(content, env, out),
            VerificationEvent::Cancel(content) => {
                info!(transaction_id = %self.id, code = %content.code, reason = %content.reason, "peer cancelled");
                out.extend(self.cancel(content.code, false));
                Ok(())
            }
            VerificationEvent::Done(_) => self.on_done(),
        }
    }

    fn send(&self, device_id: &str, event: VerificationEvent) -> Effect {
        Effect::Send {
            user_id: self.other_user.clone(),
            device_id: device_id.to_owned(),
            event,
        }
    }

    fn peer_device(&self) -> Result<String, Halt> {
        self.other_device
            .clone()
            .ok_or(Halt::Cancel(CancelCode::UnexpectedMessage))
    }

    fn send_requests(&mut self, devices: Vec<String>, timestamp: u64, env: &Env<'_>, out: &mut Vec<Effect>) {
        for device in &devices {
            out.push(self.send(
                device,
                VerificationEvent::Request(RequestContent {
                    transaction_id: self.id.clone(),
                    from_device: env.own.device_id.clone(),
                    methods: env.config.methods.clone(),
                    timestamp,
                }),
            ));
        }
        self.we_requested = true;
        self.requested_devices = devices;
    }

    fn send_ready(&mut self, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let device = self.peer_device()?;
        let methods = common_methods(&env.config.methods, &self.their_methods);
        if !methods.contains(&VerificationMethod::SasV1) {
            return Err(Halt::Cancel(CancelCode::UnknownMethod));
        }
        out.push(self.send(
            &device,
            VerificationEvent::Ready(ReadyContent {
                transaction_id: self.id.clone(),
                from_device: env.own.device_id.clone(),
                methods,
            }),
        ));
        self.state = State::Ready;
        Ok(())
    }

    fn send_start(&mut self, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let device = self.peer_device()?;
        let caps = env.config.capabilities.clone();
        out.push(self.send(
            &device,
            VerificationEvent::Start(StartContent {
                transaction_id: self.id.clone(),
                from_device: env.own.device_id.clone(),
                method: VerificationMethod::SasV1,
                hashes: caps.hashes.clone(),
                key_agreement_protocols: caps.key_agreement_protocols.clone(),
                message_authentication_codes: caps.message_authentication_codes.clone(),
                short_authentication_string: caps.short_authentication_string.clone(),
            }),
        ));
        self.offered = Some(caps);
        self.role = Some(Role::Initiator);
        self.state = State::Started;
        Ok(())
    }

    fn on_request(&mut self, content: RequestContent, out: &mut Vec<Effect>) -> Step {
        if self.request_received && self.other_device.as_deref() == Some(content.from_device.as_str()) {
            debug!(transaction_id = %self.id, device = %content.from_device, "ignoring repeated request");
            return Ok(());
        }
        if self.state != State::Requested || self.we_requested || self.request_received {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        self.request_received = true;
        self.their_methods = content.methods;
        self.other_device = Some(content.from_device.clone());
        out.push(Effect::RequestReceived {
            user_id: self.other_user.clone(),
            device_id: content.from_device,
        });
        Ok(())
    }

    fn on_ready(&mut self, content: ReadyContent, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        if let Some(device) = &self.other_device {
            if *device != content.from_device && self.we_requested {
                debug!(transaction_id = %self.id, device = %content.from_device, "ignoring ready from another device");
                return Ok(());
            }
        }
        if self.state != State::Requested || !self.we_requested {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        let methods = common_methods(&env.config.methods, &content.methods);
        if !methods.contains(&VerificationMethod::SasV1) {
            return Err(Halt::Cancel(CancelCode::UnknownMethod));
        }
        for device in self.requested_devices.iter().filter(|d| **d != content.from_device) {
            out.push(self.send(
                device,
                VerificationEvent::cancel(&self.id, CancelCode::Accepted, CancelCode::Accepted.default_reason()),
            ));
        }
        self.their_methods = content.methods;
        self.other_device = Some(content.from_device);
        self.state = State::Ready;
        Ok(())
    }

    fn on_start(&mut self, content: StartContent, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        if let Some(device) = &self.other_device {
            if *device != content.from_device {
                warn!(transaction_id = %self.id, device = %content.from_device, "start from unexpected device");
                return Err(Halt::Cancel(CancelCode::UserMismatch));
            }
        }
        if self.state != State::Ready {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        if content.method != VerificationMethod::SasV1 {
            return Err(Halt::Cancel(CancelCode::UnknownMethod));
        }
        let params = negotiate(&env.config.capabilities, &content.capabilities()).map_err(Halt::Cancel)?;
        let canonical = params
            .canonical_bytes()
            .map_err(|_| Halt::Cancel(CancelCode::InvalidMessage))?;

        let keypair = crypto::generate_keypair();
        let commitment = commitment_base64(&canonical, &keypair.public_key);
        out.push(self.send(
            &content.from_device,
            VerificationEvent::Accept(AcceptContent {
                transaction_id: self.id.clone(),
                method: VerificationMethod::SasV1,
                params: params.clone(),
                commitment: commitment.clone(),
            }),
        ));
        self.other_device = Some(content.from_device);
        self.role = Some(Role::Responder);
        self.our_public = Some(keypair.public_key);
        self.keypair = Some(keypair);
        self.params = Some(params);
        self.commitment = Some(commitment);
        self.state = State::Started;
        Ok(())
    }

    fn on_accept(&mut self, content: AcceptContent, out: &mut Vec<Effect>) -> Step {
        if self.state != State::Started || self.role != Some(Role::Initiator) {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        let offered = self
            .offered
            .as_ref()
            .ok_or(Halt::Cancel(CancelCode::UnexpectedMessage))?;
        if content.method != VerificationMethod::SasV1 || !content.params.is_subset_of(offered) {
            return Err(Halt::Cancel(CancelCode::UnknownMethod));
        }
        let device = self.peer_device()?;

        let keypair = crypto::generate_keypair();
        out.push(self.send(
            &device,
            VerificationEvent::Key(KeyContent {
                transaction_id: self.id.clone(),
                key: to_base64(&keypair.public_key),
            }),
        ));
        self.our_public = Some(keypair.public_key);
        self.keypair = Some(keypair);
        self.params = Some(content.params);
        self.commitment = Some(content.commitment);
        self.state = State::KeySent;
        Ok(())
    }

    fn on_key(&mut self, content: KeyContent, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let expecting = match (self.role, &self.state) {
            (Some(Role::Responder), State::Started) => self.params.is_some(),
            (Some(Role::Initiator), State::KeySent) => true,
            _ => false,
        };
        if !expecting {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        let their_public =
            from_base64_32(&content.key).map_err(|_| Halt::Cancel(CancelCode::InvalidMessage))?;
        if self.our_public == Some(their_public) {
            warn!(transaction_id = %self.id, "peer reflected our ephemeral key");
            return Err(Halt::Cancel(CancelCode::MismatchedSas));
        }
        let params = self
            .params
            .clone()
            .ok_or(Halt::Cancel(CancelCode::UnexpectedMessage))?;

        if self.role == Some(Role::Initiator) {
            let canonical = params
                .canonical_bytes()
                .map_err(|_| Halt::Cancel(CancelCode::InvalidMessage))?;
            if self.commitment.as_deref() != Some(commitment_base64(&canonical, &their_public).as_str()) {
                warn!(transaction_id = %self.id, "key does not match commitment");
                return Err(Halt::Cancel(CancelCode::MismatchedCommitment));
            }
        } else {
            let device = self.peer_device()?;
            let our_public = self
                .our_public
                .ok_or(Halt::Cancel(CancelCode::UnexpectedMessage))?;
            out.push(self.send(
                &device,
                VerificationEvent::Key(KeyContent {
                    transaction_id: self.id.clone(),
                    key: to_base64(&our_public),
                }),
            ));
        }
        self.their_public = Some(their_public);
        self.derive(&params, env, out)
    }

    /// Agreement and derivation. Erases the ephemeral secret.
    fn derive(&mut self, params: &AcceptParams, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let device = self.peer_device()?;
        let (Some(keypair), Some(our_public), Some(their_public)) =
            (self.keypair.as_ref(), self.our_public, self.their_public)
        else {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        };
        let shared = keypair.agree(&their_public).map_err(|err| {
            warn!(transaction_id = %self.id, %err, "key agreement failed");
            Halt::Cancel(CancelCode::MismatchedSas)
        })?;

        let own = AgreementParty {
            user_id: &env.own.user_id,
            device_id: &env.own.device_id,
            ephemeral_key: &our_public,
        };
        let peer = AgreementParty {
            user_id: &self.other_user,
            device_id: &device,
            ephemeral_key: &their_public,
        };
        let (initiator, responder) = match self.role {
            Some(Role::Initiator) => (own, peer),
            _ => (peer, own),
        };
        let derived = crypto::derive_sas_bytes(&shared, &crypto::sas_info(&initiator, &responder, &self.id))
            .and_then(|sas_bytes| {
                let info = crypto::mac_key_info(
                    params.message_authentication_code.as_str(),
                    &initiator,
                    &responder,
                    &self.id,
                );
                Ok((sas_bytes, crypto::derive_mac_key(&shared, &info)?))
            });
        let (sas_bytes, mac_key) = derived.map_err(|err| {
            warn!(transaction_id = %self.id, %err, "derivation failed");
            Halt::Cancel(CancelCode::MismatchedSas)
        })?;

        self.erase_keypair();
        let sas = ShortAuthString::new(&sas_bytes, &params.short_authentication_string);
        self.secrets = Some(SessionSecrets {
            sas: sas_bytes,
            mac_key,
        });
        self.sas = Some(sas.clone());
        out.push(Effect::ShowSas(sas));
        self.state = State::SasShown;
        Ok(())
    }

    fn send_mac(&mut self, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let device = self.peer_device()?;
        let Some(secrets) = self.secrets.as_ref() else {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        };
        let direction = MacDirection {
            sender_user: &env.own.user_id,
            sender_device: &env.own.device_id,
            receiver_user: &self.other_user,
            receiver_device: &device,
            transaction_id: &self.id,
        };

        let mut keys = vec![(KeyId::device(&env.own.device_id), env.own.signing_key)];
        if let Some(master) = env.own_master {
            keys.push((KeyId::cross_signing(&master), master));
        }
        let mut mac = BTreeMap::new();
        for (key_id, key) in &keys {
            let tag = crypto::mac_base64(&secrets.mac_key, &direction.input(key_id.as_str(), &key.to_base64()))?;
            mac.insert(key_id.to_string(), tag);
        }
        let key_list = canonical_key_list(keys.iter().map(|(key_id, _)| key_id));
        let keys_mac = crypto::mac_base64(&secrets.mac_key, &direction.input(KEY_LIST_MAC_ID, &key_list))?;

        out.push(self.send(
            &device,
            VerificationEvent::Mac(MacContent {
                transaction_id: self.id.clone(),
                mac,
                keys: keys_mac,
            }),
        ));
        self.confirmed_locally = true;
        if self.mac_received {
            self.finish(env, out)
        } else {
            self.state = State::MacSent;
            Ok(())
        }
    }

    fn on_mac(&mut self, content: MacContent, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let expecting = matches!(self.state, State::SasShown | State::MacSent) && !self.mac_received;
        if !expecting {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        }
        self.verified_keys = self.verify_peer_mac(&content, env)?;
        self.mac_received = true;
        if self.confirmed_locally {
            self.finish(env, out)
        } else {
            Ok(())
        }
    }

    /// Check the `keys` MAC, then each key we can resolve. The peer's
    /// device key must be among the verified ones.
    fn verify_peer_mac(
        &self,
        content: &MacContent,
        env: &Env<'_>,
    ) -> Result<Vec<(KeyId, Ed25519PublicKey)>, Halt> {
        let device = self.peer_device()?;
        let Some(secrets) = self.secrets.as_ref() else {
            return Err(Halt::Cancel(CancelCode::UnexpectedMessage));
        };
        let direction = MacDirection {
            sender_user: &self.other_user,
            sender_device: &device,
            receiver_user: &env.own.user_id,
            receiver_device: &env.own.device_id,
            transaction_id: &self.id,
        };

        let key_ids = content
            .mac
            .keys()
            .map(|raw| KeyId::parse(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Halt::Cancel(CancelCode::InvalidMessage))?;
        let key_list = canonical_key_list(&key_ids);
        if !verify(&secrets.mac_key, &direction.input(KEY_LIST_MAC_ID, &key_list), &content.keys) {
            warn!(transaction_id = %self.id, "key list MAC mismatch");
            return Err(Halt::Cancel(CancelCode::MismatchedKeys));
        }

        let device_key_id = KeyId::device(&device);
        let peer_master = env.directory.master_key(&self.other_user);
        let mut verified = Vec::new();
        for key_id in key_ids {
            let key = if key_id == device_key_id {
                env.directory.device_key(&self.other_user, &device)
            } else {
                peer_master.filter(|master| KeyId::cross_signing(master) == key_id)
            };
            let (Some(key), Some(tag)) = (key, content.mac.get(key_id.as_str())) else {
                debug!(transaction_id = %self.id, %key_id, "skipping unknown key");
                continue;
            };
            if !verify(&secrets.mac_key, &direction.input(key_id.as_str(), &key.to_base64()), tag) {
                let err = KeyMismatchError {
                    user_id: self.other_user.clone(),
                    key_id: key_id.to_string(),
                };
                warn!(transaction_id = %self.id, %err, "peer MAC did not verify");
                return Err(Halt::Cancel(CancelCode::MismatchedKeys));
            }
            verified.push((key_id, key));
        }
        if !verified.iter().any(|(key_id, _)| *key_id == device_key_id) {
            warn!(transaction_id = %self.id, %device_key_id, "peer did not attest its device key");
            return Err(Halt::Cancel(CancelCode::MismatchedKeys));
        }
        Ok(verified)
    }

    fn on_done(&mut self) -> Step {
        if self.mac_received || self.state == State::Done {
            self.peer_done = true;
            return Ok(());
        }
        if self.state.is_terminal() {
            return Ok(());
        }
        Err(Halt::Cancel(CancelCode::UnexpectedMessage))
    }

    fn finish(&mut self, env: &Env<'_>, out: &mut Vec<Effect>) -> Step {
        let device = self.peer_device()?;
        out.push(self.send(
            &device,
            VerificationEvent::Done(DoneContent {
                transaction_id: self.id.clone(),
            }),
        ));
        for (key_id, _) in &self.verified_keys {
            out.push(Effect::MarkVerified {
                user_id: self.other_user.clone(),
                key_id: key_id.clone(),
            });
        }
        if let Some(master) = env.signing_master {
            for (_, key) in self.verified_keys.iter().filter(|(_, key)| *key != master) {
                out.push(Effect::SignKey {
                    user_id: self.other_user.clone(),
                    key: *key,
                });
            }
        }
        self.state = State::Done;
        self.erase();
        info!(transaction_id = %self.id, peer = %self.other_user, "verification done");
        out.push(Effect::Done);
        Ok(())
    }

    fn cancel(&mut self, code: CancelCode, notify: bool) -> Vec<Effect> {
        let mut out = Vec::new();
        if notify {
            let recipients = match &self.other_device {
                Some(device) => vec![device.clone()],
                None => self.requested_devices.clone(),
            };
            for device in recipients {
                out.push(self.send(
                    &device,
                    VerificationEvent::cancel(&self.id, code.clone(), code.default_reason()),
                ));
            }
        }
        self.state = State::Cancelled(code.clone());
        self.erase();
        info!(transaction_id = %self.id, %code, "verification cancelled");
        out.push(Effect::Cancelled(code));
        out
    }

    fn erase_keypair(&mut self) {
        if let Some(mut keypair) = self.keypair.take() {
            keypair.zeroize();
        }
    }

    fn erase(&mut self) {
        self.erase_keypair();
        if let Some(mut secrets) = self.secrets.take() {
            secrets.zeroize();
        }
        self.sas = None;
    }
}
