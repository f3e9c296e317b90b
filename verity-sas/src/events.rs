//! Wire events exchanged between the two devices.
//!
//! Every event carries the `transaction_id` it belongs to. On the wire an
//! event is `{"type": "m.key.verification.<name>", "content": {...}}`,
//! wrapped by the transport in a [`ToDeviceEvent`] that adds the sender.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelCode;
use crate::methods::{
    AcceptParams, Capabilities, HashAlgorithm, KeyAgreementProtocol, MacMethod, SasMethod,
    VerificationMethod,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContent {
    pub transaction_id: String,
    pub from_device: String,
    pub methods: Vec<VerificationMethod>,
    /// Milliseconds since the Unix epoch at which the request was sent.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyContent {
    pub transaction_id: String,
    pub from_device: String,
    pub methods: Vec<VerificationMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartContent {
    pub transaction_id: String,
    pub from_device: String,
    pub method: VerificationMethod,
    pub hashes: Vec<HashAlgorithm>,
    pub key_agreement_protocols: Vec<KeyAgreementProtocol>,
    pub message_authentication_codes: Vec<MacMethod>,
    pub short_authentication_string: Vec<SasMethod>,
}

impl StartContent {
    /// The capability lists advertised by the sender.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            hashes: self.hashes.clone(),
            key_agreement_protocols: self.key_agreement_protocols.clone(),
            message_authentication_codes: self.message_authentication_codes.clone(),
            short_authentication_string: self.short_authentication_string.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptContent {
    pub transaction_id: String,
    pub method: VerificationMethod,
    #[serde(flatten)]
    pub params: AcceptParams,
    /// Unpadded base64 SHA-256 commitment.
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyContent {
    pub transaction_id: String,
    /// Unpadded base64 Curve25519 public key.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacContent {
    pub transaction_id: String,
    /// Key ID -> MAC of that key.
    pub mac: BTreeMap<String, String>,
    /// MAC of the sorted, comma-joined key IDs in `mac`.
    pub keys: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelContent {
    pub transaction_id: String,
    pub code: CancelCode,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneContent {
    pub transaction_id: String,
}

/// One verification protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum VerificationEvent {
    #[serde(rename = "m.key.verification.request")]
    Request(RequestContent),
    #[serde(rename = "m.key.verification.ready")]
    Ready(ReadyContent),
    #[serde(rename = "m.key.verification.start")]
    Start(StartContent),
    #[serde(rename = "m.key.verification.accept")]
    Accept(AcceptContent),
    #[serde(rename = "m.key.verification.key")]
    Key(KeyContent),
    #[serde(rename = "m.key.verification.mac")]
    Mac(MacContent),
    #[serde(rename = "m.key.verification.cancel")]
    Cancel(CancelContent),
    #[serde(rename = "m.key.verification.done")]
    Done(DoneContent),
}

impl VerificationEvent {
    /// The transaction every event carries.
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Request(c) => &c.transaction_id,
            Self::Ready(c) => &c.transaction_id,
            Self::Start(c) => &c.transaction_id,
            Self::Accept(c) => &c.transaction_id,
            Self::Key(c) => &c.transaction_id,
            Self::Mac(c) => &c.transaction_id,
            Self::Cancel(c) => &c.transaction_id,
            Self::Done(c) => &c.transaction_id,
        }
    }

    /// The wire `type` string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Request(_) => "m.key.verification.request",
            Self::Ready(_) => "m.key.verification.ready",
            Self::Start(_) => "m.key.verification.start",
            Self::Accept(_) => "m.key.verification.accept",
            Self::Key(_) => "m.key.verification.key",
            Self::Mac(_) => "m.key.verification.mac",
            Self::Cancel(_) => "m.key.verification.cancel",
            Self::Done(_) => "m.key.verification.done",
        }
    }

    /// A `cancel` event with a human-readable reason.
    pub fn cancel(transaction_id: &str, code: CancelCode, reason: impl Into<String>) -> Self {
        Self::Cancel(CancelContent {
            transaction_id: transaction_id.to_owned(),
            code,
            reason: reason.into(),
        })
    }
}

/// A verification event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDeviceEvent {
    /// User ID of the sending device's owner.
    pub sender: String,
    #[serde(flatten)]
    pub event: VerificationEvent,
}

impl ToDeviceEvent {
    pub fn new(sender: impl Into<String>, event: VerificationEvent) -> Self {
        Self {
            sender: sender.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> StartContent {
        let caps = Capabilities::default();
        StartContent {
            transaction_id: "txn1".into(),
            from_device: "DEVICE".into(),
            method: VerificationMethod::SasV1,
            hashes: caps.hashes,
            key_agreement_protocols: caps.key_agreement_protocols,
            message_authentication_codes: caps.message_authentication_codes,
            short_authentication_string: caps.short_authentication_string,
        }
    }

    #[test]
    fn event_json_shape() {
        let event = VerificationEvent::Done(DoneContent {
            transaction_id: "txn1".into(),
        });
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"m.key.verification.done","content":{"transaction_id":"txn1"}}"#
        );
    }

    #[test]
    fn to_device_event_parses_from_wire() {
        let raw = r#"{
            "sender": "@alice:example.org",
            "type": "m.key.verification.key",
            "content": {"transaction_id": "txn1", "key": "AAAA"}
        }"#;
        let parsed: ToDeviceEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.sender, "@alice:example.org");
        assert_eq!(parsed.event.transaction_id(), "txn1");
        assert_eq!(parsed.event.event_type(), "m.key.verification.key");
    }

    #[test]
    fn accept_params_flatten_into_content() {
        let params = crate::methods::negotiate(&Capabilities::default(), &Capabilities::default())
            .unwrap();
        let event = VerificationEvent::Accept(AcceptContent {
            transaction_id: "txn1".into(),
            method: VerificationMethod::SasV1,
            params,
            commitment: "c".into(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["content"]["hash"], "sha256");
        assert_eq!(value["content"]["message_authentication_code"], "hkdf-hmac-sha256.v2");
        assert_eq!(value["content"]["commitment"], "c");
    }

    #[test]
    fn start_exposes_capabilities() {
        assert_eq!(start().capabilities(), Capabilities::default());
    }

    #[test]
    fn cancel_helper_sets_fields() {
        let event = VerificationEvent::cancel("txn1", CancelCode::User, "bye");
        match event {
            VerificationEvent::Cancel(c) => {
                assert_eq!(c.code, CancelCode::User);
                assert_eq!(c.reason, "bye");
                assert_eq!(c.transaction_id, "txn1");
            }
            other => panic!("expected cancel, got {other:?}"),
        }
    }
}
