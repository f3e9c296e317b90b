//! Conformance: Wire Event Shapes
//!
//! Field names and type strings are the interoperability contract.

use std::collections::BTreeMap;

use verity_sas::events::{MacContent, ReadyContent};
use verity_sas::methods::VerificationMethod;
use verity_sas::{ToDeviceEvent, VerificationEvent};

#[test]
fn conformance_ready_event_shape() {
    let event = ToDeviceEvent::new(
        "@bob:example.org",
        VerificationEvent::Ready(ReadyContent {
            transaction_id: "txn1".into(),
            from_device: "BOB1".into(),
            methods: vec![VerificationMethod::SasV1],
        }),
    );
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "sender": "@bob:example.org",
            "type": "m.key.verification.ready",
            "content": {
                "transaction_id": "txn1",
                "from_device": "BOB1",
                "methods": ["m.sas.v1"]
            }
        })
    );
}

#[test]
fn conformance_mac_event_shape() {
    let mut mac = BTreeMap::new();
    mac.insert("ed25519:BOB1".to_string(), "tag".to_string());
    let event = VerificationEvent::Mac(MacContent {
        transaction_id: "txn1".into(),
        mac,
        keys: "keys-tag".into(),
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "m.key.verification.mac");
    assert_eq!(value["content"]["mac"]["ed25519:BOB1"], "tag");
    assert_eq!(value["content"]["keys"], "keys-tag");
}

#[test]
fn conformance_unknown_event_type_is_rejected() {
    let raw = r#"{
        "sender": "@bob:example.org",
        "type": "m.key.verification.qr",
        "content": {"transaction_id": "txn1"}
    }"#;
    assert!(serde_json::from_str::<ToDeviceEvent>(raw).is_err());
}
