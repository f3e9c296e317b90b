//! Conformance: Cancel-Code Registry
//!
//! Every code the state machine can emit is in the registry, round-trips
//! through serde unchanged, and unknown codes from peers survive intact.

use verity_sas::cancel::{is_valid_cancel_code, CANCEL_CODES};
use verity_sas::CancelCode;

#[test]
fn conformance_registry_matches_variants() {
    let variants = [
        CancelCode::User,
        CancelCode::Timeout,
        CancelCode::UnknownTransaction,
        CancelCode::UnknownMethod,
        CancelCode::UnexpectedMessage,
        CancelCode::MismatchedKeys,
        CancelCode::UserMismatch,
        CancelCode::InvalidMessage,
        CancelCode::Accepted,
        CancelCode::MismatchedCommitment,
        CancelCode::MismatchedSas,
    ];
    assert_eq!(variants.len(), CANCEL_CODES.len(), "registry size drift");
    for (variant, wire) in variants.iter().zip(CANCEL_CODES) {
        assert_eq!(variant.as_str(), wire, "registry order drift");
        assert!(is_valid_cancel_code(wire));
        assert_eq!(CancelCode::from(wire), *variant);
    }
}

#[test]
fn conformance_codes_serialize_as_wire_strings() {
    assert_eq!(
        serde_json::to_string(&CancelCode::MismatchedKeys).unwrap(),
        r#""m.key_mismatch""#
    );
    assert_eq!(
        serde_json::from_str::<CancelCode>(r#""m.mismatched_commitment""#).unwrap(),
        CancelCode::MismatchedCommitment
    );
}

#[test]
fn conformance_unknown_codes_are_preserved() {
    let code: CancelCode = serde_json::from_str(r#""org.example.custom""#).unwrap();
    assert_eq!(code, CancelCode::Other("org.example.custom".into()));
    assert!(!code.is_known());
    assert!(!is_valid_cancel_code(code.as_str()));
    assert_eq!(serde_json::to_string(&code).unwrap(), r#""org.example.custom""#);
}

#[test]
fn conformance_every_code_has_a_reason() {
    for wire in CANCEL_CODES {
        assert!(!CancelCode::from(wire).default_reason().is_empty());
    }
}
