//! Conformance: Error Display Stability

use verity_core::errors::VerityError;
use verity_sas::collaborators::TransportError;
use verity_sas::{CancelCode, VerificationError};

#[test]
fn conformance_verification_error_display_stable() {
    let cases: Vec<(VerificationError, &str)> = vec![
        (
            VerificationError::UnknownTransaction("txn1".into()),
            "Unknown transaction: txn1",
        ),
        (
            VerificationError::InvalidState {
                action: "start_sas",
                state: "Requested".into(),
            },
            "Invalid state: cannot start_sas while Requested",
        ),
        (
            VerificationError::NoDevices("@carol:example.org".into()),
            "No devices: @carol:example.org",
        ),
        (
            VerificationError::Cancelled(CancelCode::User),
            "Cancelled: m.user",
        ),
        (VerificationError::Expired("txn1".into()), "Expired: txn1"),
        (
            VerificationError::Config("methods must include m.sas.v1".into()),
            "Config error: methods must include m.sas.v1",
        ),
        (
            VerificationError::Core(VerityError::Encoding("invalid base64".into())),
            "Encoding error: invalid base64",
        ),
    ];

    for (error, expected) in &cases {
        assert_eq!(error.to_string(), *expected, "VerificationError display drift detected");
    }
}

#[test]
fn conformance_errors_are_std_errors() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
    assert_error::<VerificationError>();
    assert_error::<TransportError>();
}

#[test]
fn conformance_json_errors_convert() {
    let err: VerificationError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(err.to_string().starts_with("JSON error: "));
}
