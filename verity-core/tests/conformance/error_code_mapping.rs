//! Conformance: Error Display Stability
//!
//! Primitive failures map onto `VerityError` variants with a stable
//! "{Category}: {detail}" display, relied on by diagnostics.

use verity_core::errors::VerityError;

#[test]
fn conformance_verity_error_display_format_stable() {
    let cases: Vec<(VerityError, &str)> = vec![
        (
            VerityError::InvalidPublicKey("peer key is a low-order point".into()),
            "Invalid public key: peer key is a low-order point",
        ),
        (
            VerityError::Encoding("invalid base64".into()),
            "Encoding error: invalid base64",
        ),
        (
            VerityError::KeyDerivation("invalid length".into()),
            "Key derivation error: invalid length",
        ),
        (VerityError::Mac("bad key".into()), "MAC error: bad key"),
    ];

    for (error, expected) in &cases {
        assert_eq!(error.to_string(), *expected, "VerityError display drift detected");
    }
}

#[test]
fn conformance_verity_error_is_std_error() {
    let err = VerityError::Encoding("test".into());
    let _: &dyn std::error::Error = &err;
}

/// Low-order peer keys MUST surface as InvalidPublicKey.
#[test]
fn conformance_low_order_key_maps_to_invalid_public_key() {
    let kp = verity_core::crypto::generate_keypair();
    let err = kp.agree(&[0u8; 32]).unwrap_err();
    assert!(
        matches!(err, VerityError::InvalidPublicKey(_)),
        "low-order key should produce InvalidPublicKey, got: {err}"
    );
}

/// Malformed base64 MUST surface as Encoding.
#[test]
fn conformance_invalid_base64_maps_to_encoding_error() {
    let err = verity_core::encoding::from_base64("!!!not-base64!!!").unwrap_err();
    assert!(err.to_string().starts_with("Encoding error:"));
}

/// Key IDs outside the ed25519 namespace MUST be rejected.
#[test]
fn conformance_foreign_key_id_maps_to_encoding_error() {
    let err = verity_core::identity::KeyId::parse("curve25519:DEV").unwrap_err();
    assert!(err.to_string().starts_with("Encoding error:"));
}
