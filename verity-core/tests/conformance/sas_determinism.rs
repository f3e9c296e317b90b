//! Conformance: SAS Determinism
//!
//! Invariants under test:
//! - Both peers derive identical SAS bytes regardless of role
//! - Encodings are pure functions of the SAS bytes (no hidden entropy)
//! - Decimal groups stay in 1000..=9191, emoji indices in 0..64
//! - Exactly 3 decimal groups and 7 emoji

use verity_core::crypto::{derive_sas_bytes, generate_keypair, sas_info, AgreementParty, SasBytes};
use verity_core::sas::{decimal, emoji_indices, emoji_symbols, EMOJI_TABLE};

fn derive_pair(txn: &str) -> (SasBytes, SasBytes) {
    let initiator = generate_keypair();
    let responder = generate_keypair();
    let a = AgreementParty {
        user_id: "@alice:example.org",
        device_id: "AAAAAAAA",
        ephemeral_key: &initiator.public_key,
    };
    let b = AgreementParty {
        user_id: "@alice:example.org",
        device_id: "BBBBBBBB",
        ephemeral_key: &responder.public_key,
    };
    let info = sas_info(&a, &b, txn);

    let on_initiator = initiator.agree(&responder.public_key).unwrap();
    let on_responder = responder.agree(&initiator.public_key).unwrap();
    (
        derive_sas_bytes(&on_initiator, &info).unwrap(),
        derive_sas_bytes(&on_responder, &info).unwrap(),
    )
}

// ── Conformance: Peer Agreement ─────────────────────────────────

/// Initiator and responder display identical codes.
#[test]
fn conformance_sas_identical_on_both_peers() {
    for round in 0..32 {
        let (a, b) = derive_pair(&format!("txn-{round}"));
        assert_eq!(a, b, "SAS bytes differ between peers in round {round}");
        assert_eq!(decimal(&a), decimal(&b));
        assert_eq!(emoji_symbols(&a), emoji_symbols(&b));
    }
}

// ── Conformance: Determinism (No Entropy Drift) ─────────────────

/// Same bytes MUST always produce the same codes.
#[test]
fn conformance_sas_deterministic_100_rounds() {
    let sas = SasBytes::from_bytes([0x3a, 0x91, 0x07, 0xee, 0x55, 0xc2]);
    let reference = (decimal(&sas), emoji_indices(&sas));

    for round in 1..=100 {
        let codes = (decimal(&sas), emoji_indices(&sas));
        assert_eq!(codes, reference, "SAS drift at round {round}");
    }
}

/// Known bytes map to known codes.
#[test]
fn conformance_sas_known_encoding() {
    // 0x3a9107ee55c2 = 0011101010010 0010000011111 1011100101010 111000010
    let sas = SasBytes::from_bytes([0x3a, 0x91, 0x07, 0xee, 0x55, 0xc2]);
    assert_eq!(decimal(&sas), [1000 + 0x0752, 1000 + 0x041F, 1000 + 0x172A]);
    // 001110 101001 000100 000111 111011 100101 010111
    assert_eq!(emoji_indices(&sas), [14, 41, 4, 7, 59, 37, 23]);
    assert_eq!(emoji_symbols(&sas)[0].description, "Butterfly");
}

// ── Conformance: Output Bounds ──────────────────────────────────

#[test]
fn conformance_sas_output_bounds() {
    for round in 0..64 {
        let (sas, _) = derive_pair(&format!("bounds-{round}"));
        let numbers = decimal(&sas);
        assert_eq!(numbers.len(), 3);
        for n in numbers {
            assert!((1000..=9191).contains(&n), "decimal {n} out of range");
        }
        let symbols = emoji_indices(&sas);
        assert_eq!(symbols.len(), 7);
        for i in symbols {
            assert!(usize::from(i) < EMOJI_TABLE.len(), "emoji index {i} out of range");
        }
    }
}

// ── Conformance: Transaction Binding ────────────────────────────

/// The same keys in a different transaction yield different bytes.
#[test]
fn conformance_sas_bound_to_transaction_id() {
    let initiator = generate_keypair();
    let responder = generate_keypair();
    let a = AgreementParty {
        user_id: "@a:x",
        device_id: "A",
        ephemeral_key: &initiator.public_key,
    };
    let b = AgreementParty {
        user_id: "@b:x",
        device_id: "B",
        ephemeral_key: &responder.public_key,
    };
    let shared = initiator.agree(&responder.public_key).unwrap();
    let one = derive_sas_bytes(&shared, &sas_info(&a, &b, "one")).unwrap();
    let two = derive_sas_bytes(&shared, &sas_info(&a, &b, "two")).unwrap();
    assert_ne!(one, two);
}
