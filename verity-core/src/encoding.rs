//! Encoding utilities: base64 and hex.
//!
//! Keys, commitments and MACs travel as unpadded standard base64
//! (RFC 4648 alphabet, `=` stripped). Decoding accepts padded input too,
//! since some peers still emit it.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

use crate::errors::VerityError;

/// Encode bytes to unpadded standard base64.
pub fn to_base64(data: &[u8]) -> String {
    STANDARD_NO_PAD.encode(data)
}

/// Decode standard base64, padded or not.
///
/// # Errors
/// Returns `VerityError::Encoding` on invalid base64 input.
pub fn from_base64(encoded: &str) -> Result<Vec<u8>, VerityError> {
    let result = if encoded.ends_with('=') {
        STANDARD.decode(encoded)
    } else {
        STANDARD_NO_PAD.decode(encoded)
    };
    result.map_err(|e| VerityError::Encoding(format!("invalid base64: {e}")))
}

/// Decode base64 into a fixed 32-byte array.
///
/// # Errors
/// Returns `VerityError::Encoding` on invalid base64 or wrong length.
pub fn from_base64_32(encoded: &str) -> Result<[u8; 32], VerityError> {
    let bytes = from_base64(encoded)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| VerityError::Encoding(format!("expected 32 bytes, got {len}")))
}

/// Encode bytes to lowercase hex string.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_is_unpadded() {
        assert_eq!(to_base64(b"a"), "YQ");
        assert_eq!(to_base64(b"ab"), "YWI");
        assert_eq!(to_base64(b"abc"), "YWJj");
    }

    #[test]
    fn base64_accepts_padded_and_unpadded() {
        assert_eq!(from_base64("YQ").unwrap(), b"a");
        assert_eq!(from_base64("YQ==").unwrap(), b"a");
    }

    #[test]
    fn base64_invalid_rejected() {
        assert!(from_base64("!!!not-base64!!!").is_err());
    }

    #[test]
    fn base64_32_rejects_wrong_length() {
        let short = to_base64(&[7u8; 31]);
        let err = from_base64_32(&short).unwrap_err();
        assert_eq!(err.to_string(), "Encoding error: expected 32 bytes, got 31");

        let exact = to_base64(&[7u8; 32]);
        assert_eq!(from_base64_32(&exact).unwrap(), [7u8; 32]);
    }

    #[test]
    fn hex_known_value() {
        assert_eq!(to_hex(&[0xff]), "ff");
        assert_eq!(to_hex(&[0x00, 0x0a, 0xff]), "000aff");
    }
}
