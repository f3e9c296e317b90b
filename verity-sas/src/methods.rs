//! Method identifiers and SAS parameter negotiation.
//!
//! Every identifier is a string on the wire. Values this crate does not
//! implement still parse (as `Other`) so a peer advertising extra
//! methods never breaks deserialization; negotiation simply skips them.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelCode;

/// Declares a string-backed identifier enum with an `Other` catch-all.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this implementation does not know.
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Other(raw) => raw,
                }
            }

            /// `false` for `Other`.
            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $( $wire => Self::$variant, )+
                    _ => Self::Other(raw),
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::from(raw.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(raw) => raw,
                    known => known.as_str().to_owned(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use string_enum;

string_enum! {
    /// Verification method offered in `request`/`ready` and chosen in `start`.
    pub enum VerificationMethod {
        /// Short Authentication String.
        SasV1 => "m.sas.v1",
    }
}

string_enum! {
    /// Commitment hash.
    pub enum HashAlgorithm {
        Sha256 => "sha256",
    }
}

string_enum! {
    /// Key agreement protocol.
    pub enum KeyAgreementProtocol {
        Curve25519HkdfSha256 => "curve25519-hkdf-sha256",
    }
}

string_enum! {
    /// MAC method. The name is bound into the MAC-key derivation.
    pub enum MacMethod {
        HkdfHmacSha256 => "hkdf-hmac-sha256",
        HkdfHmacSha256V2 => "hkdf-hmac-sha256.v2",
    }
}

string_enum! {
    /// SAS display method.
    pub enum SasMethod {
        Decimal => "decimal",
        Emoji => "emoji",
    }
}

/// Capability lists advertised in `start`, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub hashes: Vec<HashAlgorithm>,
    pub key_agreement_protocols: Vec<KeyAgreementProtocol>,
    pub message_authentication_codes: Vec<MacMethod>,
    pub short_authentication_string: Vec<SasMethod>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            hashes: vec![HashAlgorithm::Sha256],
            key_agreement_protocols: vec![KeyAgreementProtocol::Curve25519HkdfSha256],
            message_authentication_codes: vec![MacMethod::HkdfHmacSha256V2, MacMethod::HkdfHmacSha256],
            short_authentication_string: vec![SasMethod::Decimal, SasMethod::Emoji],
        }
    }
}

/// The parameter set chosen by the responder and sent in `accept`.
///
/// Its canonical encoding is the first half of the commitment input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptParams {
    pub hash: HashAlgorithm,
    pub key_agreement_protocol: KeyAgreementProtocol,
    pub message_authentication_code: MacMethod,
    pub short_authentication_string: Vec<SasMethod>,
}

impl AcceptParams {
    /// Sorted-key JSON. `serde_json::Value` maps are ordered, so both
    /// peers produce identical bytes for equal parameters.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&serde_json::to_value(self)?)
    }

    /// `true` when every chosen value was offered in `offered`.
    pub fn is_subset_of(&self, offered: &Capabilities) -> bool {
        offered.hashes.contains(&self.hash)
            && offered
                .key_agreement_protocols
                .contains(&self.key_agreement_protocol)
            && offered
                .message_authentication_codes
                .contains(&self.message_authentication_code)
            && !self.short_authentication_string.is_empty()
            && self
                .short_authentication_string
                .iter()
                .all(|m| offered.short_authentication_string.contains(m))
    }
}

fn pick<T: Clone + PartialEq>(ours: &[T], theirs: &[T], known: impl Fn(&T) -> bool) -> Option<T> {
    ours.iter().find(|m| known(*m) && theirs.contains(*m)).cloned()
}

/// Select one hash, agreement protocol and MAC method plus every shared
/// SAS display method, following our preference order.
///
/// # Errors
/// `CancelCode::UnknownMethod` when any list has no known overlap or the
/// shared display methods lack `decimal`.
pub fn negotiate(ours: &Capabilities, theirs: &Capabilities) -> Result<AcceptParams, CancelCode> {
    let hash = pick(&ours.hashes, &theirs.hashes, HashAlgorithm::is_known);
    let key_agreement_protocol = pick(
        &ours.key_agreement_protocols,
        &theirs.key_agreement_protocols,
        KeyAgreementProtocol::is_known,
    );
    let message_authentication_code = pick(
        &ours.message_authentication_codes,
        &theirs.message_authentication_codes,
        MacMethod::is_known,
    );
    let short_authentication_string: Vec<SasMethod> = ours
        .short_authentication_string
        .iter()
        .filter(|m| m.is_known() && theirs.short_authentication_string.contains(*m))
        .cloned()
        .collect();

    match (hash, key_agreement_protocol, message_authentication_code) {
        (Some(hash), Some(key_agreement_protocol), Some(message_authentication_code))
            if short_authentication_string.contains(&SasMethod::Decimal) =>
        {
            Ok(AcceptParams {
                hash,
                key_agreement_protocol,
                message_authentication_code,
                short_authentication_string,
            })
        }
        _ => Err(CancelCode::UnknownMethod),
    }
}

/// Shared verification methods, in our order.
pub fn common_methods(
    ours: &[VerificationMethod],
    theirs: &[VerificationMethod],
) -> Vec<VerificationMethod> {
    ours.iter()
        .filter(|m| m.is_known() && theirs.contains(*m))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identifiers_round_trip() {
        let method: VerificationMethod = serde_json::from_str(r#""m.qr_code.show.v1""#).unwrap();
        assert_eq!(method, VerificationMethod::Other("m.qr_code.show.v1".into()));
        assert!(!method.is_known());
        assert_eq!(serde_json::to_string(&method).unwrap(), r#""m.qr_code.show.v1""#);
    }

    #[test]
    fn known_identifiers_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&MacMethod::HkdfHmacSha256V2).unwrap(),
            r#""hkdf-hmac-sha256.v2""#
        );
        assert_eq!(SasMethod::from("emoji"), SasMethod::Emoji);
    }

    #[test]
    fn negotiate_defaults_picks_v2_and_both_display_methods() {
        let params = negotiate(&Capabilities::default(), &Capabilities::default()).unwrap();
        assert_eq!(params.hash, HashAlgorithm::Sha256);
        assert_eq!(params.key_agreement_protocol, KeyAgreementProtocol::Curve25519HkdfSha256);
        assert_eq!(params.message_authentication_code, MacMethod::HkdfHmacSha256V2);
        assert_eq!(
            params.short_authentication_string,
            vec![SasMethod::Decimal, SasMethod::Emoji]
        );
    }

    #[test]
    fn negotiate_falls_back_to_legacy_mac() {
        let theirs = Capabilities {
            message_authentication_codes: vec![MacMethod::HkdfHmacSha256],
            short_authentication_string: vec![SasMethod::Decimal],
            ..Capabilities::default()
        };
        let params = negotiate(&Capabilities::default(), &theirs).unwrap();
        assert_eq!(params.message_authentication_code, MacMethod::HkdfHmacSha256);
        assert_eq!(params.short_authentication_string, vec![SasMethod::Decimal]);
    }

    #[test]
    fn negotiate_without_overlap_is_unknown_method() {
        let theirs = Capabilities {
            hashes: vec![HashAlgorithm::Other("sha512".into())],
            ..Capabilities::default()
        };
        assert_eq!(
            negotiate(&Capabilities::default(), &theirs),
            Err(CancelCode::UnknownMethod)
        );
    }

    #[test]
    fn negotiate_requires_decimal() {
        let theirs = Capabilities {
            short_authentication_string: vec![SasMethod::Emoji],
            ..Capabilities::default()
        };
        assert_eq!(
            negotiate(&Capabilities::default(), &theirs),
            Err(CancelCode::UnknownMethod)
        );
    }

    #[test]
    fn canonical_bytes_have_sorted_keys() {
        let params = negotiate(&Capabilities::default(), &Capabilities::default()).unwrap();
        let json = String::from_utf8(params.canonical_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"hash":"sha256","key_agreement_protocol":"curve25519-hkdf-sha256","message_authentication_code":"hkdf-hmac-sha256.v2","short_authentication_string":["decimal","emoji"]}"#
        );
    }

    #[test]
    fn subset_check_rejects_unoffered_choice() {
        let mut params = negotiate(&Capabilities::default(), &Capabilities::default()).unwrap();
        assert!(params.is_subset_of(&Capabilities::default()));
        params.hash = HashAlgorithm::Other("md5".into());
        assert!(!params.is_subset_of(&Capabilities::default()));
    }
}
