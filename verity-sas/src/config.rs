//! Verification configuration.
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid
//! config. Capability lists are in preference order.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::VerificationError;
use crate::methods::{Capabilities, SasMethod, VerificationMethod};

/// Default transaction lifetime.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Requests older than this are ignored.
pub const DEFAULT_REQUEST_MAX_AGE_SECS: u64 = 600;

/// Requests dated further in the future than this are ignored.
pub const DEFAULT_REQUEST_MAX_FUTURE_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub timeout_secs: u64,
    pub request_max_age_secs: u64,
    pub request_max_future_secs: u64,
    pub methods: Vec<VerificationMethod>,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    /// Accept a `start` for an unknown transaction without a prior request.
    pub allow_start_without_request: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_max_age_secs: DEFAULT_REQUEST_MAX_AGE_SECS,
            request_max_future_secs: DEFAULT_REQUEST_MAX_FUTURE_SECS,
            methods: vec![VerificationMethod::SasV1],
            capabilities: Capabilities::default(),
            allow_start_without_request: false,
        }
    }
}

impl VerificationConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(raw: &str) -> Result<Self, VerificationError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject configs this implementation cannot run.
    pub fn validate(&self) -> Result<(), VerificationError> {
        let caps = &self.capabilities;
        if !self.methods.contains(&VerificationMethod::SasV1) {
            return Err(VerificationError::Config("methods must include m.sas.v1".into()));
        }
        if !caps.short_authentication_string.contains(&SasMethod::Decimal) {
            return Err(VerificationError::Config(
                "short_authentication_string must include decimal".into(),
            ));
        }
        if caps.hashes.is_empty()
            || caps.key_agreement_protocols.is_empty()
            || caps.message_authentication_codes.is_empty()
        {
            return Err(VerificationError::Config("capability lists must not be empty".into()));
        }
        let unsupported = caps
            .hashes
            .iter()
            .map(|m| (m.is_known(), m.as_str()))
            .chain(caps.key_agreement_protocols.iter().map(|m| (m.is_known(), m.as_str())))
            .chain(caps.message_authentication_codes.iter().map(|m| (m.is_known(), m.as_str())))
            .chain(caps.short_authentication_string.iter().map(|m| (m.is_known(), m.as_str())))
            .find(|(known, _)| !known);
        if let Some((_, name)) = unsupported {
            return Err(VerificationError::Config(format!("unsupported method: {name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::MacMethod;

    #[test]
    fn empty_json_yields_defaults() {
        let config = VerificationConfig::from_json_str("{}").unwrap();
        assert_eq!(config, VerificationConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn capability_lists_are_top_level_fields() {
        let config = VerificationConfig::from_json_str(
            r#"{"timeout_secs": 30, "message_authentication_codes": ["hkdf-hmac-sha256"]}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(
            config.capabilities.message_authentication_codes,
            vec![MacMethod::HkdfHmacSha256]
        );
    }

    #[test]
    fn validate_requires_decimal() {
        let err = VerificationConfig::from_json_str(r#"{"short_authentication_string": ["emoji"]}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config error: short_authentication_string must include decimal"
        );
    }

    #[test]
    fn validate_rejects_unknown_methods() {
        let err = VerificationConfig::from_json_str(r#"{"hashes": ["sha3"]}"#).unwrap_err();
        assert_eq!(err.to_string(), "Config error: unsupported method: sha3");
    }

    #[test]
    fn validate_requires_sas_method() {
        let err = VerificationConfig::from_json_str(r#"{"methods": []}"#).unwrap_err();
        assert!(err.to_string().contains("m.sas.v1"));
    }
}
