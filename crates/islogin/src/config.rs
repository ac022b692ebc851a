#![forbid(unsafe_code)]

//! Relying-party configuration.
//!
//! Loaded once at startup. Every field has a default, so a JSON file only
//! needs the values it changes:
//!
//! ```json
//! {
//!   "expected_audience": "https://innskraning.example.is",
//!   "trust_anchor": { "pem_file": "/etc/islogin/anchor.pem" }
//! }
//! ```

use std::path::{Path, PathBuf};

use islogin_core::Error;
use islogin_x509::{TrustPolicy, TrustStore};
use serde::{Deserialize, Serialize};

/// Where the trust anchor certificates come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAnchorSource {
    /// The anchor compiled into the binary.
    #[default]
    Embedded,
    /// A PEM file with one or more certificates.
    PemFile(PathBuf),
    /// Inline PEM text.
    Pem(String),
}

impl TrustAnchorSource {
    pub fn load(&self) -> Result<TrustStore, Error> {
        match self {
            TrustAnchorSource::Embedded => TrustStore::embedded(),
            TrustAnchorSource::PemFile(path) => TrustStore::from_pem_file(path),
            TrustAnchorSource::Pem(pem) => TrustStore::from_pem(pem),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfig {
    /// Audience every accepted assertion must be issued for. Verification
    /// always fails while this is unset.
    pub expected_audience: Option<String>,
    /// Check `NotBefore`/`NotOnOrAfter`. Disable only in tests.
    pub enforce_temporal_window: bool,
    pub trust_anchor: TrustAnchorSource,
    pub trust_policy: TrustPolicy,
    /// Required `Response/@Destination`, if set.
    pub expected_destination: Option<String>,
    /// Required `DestinationSSN` claim, if set.
    pub expected_destination_ssn: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            expected_audience: None,
            enforce_temporal_window: true,
            trust_anchor: TrustAnchorSource::default(),
            trust_policy: TrustPolicy::default(),
            expected_destination: None,
            expected_destination_ssn: None,
        }
    }
}

impl VerifierConfig {
    /// Default configuration for `audience`.
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            expected_audience: Some(audience.into()),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e.reason())))
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {e}")))
    }

    pub fn with_trust_anchor(mut self, source: TrustAnchorSource) -> Self {
        self.trust_anchor = source;
        self
    }

    pub fn with_temporal_window(mut self, enforce: bool) -> Self {
        self.enforce_temporal_window = enforce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islogin_core::ErrorKind;

    #[test]
    fn defaults() {
        let config = VerifierConfig::default();
        assert!(config.expected_audience.is_none());
        assert!(config.enforce_temporal_window);
        assert_eq!(config.trust_anchor, TrustAnchorSource::Embedded);
        assert_eq!(config.trust_policy.expected_subject_serial_number, "6503760649");
    }

    #[test]
    fn partial_json() {
        let config = VerifierConfig::from_json(
            r#"{
                "expected_audience": "https://rp.test",
                "trust_anchor": { "pem_file": "/etc/islogin/anchor.pem" },
                "trust_policy": { "expected_issuer_organization": "Test CA" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.expected_audience.as_deref(), Some("https://rp.test"));
        assert!(config.enforce_temporal_window);
        assert_eq!(
            config.trust_anchor,
            TrustAnchorSource::PemFile("/etc/islogin/anchor.pem".into())
        );
        assert_eq!(config.trust_policy.expected_issuer_organization, "Test CA");
        assert_eq!(config.trust_policy.expected_subject_serial_number, "6503760649");
    }

    #[test]
    fn embedded_anchor_as_string() {
        let config = VerifierConfig::from_json(r#"{"trust_anchor": "embedded"}"#).unwrap();
        assert_eq!(config.trust_anchor, TrustAnchorSource::Embedded);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = VerifierConfig::from_json(r#"{"audience": "https://rp.test"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_file() {
        let err = VerifierConfig::from_json_file("/nonexistent/islogin.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.reason().contains("/nonexistent/islogin.json"));
    }

    #[test]
    fn anchor_sources_load() {
        assert_eq!(TrustAnchorSource::Embedded.load().unwrap().len(), 1);
        let pem = include_str!("../../../testdata/anchor.pem");
        assert_eq!(TrustAnchorSource::Pem(pem.into()).load().unwrap().len(), 1);
        let err = TrustAnchorSource::Pem("garbage".into()).load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
