#![forbid(unsafe_code)]

//! Errors produced while verifying a login token.
//!
//! Every failure is terminal for the token that caused it. Each variant
//! belongs to exactly one pipeline stage, and callers can match on
//! [`Error::kind`] for a stable machine-readable identifier.

use serde::Serialize;

/// Errors produced by the islogin verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport decoding or XML parsing failed, or the root shape is wrong.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The certificate embedded in the signature could not be decoded.
    #[error("malformed certificate: {0}")]
    CertificateMalformed(String),

    /// Canonicalization, digest or signature value check failed.
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),

    /// Signer identity, validity window or chain of trust check failed.
    #[error("untrusted signer: {0}")]
    UntrustedSigner(String),

    /// A required assertion element is missing or unreadable.
    #[error("invalid assertion structure: {0}")]
    AssertionStructure(String),

    /// The relying party never configured an expected audience.
    #[error("expected audience is not configured")]
    AudienceMisconfigured,

    #[error("audience mismatch: expected {expected:?}, assertion is for {actual:?}")]
    AudienceMismatch { expected: String, actual: String },

    #[error("{field} mismatch: expected {expected:?}, assertion carries {actual:?}")]
    DestinationMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// The current time is outside the assertion's validity window.
    #[error("assertion is not valid at this time: {0}")]
    TemporalValidity(String),

    /// Startup-time failure: unreadable trust anchor or configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedToken(_) => ErrorKind::MalformedToken,
            Error::CertificateMalformed(_) => ErrorKind::CertificateMalformed,
            Error::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            Error::UntrustedSigner(_) => ErrorKind::UntrustedSigner,
            Error::AssertionStructure(_) => ErrorKind::AssertionStructure,
            Error::AudienceMisconfigured => ErrorKind::AudienceMisconfigured,
            Error::AudienceMismatch { .. } => ErrorKind::AudienceMismatch,
            Error::DestinationMismatch { .. } => ErrorKind::DestinationMismatch,
            Error::TemporalValidity(_) => ErrorKind::TemporalValidity,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Human-readable reason, without the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            Error::MalformedToken(r)
            | Error::CertificateMalformed(r)
            | Error::SignatureInvalid(r)
            | Error::UntrustedSigner(r)
            | Error::AssertionStructure(r)
            | Error::TemporalValidity(r)
            | Error::Configuration(r) => r.clone(),
            other => other.to_string(),
        }
    }
}

/// Machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ErrorKind {
    MalformedToken,
    CertificateMalformed,
    SignatureInvalid,
    UntrustedSigner,
    AssertionStructure,
    AudienceMisconfigured,
    AudienceMismatch,
    DestinationMismatch,
    TemporalValidity,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedToken => "MALFORMED-TOKEN",
            ErrorKind::CertificateMalformed => "CERTIFICATE-MALFORMED",
            ErrorKind::SignatureInvalid => "SIGNATURE-INVALID",
            ErrorKind::UntrustedSigner => "UNTRUSTED-SIGNER",
            ErrorKind::AssertionStructure => "ASSERTION-STRUCTURE",
            ErrorKind::AudienceMisconfigured => "AUDIENCE-MISCONFIGURED",
            ErrorKind::AudienceMismatch => "AUDIENCE-MISMATCH",
            ErrorKind::DestinationMismatch => "DESTINATION-MISMATCH",
            ErrorKind::TemporalValidity => "TEMPORAL-VALIDITY",
            ErrorKind::Configuration => "CONFIGURATION",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = Error::AudienceMismatch {
            expected: "https://a.test".into(),
            actual: "https://b.test".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AudienceMismatch);
        assert_eq!(err.kind().as_str(), "AUDIENCE-MISMATCH");
        assert!(err.reason().contains("https://b.test"));
    }

    #[test]
    fn reason_omits_prefix() {
        let err = Error::SignatureInvalid("digest mismatch".into());
        assert_eq!(err.reason(), "digest mismatch");
        assert_eq!(err.to_string(), "invalid signature: digest mismatch");
    }

    #[test]
    fn kind_serializes_to_stable_identifier() {
        for kind in [
            ErrorKind::MalformedToken,
            ErrorKind::CertificateMalformed,
            ErrorKind::UntrustedSigner,
            ErrorKind::TemporalValidity,
            ErrorKind::AudienceMisconfigured,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
