#![forbid(unsafe_code)]

//! The verification pipeline.
//!
//! ```text
//! token ─▶ decode ─▶ verify signature ─▶ validate signer ─▶ extract ─▶ policy ─▶ VerifiedIdentity
//! ```
//!
//! Each stage either hands its output to the next one or stops the
//! pipeline with an error. There are no retries and no partial results.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use islogin_core::Error;
use islogin_x509::{validate_trust, TrustStore};
use islogin_xml::AssertionDocument;

use crate::claims::{self, Extracted};
use crate::config::VerifierConfig;
use crate::identity::VerifiedIdentity;

/// Pipeline stage, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decoding,
    SignatureChecking,
    TrustChecking,
    Extracting,
    PolicyChecking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decoding => "decoding",
            Stage::SignatureChecking => "signature",
            Stage::TrustChecking => "trust",
            Stage::Extracting => "extracting",
            Stage::PolicyChecking => "policy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verifies login tokens against one relying-party configuration.
///
/// Cheap to clone and safe to share between threads; the configuration
/// and trust anchors are read-only after construction.
#[derive(Debug, Clone)]
pub struct Verifier {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: VerifierConfig,
    trust: TrustStore,
}

impl Verifier {
    /// Load the trust anchors named by `config`.
    pub fn new(config: VerifierConfig) -> Result<Self, Error> {
        let trust = config.trust_anchor.load()?;
        Ok(Self::with_trust_store(config, trust))
    }

    /// Use an already loaded trust store; `config.trust_anchor` is ignored.
    pub fn with_trust_store(config: VerifierConfig, trust: TrustStore) -> Self {
        if config.expected_audience.is_none() {
            tracing::warn!("no expected audience configured, every token will be rejected");
        }
        if !config.enforce_temporal_window {
            tracing::warn!("assertion validity window is not enforced");
        }
        tracing::debug!(anchors = trust.len(), "verifier ready");
        Self {
            inner: Arc::new(Inner { config, trust }),
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.inner.config
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.inner.trust
    }

    /// Verify a base64 login token against the current time.
    pub fn verify(&self, token: impl AsRef<[u8]>) -> Result<VerifiedIdentity, Error> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a base64 login token as of `now`.
    ///
    /// `now` is used for both the signer certificate validity and the
    /// assertion validity window.
    pub fn verify_at(
        &self,
        token: impl AsRef<[u8]>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdentity, Error> {
        let config = &self.inner.config;

        let document = stage(Stage::Decoding, || AssertionDocument::decode(token.as_ref()))?;
        let signer = stage(Stage::SignatureChecking, || {
            islogin_dsig::verify_signature(&document)
        })?;
        stage(Stage::TrustChecking, || {
            validate_trust(&signer, &self.inner.trust, &config.trust_policy, now)
        })?;
        let extracted = stage(Stage::Extracting, || claims::extract(&document))?;
        stage(Stage::PolicyChecking, || check_policy(config, &extracted, now))?;

        let Extracted {
            conditions,
            claims,
            destination,
        } = extracted;
        tracing::info!(
            signer = %signer.subject(),
            audience = %conditions.audience,
            destination = %destination,
            "login token verified"
        );
        Ok(VerifiedIdentity::new(claims, conditions, destination))
    }

    /// [`Verifier::verify`] on the blocking thread pool.
    ///
    /// If the runtime shuts down before the task runs, the result is
    /// [`Error::Configuration`]: no verdict was reached on the token.
    pub async fn verify_async(&self, token: impl Into<Vec<u8>>) -> Result<VerifiedIdentity, Error> {
        let verifier = self.clone();
        let token = token.into();
        joined(tokio::task::spawn_blocking(move || verifier.verify(token)).await)
    }
}

fn joined(
    result: Result<Result<VerifiedIdentity, Error>, tokio::task::JoinError>,
) -> Result<VerifiedIdentity, Error> {
    match result {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(Error::Configuration(format!("verification task cancelled: {e}"))),
    }
}

fn stage<T>(stage: Stage, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    tracing::debug!(%stage, "entering stage");
    f().map_err(|e| {
        tracing::warn!(%stage, kind = %e.kind(), reason = %e.reason(), "login token rejected");
        e
    })
}

/// Relying-party checks on a verified, extracted assertion.
fn check_policy(
    config: &VerifierConfig,
    extracted: &Extracted,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let expected = config
        .expected_audience
        .as_deref()
        .ok_or(Error::AudienceMisconfigured)?;
    if extracted.conditions.audience != expected {
        return Err(Error::AudienceMismatch {
            expected: expected.to_owned(),
            actual: extracted.conditions.audience.clone(),
        });
    }

    if let Some(expected) = config.expected_destination.as_deref() {
        if extracted.destination != expected {
            return Err(Error::DestinationMismatch {
                field: "destination",
                expected: expected.to_owned(),
                actual: extracted.destination.clone(),
            });
        }
    }
    if let Some(expected) = config.expected_destination_ssn.as_deref() {
        if extracted.claims.destination_ssn != expected {
            return Err(Error::DestinationMismatch {
                field: "destination SSN",
                expected: expected.to_owned(),
                actual: extracted.claims.destination_ssn.clone(),
            });
        }
    }

    if config.enforce_temporal_window {
        extracted.conditions.check_window(now)?;
    }
    Ok(())
}
