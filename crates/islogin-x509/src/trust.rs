#![forbid(unsafe_code)]

//! Trust anchors and the signer trust decision.
//!
//! The identity provider's PKI layout is fixed: the signing certificate is
//! issued directly by an intermediate that the relying party configures as
//! its trust anchor. No chain building is attempted.

use std::path::Path;

use chrono::{DateTime, Utc};
use islogin_core::Error;
use serde::{Deserialize, Serialize};

use crate::certificate::{SignerCertificate, X509Certificate};

/// The Auðkenni "Fullgilt audkenni" intermediate that issues the
/// island.is signing certificate.
pub const EMBEDDED_ANCHOR_PEM: &str = include_str!("../certs/fullgilt-audkenni.pem");

/// A certificate the signer must be issued by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    cert: X509Certificate,
}

impl TrustAnchor {
    /// Wrap a parsed certificate as an anchor.
    ///
    /// Anchors must carry a subject-key-identifier that matches their key;
    /// it is what a signer's authority-key-identifier points at.
    pub fn new(cert: X509Certificate) -> Result<Self, Error> {
        if !cert.has_consistent_key_identifier() {
            return Err(Error::Configuration(format!(
                "trust anchor {} has a missing or inconsistent subject key identifier",
                cert.subject()
            )));
        }
        Ok(Self { cert })
    }

    pub fn certificate(&self) -> &X509Certificate {
        &self.cert
    }
}

/// The configured set of trust anchors. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStore {
    anchors: Vec<TrustAnchor>,
}

impl TrustStore {
    /// The anchor shipped with this crate.
    pub fn embedded() -> Result<Self, Error> {
        Self::from_pem(EMBEDDED_ANCHOR_PEM)
    }

    /// Load every `CERTIFICATE` block in `pem`.
    ///
    /// Anything other than certificate blocks and whitespace is rejected.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let anchors = pem_certificates(pem)?
            .into_iter()
            .map(|der| {
                let cert = X509Certificate::from_der(&der)
                    .map_err(|e| Error::Configuration(format!("bad trust anchor: {}", e.reason())))?;
                TrustAnchor::new(cert)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_anchors(anchors)
    }

    /// Load anchors from a PEM file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read trust anchor {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loading trust anchors");
        Self::from_pem(&pem)
    }

    pub fn from_anchors(anchors: Vec<TrustAnchor>) -> Result<Self, Error> {
        if anchors.is_empty() {
            return Err(Error::Configuration("no trust anchor certificates".into()));
        }
        Ok(Self { anchors })
    }

    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Identity the signer certificate must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustPolicy {
    /// Subject `serialNumber` of the signing certificate (Þjóðskrá Íslands).
    pub expected_subject_serial_number: String,
    /// Issuer `O` of the signing certificate.
    pub expected_issuer_organization: String,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            expected_subject_serial_number: "6503760649".into(),
            expected_issuer_organization: "Audkenni hf.".into(),
        }
    }
}

/// Decide whether `cert` may sign login tokens at time `now`.
///
/// Checks, in order:
/// 1. subject serial number and issuer organization match `policy`
/// 2. `now` is within the certificate validity window
/// 3. the subject-key-identifier is present and matches the key
/// 4. an anchor in `store` issued the certificate
pub fn validate_trust(
    cert: &SignerCertificate,
    store: &TrustStore,
    policy: &TrustPolicy,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let serial = cert.subject_serial_number().unwrap_or_default();
    if serial != policy.expected_subject_serial_number {
        return Err(Error::UntrustedSigner(format!(
            "subject serialNumber {serial:?} is not {:?}",
            policy.expected_subject_serial_number
        )));
    }

    let organization = cert.issuer_organization().unwrap_or_default();
    if organization != policy.expected_issuer_organization {
        return Err(Error::UntrustedSigner(format!(
            "issuer organization {organization:?} is not {:?}",
            policy.expected_issuer_organization
        )));
    }

    if !cert.is_valid_at(now) {
        return Err(Error::UntrustedSigner(format!(
            "certificate is valid from {} to {}, not at {now}",
            cert.not_before(),
            cert.not_after()
        )));
    }

    match cert.subject_key_identifier() {
        Ok(Some(ski)) if ski == cert.computed_key_identifier() => {}
        Ok(Some(_)) => {
            return Err(Error::UntrustedSigner(
                "subject key identifier does not match the public key".into(),
            ))
        }
        Ok(None) => {
            return Err(Error::UntrustedSigner(
                "certificate has no subject key identifier".into(),
            ))
        }
        Err(e) => return Err(Error::UntrustedSigner(e.reason())),
    }

    let issuer_anchor = store
        .anchors()
        .iter()
        .find(|anchor| issued_by(cert, anchor, now).is_ok());
    match issuer_anchor {
        Some(anchor) => {
            tracing::debug!(anchor = %anchor.certificate().subject(), "signer chains to trust anchor");
            Ok(())
        }
        None => {
            // Report the reason against the first anchor; with one anchor
            // this is the precise failure.
            let reason = store
                .anchors()
                .first()
                .and_then(|anchor| issued_by(cert, anchor, now).err())
                .map(|e| e.reason())
                .unwrap_or_else(|| "no trust anchor configured".into());
            Err(Error::UntrustedSigner(format!(
                "not issued by a trust anchor: {reason}"
            )))
        }
    }
}

/// Decode the `CERTIFICATE` blocks of a PEM bundle to DER.
fn pem_certificates(text: &str) -> Result<Vec<Vec<u8>>, Error> {
    const BEGIN: &str = "-----BEGIN ";
    const END: &str = "-----END ";
    let bad = |msg: String| Error::Configuration(format!("bad trust anchor PEM: {msg}"));

    let mut blocks = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if !rest.starts_with(BEGIN) {
            return Err(bad("unexpected text outside a PEM block".into()));
        }
        let end = rest
            .find(END)
            .ok_or_else(|| bad("unterminated PEM block".into()))?;
        let line_end = rest[end..].find('\n').map_or(rest.len(), |i| end + i);
        let (label, der) = pem_rfc7468::decode_vec(rest[..line_end].trim_end().as_bytes())
            .map_err(|e| bad(e.to_string()))?;
        if label != "CERTIFICATE" {
            return Err(bad(format!("expected CERTIFICATE, found {label}")));
        }
        blocks.push(der);
        rest = rest[line_end..].trim_start();
    }
    Ok(blocks)
}

fn issued_by(cert: &SignerCertificate, anchor: &TrustAnchor, now: DateTime<Utc>) -> Result<(), Error> {
    let anchor_cert = anchor.certificate();

    if cert.issuer_der().is_none() || cert.issuer_der() != anchor_cert.subject_der() {
        return Err(Error::UntrustedSigner(format!(
            "issuer {} is not {}",
            cert.issuer(),
            anchor_cert.subject()
        )));
    }

    if let Some(aki) = cert.authority_key_identifier()? {
        let anchor_ski = anchor_cert.subject_key_identifier()?;
        if anchor_ski.as_deref() != Some(aki.as_slice()) {
            return Err(Error::UntrustedSigner(
                "authority key identifier does not name the anchor".into(),
            ));
        }
    }

    if !anchor_cert.is_valid_at(now) {
        return Err(Error::UntrustedSigner(format!(
            "trust anchor expired at {}",
            anchor_cert.not_after()
        )));
    }

    cert.verify_signed_by(anchor_cert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use islogin_core::ErrorKind;

    const ANCHOR: &str = include_str!("../../../testdata/anchor.pem");
    const SIGNER: &str = include_str!("../../../testdata/signer.pem");

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn store() -> TrustStore {
        TrustStore::from_pem(ANCHOR).unwrap()
    }

    fn signer(pem: &str) -> SignerCertificate {
        X509Certificate::from_pem(pem).unwrap()
    }

    fn reason(pem: &str) -> String {
        let err = validate_trust(&signer(pem), &store(), &TrustPolicy::default(), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UntrustedSigner);
        err.reason()
    }

    #[test]
    fn accepts_signer_issued_by_anchor() {
        validate_trust(&signer(SIGNER), &store(), &TrustPolicy::default(), now()).unwrap();
    }

    #[test]
    fn rejects_wrong_subject_serial() {
        let policy = TrustPolicy {
            expected_subject_serial_number: "0000000000".into(),
            ..TrustPolicy::default()
        };
        let err = validate_trust(&signer(SIGNER), &store(), &policy, now()).unwrap_err();
        assert!(err.reason().contains("serialNumber"));
    }

    #[test]
    fn rejects_wrong_issuer_organization() {
        assert!(reason(include_str!("../../../testdata/wrong_issuer_signer.pem")).contains("Evil hf."));
    }

    #[test]
    fn rejects_expired_certificate() {
        assert!(reason(include_str!("../../../testdata/expired_signer.pem")).contains("valid from"));
    }

    #[test]
    fn validity_bounds_are_inclusive() {
        let cert = signer(SIGNER);
        let policy = TrustPolicy::default();
        validate_trust(&cert, &store(), &policy, cert.not_before()).unwrap();
        let before = cert.not_before() - chrono::Duration::seconds(1);
        assert!(validate_trust(&cert, &store(), &policy, before).is_err());
    }

    #[test]
    fn rejects_missing_subject_key_identifier() {
        assert!(reason(include_str!("../../../testdata/no_ski_signer.pem")).contains("no subject key identifier"));
    }

    #[test]
    fn rejects_rogue_chain_with_same_names() {
        let reason = reason(include_str!("../../../testdata/rogue_signer.pem"));
        assert!(reason.contains("not issued by a trust anchor"));
    }

    #[test]
    fn any_anchor_in_store_may_issue() {
        let pem = format!("{}\n{}", EMBEDDED_ANCHOR_PEM, ANCHOR);
        let store = TrustStore::from_pem(&pem).unwrap();
        assert_eq!(store.len(), 2);
        validate_trust(&signer(SIGNER), &store, &TrustPolicy::default(), now()).unwrap();
    }

    #[test]
    fn embedded_store_loads() {
        let store = TrustStore::embedded().unwrap();
        assert_eq!(store.len(), 1);
        // The test signer is not issued by the production anchor.
        let err = validate_trust(&signer(SIGNER), &store, &TrustPolicy::default(), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UntrustedSigner);
    }

    #[test]
    fn anchor_without_key_identifier_is_a_configuration_error() {
        let err = TrustStore::from_pem(include_str!("../../../testdata/no_ski_signer.pem")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = TrustStore::from_pem("no certificates here").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn truncated_bundle_is_rejected() {
        let head: Vec<&str> = EMBEDDED_ANCHOR_PEM.lines().take(5).collect();
        let pem = format!("{ANCHOR}\n{}\n", head.join("\n"));
        let err = TrustStore::from_pem(&pem).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.reason().contains("unterminated"), "{}", err.reason());

        // A truncated block followed by a complete one.
        let pem = format!("{}\n{ANCHOR}", head.join("\n"));
        let err = TrustStore::from_pem(&pem).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn bundle_must_hold_only_certificates() {
        let err = TrustStore::from_pem(&format!("{ANCHOR}\ntrailing text\n")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let key = ANCHOR.replace("CERTIFICATE", "PUBLIC KEY");
        let err = TrustStore::from_pem(&key).unwrap_err();
        assert!(err.reason().contains("PUBLIC KEY"), "{}", err.reason());

        let store = TrustStore::from_pem(&format!("\n\n{ANCHOR}\r\n\n{EMBEDDED_ANCHOR_PEM}\n")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = TrustStore::from_pem_file("/nonexistent/anchor.pem").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: TrustPolicy =
            serde_json::from_str(r#"{"expected_issuer_organization": "Test CA"}"#).unwrap();
        assert_eq!(policy.expected_subject_serial_number, "6503760649");
        assert_eq!(policy.expected_issuer_organization, "Test CA");
    }
}
