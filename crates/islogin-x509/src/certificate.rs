#![forbid(unsafe_code)]

//! Reading the fields of an X.509 certificate that the trust decision
//! depends on.

use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use der::{Decode, DecodePem, Encode, EncodePem, Tag, Tagged};
use islogin_core::Error;
use islogin_crypto::{PublicKey, SignatureMethod};
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, SubjectKeyIdentifier};
use x509_cert::name::Name;
use x509_cert::Certificate;

const SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// A parsed X.509 certificate.
///
/// Used both for the signer certificate carried in a token and for the
/// configured trust anchors.
#[derive(Debug, Clone)]
pub struct X509Certificate {
    der: Vec<u8>,
    cert: Certificate,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

/// The certificate embedded in a token's signature.
pub type SignerCertificate = X509Certificate;

impl PartialEq for X509Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Certificate {}

impl X509Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::CertificateMalformed(format!("cannot decode certificate: {e}")))?;
        Self::from_parsed(cert, der.to_vec())
    }

    /// Parse a single PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let cert = Certificate::from_pem(pem.trim())
            .map_err(|e| Error::CertificateMalformed(format!("cannot decode PEM certificate: {e}")))?;
        let der = cert
            .to_der()
            .map_err(|e| Error::CertificateMalformed(format!("cannot encode certificate: {e}")))?;
        Self::from_parsed(cert, der)
    }

    fn from_parsed(cert: Certificate, der: Vec<u8>) -> Result<Self, Error> {
        let validity = &cert.tbs_certificate.validity;
        let not_before = to_utc(&validity.not_before)?;
        let not_after = to_utc(&validity.not_after)?;
        Ok(Self {
            der,
            cert,
            not_before,
            not_after,
        })
    }

    /// The certificate as received, DER-encoded.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM text of this certificate.
    pub fn to_pem(&self) -> Result<String, Error> {
        self.cert
            .to_pem(der::pem::LineEnding::LF)
            .map_err(|e| Error::CertificateMalformed(format!("cannot encode PEM: {e}")))
    }

    pub fn subject_serial_number(&self) -> Option<String> {
        name_attribute(&self.cert.tbs_certificate.subject, SERIAL_NUMBER)
    }

    pub fn subject_common_name(&self) -> Option<String> {
        name_attribute(&self.cert.tbs_certificate.subject, COMMON_NAME)
    }

    pub fn issuer_organization(&self) -> Option<String> {
        name_attribute(&self.cert.tbs_certificate.issuer, ORGANIZATION)
    }

    /// RFC 4514 rendering of the subject, for logs and listings.
    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    pub fn issuer(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `now` lies within the validity window, boundaries included.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// The subject-key-identifier extension value, if present.
    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>, Error> {
        let ext = self
            .cert
            .tbs_certificate
            .get::<SubjectKeyIdentifier>()
            .map_err(|e| Error::CertificateMalformed(format!("bad subject key identifier: {e}")))?;
        Ok(ext.map(|(_, ski)| ski.0.as_bytes().to_vec()))
    }

    /// The key identifier of the authority-key-identifier extension, if present.
    pub fn authority_key_identifier(&self) -> Result<Option<Vec<u8>>, Error> {
        let ext = self
            .cert
            .tbs_certificate
            .get::<AuthorityKeyIdentifier>()
            .map_err(|e| Error::CertificateMalformed(format!("bad authority key identifier: {e}")))?;
        Ok(ext
            .and_then(|(_, aki)| aki.key_identifier)
            .map(|id| id.as_bytes().to_vec()))
    }

    /// SHA-1 of the subject public key bit string (RFC 5280 key identifier method 1).
    pub fn computed_key_identifier(&self) -> Vec<u8> {
        let spki = &self.cert.tbs_certificate.subject_public_key_info;
        islogin_crypto::digest::sha1(spki.subject_public_key.raw_bytes())
    }

    /// Whether the subject-key-identifier is present and matches the key.
    pub fn has_consistent_key_identifier(&self) -> bool {
        matches!(
            self.subject_key_identifier(),
            Ok(Some(ski)) if ski == self.computed_key_identifier()
        )
    }

    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let spki_der = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::CertificateMalformed(format!("cannot encode public key: {e}")))?;
        PublicKey::from_spki_der(&spki_der)
    }

    pub(crate) fn subject_der(&self) -> Option<Vec<u8>> {
        self.cert.tbs_certificate.subject.to_der().ok()
    }

    pub(crate) fn issuer_der(&self) -> Option<Vec<u8>> {
        self.cert.tbs_certificate.issuer.to_der().ok()
    }

    /// Check this certificate's signature with `issuer`'s public key.
    pub fn verify_signed_by(&self, issuer: &X509Certificate) -> Result<(), Error> {
        let oid = self.cert.signature_algorithm.oid.to_string();
        let method = SignatureMethod::from_oid(&oid).ok_or_else(|| {
            Error::UntrustedSigner(format!("unsupported certificate signature algorithm {oid}"))
        })?;
        let tbs = self
            .cert
            .tbs_certificate
            .to_der()
            .map_err(|e| Error::CertificateMalformed(format!("cannot encode certificate body: {e}")))?;
        let key = issuer.public_key()?;
        method
            .verify_der(&key, &tbs, self.cert.signature.raw_bytes())
            .map_err(|e| Error::UntrustedSigner(e.reason()))
    }
}

fn to_utc(time: &x509_cert::time::Time) -> Result<DateTime<Utc>, Error> {
    let secs = time.to_unix_duration().as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| Error::CertificateMalformed(format!("validity time out of range: {time:?}")))
}

/// First value of `oid` in `name`, read as a directory string.
fn name_attribute(name: &Name, oid: ObjectIdentifier) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| directory_string(&atv.value))
}

fn directory_string(value: &der::Any) -> Option<String> {
    let bytes = value.value();
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            std::str::from_utf8(bytes).ok().map(str::to_owned)
        }
        // T.61 in practice carries Latin-1.
        Tag::TeletexString => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        _ => None,
    }
}
