#![forbid(unsafe_code)]

//! Signature verification: RSA PKCS#1 v1.5 and ECDSA over P-256/P-384.
//!
//! XML-DSig encodes ECDSA signatures as the fixed-width concatenation
//! `r || s`, while X.509 certificates use a DER `SEQUENCE { r, s }`.
//! [`SignatureMethod::verify`] and [`SignatureMethod::verify_der`] cover
//! the two encodings.

use islogin_core::{algorithm, Error};
use signature::hazmat::PrehashVerifier;

use crate::digest::DigestMethod;

const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const SECP256R1: &str = "1.2.840.10045.3.1.7";
const SECP384R1: &str = "1.3.132.0.34";

/// A public key taken from a certificate.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Decode a DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, Error> {
        use der::Decode;
        use spki::DecodePublicKey;

        let info = spki::SubjectPublicKeyInfoRef::from_der(der)
            .map_err(|e| Error::CertificateMalformed(format!("invalid public key info: {e}")))?;
        let malformed = |e: spki::Error| Error::CertificateMalformed(format!("invalid public key: {e}"));

        match info.algorithm.oid.to_string().as_str() {
            RSA_ENCRYPTION => rsa::RsaPublicKey::from_public_key_der(der)
                .map(Self::Rsa)
                .map_err(malformed),
            EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| Error::CertificateMalformed(format!("EC key without curve: {e}")))?;
                match curve.to_string().as_str() {
                    SECP256R1 => p256::ecdsa::VerifyingKey::from_public_key_der(der)
                        .map(Self::EcP256)
                        .map_err(malformed),
                    SECP384R1 => p384::ecdsa::VerifyingKey::from_public_key_der(der)
                        .map(Self::EcP384)
                        .map_err(malformed),
                    other => Err(Error::CertificateMalformed(format!(
                        "unsupported elliptic curve: {other}"
                    ))),
                }
            }
            other => Err(Error::CertificateMalformed(format!(
                "unsupported public key algorithm: {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "EC P-256",
            Self::EcP384(_) => "EC P-384",
        }
    }

    fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::EcP256(_) | Self::EcP384(_) => KeyFamily::Ecdsa,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EcEncoding {
    /// XML-DSig `r || s`
    Concatenated,
    /// X.509 DER `SEQUENCE`
    Der,
}

/// A signature algorithm: key family plus digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMethod {
    pub family: KeyFamily,
    pub digest: DigestMethod,
}

impl SignatureMethod {
    /// Resolve a `SignatureMethod/@Algorithm` URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        let (family, digest) = match uri {
            algorithm::RSA_SHA1 => (KeyFamily::Rsa, DigestMethod::Sha1),
            algorithm::RSA_SHA256 => (KeyFamily::Rsa, DigestMethod::Sha256),
            algorithm::RSA_SHA384 => (KeyFamily::Rsa, DigestMethod::Sha384),
            algorithm::RSA_SHA512 => (KeyFamily::Rsa, DigestMethod::Sha512),
            algorithm::ECDSA_SHA1 => (KeyFamily::Ecdsa, DigestMethod::Sha1),
            algorithm::ECDSA_SHA256 => (KeyFamily::Ecdsa, DigestMethod::Sha256),
            algorithm::ECDSA_SHA384 => (KeyFamily::Ecdsa, DigestMethod::Sha384),
            algorithm::ECDSA_SHA512 => (KeyFamily::Ecdsa, DigestMethod::Sha512),
            _ => {
                return Err(Error::SignatureInvalid(format!(
                    "unsupported signature algorithm: {uri}"
                )))
            }
        };
        Ok(Self { family, digest })
    }

    /// Resolve an X.509 `signatureAlgorithm` OID.
    pub fn from_oid(oid: &str) -> Option<Self> {
        let (family, digest) = match oid {
            "1.2.840.113549.1.1.5" => (KeyFamily::Rsa, DigestMethod::Sha1),
            "1.2.840.113549.1.1.11" => (KeyFamily::Rsa, DigestMethod::Sha256),
            "1.2.840.113549.1.1.12" => (KeyFamily::Rsa, DigestMethod::Sha384),
            "1.2.840.113549.1.1.13" => (KeyFamily::Rsa, DigestMethod::Sha512),
            "1.2.840.10045.4.1" => (KeyFamily::Ecdsa, DigestMethod::Sha1),
            "1.2.840.10045.4.3.2" => (KeyFamily::Ecdsa, DigestMethod::Sha256),
            "1.2.840.10045.4.3.3" => (KeyFamily::Ecdsa, DigestMethod::Sha384),
            "1.2.840.10045.4.3.4" => (KeyFamily::Ecdsa, DigestMethod::Sha512),
            _ => return None,
        };
        Some(Self { family, digest })
    }

    /// Verify an XML-DSig `SignatureValue` over `data`.
    pub fn verify(&self, key: &PublicKey, data: &[u8], sig: &[u8]) -> Result<(), Error> {
        self.verify_encoded(key, data, sig, EcEncoding::Concatenated)
    }

    /// Verify an X.509 certificate signature over the DER `tbsCertificate`.
    pub fn verify_der(&self, key: &PublicKey, data: &[u8], sig: &[u8]) -> Result<(), Error> {
        self.verify_encoded(key, data, sig, EcEncoding::Der)
    }

    fn verify_encoded(
        &self,
        key: &PublicKey,
        data: &[u8],
        sig: &[u8],
        encoding: EcEncoding,
    ) -> Result<(), Error> {
        if key.family() != self.family {
            return Err(Error::SignatureInvalid(format!(
                "{:?} signature cannot be checked with an {} key",
                self.family,
                key.name()
            )));
        }
        let hashed = self.digest.compute(data);

        macro_rules! verify_ecdsa {
            ($curve:ident, $vk:expr) => {{
                let sig = match encoding {
                    EcEncoding::Concatenated => $curve::ecdsa::Signature::from_slice(sig),
                    EcEncoding::Der => $curve::ecdsa::Signature::from_der(sig),
                }
                .map_err(|e| Error::SignatureInvalid(format!("malformed ECDSA signature: {e}")))?;
                $vk.verify_prehash(&hashed, &sig)
                    .map_err(|_| Error::SignatureInvalid("ECDSA signature does not verify".into()))
            }};
        }

        match key {
            PublicKey::Rsa(pk) => pk
                .verify(self.digest.pkcs1v15(), &hashed, sig)
                .map_err(|_| Error::SignatureInvalid("RSA signature does not verify".into())),
            PublicKey::EcP256(vk) => verify_ecdsa!(p256, vk),
            // A P-384 prehash must be at least half the field size.
            PublicKey::EcP384(_) if self.digest == DigestMethod::Sha1 => Err(Error::SignatureInvalid(
                "SHA-1 is too short for ECDSA over P-384".into(),
            )),
            PublicKey::EcP384(vk) => verify_ecdsa!(p384, vk),
        }
    }
}
