#![forbid(unsafe_code)]

//! Signer certificates and the trust chain decision for islogin.

pub mod certificate;
pub mod trust;

pub use certificate::{SignerCertificate, X509Certificate};
pub use trust::{validate_trust, TrustAnchor, TrustPolicy, TrustStore, EMBEDDED_ANCHOR_PEM};
