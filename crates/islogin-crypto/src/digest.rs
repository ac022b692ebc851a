#![forbid(unsafe_code)]

//! Digest (hash) algorithms.

use digest::Digest;
use islogin_core::{algorithm, Error};
use subtle::ConstantTimeEq;

/// A supported digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMethod {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestMethod {
    /// Resolve a `DigestMethod/@Algorithm` URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::SHA1 => Ok(Self::Sha1),
            algorithm::SHA256 => Ok(Self::Sha256),
            algorithm::SHA384 => Ok(Self::Sha384),
            algorithm::SHA512 => Ok(Self::Sha512),
            _ => Err(Error::SignatureInvalid(format!(
                "unsupported digest algorithm: {uri}"
            ))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha384 => algorithm::SHA384,
            Self::Sha512 => algorithm::SHA512,
        }
    }

    /// Hash `data` in one shot.
    pub fn compute(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => hash::<sha1::Sha1>(data),
            Self::Sha256 => hash::<sha2::Sha256>(data),
            Self::Sha384 => hash::<sha2::Sha384>(data),
            Self::Sha512 => hash::<sha2::Sha512>(data),
        }
    }

    /// The PKCS#1 v1.5 padding scheme carrying this digest's OID.
    pub(crate) fn pkcs1v15(&self) -> rsa::Pkcs1v15Sign {
        match self {
            Self::Sha1 => rsa::Pkcs1v15Sign::new::<sha1::Sha1>(),
            Self::Sha256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
            Self::Sha384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
            Self::Sha512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
        }
    }
}

fn hash<D: Digest>(data: &[u8]) -> Vec<u8> {
    D::digest(data).to_vec()
}

/// Compute a digest by algorithm URI.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    Ok(DigestMethod::from_uri(uri)?.compute(data))
}

/// SHA-1 of `data`, as used for key identifiers.
pub fn sha1(data: &[u8]) -> Vec<u8> {
    DigestMethod::Sha1.compute(data)
}

/// Compare two digests in constant time.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
