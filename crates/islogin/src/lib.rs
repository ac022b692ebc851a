#![forbid(unsafe_code)]

//! Verification of island.is login tokens.
//!
//! A relying party receives a base64 encoded, XML-DSig signed SAML
//! response after the user authenticates at island.is. [`Verifier`] checks
//! the signature, that the signer chains to the Auðkenni trust anchor, and
//! that the assertion is for this relying party and still valid, then
//! returns the [`VerifiedIdentity`] it carries.
//!
//! ```no_run
//! use islogin::{Verifier, VerifierConfig};
//!
//! # fn main() -> Result<(), islogin::Error> {
//! let verifier = Verifier::new(VerifierConfig::new("https://innskraning.example.is"))?;
//! let identity = verifier.verify(std::fs::read("token.b64").unwrap_or_default())?;
//! println!("{} logged in", identity.kennitala());
//! # Ok(())
//! # }
//! ```

pub use islogin_c14n as c14n;
pub use islogin_core as core;
pub use islogin_crypto as crypto;
pub use islogin_dsig as dsig;
pub use islogin_x509 as x509;
pub use islogin_xml as xml;

pub mod claims;
pub mod config;
pub mod identity;
pub mod verifier;

pub use claims::{ClaimSet, Conditions};
pub use config::{TrustAnchorSource, VerifierConfig};
pub use identity::VerifiedIdentity;
pub use islogin_core::{Error, ErrorKind};
pub use verifier::{Stage, Verifier};
