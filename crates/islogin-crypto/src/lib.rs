#![forbid(unsafe_code)]

//! Verification primitives for islogin.
//!
//! Only the verifying half of each algorithm is provided: tokens are
//! signed by the identity provider, never by this crate.

pub mod digest;
pub mod sign;

pub use digest::DigestMethod;
pub use sign::{PublicKey, SignatureMethod};
