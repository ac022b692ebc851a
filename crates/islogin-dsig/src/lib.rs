#![forbid(unsafe_code)]

//! Signature verification for island.is login tokens.

pub mod keyinfo;
pub mod transform;
pub mod verify;

pub use verify::verify_signature;
