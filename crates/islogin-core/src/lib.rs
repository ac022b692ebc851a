#![forbid(unsafe_code)]

//! Core types shared by the islogin crates: the error enumeration used by
//! every pipeline stage, XML namespace constants, and algorithm URIs.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, ErrorKind, Result};
