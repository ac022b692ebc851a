#![forbid(unsafe_code)]

//! The result of a successful verification.

use serde::Serialize;

use crate::claims::{ClaimSet, Conditions};

/// Identity claims of a token that passed every check.
///
/// Only the verifier constructs this type, and only after the signature,
/// the signer's trust chain and the relying-party policy were all
/// accepted. Holding one is proof that the login was verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    #[serde(flatten)]
    claims: ClaimSet,
    conditions: Conditions,
    destination: String,
}

impl VerifiedIdentity {
    pub(crate) fn new(claims: ClaimSet, conditions: Conditions, destination: String) -> Self {
        Self {
            claims,
            conditions,
            destination,
        }
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// National ID number of the person who logged in.
    pub fn kennitala(&self) -> &str {
        &self.claims.kennitala
    }

    pub fn fullname(&self) -> &str {
        &self.claims.fullname
    }

    /// `Response/@Destination` of the token.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn audience(&self) -> &str {
        &self.conditions.audience
    }

    pub fn into_claims(self) -> ClaimSet {
        self.claims
    }
}
