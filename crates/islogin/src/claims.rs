#![forbid(unsafe_code)]

//! Assertion extraction: conditions, destination and claims.
//!
//! Pure projection of the document. No trust decision is made here, and
//! it must only run on a document whose signature has been verified.

use chrono::{DateTime, Utc};
use islogin_core::{ns, Error};
use islogin_xml::{children_by_local_name, find_child_by_local_name, AssertionDocument};
use serde::Serialize;

/// Validity window and audience of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditions {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// `AudienceRestriction/Audience`, empty when absent.
    pub audience: String,
}

impl Conditions {
    /// Whether `now` is strictly inside (`NotBefore`, `NotOnOrAfter`).
    ///
    /// A missing bound fails the check.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), Error> {
        let not_before = self
            .not_before
            .ok_or_else(|| Error::TemporalValidity("assertion has no NotBefore".into()))?;
        let not_on_or_after = self
            .not_on_or_after
            .ok_or_else(|| Error::TemporalValidity("assertion has no NotOnOrAfter".into()))?;
        if now <= not_before {
            return Err(Error::TemporalValidity(format!(
                "assertion is not valid before {not_before}, now is {now}"
            )));
        }
        if now >= not_on_or_after {
            return Err(Error::TemporalValidity(format!(
                "assertion expired at {not_on_or_after}, now is {now}"
            )));
        }
        Ok(())
    }
}

/// Identity claims of a login.
///
/// Every field is always present; a claim the token does not carry is
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimSet {
    /// National ID number (kennitala) of the person who logged in.
    pub kennitala: String,
    /// Mobile number, digits only.
    pub mobile: String,
    pub fullname: String,
    pub ip: String,
    pub user_agent: String,
    pub authentication_method: String,
    pub auth_id: String,
    /// Kennitala of the organisation the login was made on behalf of.
    pub destination_ssn: String,
}

type ClaimSetter = fn(&mut ClaimSet, &str);

/// `Attribute/@Name` to claim. Names not listed are ignored.
const CLAIMS: &[(&str, ClaimSetter)] = &[
    ("UserSSN", |c, v| c.kennitala = v.to_owned()),
    ("Mobile", |c, v| c.mobile = v.replace('-', "")),
    ("Name", |c, v| c.fullname = v.to_owned()),
    ("IPAddress", |c, v| c.ip = v.to_owned()),
    ("UserAgent", |c, v| c.user_agent = v.to_owned()),
    ("Authentication", |c, v| c.authentication_method = v.to_owned()),
    ("AuthID", |c, v| c.auth_id = v.to_owned()),
    ("DestinationSSN", |c, v| c.destination_ssn = v.to_owned()),
];

impl ClaimSet {
    /// Record one attribute by exact, case-sensitive name.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some((_, setter)) = CLAIMS.iter().find(|(claim, _)| *claim == name) {
            setter(self, value);
        }
    }
}

/// Everything the extractor reads from an assertion document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub conditions: Conditions,
    pub claims: ClaimSet,
    /// `Response/@Destination`, empty when absent.
    pub destination: String,
}

/// Project the conditions, destination and claims out of `document`.
pub fn extract(document: &AssertionDocument) -> Result<Extracted, Error> {
    let doc = document.parse_doc()?;
    let root = doc.root_element();
    let assertion = find_child_by_local_name(root, ns::node::ASSERTION)
        .ok_or_else(|| Error::AssertionStructure("missing Assertion".into()))?;

    let conditions_node = find_child_by_local_name(assertion, ns::node::CONDITIONS)
        .ok_or_else(|| Error::AssertionStructure("missing Conditions".into()))?;
    let statement = find_child_by_local_name(assertion, ns::node::ATTRIBUTE_STATEMENT)
        .ok_or_else(|| Error::AssertionStructure("missing AttributeStatement".into()))?;

    let audience = find_child_by_local_name(conditions_node, ns::node::AUDIENCE_RESTRICTION)
        .and_then(|r| find_child_by_local_name(r, ns::node::AUDIENCE))
        .and_then(|a| a.text())
        .unwrap_or("")
        .trim()
        .to_owned();
    let conditions = Conditions {
        not_before: timestamp(conditions_node, ns::attr::NOT_BEFORE)?,
        not_on_or_after: timestamp(conditions_node, ns::attr::NOT_ON_OR_AFTER)?,
        audience,
    };

    let mut claims = ClaimSet::default();
    for attribute in children_by_local_name(statement, ns::node::ATTRIBUTE) {
        let Some(name) = attribute.attribute(ns::attr::NAME) else {
            continue;
        };
        let value = find_child_by_local_name(attribute, ns::node::ATTRIBUTE_VALUE)
            .and_then(|v| v.text())
            .unwrap_or("");
        claims.set(name, value);
    }

    let destination = root.attribute(ns::attr::DESTINATION).unwrap_or("").to_owned();

    Ok(Extracted {
        conditions,
        claims,
        destination,
    })
}

fn timestamp(node: roxmltree::Node<'_, '_>, name: &str) -> Result<Option<DateTime<Utc>>, Error> {
    node.attribute(name)
        .map(|value| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::AssertionStructure(format!("bad {name} timestamp {value:?}: {e}")))
        })
        .transpose()
}
