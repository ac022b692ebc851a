#![forbid(unsafe_code)]

//! XML namespace constants and element/attribute names.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// SAML 2.0 protocol namespace (`Response`)
pub const SAML_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 assertion namespace (`Assertion` and its children)
pub const SAML_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // SAML elements
    pub const RESPONSE: &str = "Response";
    pub const ASSERTION: &str = "Assertion";
    pub const CONDITIONS: &str = "Conditions";
    pub const AUDIENCE_RESTRICTION: &str = "AudienceRestriction";
    pub const AUDIENCE: &str = "Audience";
    pub const ATTRIBUTE_STATEMENT: &str = "AttributeStatement";
    pub const ATTRIBUTE: &str = "Attribute";
    pub const ATTRIBUTE_VALUE: &str = "AttributeValue";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ALGORITHM: &str = "Algorithm";
    pub const URI: &str = "URI";
    pub const PREFIX_LIST: &str = "PrefixList";

    pub const DESTINATION: &str = "Destination";
    pub const NOT_BEFORE: &str = "NotBefore";
    pub const NOT_ON_OR_AFTER: &str = "NotOnOrAfter";
    pub const NAME: &str = "Name";

    /// Attribute names treated as element IDs by same-document references.
    pub const ID_ATTRS: [&str; 3] = ["ID", "Id", "id"];
}
