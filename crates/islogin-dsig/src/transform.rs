#![forbid(unsafe_code)]

//! Reference transforms.
//!
//! Only the transforms that appear in SAML signature profiles are
//! accepted: enveloped-signature followed by a canonicalization.

use islogin_c14n::C14nMode;
use islogin_core::{algorithm, ns, Error};
use islogin_xml::NodeSet;

/// Data flowing through the transform chain.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// A subset of the parsed document.
    Nodes(NodeSet),
    /// Serialized octets.
    Octets(Vec<u8>),
}

impl TransformData {
    /// Final octets to digest.
    ///
    /// A node set left at the end of the chain is serialized with
    /// Canonical XML 1.0, as XML-DSig requires.
    pub fn into_octets(self, doc: &roxmltree::Document<'_>) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Octets(data) => Ok(data),
            TransformData::Nodes(set) => {
                islogin_c14n::canonicalize(doc, C14nMode::Inclusive, Some(&set), &[])
            }
        }
    }
}

/// A supported reference transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Enveloped,
    C14n { mode: C14nMode, prefixes: Vec<String> },
}

impl Transform {
    /// Read a `<Transform>` element.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Result<Self, Error> {
        let uri = node.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
            Error::SignatureInvalid("Transform without Algorithm attribute".into())
        })?;
        if uri == algorithm::ENVELOPED_SIGNATURE {
            return Ok(Transform::Enveloped);
        }
        match C14nMode::from_uri(uri) {
            Some(mode) => Ok(Transform::C14n {
                mode,
                prefixes: inclusive_prefixes(node),
            }),
            None => Err(Error::SignatureInvalid(format!("unsupported transform: {uri}"))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Transform::Enveloped => algorithm::ENVELOPED_SIGNATURE,
            Transform::C14n { mode, .. } => mode.uri(),
        }
    }

    /// Apply the transform. `signature` is the enclosing `<Signature>`.
    pub fn apply(
        &self,
        doc: &roxmltree::Document<'_>,
        signature: roxmltree::Node<'_, '_>,
        input: TransformData,
    ) -> Result<TransformData, Error> {
        let TransformData::Nodes(mut set) = input else {
            return Err(Error::SignatureInvalid(format!(
                "transform {} needs a node set, got octets",
                self.uri()
            )));
        };
        match self {
            Transform::Enveloped => {
                set.remove_subtree(signature);
                Ok(TransformData::Nodes(set))
            }
            Transform::C14n { mode, prefixes } => Ok(TransformData::Octets(
                islogin_c14n::canonicalize(doc, *mode, Some(&set), prefixes)?,
            )),
        }
    }
}

/// The `PrefixList` of an `<InclusiveNamespaces>` child, if any.
pub fn inclusive_prefixes(method: roxmltree::Node<'_, '_>) -> Vec<String> {
    islogin_xml::find_child_by_local_name(method, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}
