#![forbid(unsafe_code)]

//! Codec and XML access for login tokens.
//!
//! Decodes the base64 transport encoding into an [`AssertionDocument`] that
//! keeps the exact decoded text (signatures are computed over it), and
//! provides the element lookups and [`NodeSet`] used by canonicalization.

pub mod document;
pub mod nodeset;

pub use document::AssertionDocument;
pub use nodeset::NodeSet;

/// Find the first child element with the given namespace and local name.
pub fn find_child_element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all child elements with the given namespace and local name.
pub fn find_child_elements<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Find the first child element with the given local name, in any namespace.
///
/// SAML elements of login tokens are matched this way.
pub fn find_child_by_local_name<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
}

/// Iterate child elements with the given local name, in any namespace.
pub fn children_by_local_name<'a, 'input: 'a>(
    parent: roxmltree::Node<'a, 'input>,
    local_name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    parent
        .children()
        .filter(move |n| n.is_element() && n.tag_name().name() == local_name)
}

/// Concatenated text content of an element with all whitespace removed.
///
/// Used for base64 element content (`DigestValue`, `SignatureValue`,
/// `X509Certificate`), which is frequently line-wrapped.
pub fn compact_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect()
}
