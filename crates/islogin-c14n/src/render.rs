#![forbid(unsafe_code)]

//! Shared rendering utilities for C14N output.
//!
//! `roxmltree` resolves names to (namespace, local name) pairs and does not
//! keep the prefixes used in the source. Canonical output must reproduce
//! them, so the helpers here recover prefixes from the input text and the
//! in-scope namespace bindings.

use std::collections::BTreeMap;

use islogin_core::ns;

use crate::escape;

/// Prefix to namespace URI bindings; `""` is the default namespace.
pub type NsMap = BTreeMap<String, String>;

/// A namespace declaration to be rendered.
///
/// Field order gives the canonical sort: the default namespace (empty
/// prefix) first, then by prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NsDecl {
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }

    pub fn render(&self, out: &mut String) {
        out.push_str(" xmlns");
        if !self.prefix.is_empty() {
            out.push(':');
            out.push_str(&self.prefix);
        }
        out.push_str("=\"");
        out.push_str(&escape::escape_attr(&self.uri));
        out.push('"');
    }
}

/// An attribute to be rendered.
///
/// Field order gives the canonical sort: unqualified attributes first (an
/// empty namespace URI sorts lowest), then by namespace URI and local name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attr {
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    /// Build from a `roxmltree` attribute of `element`.
    pub fn from_node(element: roxmltree::Node<'_, '_>, attr: &roxmltree::Attribute<'_, '_>) -> Self {
        Self {
            ns_uri: attr.namespace().unwrap_or("").to_owned(),
            local_name: attr.name().to_owned(),
            qualified_name: attr_qname(element, attr),
            value: attr.value().to_owned(),
        }
    }

    /// The namespace prefix of this attribute, if qualified.
    pub fn prefix(&self) -> Option<&str> {
        self.qualified_name
            .split_once(':')
            .map(|(prefix, _)| prefix)
    }

    pub fn render(&self, out: &mut String) {
        out.push(' ');
        out.push_str(&self.qualified_name);
        out.push_str("=\"");
        out.push_str(&escape::escape_attr(&self.value));
        out.push('"');
    }
}

/// The qualified element name as written in the source, e.g. `ds:SignedInfo`.
pub fn element_qname(node: roxmltree::Node<'_, '_>) -> String {
    let input = node.document().input_text();
    let start = node.range().start;
    let from_source = input
        .get(start..)
        .and_then(|s| s.strip_prefix('<'))
        .map(|s| {
            let end = s
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .unwrap_or(s.len());
            &s[..end]
        })
        .filter(|qname| qname.rsplit(':').next() == Some(node.tag_name().name()));

    match from_source {
        Some(qname) => qname.to_owned(),
        None => {
            // Fall back to the first prefix bound to the element's namespace.
            let local = node.tag_name().name();
            match node
                .tag_name()
                .namespace()
                .and_then(|uri| node.lookup_prefix(uri))
            {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
                _ => local.to_owned(),
            }
        }
    }
}

/// The prefix of an element name, `""` when unprefixed.
pub fn element_prefix(node: roxmltree::Node<'_, '_>) -> String {
    element_qname(node)
        .split_once(':')
        .map(|(prefix, _)| prefix.to_owned())
        .unwrap_or_default()
}

/// The qualified attribute name, e.g. `xml:lang` or `wsu:Id`.
pub fn attr_qname(element: roxmltree::Node<'_, '_>, attr: &roxmltree::Attribute<'_, '_>) -> String {
    let local = attr.name();
    let Some(uri) = attr.namespace() else {
        return local.to_owned();
    };
    if uri == ns::XML {
        return format!("xml:{local}");
    }
    element
        .namespaces()
        .find(|n| n.uri() == uri && n.name().is_some())
        .and_then(|n| n.name())
        .map(|prefix| format!("{prefix}:{local}"))
        .unwrap_or_else(|| local.to_owned())
}

/// Namespaces in scope at `node`, excluding the implicit `xml` binding.
///
/// An empty default namespace URI (`xmlns=""`) means no default namespace
/// and is left out.
pub fn in_scope_namespaces(node: roxmltree::Node<'_, '_>) -> NsMap {
    node.namespaces()
        .filter(|n| n.name() != Some("xml") && !n.uri().is_empty())
        .map(|n| (n.name().unwrap_or("").to_owned(), n.uri().to_owned()))
        .collect()
}

/// Sorted attributes of an element.
pub fn sorted_attrs(node: roxmltree::Node<'_, '_>) -> Vec<Attr> {
    let mut attrs: Vec<Attr> = node
        .attributes()
        .map(|a| Attr::from_node(node, &a))
        .collect();
    attrs.sort();
    attrs
}

/// Write a start tag.
pub fn write_start_tag(out: &mut String, qname: &str, ns_decls: &[NsDecl], attrs: &[Attr]) {
    out.push('<');
    out.push_str(qname);
    for decl in ns_decls {
        decl.render(out);
    }
    for attr in attrs {
        attr.render(out);
    }
    out.push('>');
}

/// Write a comment or processing instruction node.
///
/// Outside the document element a newline separates the node from the
/// element, as canonical XML requires.
pub fn write_misc(out: &mut String, node: roxmltree::Node<'_, '_>, with_comments: bool) {
    let text = match node.node_type() {
        roxmltree::NodeType::Comment if with_comments => {
            format!("<!--{}-->", node.text().unwrap_or(""))
        }
        roxmltree::NodeType::PI => match node.pi() {
            Some(pi) => match pi.value {
                Some(value) if !value.is_empty() => {
                    format!("<?{} {}?>", pi.target, escape::escape_pi(value))
                }
                _ => format!("<?{}?>", pi.target),
            },
            None => return,
        },
        _ => return,
    };

    let at_top = node.parent().map_or(false, |p| p.is_root());
    let after_root = at_top && node.prev_siblings().any(|n| n.is_element());
    let before_root = at_top && !after_root;

    if after_root {
        out.push('\n');
    }
    out.push_str(&text);
    if before_root {
        out.push('\n');
    }
}
