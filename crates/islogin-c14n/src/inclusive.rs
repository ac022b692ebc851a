#![forbid(unsafe_code)]

//! Canonical XML 1.0 (inclusive C14N).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every in-scope namespace binding is output on an element unless its
//! nearest output ancestor already rendered it. When rendering a document
//! subset, an element whose parent is not output also inherits the `xml:*`
//! attributes of its ancestors.

use std::collections::BTreeSet;

use islogin_core::{ns, Error};
use islogin_xml::NodeSet;

use crate::escape;
use crate::render::{self, Attr, NsDecl, NsMap};

/// Canonicalize using Canonical XML 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let ctx = InclusiveC14n {
        with_comments,
        node_set,
    };
    let mut out = String::new();
    ctx.process_node(doc.root(), &mut out, &NsMap::new());
    Ok(out.into_bytes())
}

struct InclusiveC14n<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl InclusiveC14n<'_> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process_node(&self, node: roxmltree::Node<'_, '_>, out: &mut String, inherited: &NsMap) {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, out, inherited);
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, out, inherited),
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    out.push_str(&escape::escape_text(node.text().unwrap_or("")));
                }
            }
            roxmltree::NodeType::Comment | roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    render::write_misc(out, node, self.with_comments);
                }
            }
        }
    }

    fn process_element(&self, node: roxmltree::Node<'_, '_>, out: &mut String, inherited: &NsMap) {
        if !self.is_visible(&node) {
            for child in node.children() {
                self.process_node(child, out, inherited);
            }
            return;
        }

        let in_scope = render::in_scope_namespaces(node);
        let mut ns_decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| inherited.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl::new(prefix.as_str(), uri.as_str()))
            .collect();

        let mut child_ns = in_scope.clone();
        if !in_scope.contains_key("") && inherited.get("").map_or(false, |u| !u.is_empty()) {
            ns_decls.push(NsDecl::new("", ""));
            child_ns.insert(String::new(), String::new());
        }
        ns_decls.sort();

        let mut attrs = render::sorted_attrs(node);
        let parent_hidden = node
            .parent_element()
            .map_or(false, |p| !self.is_visible(&p));
        if self.node_set.is_some() && parent_hidden {
            attrs.extend(inherited_xml_attrs(node, &attrs));
            attrs.sort();
        }

        let qname = render::element_qname(node);
        render::write_start_tag(out, &qname, &ns_decls, &attrs);
        for child in node.children() {
            self.process_node(child, out, &child_ns);
        }
        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}

/// `xml:*` attributes of ancestors not already present on the element.
///
/// The nearest ancestor wins for each name.
fn inherited_xml_attrs(node: roxmltree::Node<'_, '_>, own: &[Attr]) -> Vec<Attr> {
    let mut seen: BTreeSet<String> = own
        .iter()
        .filter(|a| a.ns_uri == ns::XML)
        .map(|a| a.local_name.clone())
        .collect();
    let mut extra = Vec::new();
    for ancestor in node.ancestors().skip(1).filter(|n| n.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() == Some(ns::XML) && seen.insert(attr.name().to_owned()) {
                extra.push(Attr::from_node(ancestor, &attr));
            }
        }
    }
    extra
}
