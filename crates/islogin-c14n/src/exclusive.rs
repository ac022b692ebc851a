#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only visibly utilized namespace declarations are output. A prefix is
//! visibly utilized by an element if the element name or one of its
//! attributes uses it, or if it is listed in the InclusiveNamespaces
//! PrefixList. A declaration is skipped when the nearest output ancestor
//! already rendered the same binding.

use std::collections::BTreeSet;

use islogin_core::Error;
use islogin_xml::NodeSet;

use crate::escape;
use crate::render::{self, NsDecl, NsMap};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let ctx = ExcC14n {
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    let mut out = String::new();
    ctx.process_node(doc.root(), &mut out, &NsMap::new());
    Ok(out.into_bytes())
}

struct ExcC14n<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: BTreeSet<String>,
}

impl ExcC14n<'_> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process_node(&self, node: roxmltree::Node<'_, '_>, out: &mut String, rendered: &NsMap) {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, out, rendered);
                }
            }
            roxmltree::NodeType::Element => self.process_element(node, out, rendered),
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

    fn process_element(&self, node: roxmltree::Node<'_, '_>, out: &mut String, rendered: &NsMap) {
        if !self.is_visible(&node) {
            // Descendants may still be in the set; they see the same
            // output ancestor context.
            for child in node.children() {
                self.process_node(child, out, rendered);
            }
            return;
        }

        let qname = render::element_qname(node);
        let attrs = render::sorted_attrs(node);
        let in_scope = render::in_scope_namespaces(node);

        let mut utilized: BTreeSet<String> = self.inclusive_prefixes.clone();
        utilized.insert(
            qname
                .split_once(':')
                .map(|(p, _)| p.to_owned())
                .unwrap_or_default(),
        );
        utilized.extend(
            attrs
                .iter()
                .filter_map(|a| a.prefix())
                .filter(|p| *p != "xml")
                .map(str::to_owned),
        );

        let mut child_rendered = rendered.clone();
        let mut ns_decls = Vec::new();
        for prefix in &utilized {
            match in_scope.get(prefix) {
                Some(uri) => {
                    if rendered.get(prefix) != Some(uri) {
                        ns_decls.push(NsDecl::new(prefix.as_str(), uri.as_str()));
                        child_rendered.insert(prefix.clone(), uri.clone());
                    }
                }
                None if prefix.is_empty() => {
                    // Default namespace undeclared here but rendered above.
                    if rendered.get("").map_or(false, |u| !u.is_empty()) {
                        ns_decls.push(NsDecl::new("", ""));
                        child_rendered.insert(String::new(), String::new());
                    }
                }
                None => {}
            }
        }
        ns_decls.sort();

        render::write_start_tag(out, &qname, &ns_decls, &attrs);
        for child in node.children() {
            self.process_node(child, out, &child_rendered);
        }
        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}
