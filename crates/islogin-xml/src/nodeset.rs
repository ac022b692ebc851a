#![forbid(unsafe_code)]

//! Node sets for document-subset canonicalization.
//!
//! A signature reference selects a subtree (the element carrying the
//! referenced ID) and the enveloped-signature transform then carves the
//! `<Signature>` subtree out of it. Both operations are expressed here.

use std::collections::HashSet;

/// A set of nodes from one parsed document, identified by `NodeId`.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<roxmltree::NodeId>,
}

impl NodeSet {
    /// Every node of the document except comments.
    ///
    /// This is what a same-document reference with `URI=""` selects.
    pub fn document_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        Self::tree_without_comments(doc.root())
    }

    /// The subtree rooted at `root`, excluding comment nodes.
    pub fn tree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let nodes = root
            .descendants()
            .filter(|n| !n.is_comment())
            .map(|n| n.id())
            .collect();
        Self { nodes }
    }

    /// The subtree rooted at `root`, comments included.
    pub fn tree_with_comments(root: roxmltree::Node<'_, '_>) -> Self {
        Self {
            nodes: root.descendants().map(|n| n.id()).collect(),
        }
    }

    pub fn contains(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id())
    }

    /// Remove `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: roxmltree::Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&n.id());
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
