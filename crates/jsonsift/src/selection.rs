//! The selection tree driving a projection.
//!
//! A [`Selection`] maps input keys to [`SelectionNode`]s, one level per
//! nesting depth. Construction happens in the query parser; the engine
//! treats the tree as read-only shared state, so a single tree can drive
//! any number of sequential executions.

use indexmap::IndexMap;

use crate::directive::Directive;

/// Immutable mapping from input key to the node governing that key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    entries: IndexMap<String, SelectionNode>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node; an existing entry for `key` is replaced.
    pub fn insert(&mut self, key: impl Into<String>, node: SelectionNode) {
        self.entries.insert(key.into(), node);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SelectionNode> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SelectionNode)> {
        self.entries.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, SelectionNode)> for Selection {
    fn from_iter<T: IntoIterator<Item = (K, SelectionNode)>>(iter: T) -> Self {
        let mut sel = Selection::new();
        for (k, node) in iter {
            sel.insert(k, node);
        }
        sel
    }
}

/// One entry of a [`Selection`].
///
/// `Leaf` accepts whatever value appears at the key while projecting no
/// children of an object value; `Node` optionally renames the output key,
/// narrows nested objects/arrays through a child selection, and attaches a
/// directive chain applied at emission time.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionNode {
    Leaf,
    Node {
        alias: Option<String>,
        children: Option<Selection>,
        directives: Vec<Directive>,
    },
}

impl SelectionNode {
    /// A `Node` with only an alias set.
    #[must_use]
    pub fn aliased(alias: impl Into<String>) -> Self {
        SelectionNode::Node {
            alias: Some(alias.into()),
            children: None,
            directives: Vec::new(),
        }
    }

    /// A `Node` with only a child selection.
    #[must_use]
    pub fn nested(children: Selection) -> Self {
        SelectionNode::Node {
            alias: None,
            children: Some(children),
            directives: Vec::new(),
        }
    }

    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        match self {
            SelectionNode::Leaf => None,
            SelectionNode::Node { alias, .. } => alias.as_deref(),
        }
    }

    #[must_use]
    pub fn children(&self) -> Option<&Selection> {
        match self {
            SelectionNode::Leaf => None,
            SelectionNode::Node { children, .. } => children.as_ref(),
        }
    }

    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        match self {
            SelectionNode::Leaf => &[],
            SelectionNode::Node { directives, .. } => directives,
        }
    }

    /// The key under which this node's value lands in the output.
    #[must_use]
    pub fn output_key<'a>(&'a self, input_key: &'a str) -> &'a str {
        self.alias().unwrap_or(input_key)
    }

    /// Whether scalar array elements governed by this node are admitted.
    ///
    /// A node carrying a child selection projects object and array
    /// elements; scalars have no keys to project and are discarded.
    #[must_use]
    pub fn admits_scalar_elements(&self) -> bool {
        self.children().is_none()
    }

    /// Whether the directive chain contains a `default`.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.directives().iter().any(|d| d.name == "default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_has_no_alias_or_children() {
        let leaf = SelectionNode::Leaf;
        assert_eq!(leaf.alias(), None);
        assert!(leaf.children().is_none());
        assert!(leaf.directives().is_empty());
        assert!(leaf.admits_scalar_elements());
    }

    #[test]
    fn output_key_prefers_alias() {
        let node = SelectionNode::aliased("first");
        assert_eq!(node.output_key("firstName"), "first");
        assert_eq!(SelectionNode::Leaf.output_key("x"), "x");
    }

    #[test]
    fn insert_replaces_but_iteration_order_is_stable() {
        let mut sel = Selection::new();
        sel.insert("a", SelectionNode::Leaf);
        sel.insert("b", SelectionNode::Leaf);
        sel.insert("a", SelectionNode::aliased("z"));
        let keys: Vec<_> = sel.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(sel.get("a").unwrap().alias(), Some("z"));
    }
}
