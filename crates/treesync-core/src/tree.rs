//! The replicated document tree and delta merge.
//!
//! Every internal node maps string keys to either another node or a leaf
//! [`Scalar`]. A [`Delta`] has the same shape as a [`Document`]; merging it
//! overwrites every leaf path it names and leaves everything else alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An internal node: string keys to subtrees.
///
/// `BTreeMap` keeps sibling iteration deterministic; sibling order carries no
/// meaning in the document itself.
pub type Node = BTreeMap<String, Tree>;

/// An opaque leaf value.
///
/// No floats: every scalar must have exactly one canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// A subtree: a leaf or an internal node, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tree {
    Leaf(Scalar),
    Node(Node),
}

impl Tree {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Tree::Leaf(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Tree::Leaf(scalar) => Some(scalar),
            Tree::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Tree::Leaf(_) => None,
            Tree::Node(node) => Some(node),
        }
    }

    /// Number of leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Node(node) => node.values().map(Tree::leaf_count).sum(),
        }
    }

    /// Nesting depth: a leaf is 0, a node is one more than its deepest child.
    pub fn depth(&self) -> usize {
        match self {
            Tree::Leaf(_) => 0,
            Tree::Node(node) => 1 + node.values().map(Tree::depth).max().unwrap_or(0),
        }
    }
}

impl From<Scalar> for Tree {
    fn from(value: Scalar) -> Self {
        Tree::Leaf(value)
    }
}

impl From<&str> for Tree {
    fn from(value: &str) -> Self {
        Tree::Leaf(value.into())
    }
}

/// The replicated document: a tree whose root is always an internal node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Node,
}

/// A partial document describing an incremental change.
pub type Delta = Document;

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Wrap an existing root node.
    pub fn from_node(root: Node) -> Self {
        Self { root }
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Consume the document, returning its root node.
    pub fn into_node(self) -> Node {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Builder form of [`Document::insert`].
    pub fn with(mut self, path: &[&str], value: impl Into<Scalar>) -> Self {
        self.insert(path, value);
        self
    }

    /// Set the leaf at `path`, creating intermediate nodes as needed.
    ///
    /// A leaf standing where an intermediate node is required is replaced.
    /// An empty path is ignored.
    pub fn insert(&mut self, path: &[&str], value: impl Into<Scalar>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut node = &mut self.root;
        for key in parents {
            let slot = node
                .entry((*key).to_string())
                .or_insert_with(|| Tree::Node(Node::new()));
            if slot.is_leaf() {
                *slot = Tree::Node(Node::new());
            }
            let Tree::Node(inner) = slot else {
                return;
            };
            node = inner;
        }
        node.insert((*last).to_string(), Tree::Leaf(value.into()));
    }

    /// Look up the subtree at `path`. The empty path is not addressable.
    pub fn get(&self, path: &[&str]) -> Option<&Tree> {
        let (last, parents) = path.split_last()?;
        let mut node = &self.root;
        for key in parents {
            node = node.get(*key)?.as_node()?;
        }
        node.get(*last)
    }

    /// Look up the leaf value at `path`.
    pub fn get_scalar(&self, path: &[&str]) -> Option<&Scalar> {
        self.get(path).and_then(Tree::as_scalar)
    }

    /// Number of leaves in the document.
    pub fn leaf_count(&self) -> usize {
        self.root.values().map(Tree::leaf_count).sum()
    }

    /// All leaves as `(path, value)` pairs in canonical key order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &Scalar)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_leaves(&self.root, &mut prefix, &mut out);
        out
    }

    /// Merge a delta into this document.
    ///
    /// For every leaf path in `delta` the document ends up holding the
    /// delta's value at that path; paths absent from the delta are untouched.
    /// Internal nodes in the delta descend rather than replace. Delta
    /// subtrees without any leaves write nothing.
    pub fn merge(&mut self, delta: &Delta) {
        merge_node(&mut self.root, &delta.root);
    }
}

impl From<Node> for Document {
    fn from(root: Node) -> Self {
        Self::from_node(root)
    }
}

fn merge_node(target: &mut Node, delta: &Node) {
    for (key, value) in delta {
        match value {
            Tree::Leaf(scalar) => {
                target.insert(key.clone(), Tree::Leaf(scalar.clone()));
            }
            Tree::Node(child) => match target.get_mut(key) {
                Some(Tree::Node(existing)) => merge_node(existing, child),
                _ => {
                    // Build off to the side so a leafless delta subtree
                    // neither creates nodes nor clobbers an existing leaf.
                    let mut fresh = Node::new();
                    merge_node(&mut fresh, child);
                    if !fresh.is_empty() {
                        target.insert(key.clone(), Tree::Node(fresh));
                    }
                }
            },
        }
    }
}

fn collect_leaves<'a>(
    node: &'a Node,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, &'a Scalar)>,
) {
    for (key, value) in node {
        prefix.push(key.clone());
        match value {
            Tree::Leaf(scalar) => out.push((prefix.clone(), scalar)),
            Tree::Node(child) => collect_leaves(child, prefix, out),
        }
        prefix.pop();
    }
}
