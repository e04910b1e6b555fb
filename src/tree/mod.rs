//! Addressed node tree
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The public
//! dotted-path address of every node is derived by a depth-first walk from the
//! root (`"0"`, `"0.0"`, `"0.1.3"`, …) and is recomputed by [`NodeTree::readdress`]
//! after every structural change. Addresses are never maintained incrementally.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use crate::markup::Element;

pub mod traverse;

pub use traverse::{
    inner_text, is_within, marshall_text, nearest_ancestor_of_type, next_node, next_sibling,
    parent_of, search_for_node,
};

/// Address of the tree root
pub const ROOT_ADDRESS: &str = "0";

/// Node type given to raw text runs
pub const TEXT_KIND: &str = "#text";

/// Stable arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Ordered attribute map (insertion order preserved)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Create an empty attribute map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the attribute exists
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(key, _)| key == name)
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Remove an attribute, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let position = self.0.iter().position(|(key, _)| key == name)?;
        Some(self.0.remove(position).1)
    }

    /// Rename an attribute in place; no-op when `from` is absent
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to || !self.contains(from) {
            return;
        }
        self.remove(to);
        if let Some(entry) = self.0.iter_mut().find(|(key, _)| key == from) {
            entry.0 = to.to_string();
        }
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (key, value) in iter {
            attrs.set(key, value);
        }
        attrs
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A single node of the story tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Derived dotted-path address (valid after the last `readdress`)
    pub addr: String,
    /// Node type: a lower-cased tag name, `root`, or `#text`
    pub kind: String,
    /// Ordered attributes
    pub attrs: Attributes,
    /// Children in document order
    pub children: Vec<NodeId>,
    /// Text content (only meaningful for `#text` nodes)
    pub text: String,
}

impl Node {
    fn new(kind: impl Into<String>, attrs: Attributes, text: impl Into<String>) -> Self {
        Self {
            addr: String::new(),
            kind: kind.into(),
            attrs,
            children: Vec::new(),
            text: text.into(),
        }
    }

    /// Whether this is a raw text node
    pub fn is_text(&self) -> bool {
        self.kind == TEXT_KIND
    }

    /// Attribute lookup shortcut
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name)
    }
}

/// Arena-backed story tree
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<Node>,
    root: NodeId,
    index: HashMap<String, NodeId>,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create a tree holding only an empty root
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: vec![Node::new("root", Attributes::new(), "")],
            root: NodeId(0),
            index: HashMap::new(),
        };
        tree.readdress();
        tree
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Allocate a detached node
    pub fn alloc(&mut self, kind: impl Into<String>, attrs: Attributes, text: impl Into<String>) -> NodeId {
        self.nodes.push(Node::new(kind, attrs, text));
        NodeId(self.nodes.len() - 1)
    }

    /// Allocate a detached copy of a parsed element (recursively)
    pub fn graft(&mut self, element: &Element) -> NodeId {
        let id = self.alloc(
            element.kind.clone(),
            element.attrs.iter().cloned().collect(),
            element.text.clone(),
        );
        for child in &element.children {
            let child_id = self.graft(child);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    /// Allocate a detached deep copy of an existing subtree
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let source = self.get(id).clone();
        let copy = self.alloc(source.kind, source.attrs, source.text);
        for child in source.children {
            let child_copy = self.deep_clone(child);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Append a child to a parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
    }

    /// Remove `child` from `parent`, returning its former position
    pub fn detach(&mut self, parent: NodeId, child: NodeId) -> Option<usize> {
        let children = &mut self.nodes[parent.0].children;
        let position = children.iter().position(|candidate| *candidate == child)?;
        children.remove(position);
        Some(position)
    }

    /// Replace `child` of `parent` with a sequence of nodes at the same position
    pub fn splice(&mut self, parent: NodeId, child: NodeId, replacement: Vec<NodeId>) -> bool {
        match self.detach(parent, child) {
            Some(position) => {
                let children = &mut self.nodes[parent.0].children;
                for (offset, node) in replacement.into_iter().enumerate() {
                    children.insert(position + offset, node);
                }
                true
            }
            None => false,
        }
    }

    /// Recompute every address with a depth-first walk from the root
    pub fn readdress(&mut self) {
        self.index.clear();
        let mut pending = vec![(self.root, ROOT_ADDRESS.to_string())];
        while let Some((id, addr)) = pending.pop() {
            let children = self.nodes[id.0].children.clone();
            for (position, child) in children.iter().enumerate().rev() {
                pending.push((*child, format!("{}.{}", addr, position)));
            }
            self.index.insert(addr.clone(), id);
            self.nodes[id.0].addr = addr;
        }
    }

    /// Resolve an address to a node
    pub fn find(&self, addr: &str) -> Option<NodeId> {
        self.index.get(addr).copied()
    }

    /// Address of an attached node
    pub fn addr(&self, id: NodeId) -> &str {
        &self.nodes[id.0].addr
    }

    /// Whether a node is still reachable from the root (as of the last readdress)
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.find(&self.nodes[id.0].addr) == Some(id)
    }

    /// All attached node ids in document order, starting at `id`
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            order.push(current);
            for child in self.nodes[current.0].children.iter().rev() {
                pending.push(*child);
            }
        }
        order
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the root has no children
    pub fn is_empty(&self) -> bool {
        self.get(self.root).children.is_empty()
    }

    /// JSON outline of a subtree
    pub fn outline(&self, id: NodeId) -> Value {
        let node = self.get(id);
        let mut object = Map::new();
        object.insert("addr".into(), json!(node.addr));
        object.insert("type".into(), json!(node.kind));
        if !node.attrs.is_empty() {
            let attrs: Map<String, Value> = node
                .attrs
                .iter()
                .map(|(key, value)| (key.to_string(), json!(value)))
                .collect();
            object.insert("attributes".into(), Value::Object(attrs));
        }
        if !node.text.is_empty() {
            object.insert("text".into(), json!(node.text));
        }
        if !node.children.is_empty() {
            let children = node.children.iter().map(|child| self.outline(*child)).collect();
            object.insert("children".into(), Value::Array(children));
        }
        Value::Object(object)
    }
}

impl Serialize for NodeTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.outline(self.root).serialize(serializer)
    }
}
