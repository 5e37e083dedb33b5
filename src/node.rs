use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Stable handle of a node in the identity map.
///
/// Keys survive a rename of the node's @id. A key is invalidated when its
/// node is forgotten; the slot may be reused later under a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// One stored property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Anything that is not a reference: strings, numbers, booleans and
    /// value objects such as `{"@value": ..}`.
    Literal(JsonValue),
    /// A reference to another node of the same graph.
    Ref(NodeKey),
}

impl Value {
    pub fn as_ref_key(&self) -> Option<NodeKey> {
        match self {
            Value::Ref(key) => Some(*key),
            Value::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&JsonValue> {
        match self {
            Value::Literal(value) => Some(value),
            Value::Ref(_) => None,
        }
    }
}

/// The record behind one graph entity.
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    pub(crate) id: String,
    properties: IndexMap<String, Vec<Value>>,
    reverse: BTreeMap<String, BTreeSet<NodeKey>>,
    pub(crate) live: bool,
}

impl Node {
    pub(crate) fn new(id: &str) -> Node {
        Node {
            id: id.to_owned(),
            ..Node::default()
        }
    }

    pub(crate) fn values(&self, name: &str) -> Option<&[Value]> {
        self.properties.get(name).map(Vec::as_slice)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub(crate) fn properties(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.properties
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub(crate) fn property_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    /// Store `values` under `name`, keeping the position of an existing key.
    pub(crate) fn insert_values(&mut self, name: &str, values: Vec<Value>) -> Option<Vec<Value>> {
        self.properties.insert(name.to_owned(), values)
    }

    pub(crate) fn remove_property(&mut self, name: &str) -> Option<Vec<Value>> {
        self.properties.shift_remove(name)
    }

    pub(crate) fn add_reverse(&mut self, name: &str, referrer: NodeKey) {
        self.reverse
            .entry(name.to_owned())
            .or_default()
            .insert(referrer);
    }

    pub(crate) fn remove_reverse(&mut self, name: &str, referrer: NodeKey) {
        if let Some(referrers) = self.reverse.get_mut(name) {
            referrers.remove(&referrer);
            if referrers.is_empty() {
                self.reverse.remove(name);
            }
        }
    }

    pub(crate) fn reverse(&self, name: &str) -> Option<&BTreeSet<NodeKey>> {
        self.reverse.get(name)
    }

    pub(crate) fn reverse_entries(&self) -> impl Iterator<Item = (&str, &BTreeSet<NodeKey>)> {
        self.reverse
            .iter()
            .map(|(name, referrers)| (name.as_str(), referrers))
    }

    /// Every (property, referrer) pair pointing at this node.
    pub(crate) fn inbound(&self) -> Vec<(String, NodeKey)> {
        self.reverse
            .iter()
            .flat_map(|(name, referrers)| referrers.iter().map(|key| (name.clone(), *key)))
            .collect()
    }

    pub(crate) fn has_inbound(&self) -> bool {
        !self.reverse.is_empty()
    }

    pub(crate) fn types(&self) -> impl Iterator<Item = &str> {
        self.values("@type")
            .unwrap_or_default()
            .iter()
            .filter_map(|value| value.as_literal().and_then(JsonValue::as_str))
    }
}
