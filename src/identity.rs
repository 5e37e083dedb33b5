use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue, json};
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeKey, Value};

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owns every node of a graph, live entities and placeholders alike.
///
/// Nodes live in an arena addressed by [`NodeKey`]; the @id index maps
/// identifiers to keys, so a rename only touches that index.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdentityMap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<String, NodeKey>,
    order: Vec<NodeKey>,
}

impl IdentityMap {
    pub(crate) fn new() -> IdentityMap {
        IdentityMap::default()
    }

    /// Key of the node with `id`, creating a placeholder when there is none.
    pub(crate) fn get_or_create(&mut self, id: &str) -> NodeKey {
        if let Some(key) = self.by_id.get(id) {
            return *key;
        }
        let node = Some(Node::new(id));
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = node;
                NodeKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node,
                });
                NodeKey {
                    index,
                    generation: 0,
                }
            }
        };
        trace!(target: "graph", id, "node created");
        self.by_id.insert(id.to_owned(), key);
        key
    }

    /// Key of the node with `id`, live or not.
    pub(crate) fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.by_id.get(id).copied()
    }

    /// Key of the live entity with `id`.
    pub(crate) fn lookup(&self, id: &str) -> Option<NodeKey> {
        self.key_of(id).filter(|key| self.is_live(*key))
    }

    pub(crate) fn node(&self, key: NodeKey) -> Option<&Node> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn is_live(&self, key: NodeKey) -> bool {
        self.node(key).is_some_and(|node| node.live)
    }

    pub(crate) fn id_of(&self, key: NodeKey) -> Option<&str> {
        self.node(key).map(|node| node.id.as_str())
    }

    /// Flip the live flag; live nodes are listed in the order they went live.
    pub(crate) fn set_live(&mut self, key: NodeKey, live: bool) {
        let Some(node) = self.node_mut(key) else {
            return;
        };
        if node.live == live {
            return;
        }
        node.live = live;
        if live {
            self.order.push(key);
        } else {
            self.order.retain(|k| *k != key);
        }
    }

    /// Drop a node for good. Its key stops resolving.
    pub(crate) fn forget(&mut self, key: NodeKey) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.by_id.remove(&node.id);
        if node.live {
            self.order.retain(|k| *k != key);
        }
        trace!(target: "graph", id = %node.id, "node forgotten");
        Some(node)
    }

    /// Move a node to a new @id.
    ///
    /// Fails when another node, live or placeholder, already holds `new_id`.
    pub(crate) fn rename(&mut self, key: NodeKey, new_id: &str) -> GraphResult<()> {
        match self.by_id.get(new_id) {
            Some(other) if *other == key => return Ok(()),
            Some(_) => {
                return Err(GraphError::IdCollision {
                    id: new_id.to_owned(),
                });
            }
            None => {}
        }
        let node = self.node_mut(key).ok_or(GraphError::StaleKey { key })?;
        let old_id = std::mem::replace(&mut node.id, new_id.to_owned());
        self.by_id.remove(&old_id);
        self.by_id.insert(new_id.to_owned(), key);
        Ok(())
    }

    /// Live entities in document order.
    pub(crate) fn live_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.order.iter().copied()
    }

    /// Number of live entities.
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn position(&self, key: NodeKey) -> Option<usize> {
        self.order.iter().position(|k| *k == key)
    }

    /// Flat JSON-LD form of a node: `@id` first, references as `{"@id": ..}`,
    /// single values collapsed.
    pub(crate) fn entity_json(&self, key: NodeKey) -> Option<JsonValue> {
        let node = self.node(key)?;
        let mut entity = Map::new();
        entity.insert("@id".to_owned(), JsonValue::String(node.id.clone()));
        for (name, values) in node.properties() {
            entity.insert(name.to_owned(), self.values_json(values, false));
        }
        Some(JsonValue::Object(entity))
    }

    pub(crate) fn value_json(&self, value: &Value) -> JsonValue {
        match value {
            Value::Literal(literal) => literal.clone(),
            Value::Ref(key) => json!({ "@id": self.id_of(*key).unwrap_or_default() }),
        }
    }

    pub(crate) fn values_json(&self, values: &[Value], as_array: bool) -> JsonValue {
        match values {
            [value] if !as_array => self.value_json(value),
            values => values.iter().map(|value| self.value_json(value)).collect(),
        }
    }
}
