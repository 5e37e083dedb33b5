use std::fmt;

use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::node::{Node, NodeKey, Value};

/// Read-only view of a live entity.
///
/// Property reads follow the graph configuration: `always_as_array` keeps
/// single values in a list and `link` turns references to live entities
/// into nested views.
#[derive(Clone, Copy)]
pub struct Entity<'g> {
    graph: &'g Graph,
    key: NodeKey,
}

/// One value read through an [`Entity`].
#[derive(Debug, Clone, Copy)]
pub enum Item<'g> {
    Literal(&'g JsonValue),
    /// A reference left as its @id, because linking is off or the target
    /// is not a live entity.
    Reference(&'g str),
    Entity(Entity<'g>),
}

/// The shaped result of reading one property.
#[derive(Debug, Clone)]
pub enum Property<'g> {
    /// `@id`, which is never wrapped or resolved.
    Id(&'g str),
    One(Item<'g>),
    Many(Vec<Item<'g>>),
    /// `@reverse`: the referring entities, shaped per property.
    Reverse(Vec<(&'g str, Property<'g>)>),
}

impl<'g> Entity<'g> {
    pub(crate) fn new(graph: &'g Graph, key: NodeKey) -> Entity<'g> {
        Entity { graph, key }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    fn node(&self) -> Option<&'g Node> {
        self.graph.nodes.node(self.key)
    }

    pub fn id(&self) -> &'g str {
        self.node().map(|node| node.id.as_str()).unwrap_or_default()
    }

    /// False once the entity has been deleted from the graph.
    pub fn is_live(&self) -> bool {
        self.graph.nodes.is_live(self.key)
    }

    /// Read a property. `@reverse` yields the reverse index, every entry
    /// shaped like a forward property.
    pub fn get(&self, name: &str) -> Option<Property<'g>> {
        match name {
            "@id" => return self.node().map(|node| Property::Id(node.id.as_str())),
            "@reverse" => return Some(self.reverse_index()),
            _ => {}
        }
        let values = self.node()?.values(name)?;
        let items = values.iter().map(|value| self.item(value)).collect();
        Some(self.shape(items))
    }

    /// Stored values of a property, without shaping.
    pub fn values(&self, name: &str) -> Option<&'g [Value]> {
        self.node()?.values(name)
    }

    /// Entities that reference this one under `name`.
    pub fn reverse(&self, name: &str) -> Option<Property<'g>> {
        let referrers = self.node()?.reverse(name)?;
        let items = referrers
            .iter()
            .map(|referrer| self.link(*referrer))
            .collect();
        Some(self.shape(items))
    }

    pub fn reverse_keys(&self) -> impl Iterator<Item = &'g str> + use<'g> {
        self.node()
            .into_iter()
            .flat_map(|node| node.reverse_entries().map(|(name, _)| name))
    }

    /// The reverse index as a JSON-LD `@reverse` object.
    pub fn reverse_json(&self) -> JsonValue {
        self.reverse_index().to_json()
    }

    fn reverse_index(&self) -> Property<'g> {
        let entries = self
            .reverse_keys()
            .filter_map(|name| Some((name, self.reverse(name)?)))
            .collect();
        Property::Reverse(entries)
    }

    /// Property names, `@id` first. The reverse index is not included.
    pub fn keys(&self) -> impl Iterator<Item = &'g str> + use<'g> {
        std::iter::once::<&'g str>("@id").chain(
            self.node()
                .into_iter()
                .flat_map(|node| node.properties().map(|(name, _)| name)),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        name == "@id" || self.node().is_some_and(|node| node.contains(name))
    }

    pub fn types(&self) -> impl Iterator<Item = &'g str> + use<'g> {
        self.node().into_iter().flat_map(Node::types)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types().any(|t| t == type_name)
    }

    /// The @ids a property refers to, whether or not the targets are live.
    pub fn references(&self, name: &str) -> Vec<&'g str> {
        self.values(name)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_ref_key)
            .filter_map(|key| self.graph.nodes.id_of(key))
            .collect()
    }

    /// Keys of the entities linked through `name`, or linking here through
    /// it when `reverse` is set.
    pub(crate) fn targets(&self, name: &str, reverse: bool) -> Vec<NodeKey> {
        let Some(node) = self.node() else {
            return vec![];
        };
        if reverse {
            return node
                .reverse(name)
                .map(|referrers| referrers.iter().copied().collect())
                .unwrap_or_default();
        }
        node.values(name)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_ref_key)
            .collect()
    }

    /// Flat JSON-LD form, references as `{"@id": ..}`.
    pub fn to_json(&self) -> JsonValue {
        self.graph
            .nodes
            .entity_json(self.key)
            .unwrap_or(JsonValue::Null)
    }

    fn item(&self, value: &'g Value) -> Item<'g> {
        match value {
            Value::Literal(literal) => Item::Literal(literal),
            Value::Ref(key) => self.link(*key),
        }
    }

    fn link(&self, key: NodeKey) -> Item<'g> {
        if self.graph.config().link && self.graph.nodes.is_live(key) {
            Item::Entity(Entity::new(self.graph, key))
        } else {
            Item::Reference(self.graph.nodes.id_of(key).unwrap_or_default())
        }
    }

    fn shape(&self, mut items: Vec<Item<'g>>) -> Property<'g> {
        if items.len() == 1 && !self.graph.config().always_as_array {
            if let Some(item) = items.pop() {
                return Property::One(item);
            }
        }
        Property::Many(items)
    }
}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("key", &self.key)
            .finish()
    }
}

impl PartialEq for Entity<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.key == other.key
    }
}

impl<'g> Item<'g> {
    /// The @id of a referenced entity.
    pub fn id(&self) -> Option<&'g str> {
        match *self {
            Item::Literal(_) => None,
            Item::Reference(id) => Some(id),
            Item::Entity(entity) => Some(entity.id()),
        }
    }

    pub fn as_str(&self) -> Option<&'g str> {
        match *self {
            Item::Literal(literal) => literal.as_str(),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<Entity<'g>> {
        match *self {
            Item::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match *self {
            Item::Literal(literal) => literal.clone(),
            Item::Reference(id) => serde_json::json!({ "@id": id }),
            Item::Entity(entity) => entity.to_json(),
        }
    }
}

impl<'g> Property<'g> {
    /// The values of a property. Empty for `@id` and `@reverse`.
    pub fn items(&self) -> Vec<Item<'g>> {
        match self {
            Property::Id(_) | Property::Reverse(_) => vec![],
            Property::One(item) => vec![*item],
            Property::Many(items) => items.clone(),
        }
    }

    pub fn first(&self) -> Option<Item<'g>> {
        match self {
            Property::Id(_) | Property::Reverse(_) => None,
            Property::One(item) => Some(*item),
            Property::Many(items) => items.first().copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Property::Id(_) | Property::One(_) => 1,
            Property::Many(items) => items.len(),
            Property::Reverse(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The string of an `@id` or of a single string literal.
    pub fn as_str(&self) -> Option<&'g str> {
        match self {
            Property::Id(id) => Some(*id),
            Property::One(item) => item.as_str(),
            Property::Many(items) => match items.as_slice() {
                [item] => item.as_str(),
                _ => None,
            },
            Property::Reverse(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Property::Id(id) => JsonValue::String((*id).to_owned()),
            Property::One(item) => item.to_json(),
            Property::Many(items) => items.iter().map(Item::to_json).collect(),
            Property::Reverse(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(name, property)| ((*name).to_owned(), property.to_json()))
                    .collect::<Map<String, JsonValue>>(),
            ),
        }
    }
}

/// Writable view of a live entity. Every write goes through the graph's
/// mutation engine, so reverse links stay consistent.
pub struct EntityMut<'g> {
    graph: &'g mut Graph,
    key: NodeKey,
}

impl<'g> EntityMut<'g> {
    pub(crate) fn new(graph: &'g mut Graph, key: NodeKey) -> EntityMut<'g> {
        EntityMut { graph, key }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn id(&self) -> &str {
        self.graph.nodes.id_of(self.key).unwrap_or_default()
    }

    pub fn as_entity(&self) -> Entity<'_> {
        Entity::new(self.graph, self.key)
    }

    pub fn get(&self, name: &str) -> Option<Property<'_>> {
        self.as_entity().get(name)
    }

    /// Replace a property. `@id` renames the entity.
    pub fn set(&mut self, name: &str, value: &JsonValue) -> GraphResult<()> {
        self.graph.set_property_of(self.key, name, value)
    }

    pub fn add(&mut self, name: &str, value: &JsonValue) -> GraphResult<bool> {
        let opts = self.graph.config().mutation_options();
        self.graph.add_values_of(self.key, name, value, opts)
    }

    pub fn delete(&mut self, name: &str) -> GraphResult<bool> {
        self.graph.delete_property_of(self.key, name)
    }

    pub fn delete_values(&mut self, name: &str, value: &JsonValue) -> GraphResult<bool> {
        self.graph.delete_values_of(self.key, name, value)
    }

    pub fn set_id(&mut self, new_id: &str) -> GraphResult<bool> {
        self.graph.rename(self.key, new_id)
    }

    /// Delete the entity, consuming the view.
    pub fn remove(self, cascade: bool) -> Option<JsonValue> {
        self.graph.delete_entity_of(self.key, cascade)
    }
}

impl fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMut")
            .field("id", &self.id())
            .field("key", &self.key)
            .finish()
    }
}

/// Selects entities whose properties match regular expressions.
///
/// Every pattern has to match at least one value of its property. String
/// and number literals are matched on their text, references on their @id.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    patterns: Vec<(String, Regex)>,
}

impl EntityFilter {
    pub fn new() -> EntityFilter {
        EntityFilter::default()
    }

    pub fn with(mut self, property: &str, pattern: Regex) -> EntityFilter {
        self.patterns.push((property.to_owned(), pattern));
        self
    }

    /// Build a filter from `(property, pattern)` source pairs.
    pub fn parse<'a>(patterns: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<EntityFilter, regex::Error> {
        let mut filter = EntityFilter::new();
        for (property, pattern) in patterns {
            filter = filter.with(property, Regex::new(pattern)?);
        }
        Ok(filter)
    }

    pub fn matches(&self, entity: &Entity<'_>) -> bool {
        self.patterns.iter().all(|(property, pattern)| {
            if property == "@id" {
                return pattern.is_match(entity.id());
            }
            entity
                .values(property)
                .unwrap_or_default()
                .iter()
                .any(|value| match value {
                    Value::Literal(JsonValue::String(text)) => pattern.is_match(text),
                    Value::Literal(JsonValue::Number(number)) => pattern.is_match(&number.to_string()),
                    Value::Literal(JsonValue::Bool(flag)) => pattern.is_match(&flag.to_string()),
                    Value::Literal(_) => false,
                    Value::Ref(key) => entity
                        .graph
                        .nodes
                        .id_of(*key)
                        .is_some_and(|id| pattern.is_match(id)),
                })
        })
    }
}
