use std::collections::{BTreeSet, HashSet};

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use crate::defaults::BLANK_ID_PREFIX;
use crate::error::{GraphError, GraphResult};
use crate::identity::IdentityMap;
use crate::node::{NodeKey, Value};

/// How incoming entity data combines with what the graph already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
    /// Overwrite an entity that already exists.
    pub replace: bool,
    /// When replacing, keep properties the incoming data does not mention.
    pub merge: bool,
    /// Apply `replace`/`merge` to nested entities that already exist.
    pub recurse: bool,
    /// Keep repeated values instead of dropping them.
    pub duplicate: bool,
}

/// Input objects already descended into during one mutation call.
type Seen = HashSet<*const Map<String, JsonValue>>;

/// Applies writes to the identity map while keeping reverse links exact.
pub(crate) struct MutationEngine<'g> {
    nodes: &'g mut IdentityMap,
    blank_counter: &'g mut u64,
    default_type: &'g str,
}

impl<'g> MutationEngine<'g> {
    pub(crate) fn new(
        nodes: &'g mut IdentityMap,
        blank_counter: &'g mut u64,
        default_type: &'g str,
    ) -> MutationEngine<'g> {
        MutationEngine {
            nodes,
            blank_counter,
            default_type,
        }
    }

    /// Add an entity, or update it when it exists and `opts.replace` is set.
    ///
    /// Returns false when the entity already existed and was left alone.
    pub(crate) fn add_entity(&mut self, data: &JsonValue, opts: MutationOptions) -> GraphResult<bool> {
        let JsonValue::Object(entity) = data else {
            return Err(GraphError::InvalidDocument {
                message: format!("entity must be an object, got {data}"),
            });
        };
        let id = match entity.get("@id") {
            Some(JsonValue::String(id)) => id,
            Some(value) => {
                return Err(GraphError::InvalidId {
                    value: value.to_string(),
                });
            }
            None => return Err(GraphError::MissingId),
        };
        check_entity(entity)?;
        let key = self.nodes.get_or_create(id);
        let mut seen = Seen::new();
        seen.insert(entity as *const _);
        let added = self.update_node(key, entity, opts, &mut seen);
        if !added {
            trace!(target: "graph", %id, "entity exists, left unchanged");
        }
        Ok(added)
    }

    /// Update an entity that must already be live, overwriting its properties.
    pub(crate) fn update_entity(
        &mut self,
        key: NodeKey,
        data: &Map<String, JsonValue>,
        opts: MutationOptions,
    ) -> GraphResult<bool> {
        check_entity(data)?;
        let mut seen = Seen::new();
        seen.insert(data as *const _);
        let opts = MutationOptions {
            replace: true,
            ..opts
        };
        Ok(self.update_node(key, data, opts, &mut seen))
    }

    fn update_node(
        &mut self,
        key: NodeKey,
        data: &Map<String, JsonValue>,
        opts: MutationOptions,
        seen: &mut Seen,
    ) -> bool {
        let merge = self.nodes.is_live(key) && opts.merge;
        if self.nodes.is_live(key) {
            if !opts.replace {
                return false;
            }
            if !opts.merge {
                // clear first, so properties present in `data` are simply rewritten below
                let stale: Vec<String> = self
                    .nodes
                    .node(key)
                    .map(|node| node.property_names())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|name| name != "@type" && !data.contains_key(name))
                    .collect();
                for name in stale {
                    self.store(key, &name, vec![], true);
                }
            }
        } else {
            self.nodes.set_live(key, true);
        }
        for (name, value) in data {
            if name == "@id" || name == "@reverse" {
                continue;
            }
            let values = self.materialize(value, opts, seen);
            if merge {
                self.append(key, name, values, opts.duplicate);
            } else {
                self.store(key, name, values, opts.duplicate);
            }
        }
        self.ensure_type(key);
        if let Some(id) = self.nodes.id_of(key) {
            debug!(target: "graph", %id, "entity written");
        }
        true
    }

    /// Replace every value of a property. An empty value deletes it.
    pub(crate) fn set_property(
        &mut self,
        key: NodeKey,
        name: &str,
        value: &JsonValue,
        opts: MutationOptions,
    ) -> GraphResult<()> {
        check_value(name, value)?;
        let mut seen = Seen::new();
        let values = self.materialize(value, opts, &mut seen);
        self.store(key, name, values, opts.duplicate);
        if name == "@type" {
            self.ensure_type(key);
        }
        Ok(())
    }

    /// Append values to a property, skipping ones already present unless
    /// `opts.duplicate`. Returns whether the property gained values.
    pub(crate) fn add_values(
        &mut self,
        key: NodeKey,
        name: &str,
        value: &JsonValue,
        opts: MutationOptions,
    ) -> GraphResult<bool> {
        if name == "@id" || name == "@reverse" || value.is_null() {
            return Ok(false);
        }
        check_value(name, value)?;
        let mut seen = Seen::new();
        let candidates = self.materialize(value, opts, &mut seen);
        Ok(self.append(key, name, candidates, opts.duplicate))
    }

    /// Append stored values, skipping ones already present unless
    /// `duplicate`. Returns whether the property gained values.
    fn append(&mut self, key: NodeKey, name: &str, candidates: Vec<Value>, duplicate: bool) -> bool {
        let mut values: Vec<Value> = self
            .nodes
            .node(key)
            .and_then(|node| node.values(name))
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        let before = values.len();
        let mut skipped = vec![];
        for candidate in candidates {
            if duplicate || !values.contains(&candidate) {
                values.push(candidate);
            } else if let Value::Ref(target) = candidate {
                skipped.push(target);
            }
        }
        let increased = values.len() > before;
        if increased {
            self.store(key, name, values, true);
        }
        for target in skipped {
            self.release(target);
        }
        increased
    }

    pub(crate) fn delete_property(&mut self, key: NodeKey, name: &str) -> GraphResult<bool> {
        if matches!(name, "@id" | "@type" | "@reverse") {
            return Err(GraphError::ReservedProperty {
                property: name.to_owned(),
            });
        }
        if !self.nodes.node(key).is_some_and(|node| node.contains(name)) {
            return Ok(false);
        }
        self.store(key, name, vec![], true);
        Ok(true)
    }

    /// Remove the values of a property that match `value` (one value or an
    /// array). References match by @id, everything else by deep equality.
    pub(crate) fn delete_values(&mut self, key: NodeKey, name: &str, value: &JsonValue) -> GraphResult<bool> {
        match name {
            "@id" => {
                return Err(GraphError::ReservedProperty {
                    property: name.to_owned(),
                });
            }
            "@reverse" => return Err(GraphError::ReverseReadOnly),
            _ => {}
        }
        let unwanted: Vec<&JsonValue> = match value {
            JsonValue::Array(items) => items.iter().collect(),
            value => vec![value],
        };
        let Some(existing) = self.nodes.node(key).and_then(|node| node.values(name)) else {
            return Ok(false);
        };
        let remaining: Vec<Value> = existing
            .iter()
            .filter(|value| !unwanted.iter().any(|other| self.matches(value, other)))
            .cloned()
            .collect();
        if remaining.len() == existing.len() {
            return Ok(false);
        }
        self.store(key, name, remaining, true);
        if name == "@type" {
            self.ensure_type(key);
        }
        Ok(true)
    }

    /// Take an entity out of the graph and return its last flat form.
    ///
    /// Outgoing links are always retracted. With `cascade`, inbound
    /// references are removed from their owners too; otherwise the node
    /// stays behind as a placeholder while something still points at it.
    pub(crate) fn delete_entity(&mut self, key: NodeKey, cascade: bool) -> Option<JsonValue> {
        if !self.nodes.is_live(key) {
            return None;
        }
        let snapshot = self.nodes.entity_json(key);
        let names = self
            .nodes
            .node(key)
            .map(|node| node.property_names())
            .unwrap_or_default();
        for name in names {
            self.store(key, &name, vec![], true);
        }
        if cascade {
            let inbound = self
                .nodes
                .node(key)
                .map(|node| node.inbound())
                .unwrap_or_default();
            for (name, referrer) in inbound {
                let remaining: Vec<Value> = self
                    .nodes
                    .node(referrer)
                    .and_then(|node| node.values(&name))
                    .unwrap_or_default()
                    .iter()
                    .filter(|value| value.as_ref_key() != Some(key))
                    .cloned()
                    .collect();
                self.store(referrer, &name, remaining, true);
            }
        }
        self.nodes.set_live(key, false);
        if let Some(id) = self.nodes.id_of(key) {
            debug!(target: "graph", %id, cascade, "entity deleted");
        }
        self.release(key);
        snapshot
    }

    /// Give a node a new @id. A placeholder already holding that @id is
    /// merged into the node, so dangling references get resolved.
    pub(crate) fn rename(&mut self, key: NodeKey, new_id: &str) -> GraphResult<bool> {
        let Some(old_id) = self.nodes.id_of(key).map(str::to_owned) else {
            return Err(GraphError::StaleKey { key });
        };
        if old_id == new_id {
            return Ok(true);
        }
        if let Some(other) = self.nodes.key_of(new_id) {
            if self.nodes.is_live(other) {
                return Err(GraphError::IdCollision {
                    id: new_id.to_owned(),
                });
            }
            self.absorb(other, key);
        }
        self.nodes.rename(key, new_id)?;
        debug!(target: "graph", %old_id, %new_id, "entity renamed");
        Ok(true)
    }

    fn absorb(&mut self, placeholder: NodeKey, into: NodeKey) {
        let inbound = self
            .nodes
            .node(placeholder)
            .map(|node| node.inbound())
            .unwrap_or_default();
        for (name, referrer) in inbound {
            if let Some(node) = self.nodes.node_mut(referrer) {
                let existing = node.values(&name).unwrap_or_default();
                // a referrer already linked to `into` keeps that single link
                let linked = existing.contains(&Value::Ref(into));
                let values: Vec<Value> = existing
                    .iter()
                    .filter_map(|value| match value {
                        Value::Ref(target) if *target == placeholder => (!linked).then_some(Value::Ref(into)),
                        value => Some(value.clone()),
                    })
                    .collect();
                node.insert_values(&name, values);
            }
            if let Some(node) = self.nodes.node_mut(into) {
                node.add_reverse(&name, referrer);
            }
        }
        self.nodes.forget(placeholder);
    }

    pub(crate) fn ensure_type(&mut self, key: NodeKey) {
        let default_type = self.default_type;
        if let Some(node) = self.nodes.node_mut(key) {
            if node.values("@type").is_none_or(<[Value]>::is_empty) {
                node.insert_values("@type", vec![Value::Literal(default_type.into())]);
            }
        }
    }

    /// Write `values` under `name` and bring reverse links in line: targets
    /// no longer referenced lose the entry, new targets gain one.
    fn store(&mut self, key: NodeKey, name: &str, mut values: Vec<Value>, duplicate: bool) {
        if !duplicate {
            let mut unique = Vec::with_capacity(values.len());
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            values = unique;
        }
        let new_refs: BTreeSet<NodeKey> = values.iter().filter_map(Value::as_ref_key).collect();
        let Some(node) = self.nodes.node_mut(key) else {
            return;
        };
        let old = if values.is_empty() {
            node.remove_property(name)
        } else {
            node.insert_values(name, values)
        };
        let old_refs: BTreeSet<NodeKey> = old
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_ref_key)
            .collect();
        for target in old_refs.difference(&new_refs) {
            if let Some(node) = self.nodes.node_mut(*target) {
                node.remove_reverse(name, key);
            }
            self.release(*target);
        }
        for target in new_refs.difference(&old_refs) {
            if let Some(node) = self.nodes.node_mut(*target) {
                node.add_reverse(name, key);
            }
        }
        trace!(target: "graph", property = name, "values stored");
    }

    /// Forget a node that is neither live nor referenced.
    fn release(&mut self, key: NodeKey) {
        let unused = self
            .nodes
            .node(key)
            .is_some_and(|node| !node.live && !node.has_inbound());
        if unused {
            self.nodes.forget(key);
        }
    }

    fn materialize(&mut self, value: &JsonValue, opts: MutationOptions, seen: &mut Seen) -> Vec<Value> {
        match value {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| self.materialize_item(item, opts, seen))
                .collect(),
            item => self.materialize_item(item, opts, seen).into_iter().collect(),
        }
    }

    /// Turn one input value into a stored value, creating or updating the
    /// entity a nested object describes.
    fn materialize_item(&mut self, item: &JsonValue, opts: MutationOptions, seen: &mut Seen) -> Option<Value> {
        match item {
            JsonValue::Null => None,
            JsonValue::Object(entity) if !entity.is_empty() && !is_value_object(entity) => {
                let key = match entity.get("@id").and_then(JsonValue::as_str) {
                    Some(id) => self.nodes.get_or_create(id),
                    None => {
                        let id = self.blank_id();
                        self.nodes.get_or_create(&id)
                    }
                };
                let has_data = entity.keys().any(|name| name != "@id");
                if has_data && seen.insert(entity as *const _) {
                    if !self.nodes.is_live(key) {
                        self.update_node(key, entity, opts, seen);
                    } else if opts.recurse {
                        let opts = MutationOptions {
                            replace: true,
                            ..opts
                        };
                        self.update_node(key, entity, opts, seen);
                    }
                }
                Some(Value::Ref(key))
            }
            literal => Some(Value::Literal(literal.clone())),
        }
    }

    fn blank_id(&mut self) -> String {
        loop {
            let id = format!("{BLANK_ID_PREFIX}{}", *self.blank_counter);
            *self.blank_counter += 1;
            if self.nodes.key_of(&id).is_none() {
                return id;
            }
        }
    }

    fn matches(&self, value: &Value, other: &JsonValue) -> bool {
        match value {
            Value::Ref(key) => other
                .get("@id")
                .and_then(JsonValue::as_str)
                .is_some_and(|id| self.nodes.id_of(*key) == Some(id)),
            Value::Literal(literal) => literal == other,
        }
    }
}

/// `{"@value": ..}`, `{"@list": ..}` and `{"@set": ..}` are stored as literals.
pub(crate) fn is_value_object(object: &Map<String, JsonValue>) -> bool {
    ["@value", "@list", "@set"]
        .iter()
        .any(|keyword| object.contains_key(*keyword))
}

/// Reject shapes the graph can not store before anything is written.
pub(crate) fn check_value(property: &str, value: &JsonValue) -> GraphResult<()> {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                if item.is_array() {
                    return Err(GraphError::NestedArray {
                        property: property.to_owned(),
                    });
                }
                check_value(property, item)?;
            }
            Ok(())
        }
        JsonValue::Object(object) if !is_value_object(object) => check_entity(object),
        _ => Ok(()),
    }
}

pub(crate) fn check_entity(entity: &Map<String, JsonValue>) -> GraphResult<()> {
    if let Some(id) = entity.get("@id") {
        if !id.is_string() {
            return Err(GraphError::InvalidId {
                value: id.to_string(),
            });
        }
    }
    for (name, value) in entity {
        if name == "@id" || name == "@reverse" {
            continue;
        }
        check_value(name, value)?;
    }
    Ok(())
}
