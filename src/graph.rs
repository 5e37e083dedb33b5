use std::sync::Arc;

use context::{ContextLoader, SourceStatus, TermIndex, bundled_context, resolve_sources};
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

use crate::accessor::{Entity, EntityFilter, EntityMut, Property};
use crate::config::GraphConfig;
use crate::defaults::{self, DEFAULT_CONTEXT, IDENTIFIER_TYPE, LOCAL_ID_PREFIX};
use crate::error::{GraphError, GraphResult};
use crate::identity::IdentityMap;
use crate::mutation::{MutationEngine, MutationOptions};
use crate::node::NodeKey;

/// An RO-Crate metadata document held as a mutable entity graph.
#[derive(Debug, Clone)]
pub struct Graph {
    config: GraphConfig,
    pub(crate) nodes: IdentityMap,
    context: Vec<JsonValue>,
    terms: TermIndex,
    blank_counter: u64,
}

/// What a vocabulary term stands for.
#[derive(Debug, Clone)]
pub enum Definition<'g> {
    Iri(String),
    /// The crate defines the term itself, as an `rdfs:Class` or `rdf:Property`.
    Entity(Entity<'g>),
}

impl Graph {
    /// An empty crate: a root dataset and its metadata descriptor.
    pub fn new(config: GraphConfig) -> GraphResult<Graph> {
        Graph::from_json(&json!({}), config)
    }

    /// Load a flattened JSON-LD document.
    ///
    /// Contexts that are bundled or inline are indexed right away; others
    /// need [`Graph::resolve_context`]. Fails when the document has no
    /// metadata descriptor or its root dataset is missing.
    pub fn from_json(document: &JsonValue, config: GraphConfig) -> GraphResult<Graph> {
        let JsonValue::Object(document) = document else {
            return Err(GraphError::InvalidDocument {
                message: "document must be a JSON object".to_owned(),
            });
        };
        let context = match document.get("@context") {
            None | Some(JsonValue::Null) => vec![JsonValue::from(DEFAULT_CONTEXT)],
            Some(JsonValue::Array(sources)) => sources.clone(),
            Some(source) => vec![source.clone()],
        };
        let mut graph = Graph {
            config,
            nodes: IdentityMap::new(),
            context: vec![],
            terms: TermIndex::new(),
            blank_counter: 0,
        };
        for source in context {
            graph.add_context(source)?;
        }

        let entities = match document.get("@graph") {
            Some(JsonValue::Array(entities)) if !entities.is_empty() => entities.clone(),
            None | Some(JsonValue::Array(_)) => defaults::skeleton(),
            Some(other) => {
                return Err(GraphError::InvalidDocument {
                    message: format!("@graph must be an array, got {other}"),
                });
            }
        };
        let opts = graph.config.mutation_options();
        for (index, mut entity) in entities.into_iter().enumerate() {
            let JsonValue::Object(object) = &mut entity else {
                return Err(GraphError::InvalidDocument {
                    message: format!("@graph entry {index} is not an object"),
                });
            };
            if !object.contains_key("@id") {
                object.insert("@id".to_owned(), JsonValue::String(format!("#{index}")));
            }
            graph.engine().add_entity(&entity, opts)?;
        }
        graph.check_root()?;
        debug!(target: "graph", entities = graph.graph_size(), "graph loaded");
        Ok(graph)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Reading flags may be changed at any time; they never affect storage.
    pub fn config_mut(&mut self) -> &mut GraphConfig {
        &mut self.config
    }

    fn engine(&mut self) -> MutationEngine<'_> {
        MutationEngine::new(
            &mut self.nodes,
            &mut self.blank_counter,
            &self.config.default_type,
        )
    }

    /// The document as flattened JSON-LD.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "@context": self.context,
            "@graph": self.graph(),
        })
    }

    /// Flat JSON of every live entity, in document order.
    pub fn graph(&self) -> Vec<JsonValue> {
        self.nodes
            .live_keys()
            .filter_map(|key| self.nodes.entity_json(key))
            .collect()
    }

    pub fn graph_size(&self) -> usize {
        self.nodes.len()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.lookup(id).and_then(|key| self.nodes.position(key))
    }

    // Context and terms

    pub fn context(&self) -> &[JsonValue] {
        &self.context
    }

    /// Append a context source: a URL, an inline term map, or `null`, which
    /// clears every term defined so far.
    ///
    /// Returns false when the URL is already listed since the last `null`.
    pub fn add_context(&mut self, source: JsonValue) -> GraphResult<bool> {
        match &source {
            JsonValue::String(url) => {
                let listed = self
                    .context
                    .iter()
                    .rev()
                    .take_while(|entry| !entry.is_null())
                    .any(|entry| *entry == source);
                if listed {
                    return Ok(false);
                }
                if let Some(terms) = bundled_context(url).and_then(|document| document.get("@context")) {
                    self.index_terms(terms)?;
                }
            }
            JsonValue::Object(_) | JsonValue::Null => self.index_terms(&source)?,
            other => {
                return Err(GraphError::InvalidContext {
                    message: format!("context must be a URL, an object or null, got {other}"),
                });
            }
        }
        self.context.push(source);
        Ok(true)
    }

    fn index_terms(&mut self, terms: &JsonValue) -> GraphResult<()> {
        self.terms
            .index_context(terms)
            .map_err(|error| GraphError::InvalidContext {
                message: error.to_string(),
            })
    }

    /// Define a term in the last inline context, adding one when needed.
    pub fn add_term_definition(&mut self, term: &str, iri: &str) -> GraphResult<()> {
        self.terms
            .add_term(term, iri)
            .map_err(|error| GraphError::InvalidContext {
                message: error.to_string(),
            })?;
        match self.context.last_mut() {
            Some(JsonValue::Object(terms)) => {
                terms.insert(term.to_owned(), JsonValue::from(iri));
            }
            _ => {
                let mut terms = Map::new();
                terms.insert(term.to_owned(), JsonValue::from(iri));
                self.context.push(JsonValue::Object(terms));
            }
        }
        Ok(())
    }

    /// Rebuild the term index from every context source, fetching remote
    /// ones with `loader`. Sources that fail are skipped.
    pub async fn resolve_context<L: ContextLoader>(&mut self, loader: Arc<L>) -> Vec<SourceStatus> {
        let resolved = resolve_sources(&self.context, loader).await;
        let mut terms = TermIndex::new();
        let mut statuses = Vec::with_capacity(resolved.len());
        for source in resolved {
            let mut status = source.status;
            if let Some(local) = &source.terms {
                if let Err(error) = terms.index_context(local) {
                    warn!(target: "context", %error, "context source skipped");
                    status = SourceStatus::Failed(error.to_string());
                }
            }
            statuses.push(status);
        }
        self.terms = terms;
        debug!(target: "context", terms = self.terms.len(), "context resolved");
        statuses
    }

    pub fn terms(&self) -> &TermIndex {
        &self.terms
    }

    pub fn resolve_term(&self, term: &str) -> Option<String> {
        self.terms.resolve_term(term)
    }

    pub fn get_term(&self, iri: &str) -> Option<String> {
        self.terms.get_term(iri)
    }

    /// Expand a term and look for a local definition of it, following a
    /// `sameAs` link once.
    pub fn get_definition(&self, term: &str) -> Option<Definition<'_>> {
        let mut iri = self.resolve_term(term)?;
        let mut local = self.get_entity(&iri);
        if let Some(entity) = local {
            if let Some(same_as) = entity.references("sameAs").first() {
                iri = (*same_as).to_owned();
                local = self.get_entity(&iri);
            }
        }
        match local {
            Some(entity) if entity.has_type("rdfs:Class") || entity.has_type("rdf:Property") => {
                Some(Definition::Entity(entity))
            }
            _ => Some(Definition::Iri(iri)),
        }
    }

    /// True when the entity has `type_name` as a type, directly or through
    /// the IRI both expand to.
    pub fn has_type(&self, entity: &Entity<'_>, type_name: &str) -> bool {
        if entity.has_type(type_name) {
            return true;
        }
        let Some(iri) = self.resolve_term(type_name) else {
            return false;
        };
        entity
            .types()
            .any(|t| self.resolve_term(t).is_some_and(|other| other == iri))
    }

    // Entities

    pub fn has_entity(&self, id: &str) -> bool {
        self.nodes.lookup(id).is_some()
    }

    pub fn get_entity(&self, id: &str) -> Option<Entity<'_>> {
        self.nodes.lookup(id).map(|key| Entity::new(self, key))
    }

    pub fn get_entity_mut(&mut self, id: &str) -> Option<EntityMut<'_>> {
        let key = self.nodes.lookup(id)?;
        Some(EntityMut::new(self, key))
    }

    /// The view behind `key`, or `None` once that entity was deleted.
    pub fn entity(&self, key: NodeKey) -> Option<Entity<'_>> {
        self.nodes.is_live(key).then(|| Entity::new(self, key))
    }

    pub fn entity_mut(&mut self, key: NodeKey) -> Option<EntityMut<'_>> {
        if !self.nodes.is_live(key) {
            return None;
        }
        Some(EntityMut::new(self, key))
    }

    /// Live entities in document order, optionally filtered.
    pub fn entities<'a>(&'a self, filter: Option<&'a EntityFilter>) -> impl Iterator<Item = Entity<'a>> + 'a {
        self.nodes
            .live_keys()
            .map(|key| Entity::new(self, key))
            .filter(move |entity| filter.is_none_or(|filter| filter.matches(entity)))
    }

    /// `base` if unused, otherwise `base` with the first free number appended.
    pub fn unique_id(&self, base: &str) -> String {
        let mut id = base.to_owned();
        let mut suffix = 1;
        while self.nodes.key_of(&id).is_some() {
            id = format!("{base}{suffix}");
            suffix += 1;
        }
        id
    }

    /// Add an entity using the configured mutation options.
    pub fn add_entity(&mut self, data: &JsonValue) -> GraphResult<bool> {
        let opts = self.config.mutation_options();
        self.add_entity_with(data, opts)
    }

    pub fn add_entity_with(&mut self, data: &JsonValue, opts: MutationOptions) -> GraphResult<bool> {
        self.engine().add_entity(data, opts)
    }

    /// Overwrite the properties of an existing entity with `data`.
    pub fn update_entity(&mut self, data: &JsonValue) -> GraphResult<bool> {
        let opts = self.config.mutation_options();
        self.update_entity_with(data, opts)
    }

    pub fn update_entity_with(&mut self, data: &JsonValue, opts: MutationOptions) -> GraphResult<bool> {
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
        let key = self.live_key(id)?;
        self.engine().update_entity(key, entity, opts)
    }

    pub fn update_entity_id(&mut self, id: &str, new_id: &str) -> GraphResult<bool> {
        let key = self.live_key(id)?;
        self.rename(key, new_id)
    }

    /// Delete an entity and return its last flat form, or `None` when
    /// there is no such entity.
    pub fn delete_entity(&mut self, id: &str, cascade: bool) -> Option<JsonValue> {
        let key = self.nodes.lookup(id)?;
        self.delete_entity_of(key, cascade)
    }

    // Properties

    pub fn get_property(&self, id: &str, name: &str) -> Option<Property<'_>> {
        self.get_entity(id)?.get(name)
    }

    /// Replace the values of a property. `@id` renames the entity.
    pub fn set_property(&mut self, id: &str, name: &str, value: &JsonValue) -> GraphResult<()> {
        let key = self.live_key(id)?;
        self.set_property_of(key, name, value)
    }

    pub fn add_values(&mut self, id: &str, name: &str, value: &JsonValue) -> GraphResult<bool> {
        let opts = self.config.mutation_options();
        self.add_values_with(id, name, value, opts)
    }

    pub fn add_values_with(
        &mut self,
        id: &str,
        name: &str,
        value: &JsonValue,
        opts: MutationOptions,
    ) -> GraphResult<bool> {
        let key = self.live_key(id)?;
        self.add_values_of(key, name, value, opts)
    }

    pub fn delete_property(&mut self, id: &str, name: &str) -> GraphResult<bool> {
        let key = self.live_key(id)?;
        self.delete_property_of(key, name)
    }

    pub fn delete_values(&mut self, id: &str, name: &str, value: &JsonValue) -> GraphResult<bool> {
        let key = self.live_key(id)?;
        self.delete_values_of(key, name, value)
    }

    // Crate-level helpers

    /// Declare that the crate conforms to a profile.
    pub fn add_profile(&mut self, uri: &str) -> GraphResult<()> {
        let descriptor = self
            .metadata_descriptor()
            .map(|entity| entity.key())
            .ok_or(GraphError::MissingMetadataDescriptor)?;
        let root = self.root_key()?;
        let profile = json!({ "@id": uri });
        let opts = self.config.mutation_options();
        self.add_values_of(descriptor, "conformsTo", &profile, opts)?;
        self.add_values_of(root, "conformsTo", &profile, opts)?;
        Ok(())
    }

    /// Attach a named `PropertyValue` identifier to the root dataset and
    /// return its @id, or `None` when it is already there.
    pub fn add_identifier(
        &mut self,
        name: &str,
        identifier: &str,
        description: Option<&str>,
    ) -> GraphResult<Option<String>> {
        let root = self.root_key()?;
        let id = format!("{LOCAL_ID_PREFIX}{name}:{identifier}");
        let mut entity = json!({
            "@id": id,
            "@type": IDENTIFIER_TYPE,
            "value": identifier,
            "name": name,
        });
        if let Some(description) = description {
            entity["description"] = JsonValue::from(description);
        }
        let opts = MutationOptions {
            duplicate: false,
            ..self.config.mutation_options()
        };
        let added = self.add_values_of(root, "identifier", &entity, opts)?;
        Ok(added.then_some(id))
    }

    /// The value of the root dataset's identifier called `name`.
    pub fn get_identifier(&self, name: &str) -> Option<&JsonValue> {
        let root = self.root()?;
        root.references("identifier")
            .into_iter()
            .filter_map(|id| self.get_entity(id))
            .find(|entity| {
                self.has_type(entity, IDENTIFIER_TYPE)
                    && entity
                        .values("name")
                        .unwrap_or_default()
                        .iter()
                        .any(|value| value.as_literal().and_then(JsonValue::as_str) == Some(name))
            })
            .and_then(|entity| entity.values("value"))
            .and_then(|values| values.first())
            .and_then(|value| value.as_literal())
    }

    // Key based operations shared with the accessor views

    fn live_key(&self, id: &str) -> GraphResult<NodeKey> {
        self.nodes
            .lookup(id)
            .ok_or_else(|| GraphError::EntityNotFound { id: id.to_owned() })
    }

    fn check_live(&self, key: NodeKey) -> GraphResult<()> {
        if self.nodes.is_live(key) {
            return Ok(());
        }
        match self.nodes.id_of(key) {
            Some(id) => Err(GraphError::EntityNotFound { id: id.to_owned() }),
            None => Err(GraphError::StaleKey { key }),
        }
    }

    pub(crate) fn set_property_of(&mut self, key: NodeKey, name: &str, value: &JsonValue) -> GraphResult<()> {
        self.check_live(key)?;
        match name {
            "@id" => match value {
                JsonValue::String(new_id) => self.rename(key, new_id).map(|_| ()),
                other => Err(GraphError::InvalidId {
                    value: other.to_string(),
                }),
            },
            "@reverse" => Err(GraphError::ReverseReadOnly),
            _ => {
                let opts = self.config.mutation_options();
                self.engine().set_property(key, name, value, opts)
            }
        }
    }

    pub(crate) fn add_values_of(
        &mut self,
        key: NodeKey,
        name: &str,
        value: &JsonValue,
        opts: MutationOptions,
    ) -> GraphResult<bool> {
        self.check_live(key)?;
        self.engine().add_values(key, name, value, opts)
    }

    pub(crate) fn delete_property_of(&mut self, key: NodeKey, name: &str) -> GraphResult<bool> {
        self.check_live(key)?;
        self.engine().delete_property(key, name)
    }

    pub(crate) fn delete_values_of(&mut self, key: NodeKey, name: &str, value: &JsonValue) -> GraphResult<bool> {
        self.check_live(key)?;
        self.engine().delete_values(key, name, value)
    }

    pub(crate) fn delete_entity_of(&mut self, key: NodeKey, cascade: bool) -> Option<JsonValue> {
        self.engine().delete_entity(key, cascade)
    }

    pub(crate) fn rename(&mut self, key: NodeKey, new_id: &str) -> GraphResult<bool> {
        self.check_live(key)?;
        self.engine().rename(key, new_id)
    }
}
