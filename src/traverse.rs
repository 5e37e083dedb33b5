use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde_json::{Map, Value as JsonValue, json};

use crate::accessor::Entity;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{NodeKey, Value};

/// Options for [`Graph::build_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOptions {
    /// @id of the entity to start from; the root data entity by default.
    pub root: Option<String>,
    /// How many levels of references to expand. `None` means no limit.
    pub depth: Option<usize>,
    /// Wrap scalar values as `{"@value": ..}`.
    pub value_object: bool,
    /// Expand references back to an entity already on the current path.
    /// Only allowed together with a finite depth.
    pub allow_cycles: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            root: None,
            depth: None,
            value_object: true,
            allow_cycles: false,
        }
    }
}

enum Slot {
    Json(JsonValue),
    Branch(usize),
}

struct Branch {
    key: NodeKey,
    level: usize,
    ancestors: Vec<NodeKey>,
    entries: Vec<(String, Vec<Slot>)>,
}

impl Graph {
    /// Materialize a nested copy of the graph starting at one entity.
    ///
    /// References are expanded breadth first while depth remains. Unless
    /// `allow_cycles` is set, a reference to an entity already on the path
    /// from the start is left as `{"@id": ..}`. Every property except `@id`
    /// comes out as an array. With `value_object`, scalars are wrapped as
    /// `{"@value": ..}`; object literals such as `{"@value": .., "@language": ..}`
    /// are copied as they are, never wrapped again. Returns `None` when the
    /// start entity does not exist.
    pub fn build_tree(&self, options: &TreeOptions) -> GraphResult<Option<JsonValue>> {
        if options.allow_cycles && options.depth.is_none() {
            return Err(GraphError::InvalidTreeOptions {
                message: "allow_cycles needs a finite depth".to_owned(),
            });
        }
        let start = match &options.root {
            Some(id) => self.nodes.lookup(id),
            None => self.root_key().ok(),
        };
        let Some(start) = start else {
            return Ok(None);
        };

        let mut branches = vec![Branch {
            key: start,
            level: 0,
            ancestors: vec![],
            entries: vec![],
        }];
        let mut queue = VecDeque::from([0]);
        while let Some(index) = queue.pop_front() {
            let key = branches[index].key;
            let level = branches[index].level;
            let mut path = branches[index].ancestors.clone();
            if !options.allow_cycles {
                path.push(key);
            }
            let Some(node) = self.nodes.node(key) else {
                continue;
            };
            let mut entries = vec![("@id".to_owned(), vec![Slot::Json(JsonValue::from(node.id.as_str()))])];
            for (name, values) in node.properties() {
                let mut slots = Vec::with_capacity(values.len());
                for value in values {
                    let slot = match value {
                        Value::Literal(literal) if name == "@type" => Slot::Json(literal.clone()),
                        Value::Literal(literal) if options.value_object && !literal.is_object() => {
                            Slot::Json(json!({ "@value": literal }))
                        }
                        Value::Literal(literal) => Slot::Json(literal.clone()),
                        Value::Ref(target) => {
                            let expand = options.depth.is_none_or(|depth| level < depth)
                                && self.nodes.is_live(*target)
                                && !path.contains(target);
                            if expand {
                                branches.push(Branch {
                                    key: *target,
                                    level: level + 1,
                                    ancestors: path.clone(),
                                    entries: vec![],
                                });
                                queue.push_back(branches.len() - 1);
                                Slot::Branch(branches.len() - 1)
                            } else {
                                Slot::Json(self.nodes.value_json(value))
                            }
                        }
                    };
                    slots.push(slot);
                }
                entries.push((name.to_owned(), slots));
            }
            branches[index].entries = entries;
        }

        // children always come after their parent, so build from the back
        let mut built: Vec<Option<JsonValue>> = Vec::with_capacity(branches.len());
        built.resize_with(branches.len(), || None);
        for (index, branch) in branches.into_iter().enumerate().rev() {
            let mut object = Map::new();
            for (name, slots) in branch.entries {
                let values: Vec<JsonValue> = slots
                    .into_iter()
                    .map(|slot| match slot {
                        Slot::Json(value) => value,
                        Slot::Branch(child) => built[child].take().unwrap_or(JsonValue::Null),
                    })
                    .collect();
                let value = match values.as_slice() {
                    [id] if name == "@id" => id.clone(),
                    _ => JsonValue::Array(values),
                };
                object.insert(name, value);
            }
            built[index] = Some(JsonValue::Object(object));
        }
        Ok(built.into_iter().next().flatten())
    }

    /// The root data entity as a plain nested object without cycles.
    pub fn objectify(&self) -> Option<JsonValue> {
        let options = TreeOptions {
            value_object: false,
            ..TreeOptions::default()
        };
        self.build_tree(&options).ok().flatten()
    }

    /// Follow `steps` from `items`, one property at a time.
    ///
    /// Returns `None` as soon as a step matches nothing.
    pub fn resolve<'g>(&'g self, items: &[Entity<'g>], steps: &[PathStep]) -> Option<Vec<Entity<'g>>> {
        self.follow(items, steps, None)
    }

    /// Like [`Graph::resolve`], also collecting every entity matched along
    /// the way, without repeats.
    pub fn resolve_all<'g>(
        &'g self,
        items: &[Entity<'g>],
        steps: &[PathStep],
    ) -> (Option<Vec<Entity<'g>>>, Vec<Entity<'g>>) {
        let mut subgraph = vec![];
        let result = self.follow(items, steps, Some(&mut subgraph));
        (result, subgraph)
    }

    fn follow<'g>(
        &'g self,
        items: &[Entity<'g>],
        steps: &[PathStep],
        mut subgraph: Option<&mut Vec<Entity<'g>>>,
    ) -> Option<Vec<Entity<'g>>> {
        let mut collected = HashSet::new();
        let mut current = items.to_vec();
        for step in steps {
            let mut next = vec![];
            let mut matched = HashSet::new();
            for item in &current {
                for target in item.targets(&step.property, step.reverse) {
                    if matched.contains(&target) {
                        continue;
                    }
                    let Some(candidate) = self.entity(target) else {
                        continue;
                    };
                    if step.accepts(&candidate) {
                        matched.insert(target);
                        next.push(candidate);
                    }
                }
            }
            if next.is_empty() {
                return None;
            }
            if let Some(subgraph) = subgraph.as_deref_mut() {
                for entity in &next {
                    if collected.insert(entity.key()) {
                        subgraph.push(*entity);
                    }
                }
            }
            current = next;
        }
        Some(current)
    }
}

type Matcher = Box<dyn Fn(&Entity<'_>) -> bool>;

/// One hop of a path through the graph.
pub struct PathStep {
    pub property: String,
    /// Follow the property backwards, from referenced to referring entities.
    pub reverse: bool,
    /// The target must have at least one of these property values.
    pub includes: Vec<(String, JsonValue)>,
    matcher: Option<Matcher>,
}

impl PathStep {
    pub fn new(property: &str) -> PathStep {
        PathStep {
            property: property.to_owned(),
            reverse: false,
            includes: vec![],
            matcher: None,
        }
    }

    pub fn reverse(mut self) -> PathStep {
        self.reverse = true;
        self
    }

    pub fn includes(mut self, property: &str, value: impl Into<JsonValue>) -> PathStep {
        self.includes.push((property.to_owned(), value.into()));
        self
    }

    /// Also require `matcher` to accept the target.
    pub fn matching(mut self, matcher: impl Fn(&Entity<'_>) -> bool + 'static) -> PathStep {
        self.matcher = Some(Box::new(matcher));
        self
    }

    fn accepts(&self, entity: &Entity<'_>) -> bool {
        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|(property, expected)| entity_has_value(entity, property, expected));
        included && self.matcher.as_ref().is_none_or(|matcher| matcher(entity))
    }
}

impl fmt::Debug for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathStep")
            .field("property", &self.property)
            .field("reverse", &self.reverse)
            .field("includes", &self.includes)
            .field("matcher", &self.matcher.is_some())
            .finish()
    }
}

fn entity_has_value(entity: &Entity<'_>, property: &str, expected: &JsonValue) -> bool {
    if property == "@id" {
        return expected.as_str() == Some(entity.id());
    }
    let expected_id = expected
        .as_str()
        .or_else(|| expected.get("@id").and_then(JsonValue::as_str));
    let references = entity.references(property);
    entity
        .values(property)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_literal)
        .any(|literal| literal == expected)
        || expected_id.is_some_and(|id| references.contains(&id))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::{PathStep, TreeOptions};
    use crate::config::GraphConfig;
    use crate::error::GraphError;
    use crate::graph::Graph;

    fn cyclic_graph() -> Result<Graph> {
        let mut graph = Graph::new(GraphConfig::default())?;
        graph.set_property("./", "name", &json!("root"))?;
        graph.set_property(
            "./",
            "author",
            &json!({ "@id": "#alice", "@type": "Person", "knows": { "@id": "#bob", "@type": "Person" } }),
        )?;
        graph.set_property("#bob", "knows", &json!({ "@id": "#alice" }))?;
        Ok(graph)
    }

    #[test]
    fn tree_stops_at_cycles() -> Result<()> {
        let graph = cyclic_graph()?;
        let tree = graph.build_tree(&TreeOptions::default())?;
        assert_eq!(
            tree,
            Some(json!({
                "@id": "./",
                "@type": ["Dataset"],
                "name": [{ "@value": "root" }],
                "author": [{
                    "@id": "#alice",
                    "@type": ["Person"],
                    "knows": [{
                        "@id": "#bob",
                        "@type": ["Person"],
                        "knows": [{ "@id": "#alice" }]
                    }]
                }]
            }))
        );
        Ok(())
    }

    #[test]
    fn tree_keeps_object_literals_unwrapped() -> Result<()> {
        let mut graph = Graph::new(GraphConfig::default())?;
        graph.set_property("./", "name", &json!({ "@value": "Wurzel", "@language": "de" }))?;
        graph.set_property("./", "keywords", &json!([{ "@list": ["a", "b"] }, "c"]))?;
        let tree = graph.build_tree(&TreeOptions::default())?;
        assert_eq!(
            tree.as_ref().map(|tree| &tree["name"]),
            Some(&json!([{ "@value": "Wurzel", "@language": "de" }]))
        );
        assert_eq!(
            tree.as_ref().map(|tree| &tree["keywords"]),
            Some(&json!([{ "@list": ["a", "b"] }, { "@value": "c" }]))
        );
        Ok(())
    }

    #[test]
    fn tree_depth_limits_expansion() -> Result<()> {
        let graph = cyclic_graph()?;
        let options = TreeOptions {
            depth: Some(1),
            value_object: false,
            ..TreeOptions::default()
        };
        let tree = graph.build_tree(&options)?;
        assert_eq!(
            tree,
            Some(json!({
                "@id": "./",
                "@type": ["Dataset"],
                "name": ["root"],
                "author": [{
                    "@id": "#alice",
                    "@type": ["Person"],
                    "knows": [{ "@id": "#bob" }]
                }]
            }))
        );
        Ok(())
    }

    #[test]
    fn tree_with_cycles_needs_depth() -> Result<()> {
        let graph = cyclic_graph()?;
        let options = TreeOptions {
            allow_cycles: true,
            ..TreeOptions::default()
        };
        assert!(matches!(
            graph.build_tree(&options),
            Err(GraphError::InvalidTreeOptions { .. })
        ));
        let options = TreeOptions {
            root: Some("#alice".to_owned()),
            depth: Some(2),
            allow_cycles: true,
            value_object: false,
        };
        let tree = graph.build_tree(&options)?;
        assert_eq!(
            tree.as_ref().map(|tree| &tree["knows"][0]["knows"][0]["@id"]),
            Some(&json!("#alice"))
        );
        assert_eq!(
            tree.as_ref().map(|tree| &tree["knows"][0]["knows"][0]["@type"]),
            Some(&json!(["Person"]))
        );
        let missing = TreeOptions {
            root: Some("#nobody".to_owned()),
            ..TreeOptions::default()
        };
        assert_eq!(graph.build_tree(&missing)?, None);
        Ok(())
    }

    #[test]
    fn resolve_follows_forward_and_reverse_steps() -> Result<()> {
        let mut graph = cyclic_graph()?;
        graph.add_entity(&json!({
            "@id": "#update",
            "@type": "UpdateAction",
            "agent": { "@id": "#alice" }
        }))?;
        graph.add_entity(&json!({
            "@id": "#create",
            "@type": "CreateAction",
            "agent": { "@id": "#alice" }
        }))?;
        let root = graph.root().into_iter().collect::<Vec<_>>();
        let steps = [
            PathStep::new("author"),
            PathStep::new("agent")
                .reverse()
                .includes("@type", "UpdateAction"),
        ];
        let (actions, subgraph) = graph.resolve_all(&root, &steps);
        let ids: Option<Vec<&str>> = actions.map(|actions| actions.iter().map(|a| a.id()).collect());
        assert_eq!(ids, Some(vec!["#update"]));
        let collected: Vec<&str> = subgraph.iter().map(|e| e.id()).collect();
        assert_eq!(collected, vec!["#alice", "#update"]);

        let steps = [PathStep::new("author").matching(|entity| entity.id() == "#carol")];
        assert!(graph.resolve(&root, &steps).is_none());
        Ok(())
    }
}
