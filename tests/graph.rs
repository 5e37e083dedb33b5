//! End-to-end behavior of the entity graph through its public API:
//! construction, mutation with reverse links, renames, deletes and paths.

use std::sync::Arc;

use anyhow::{Result, bail};
use regex::Regex;
use rocrate::{
    ContextLoader, Definition, EntityFilter, Graph, GraphConfig, GraphError, Item, MutationOptions, PathStep,
    Property, SourceStatus, TreeOptions,
};
use serde_json::{Value as JsonValue, json};

fn sample() -> Result<Graph> {
    let document = json!({
        "@context": "https://w3id.org/ro/crate/1.1/context",
        "@graph": [
            {
                "@id": "ro-crate-metadata.json",
                "@type": "CreativeWork",
                "conformsTo": { "@id": "https://w3id.org/ro/crate/1.1" },
                "about": { "@id": "./" }
            },
            {
                "@id": "./",
                "@type": "Dataset",
                "name": "Sample crate",
                "author": [{ "@id": "#alice" }, { "@id": "#bob" }],
                "hasPart": { "@id": "data.csv" }
            },
            { "@id": "#alice", "@type": "Person", "name": "Alice" },
            { "@id": "#bob", "@type": "Person", "name": "Bob" },
            { "@id": "#carol", "@type": "Person", "name": "Carol" },
            { "@id": "data.csv", "@type": "File", "name": "Data" },
            { "@id": "#update-1", "@type": "UpdateAction", "agent": { "@id": "#alice" } },
            { "@id": "#create-1", "@type": "CreateAction", "agent": { "@id": "#alice" } },
            { "@id": "#update-2", "@type": "UpdateAction", "agent": { "@id": "#carol" } }
        ]
    });
    Ok(Graph::from_json(&document, GraphConfig::default())?)
}

fn reverse_ids(graph: &Graph, id: &str, property: &str) -> Vec<String> {
    let Some(entity) = graph.get_entity(id) else {
        return vec![];
    };
    let mut ids: Vec<String> = entity
        .reverse(property)
        .map(|property| property.items())
        .unwrap_or_default()
        .iter()
        .filter_map(Item::id)
        .map(str::to_owned)
        .collect();
    ids.sort();
    ids
}

#[test]
fn empty_graph_has_no_root_name() -> Result<()> {
    let graph = Graph::new(GraphConfig::default())?;
    let root = graph.root().expect("root dataset");
    assert!(root.get("name").is_none());
    assert!(matches!(
        graph.get_definition("name"),
        Some(Definition::Iri(iri)) if iri == "http://schema.org/name"
    ));
    Ok(())
}

#[test]
fn replace_without_merge_resets_to_default_type() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    assert!(graph.add_entity(&json!({ "@id": "#a", "name": "A" }))?);
    let opts = MutationOptions {
        replace: true,
        merge: false,
        ..MutationOptions::default()
    };
    assert!(graph.add_entity_with(&json!({ "@id": "#a" }), opts)?);
    let entity = graph.get_entity("#a").expect("#a");
    assert!(entity.get("name").is_none());
    assert_eq!(entity.types().collect::<Vec<_>>(), vec!["Thing"]);
    Ok(())
}

#[test]
fn adding_an_existing_entity_keeps_it_by_default() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    assert!(graph.add_entity(&json!({ "@id": "#a", "name": "A" }))?);
    assert!(!graph.add_entity(&json!({ "@id": "#a", "name": "B" }))?);
    let name = graph.get_property("#a", "name");
    assert_eq!(name.and_then(|name| name.as_str()), Some("A"));
    Ok(())
}

#[test]
fn cascading_delete_forgets_the_entity() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.set_property("./", "author", &json!({ "@id": "#p", "name": "P" }))?;
    assert_eq!(reverse_ids(&graph, "#p", "author"), vec!["./"]);

    let removed = graph.delete_entity("#p", true).expect("#p was live");
    assert_eq!(removed, json!({ "@id": "#p", "name": "P", "@type": "Thing" }));
    assert!(graph.get_property("./", "author").is_none());
    assert!(!graph.has_entity("#p"));
    let root = graph.root().expect("root dataset");
    assert_eq!(root.reverse_keys().count(), 1);
    assert!(!graph.to_json().to_string().contains("#p"));
    Ok(())
}

#[test]
fn delete_without_cascade_leaves_a_dangling_reference() -> Result<()> {
    let mut graph = sample()?;
    graph.config_mut().link = true;
    assert!(graph.delete_entity("#bob", false).is_some());
    assert!(graph.get_entity("#bob").is_none());

    let authors = graph.get_property("./", "author").expect("authors");
    let items = authors.items();
    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Item::Entity(entity) if entity.id() == "#alice"));
    assert!(matches!(items[1], Item::Reference("#bob")));

    // adding the entity back resolves the reference again
    graph.add_entity(&json!({ "@id": "#bob", "@type": "Person" }))?;
    let authors = graph.get_property("./", "author").expect("authors");
    assert!(authors.items().iter().all(|item| item.as_entity().is_some()));
    assert_eq!(reverse_ids(&graph, "#bob", "author"), vec!["./"]);
    Ok(())
}

#[test]
fn deleting_a_missing_entity_is_a_no_op() -> Result<()> {
    let mut graph = sample()?;
    let before = graph.to_json();
    assert!(graph.delete_entity("#nobody", true).is_none());
    assert_eq!(graph.to_json(), before);
    Ok(())
}

#[test]
fn renaming_the_root_updates_the_descriptor() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    assert!(graph.set_root_id("#root")?);
    assert_eq!(graph.root_id(), Some("#root"));
    let about = graph
        .metadata_descriptor()
        .expect("descriptor")
        .to_json();
    assert_eq!(about["about"], json!({ "@id": "#root" }));
    assert!(!graph.has_entity("./"));
    Ok(())
}

#[test]
fn renames_are_visible_from_every_referrer() -> Result<()> {
    let mut graph = sample()?;
    assert!(graph.update_entity_id("#alice", "#alice-smith")?);
    let root = graph.root().expect("root dataset");
    assert_eq!(root.references("author"), vec!["#alice-smith", "#bob"]);
    assert_eq!(
        reverse_ids(&graph, "#alice-smith", "agent"),
        vec!["#create-1", "#update-1"]
    );
    assert!(!graph.has_entity("#alice"));

    let collision = graph.update_entity_id("#bob", "#carol");
    assert!(matches!(collision, Err(GraphError::IdCollision { id }) if id == "#carol"));
    Ok(())
}

#[test]
fn setting_id_through_a_view_renames() -> Result<()> {
    let mut graph = sample()?;
    let mut carol = graph.get_entity_mut("#carol").expect("#carol");
    carol.set("@id", &json!("#carol-jones"))?;
    assert_eq!(carol.id(), "#carol-jones");
    assert!(matches!(
        carol.set("@reverse", &json!({})),
        Err(GraphError::ReverseReadOnly)
    ));
    assert_eq!(reverse_ids(&graph, "#carol-jones", "agent"), vec!["#update-2"]);
    Ok(())
}

#[test]
fn renaming_onto_a_dangling_reference_resolves_it() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.set_property("./", "license", &json!({ "@id": "#license" }))?;
    assert!(!graph.has_entity("#license"));
    graph.add_entity(&json!({ "@id": "#draft", "@type": "CreativeWork", "name": "CC-BY" }))?;
    graph.update_entity_id("#draft", "#license")?;
    graph.config_mut().link = true;

    let license = graph.get_property("./", "license").expect("license");
    let entity = license.first().and_then(|item| item.as_entity()).expect("linked");
    assert_eq!(entity.id(), "#license");
    assert_eq!(reverse_ids(&graph, "#license", "license"), vec!["./"]);
    Ok(())
}

#[test]
fn renaming_onto_a_held_reference_keeps_one_link() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.add_entity(&json!({ "@id": "#b", "@type": "Person", "name": "B" }))?;
    graph.set_property("./", "author", &json!([{ "@id": "#x" }, { "@id": "#b" }]))?;
    assert!(!graph.has_entity("#x"));

    graph.update_entity_id("#b", "#x")?;
    let root = graph.root().expect("root dataset");
    assert_eq!(root.references("author"), vec!["#x"]);
    assert_eq!(reverse_ids(&graph, "#x", "author"), vec!["./"]);
    assert_eq!(
        graph.get_entity("#x").map(|entity| entity.reverse_json()),
        Some(json!({ "author": { "@id": "./" } }))
    );
    Ok(())
}

#[test]
fn duplicate_references_follow_the_option() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.add_entity(&json!({ "@id": "#p", "@type": "Person" }))?;
    let reference = json!({ "@id": "#p" });

    assert!(graph.add_values("./", "author", &reference)?);
    assert!(!graph.add_values("./", "author", &reference)?);
    assert_eq!(graph.get_property("./", "author").map(|p| p.len()), Some(1));

    let opts = MutationOptions {
        duplicate: true,
        ..MutationOptions::default()
    };
    assert!(graph.add_values_with("./", "author", &reference, opts)?);
    assert_eq!(graph.get_property("./", "author").map(|p| p.len()), Some(2));
    assert_eq!(reverse_ids(&graph, "#p", "author"), vec!["./"]);
    Ok(())
}

#[test]
fn deleting_values_retracts_reverse_links() -> Result<()> {
    let mut graph = sample()?;
    assert!(graph.delete_values("./", "author", &json!({ "@id": "#bob" }))?);
    let root = graph.root().expect("root dataset");
    assert_eq!(root.references("author"), vec!["#alice"]);
    assert!(reverse_ids(&graph, "#bob", "author").is_empty());
    assert!(!graph.delete_values("./", "author", &json!({ "@id": "#bob" }))?);

    assert!(graph.delete_property("./", "hasPart")?);
    assert!(reverse_ids(&graph, "data.csv", "hasPart").is_empty());
    assert!(matches!(
        graph.delete_property("./", "@type"),
        Err(GraphError::ReservedProperty { .. })
    ));
    Ok(())
}

#[test]
fn read_shaping_follows_the_config() -> Result<()> {
    let mut graph = sample()?;
    assert!(matches!(graph.get_property("./", "name"), Some(Property::One(_))));
    assert!(matches!(graph.get_property("./", "@id"), Some(Property::Id("./"))));

    graph.config_mut().always_as_array = true;
    let name = graph.get_property("./", "name").expect("name");
    assert!(matches!(&name, Property::Many(items) if items.len() == 1));
    assert_eq!(name.to_json(), json!(["Sample crate"]));
    assert!(matches!(graph.get_property("./", "@id"), Some(Property::Id("./"))));

    let part = graph.get_property("./", "hasPart").expect("hasPart");
    assert_eq!(part.to_json(), json!([{ "@id": "data.csv" }]));
    graph.config_mut().link = true;
    let part = graph.get_property("./", "hasPart").expect("hasPart");
    let file = part.first().and_then(|item| item.as_entity()).expect("linked");
    assert_eq!(file.get("name").and_then(|name| name.as_str()), Some("Data"));
    Ok(())
}

#[test]
fn reverse_reads_are_shaped_like_properties() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.set_property("./", "author", &json!({ "@id": "#p", "name": "P" }))?;

    let person = graph.get_entity("#p").expect("person");
    let reverse = person.get("@reverse").expect("reverse index");
    assert!(matches!(
        &reverse,
        Property::Reverse(entries) if matches!(entries.as_slice(), [("author", Property::One(Item::Reference("./")))])
    ));
    assert_eq!(reverse.to_json(), json!({ "author": { "@id": "./" } }));
    assert_eq!(person.reverse_json(), reverse.to_json());

    graph.config_mut().link = true;
    graph.config_mut().always_as_array = true;
    let person = graph.get_entity("#p").expect("person");
    let Some(Property::Reverse(entries)) = person.get("@reverse") else {
        bail!("@reverse is not a reverse index");
    };
    let [("author", Property::Many(items))] = entries.as_slice() else {
        bail!("unexpected reverse entries: {entries:?}");
    };
    let [Item::Entity(referrer)] = items.as_slice() else {
        bail!("unexpected referrers: {items:?}");
    };
    assert_eq!(referrer.id(), "./");
    Ok(())
}

#[test]
fn keys_list_id_first_without_reverse() -> Result<()> {
    let graph = sample()?;
    let root = graph.root().expect("root dataset");
    let keys: Vec<&str> = root.keys().collect();
    assert_eq!(keys, vec!["@id", "@type", "name", "author", "hasPart"]);
    assert!(root.contains("@id"));
    assert!(!root.contains("@reverse"));
    Ok(())
}

#[test]
fn nested_entities_without_id_get_blank_ids() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    graph.set_property("./", "contactPoint", &json!({ "@type": "ContactPoint", "name": "Desk" }))?;
    let root = graph.root().expect("root dataset");
    let ids = root.references("contactPoint");
    assert_eq!(ids.len(), 1);
    assert!(ids[0].starts_with("_:b"));
    let point = graph.get_entity(ids[0]).expect("blank entity");
    assert!(point.has_type("ContactPoint"));
    Ok(())
}

#[test]
fn nested_arrays_are_rejected() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    let result = graph.set_property("./", "keywords", &json!(["a", ["b"]]));
    assert!(matches!(result, Err(GraphError::NestedArray { property }) if property == "keywords"));
    assert!(graph.get_property("./", "keywords").is_none());
    Ok(())
}

#[test]
fn update_of_a_missing_entity_fails() -> Result<()> {
    let mut graph = Graph::new(GraphConfig::default())?;
    let result = graph.update_entity(&json!({ "@id": "#ghost", "name": "Ghost" }));
    assert!(matches!(result, Err(GraphError::EntityNotFound { id }) if id == "#ghost"));
    assert!(matches!(
        graph.update_entity(&json!({ "name": "Nobody" })),
        Err(GraphError::MissingId)
    ));
    Ok(())
}

#[test]
fn update_overwrites_properties() -> Result<()> {
    let mut graph = sample()?;
    assert!(graph.update_entity(&json!({ "@id": "#alice", "email": "alice@example.com" }))?);
    let alice = graph.get_entity("#alice").expect("#alice");
    assert!(alice.get("name").is_none());
    assert!(alice.has_type("Person"));
    assert_eq!(
        alice.get("email").and_then(|email| email.as_str()),
        Some("alice@example.com")
    );
    Ok(())
}

#[test]
fn resolve_follows_paths_with_filters() -> Result<()> {
    let graph = sample()?;
    let root = graph.root().expect("root dataset");
    let steps = [
        PathStep::new("author"),
        PathStep::new("agent").reverse().includes("@type", "UpdateAction"),
    ];
    let actions = graph.resolve(&[root], &steps).expect("matching actions");
    let ids: Vec<&str> = actions.iter().map(|entity| entity.id()).collect();
    assert_eq!(ids, vec!["#update-1"]);

    let (result, subgraph) = graph.resolve_all(&[root], &steps);
    assert!(result.is_some());
    let ids: Vec<&str> = subgraph.iter().map(|entity| entity.id()).collect();
    assert_eq!(ids, vec!["#alice", "#bob", "#update-1"]);

    let nothing = [PathStep::new("author").matching(|entity| entity.id() == "#carol")];
    assert!(graph.resolve(&[root], &nothing).is_none());
    Ok(())
}

#[test]
fn entities_can_be_filtered() -> Result<()> {
    let graph = sample()?;
    let people = EntityFilter::new().with("@type", Regex::new("^Person$")?);
    let ids: Vec<&str> = graph.entities(Some(&people)).map(|entity| entity.id()).collect();
    assert_eq!(ids, vec!["#alice", "#bob", "#carol"]);

    let named = EntityFilter::parse([("@type", "Person"), ("name", "^[AB]")])?;
    assert_eq!(graph.entities(Some(&named)).count(), 2);
    assert_eq!(graph.entities(None).count(), graph.graph_size());
    Ok(())
}

#[test]
fn trees_expand_references_once_per_path() -> Result<()> {
    let mut graph = sample()?;
    graph.set_property("#alice", "knows", &json!({ "@id": "./" }))?;
    let tree = graph
        .build_tree(&TreeOptions {
            value_object: false,
            ..TreeOptions::default()
        })?
        .expect("tree");
    assert_eq!(tree["@id"], json!("./"));
    assert_eq!(tree["name"], json!(["Sample crate"]));
    let alice = &tree["author"][0];
    assert_eq!(alice["name"], json!(["Alice"]));
    assert_eq!(alice["knows"], json!([{ "@id": "./" }]));
    assert_eq!(graph.objectify(), Some(tree));
    Ok(())
}

#[test]
fn round_trip_through_json() -> Result<()> {
    let graph = sample()?;
    let document = graph.to_json();
    let again = Graph::from_json(&document, GraphConfig::default())?;
    assert_eq!(again.to_json(), document);
    assert_eq!(again.index_of("#carol"), graph.index_of("#carol"));
    Ok(())
}

struct MockLoader;

impl ContextLoader for MockLoader {
    async fn load(&self, url: &str) -> Result<JsonValue> {
        match url {
            "https://example.com/context" => Ok(json!({
                "@context": { "ex": "https://example.com/vocab#", "Widget": "ex:Widget" }
            })),
            _ => bail!("not found: {url}"),
        }
    }
}

#[tokio::test]
async fn remote_contexts_are_resolved_on_request() -> Result<()> {
    let document = json!({
        "@context": [
            "https://w3id.org/ro/crate/1.1/context",
            "https://example.com/context",
            "https://example.com/missing"
        ],
        "@graph": []
    });
    let mut graph = Graph::from_json(&document, GraphConfig::default())?;
    assert!(graph.resolve_term("Widget").is_none());

    let statuses = graph.resolve_context(Arc::new(MockLoader)).await;
    assert_eq!(statuses[0], SourceStatus::Bundled);
    assert_eq!(statuses[1], SourceStatus::Fetched);
    assert!(matches!(statuses[2], SourceStatus::Failed(_)));
    assert_eq!(
        graph.resolve_term("Widget").as_deref(),
        Some("https://example.com/vocab#Widget")
    );
    assert_eq!(graph.resolve_term("name").as_deref(), Some("http://schema.org/name"));
    Ok(())
}
