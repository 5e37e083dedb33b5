use serde_json::{Value as JsonValue, json};

/// File names the metadata descriptor may use as its @id.
pub const METADATA_IDS: [&str; 2] = ["ro-crate-metadata.json", "ro-crate-metadata.jsonld"];

pub const DEFAULT_CONTEXT: &str = "https://w3id.org/ro/crate/1.1/context";
pub const DEFAULT_PROFILE: &str = "https://w3id.org/ro/crate/1.1";
pub const ROOT_ID: &str = "./";

pub const DATASET_TYPE: &str = "Dataset";
pub const DESCRIPTOR_TYPE: &str = "CreativeWork";
pub const IDENTIFIER_TYPE: &str = "PropertyValue";

/// Prefix of the blank @ids given to nested entities that were written without one.
pub const BLANK_ID_PREFIX: &str = "_:b";
pub const LOCAL_ID_PREFIX: &str = "_:local-id:";

/// The entities of an empty crate: a root dataset and its descriptor.
pub fn skeleton() -> Vec<JsonValue> {
    vec![
        json!({
            "@id": ROOT_ID,
            "@type": DATASET_TYPE,
        }),
        json!({
            "@id": METADATA_IDS[0],
            "@type": DESCRIPTOR_TYPE,
            "conformsTo": { "@id": DEFAULT_PROFILE },
            "about": { "@id": ROOT_ID },
        }),
    ]
}
