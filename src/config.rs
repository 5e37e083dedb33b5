use serde::Deserialize;

use crate::mutation::MutationOptions;

/// Settings of the `rocrate` command, read from a TOML file.
#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub context: ContextConfig,
}

/// Behavior switches of a [`Graph`](crate::Graph).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Report every property value as an array, even a single one.
    #[serde(alias = "array")]
    pub always_as_array: bool,
    /// Present references to existing entities as entity views.
    #[serde(alias = "resolve_links")]
    pub link: bool,
    /// Let an incoming entity overwrite an existing one with the same @id.
    #[serde(alias = "replace")]
    pub replace_existing: bool,
    /// When replacing, keep properties the incoming data does not mention.
    #[serde(alias = "merge")]
    pub merge_properties: bool,
    /// Apply replace and merge to nested entities too.
    pub recurse: bool,
    /// Allow the same value to appear more than once in a property.
    pub duplicate: bool,
    /// @type given to entities created without one.
    pub default_type: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            always_as_array: false,
            link: false,
            replace_existing: false,
            merge_properties: false,
            recurse: false,
            duplicate: false,
            default_type: "Thing".to_string(),
        }
    }
}

impl GraphConfig {
    pub fn mutation_options(&self) -> MutationOptions {
        MutationOptions {
            replace: self.replace_existing,
            merge: self.merge_properties,
            recurse: self.recurse,
            duplicate: self.duplicate,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Fetch context URLs that are not bundled with the crate.
    pub fetch_remote: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { fetch_remote: true }
    }
}
