//! An in-memory editor for RO-Crate metadata.
//!
//! A crate is loaded from its flattened JSON-LD form into a [`Graph`] of
//! entities. References between entities are tracked in both directions,
//! so entities can be renamed or deleted without leaving stale links, and
//! the graph can be walked as nested trees or along property paths.

mod accessor;
mod config;
pub mod defaults;
mod error;
mod graph;
mod identity;
mod load;
mod mutation;
mod node;
mod root;
mod traverse;

pub use accessor::{Entity, EntityFilter, EntityMut, Item, Property};
pub use config::{Config, ContextConfig, GraphConfig};
pub use context::{ContextLoader, HttpContextLoader, SourceStatus, TermIndex};
pub use error::{GraphError, GraphResult};
pub use graph::{Definition, Graph};
pub use load::{load_config, load_crate, metadata_path};
pub use mutation::MutationOptions;
pub use node::{NodeKey, Value};
pub use traverse::{PathStep, TreeOptions};
