use thiserror::Error;

use crate::node::NodeKey;

/// Errors raised while building or editing a crate graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("no metadata descriptor (ro-crate-metadata.json) found in the graph")]
    MissingMetadataDescriptor,

    #[error("metadata descriptor has no `about` reference to a root data entity")]
    MissingRootReference,

    #[error("root data entity {id} referenced by the metadata descriptor does not exist")]
    RootNotFound { id: String },

    #[error("no entity with @id {id}")]
    EntityNotFound { id: String },

    #[error("entity handle {key:?} refers to a forgotten node")]
    StaleKey { key: NodeKey },

    #[error("entity has no @id")]
    MissingId,

    #[error("@id must be a string, got {value}")]
    InvalidId { value: String },

    #[error("another entity already uses @id {id}")]
    IdCollision { id: String },

    #[error("{property} can not be deleted")]
    ReservedProperty { property: String },

    #[error("@reverse is maintained by the graph and can not be written")]
    ReverseReadOnly,

    #[error("nested arrays are not allowed (property {property})")]
    NestedArray { property: String },

    #[error("invalid document: {message}")]
    InvalidDocument { message: String },

    #[error("invalid context: {message}")]
    InvalidContext { message: String },

    #[error("invalid tree options: {message}")]
    InvalidTreeOptions { message: String },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
