use tracing::debug;

use crate::accessor::Entity;
use crate::defaults::{DESCRIPTOR_TYPE, METADATA_IDS};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{NodeKey, Value};

impl Graph {
    /// The `ro-crate-metadata.json` entity describing the crate.
    pub fn metadata_descriptor(&self) -> Option<Entity<'_>> {
        METADATA_IDS
            .iter()
            .filter_map(|id| self.get_entity(id))
            .find(|entity| entity.has_type(DESCRIPTOR_TYPE))
    }

    /// The @id the descriptor's `about` points at.
    pub fn root_id(&self) -> Option<&str> {
        self.metadata_descriptor()?.references("about").first().copied()
    }

    /// The root data entity.
    pub fn root(&self) -> Option<Entity<'_>> {
        self.get_entity(self.root_id()?)
    }

    /// Rename the root data entity. The descriptor keeps pointing at it.
    pub fn set_root_id(&mut self, new_id: &str) -> GraphResult<bool> {
        let key = self.root_key()?;
        self.rename(key, new_id)
    }

    pub(crate) fn root_key(&self) -> GraphResult<NodeKey> {
        let descriptor = self
            .metadata_descriptor()
            .ok_or(GraphError::MissingMetadataDescriptor)?;
        let about = descriptor
            .values("about")
            .unwrap_or_default()
            .iter()
            .find_map(Value::as_ref_key)
            .ok_or(GraphError::MissingRootReference)?;
        match self.entity(about) {
            Some(root) => Ok(root.key()),
            None => Err(GraphError::RootNotFound {
                id: self.nodes.id_of(about).unwrap_or_default().to_owned(),
            }),
        }
    }

    pub(crate) fn check_root(&self) -> GraphResult<()> {
        let root = self.root_key()?;
        debug!(target: "graph", root = self.nodes.id_of(root), "root data entity found");
        Ok(())
    }
}
