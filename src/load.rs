use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::{Config, GraphConfig};
use crate::defaults::METADATA_IDS;
use crate::graph::Graph;

/// Read a TOML configuration file.
pub async fn load_config(path: &Path) -> Result<Config> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("unable to read config {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Find the metadata file of a crate: `path` itself when it is a file,
/// otherwise the first well-known metadata file name inside it.
pub async fn metadata_path(path: &Path) -> Result<PathBuf> {
    if tokio::fs::metadata(path).await?.is_file() {
        return Ok(path.to_owned());
    }
    for name in METADATA_IDS {
        let candidate = path.join(name);
        if tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    bail!("no RO-Crate metadata file in {}", path.display());
}

/// Load the crate at `path` (a directory or a metadata file).
pub async fn load_crate(path: &Path, config: GraphConfig) -> Result<Graph> {
    let metadata = metadata_path(path).await?;
    debug!(target: "graph", path = %metadata.display(), "loading crate");
    let text = tokio::fs::read_to_string(&metadata)
        .await
        .with_context(|| format!("unable to read {}", metadata.display()))?;
    let document: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", metadata.display()))?;
    let graph = Graph::from_json(&document, config)
        .with_context(|| format!("{} is not a valid crate", metadata.display()))?;
    Ok(graph)
}
