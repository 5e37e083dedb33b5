mod flags;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use rocrate::{Config, Graph, HttpContextLoader, SourceStatus, TreeOptions, load_config, load_crate};
use tracing::{info, warn};

use crate::flags::RocrateCmd;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let flags = flags::Rocrate::from_env_or_exit();
    let config = match &flags.config {
        Some(path) => load_config(path).await?,
        None => Config::default(),
    };

    match flags.subcommand {
        RocrateCmd::Info(cmd) => info(&cmd.path, &config).await,
        RocrateCmd::Tree(cmd) => {
            let options = TreeOptions {
                root: None,
                depth: cmd.depth,
                value_object: !cmd.no_value_object,
                allow_cycles: cmd.allow_cycles,
            };
            tree(&cmd.path, &config, &options).await
        }
        RocrateCmd::Term(cmd) => term(&cmd.path, &config, &cmd.term).await,
    }
}

async fn open(path: &Path, config: &Config) -> Result<Graph> {
    let graph = load_crate(path, config.graph.clone()).await?;
    info!(
        target: "graph",
        root = graph.root_id().unwrap_or_default(),
        entities = graph.graph_size(),
        "crate loaded"
    );
    Ok(graph)
}

async fn info(path: &Path, config: &Config) -> Result<()> {
    let graph = open(path, config).await?;
    let Some(root) = graph.root() else {
        bail!("crate has no root data entity");
    };
    if let Some(descriptor) = graph.metadata_descriptor() {
        println!("descriptor: {}", descriptor.id());
    }
    println!("root: {}", root.id());
    if let Some(name) = root.get("name").and_then(|name| name.as_str().map(str::to_owned)) {
        println!("name: {name}");
    }
    println!("entities: {}", graph.graph_size());
    Ok(())
}

async fn tree(path: &Path, config: &Config, options: &TreeOptions) -> Result<()> {
    let graph = open(path, config).await?;
    let Some(tree) = graph.build_tree(options)? else {
        bail!("crate has no root data entity");
    };
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

async fn term(path: &Path, config: &Config, term: &str) -> Result<()> {
    let mut graph = open(path, config).await?;
    if config.context.fetch_remote {
        let loader = Arc::new(HttpContextLoader::new()?);
        for status in graph.resolve_context(loader).await {
            if let SourceStatus::Failed(reason) = status {
                warn!(target: "context", %reason, "context source not loaded");
            }
        }
    }
    match graph.resolve_term(term) {
        Some(iri) => {
            println!("{iri}");
            Ok(())
        }
        None => bail!("term {term} is not defined"),
    }
}
