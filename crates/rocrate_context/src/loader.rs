use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use reqwest::header::{self, HeaderValue};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::bundled::bundled_context;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
const APPLICATION_LD_JSON: HeaderValue =
    HeaderValue::from_static("application/ld+json, application/json;q=0.9");

/// Fetches remote context documents.
pub trait ContextLoader: Send + Sync + 'static {
    /// Load the JSON document published at `url`.
    fn load(&self, url: &str) -> impl Future<Output = Result<JsonValue>> + Send;
}

#[derive(Clone)]
pub struct HttpContextLoader {
    client: Client,
}

impl HttpContextLoader {
    pub fn new() -> Result<HttpContextLoader> {
        Ok(HttpContextLoader {
            client: Client::builder()
                .user_agent(APP_USER_AGENT)
                .gzip(true)
                .timeout(Duration::from_secs(10))
                .build()?,
        })
    }
}

impl ContextLoader for HttpContextLoader {
    async fn load(&self, url: &str) -> Result<JsonValue> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, APPLICATION_LD_JSON)
            .send()
            .await?;
        if response.error_for_status_ref().is_err() {
            let code = response.status();
            bail!("fetching context {url} failed with status {code}");
        }
        Ok(response.json().await?)
    }
}

/// Where the terms of one context entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// The entry was an inline term map.
    Inline,
    /// A well-known URL served from the copy shipped with this crate.
    Bundled,
    /// Fetched from the network.
    Fetched,
    /// Could not be used; the entry contributes no terms.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub status: SourceStatus,
    /// The local context to index, when there is one.
    pub terms: Option<JsonValue>,
}

impl ResolvedSource {
    fn failed(reason: impl Into<String>) -> ResolvedSource {
        ResolvedSource {
            status: SourceStatus::Failed(reason.into()),
            terms: None,
        }
    }
}

/// Resolve every entry of a document's `@context` to a local context.
///
/// Remote entries are fetched concurrently; the result keeps the order of
/// `sources` so the term maps can be overlaid in document order.
pub async fn resolve_sources<L: ContextLoader>(
    sources: &[JsonValue],
    loader: Arc<L>,
) -> Vec<ResolvedSource> {
    let mut resolved: Vec<ResolvedSource> = sources
        .iter()
        .map(|_| ResolvedSource::failed("not resolved"))
        .collect();
    let mut join_set = JoinSet::new();

    for (index, source) in sources.iter().enumerate() {
        resolved[index] = match source {
            JsonValue::Object(_) | JsonValue::Null => ResolvedSource {
                status: SourceStatus::Inline,
                terms: Some(source.clone()),
            },
            JsonValue::String(url) => match bundled_context(url) {
                Some(document) => {
                    debug!(target: "context", %url, "using bundled context");
                    ResolvedSource {
                        status: SourceStatus::Bundled,
                        terms: document.get("@context").cloned(),
                    }
                }
                None => {
                    let loader = loader.clone();
                    let url = url.clone();
                    join_set.spawn(async move { (index, loader.load(&url).await) });
                    continue;
                }
            },
            _ => ResolvedSource::failed(format!("unsupported context entry {source}")),
        };
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(document))) => {
                debug!(target: "context", source = %sources[index], "fetched context");
                // a bare term map is accepted in place of a context document
                let terms = match document {
                    JsonValue::Object(mut document) if document.contains_key("@context") => {
                        document.remove("@context")
                    }
                    document => Some(document),
                };
                resolved[index] = ResolvedSource {
                    status: SourceStatus::Fetched,
                    terms,
                };
            }
            Ok((index, Err(error))) => {
                warn!(target: "context", %error, source = %sources[index], "unable to load context");
                resolved[index] = ResolvedSource::failed(error.to_string());
            }
            Err(error) => {
                warn!(target: "context", %error, "context loader task failed");
            }
        }
    }
    resolved
}
