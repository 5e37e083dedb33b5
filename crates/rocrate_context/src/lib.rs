//! Term lookups for RO-Crate documents.
//!
//! This is not a JSON-LD processor. It flattens the `@context` of a crate
//! into a single term index that can expand terms to IRIs and compact IRIs
//! back to terms, which is all an RO-Crate editor needs.

mod bundled;
mod context;
mod loader;
pub mod vocab;

pub use bundled::bundled_context;
pub use context::{TermDefinition, TermIndex};
pub use loader::{ContextLoader, HttpContextLoader, ResolvedSource, SourceStatus, resolve_sources};
