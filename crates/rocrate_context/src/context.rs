use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::{Result, bail};
use serde_json::{Map, Value as JsonValue};
use tracing::trace;

use crate::vocab::{self, DEFAULT_PREFIX, Term, is_absolute_iri, is_keyword, is_scheme};

/// One entry of the term index.
#[derive(Debug, Clone, PartialEq)]
pub struct TermDefinition {
    /// The IRI (or keyword) the term maps to, as written in the context.
    pub iri: Term,
    /// The expanded term definition object, when the context used one.
    pub definition: Option<JsonValue>,
}

impl TermDefinition {
    pub fn iri(iri: &str) -> TermDefinition {
        TermDefinition {
            iri: Term::parse(iri),
            definition: None,
        }
    }
}

/// Flat lookup table of every term defined by the contexts of a document.
///
/// Contexts are overlaid in order: a later definition of a term replaces the
/// earlier one. Values are stored unexpanded and expanded on lookup, so a
/// prefix defined by a later context still applies to compact IRIs of an
/// earlier one.
#[derive(Debug, Default)]
pub struct TermIndex {
    term_map: BTreeMap<String, TermDefinition>,
    inverse_map: BTreeMap<String, String>,
    compacted: Mutex<HashMap<String, Option<String>>>,
}

impl Clone for TermIndex {
    fn clone(&self) -> Self {
        TermIndex {
            term_map: self.term_map.clone(),
            inverse_map: self.inverse_map.clone(),
            compacted: Mutex::default(),
        }
    }
}

enum Change {
    Reset,
    Define(String, TermDefinition),
    Undefine(String),
}

impl TermIndex {
    pub fn new() -> TermIndex {
        TermIndex::default()
    }

    pub fn len(&self) -> usize {
        self.term_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_map.is_empty()
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.term_map.contains_key(term)
    }

    pub fn get_term_definition(&self, term: &str) -> Option<&TermDefinition> {
        self.term_map.get(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &TermDefinition)> {
        self.term_map.iter().map(|(term, def)| (term.as_str(), def))
    }

    pub fn vocab(&self) -> Option<&str> {
        self.term_map.get(vocab::VOCAB.as_str()).map(|def| def.iri.as_str())
    }

    /// Overlay a local context onto the index.
    ///
    /// Accepts a term map, `null` (which clears every definition made so far)
    /// or an array of those. Remote references inside an array are left to the
    /// loader and skipped here. The index is unchanged when an error is
    /// returned.
    pub fn index_context(&mut self, context: &JsonValue) -> Result<()> {
        let mut changes = vec![];
        match context {
            JsonValue::Null => changes.push(Change::Reset),
            JsonValue::Object(map) => stage_definitions(map, &mut changes)?,
            JsonValue::Array(contexts) => {
                for context in contexts {
                    match context {
                        JsonValue::Null => changes.push(Change::Reset),
                        JsonValue::Object(map) => stage_definitions(map, &mut changes)?,
                        JsonValue::String(remote) => {
                            trace!(target: "context", %remote, "skipping nested remote context");
                        }
                        _ => bail!("invalid local context (not null, string, or map)"),
                    }
                }
            }
            _ => bail!("context should either be an object, null, or an array of them"),
        }
        for change in changes {
            match change {
                Change::Reset => {
                    self.term_map.clear();
                    self.inverse_map.clear();
                }
                Change::Define(term, definition) => self.insert(term, definition),
                Change::Undefine(term) => self.remove(&term),
            }
        }
        self.forget_lookups();
        Ok(())
    }

    /// Define a single term mapping to an IRI.
    pub fn add_term(&mut self, term: &str, iri: &str) -> Result<()> {
        let mut changes = vec![];
        let mut map = Map::new();
        map.insert(term.to_owned(), JsonValue::String(iri.to_owned()));
        stage_definitions(&map, &mut changes)?;
        for change in changes {
            if let Change::Define(term, definition) = change {
                self.insert(term, definition);
            }
        }
        self.forget_lookups();
        Ok(())
    }

    /// Expand a term to an absolute IRI.
    ///
    /// Absolute IRIs come back unchanged, `schema:` is treated as the default
    /// vocabulary, and compact values are expanded through their prefix.
    pub fn resolve_term(&self, term: &str) -> Option<String> {
        if is_absolute_iri(term) {
            return Some(term.to_owned());
        }
        let mut visiting = BTreeSet::new();
        if let Some(local) = term
            .strip_prefix(DEFAULT_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            if let Some(iri) = self.expand(local, &mut visiting) {
                return Some(iri);
            }
            visiting.clear();
        }
        self.expand(term, &mut visiting)
    }

    fn expand(&self, term: &str, visiting: &mut BTreeSet<String>) -> Option<String> {
        if is_absolute_iri(term) {
            return Some(term.to_owned());
        }
        if !visiting.insert(term.to_owned()) {
            trace!(target: "context", term, "cyclic IRI mapping found");
            return None;
        }
        if let Some(definition) = self.term_map.get(term) {
            let iri = &definition.iri;
            if iri.is_keyword() || iri.is_absolute() {
                return Some(iri.as_str().to_owned());
            }
            if let Some((prefix, suffix)) = iri.compact_parts() {
                return self.expand_compact(iri.as_str(), prefix, suffix, visiting);
            }
            // a relative mapping is resolved against the vocabulary
            return self
                .vocab()
                .filter(|vocab| is_absolute_iri(vocab))
                .map(|vocab| format!("{vocab}{}", iri.as_str()));
        }
        let (prefix, suffix) = term.split_once(':')?;
        self.expand_compact(term, prefix, suffix, visiting)
    }

    fn expand_compact(
        &self,
        iri: &str,
        prefix: &str,
        suffix: &str,
        visiting: &mut BTreeSet<String>,
    ) -> Option<String> {
        if !self.term_map.contains_key(prefix) {
            return is_scheme(prefix).then(|| iri.to_owned());
        }
        self.expand(prefix, visiting)
            .map(|base| format!("{base}{suffix}"))
    }

    /// Compact an IRI back to the term that defines it.
    ///
    /// Tries the inverse index first, then guesses the term from the last
    /// path segment, then scans every definition. Results are memoized until
    /// the index changes.
    pub fn get_term(&self, iri: &str) -> Option<String> {
        if let Ok(compacted) = self.compacted.lock() {
            if let Some(hit) = compacted.get(iri) {
                return hit.clone();
            }
        }
        let found = self
            .inverse_map
            .get(iri)
            .filter(|term| self.resolve_term(term).as_deref() == Some(iri))
            .cloned()
            .or_else(|| {
                let (_, guess) = iri.rsplit_once(['/', '#'])?;
                (!guess.is_empty() && self.resolve_term(guess).as_deref() == Some(iri))
                    .then(|| guess.to_owned())
            })
            .or_else(|| {
                self.term_map
                    .keys()
                    .filter(|term| !is_keyword(term))
                    .find(|term| self.resolve_term(term).as_deref() == Some(iri))
                    .cloned()
            });
        if let Ok(mut compacted) = self.compacted.lock() {
            compacted.insert(iri.to_owned(), found.clone());
        }
        found
    }

    fn insert(&mut self, term: String, definition: TermDefinition) {
        self.remove(&term);
        if definition.iri.is_absolute() && !is_keyword(&term) {
            self.inverse_map
                .insert(definition.iri.as_str().to_owned(), term.clone());
        }
        self.term_map.insert(term, definition);
    }

    fn remove(&mut self, term: &str) {
        if self.term_map.remove(term).is_some() {
            self.inverse_map.retain(|_, t| t != term);
        }
    }

    fn forget_lookups(&self) {
        if let Ok(mut compacted) = self.compacted.lock() {
            compacted.clear();
        }
    }
}

fn stage_definitions(context: &Map<String, JsonValue>, changes: &mut Vec<Change>) -> Result<()> {
    match context.get("@version") {
        Some(JsonValue::Number(number)) => {
            if number.as_f64().unwrap_or_default() != 1.1 {
                bail!("invalid @version value {number}");
            }
        }
        Some(value) => {
            bail!("invalid @version value {value}");
        }
        None => {}
    }

    for (key, value) in context.iter() {
        match key.as_str() {
            "@vocab" | "@base" | "@language" => match value {
                JsonValue::Null => changes.push(Change::Undefine(key.to_owned())),
                JsonValue::String(iri) => changes.push(Change::Define(
                    key.to_owned(),
                    TermDefinition {
                        iri: Term::new_iri(iri),
                        definition: None,
                    },
                )),
                _ => bail!("invalid {key} value {value}"),
            },
            "@direction" | "@import" | "@propagate" | "@protected" | "@version" => continue,
            // JSON-LD 1.1 allows `@type` to carry a container definition
            "@type" if value.is_object() => continue,
            "" => bail!("invalid term definition (empty string)"),
            term if term.starts_with('@') && term.is_ascii() => {
                bail!("keyword redefinition error ({term})")
            }
            term => changes.push(create_term_definition(term, value)?),
        }
    }
    Ok(())
}

fn create_term_definition(term: &str, value: &JsonValue) -> Result<Change> {
    match value {
        JsonValue::Null => Ok(Change::Undefine(term.to_owned())),
        JsonValue::String(id) => {
            check_iri_mapping(id)?;
            Ok(Change::Define(term.to_owned(), TermDefinition::iri(id)))
        }
        JsonValue::Object(definition) => {
            for entry in definition.keys() {
                if ![
                    "@id",
                    "@reverse",
                    "@container",
                    "@context",
                    "@direction",
                    "@index",
                    "@language",
                    "@nest",
                    "@prefix",
                    "@protected",
                    "@type",
                ]
                .contains(&entry.as_str())
                {
                    bail!("invalid term definition (unknown keyword {entry})");
                }
            }
            let iri = match definition.get("@id").or_else(|| definition.get("@reverse")) {
                Some(JsonValue::Null) => return Ok(Change::Undefine(term.to_owned())),
                Some(JsonValue::String(id)) => {
                    check_iri_mapping(id)?;
                    Term::parse(id)
                }
                Some(_) => bail!("invalid IRI mapping error (entry is not a string)"),
                // without @id the term is its own (compact or vocabulary relative) IRI
                None => Term::new_iri(term),
            };
            Ok(Change::Define(
                term.to_owned(),
                TermDefinition {
                    iri,
                    definition: Some(value.clone()),
                },
            ))
        }
        _ => bail!("invalid term definition error"),
    }
}

fn check_iri_mapping(id: &str) -> Result<()> {
    if id.starts_with('@') && !is_keyword(id) {
        bail!("invalid keyword alias {id}");
    }
    if id == vocab::CONTEXT.as_str() {
        bail!("invalid keyword alias error (@context cannot be aliased)");
    }
    Ok(())
}
