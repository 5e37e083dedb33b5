use std::borrow::Cow;

/// The right-hand side of a term definition.
///
/// A definition either names a JSON-LD keyword (`"id": "@id"`) or an IRI.
/// IRIs are kept exactly as written in the context, so they may still be in
/// compact `prefix:suffix` form until a lookup expands them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Term {
    Iri(Cow<'static, str>),
    Keyword(Cow<'static, str>),
}

impl Default for Term {
    fn default() -> Self {
        Term::Iri(Cow::default())
    }
}

impl Term {
    pub fn new_keyword(keyword: &str) -> Term {
        Term::Keyword(Cow::Owned(keyword.to_owned()))
    }

    pub const fn const_keyword(keyword: &'static str) -> Term {
        Term::Keyword(Cow::Borrowed(keyword))
    }

    pub fn new_iri(iri: &str) -> Term {
        Term::Iri(Cow::Owned(iri.to_owned()))
    }

    /// Classify a raw context value.
    pub fn parse(value: &str) -> Term {
        if is_keyword(value) {
            Term::new_keyword(value)
        } else {
            Term::new_iri(value)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Term::Iri(iri) => iri,
            Term::Keyword(keyword) => keyword,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self, Term::Keyword(_))
    }

    /// True when the term is an IRI that needs no further expansion.
    pub fn is_absolute(&self) -> bool {
        self.is_iri() && is_absolute_iri(self.as_str())
    }

    /// Split a compact IRI into prefix and suffix.
    pub fn compact_parts(&self) -> Option<(&str, &str)> {
        match self {
            Term::Iri(iri) if !is_absolute_iri(iri) => iri.split_once(':'),
            _ => None,
        }
    }
}

pub const CONTEXT: Term = Term::const_keyword("@context");
pub const VOCAB: Term = Term::const_keyword("@vocab");

/// The prefix alias for the default (schema.org) vocabulary.
pub const DEFAULT_PREFIX: &str = "schema";

/// `scheme://...` style IRIs are already expanded.
pub fn is_absolute_iri(value: &str) -> bool {
    match value.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && rest.starts_with("//")
        }
        None => false,
    }
}

/// A valid IRI scheme such as `urn` or `mailto`. A compact IRI whose prefix
/// is not a defined term is read as an absolute IRI with this scheme.
pub fn is_scheme(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

pub fn is_keyword(value: &str) -> bool {
    [
        "@base",
        "@container",
        "@context",
        "@direction",
        "@graph",
        "@id",
        "@import",
        "@included",
        "@index",
        "@json",
        "@language",
        "@list",
        "@nest",
        "@none",
        "@prefix",
        "@propagate",
        "@protected",
        "@reverse",
        "@set",
        "@type",
        "@value",
        "@version",
        "@vocab",
    ]
    .contains(&value)
}
