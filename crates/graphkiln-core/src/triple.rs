//! RDF terms, triples and document triple sets
//!
//! Everything here is ordered (`Ord`) so that a [`TripleSet`] iterates in the
//! same order every time it is derived from the same content. The canonical
//! N-Triples rendering is also the input to [`TripleHash`], which makes the
//! hash independent of how a triple was constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// `xsd:string`, the implicit datatype of a plain literal
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `rdf:langString`, the implicit datatype of a language-tagged literal
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
/// `rdf:type`
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// An RDF term
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Term {
    /// An IRI reference
    Iri {
        /// The IRI, without angle brackets
        value: String,
    },

    /// A blank node
    ///
    /// Accepted when reading a graph back, rejected for publishing: blank nodes
    /// cannot appear in `DELETE DATA`, so a triple holding one could never be
    /// retracted.
    Blank {
        /// Blank node label, without the `_:` prefix
        value: String,
    },

    /// A literal
    Literal {
        /// Lexical form
        value: String,
        /// Datatype IRI; `None` for plain and language-tagged literals
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        /// Language tag, lowercased
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    /// IRI term
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    /// Blank node term
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank {
            value: label.into(),
        }
    }

    /// Plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    /// Typed literal
    ///
    /// `xsd:string` is folded into a plain literal, the two are the same term.
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Term::Literal {
            value: value.into(),
            datatype: (datatype != XSD_STRING).then_some(datatype),
            language: None,
        }
    }

    /// Language-tagged literal
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    /// The IRI if this term is one
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { value } => Some(value),
            _ => None,
        }
    }

    /// Lexical value regardless of kind
    pub fn value(&self) -> &str {
        match self {
            Term::Iri { value } | Term::Blank { value } | Term::Literal { value, .. } => value,
        }
    }

    /// Whether this is an IRI
    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri { .. })
    }

    /// Canonical N-Triples rendering
    pub fn to_ntriples(&self) -> String {
        match self {
            Term::Iri { value } => format!("<{value}>"),
            Term::Blank { value } => format!("_:{value}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('"');
                escape_literal_into(value, &mut out);
                out.push('"');
                if let Some(lang) = language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = datatype {
                    out.push_str("^^<");
                    out.push_str(dt);
                    out.push('>');
                }
                out
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

fn escape_literal_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            _ => out.push(c),
        }
    }
}

/// Characters N-Triples forbids inside `<...>`
fn invalid_iri_char(c: char) -> bool {
    c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
}

/// A (subject, predicate, object) fact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Subject (IRI)
    pub subject: Term,
    /// Predicate (IRI)
    pub predicate: Term,
    /// Object (IRI or literal)
    pub object: Term,
}

impl Triple {
    /// Create a triple
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Canonical N-Triples statement, including the trailing ` .`
    pub fn to_ntriples(&self) -> String {
        format!(
            "{} {} {} .",
            self.subject.to_ntriples(),
            self.predicate.to_ntriples(),
            self.object.to_ntriples()
        )
    }

    /// Content hash of the canonical form
    pub fn hash(&self) -> TripleHash {
        TripleHash::of(self)
    }

    /// Check that the triple can be published with `INSERT DATA`/`DELETE DATA`
    pub fn validate(&self) -> Result<(), InvalidTriple> {
        let reject = |reason: String| {
            Err(InvalidTriple {
                triple: self.to_ntriples(),
                reason,
            })
        };

        for (position, term) in [("subject", &self.subject), ("object", &self.object)] {
            if let Term::Blank { .. } = term {
                return reject(format!("blank node in {position}; skolemize it before publishing"));
            }
        }
        if !self.subject.is_iri() {
            return reject("subject must be an IRI".to_string());
        }
        if !self.predicate.is_iri() {
            return reject("predicate must be an IRI".to_string());
        }

        for term in [&self.subject, &self.predicate, &self.object] {
            match term {
                Term::Iri { value } => {
                    if value.is_empty() || value.chars().any(invalid_iri_char) {
                        return reject(format!("invalid IRI '{value}'"));
                    }
                }
                Term::Literal {
                    datatype, language, ..
                } => {
                    if let Some(dt) = datatype {
                        if dt.chars().any(invalid_iri_char) {
                            return reject(format!("invalid datatype IRI '{dt}'"));
                        }
                    }
                    if let Some(lang) = language {
                        let valid = !lang.is_empty()
                            && lang.split('-').all(|part| {
                                !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
                            });
                        if !valid {
                            return reject(format!("invalid language tag '{lang}'"));
                        }
                    }
                }
                Term::Blank { .. } => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

/// A triple that cannot be published
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid triple {triple}: {reason}")]
pub struct InvalidTriple {
    /// N-Triples rendering of the offending triple
    pub triple: String,
    /// What is wrong with it
    pub reason: String,
}

/// BLAKE3 hash of a triple's canonical N-Triples form, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripleHash(String);

impl TripleHash {
    /// Hash a triple
    pub fn of(triple: &Triple) -> Self {
        Self(blake3::hash(triple.to_ntriples().as_bytes()).to_hex().to_string())
    }

    /// Hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TripleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of a whole set of triple hashes
///
/// Order-independent because the input set is sorted.
pub fn set_digest<'a>(hashes: impl IntoIterator<Item = &'a TripleHash>) -> String {
    let mut hasher = blake3::Hasher::new();
    for hash in hashes {
        hasher.update(hash.as_str().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// The complete set of triples derived from one document, scoped to a named graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleSet {
    /// Named graph the triples are published into
    pub graph_uri: String,
    /// The triples, ordered
    #[serde(default)]
    pub triples: BTreeSet<Triple>,
}

impl TripleSet {
    /// Empty set for a graph
    pub fn new(graph_uri: impl Into<String>) -> Self {
        Self {
            graph_uri: graph_uri.into(),
            triples: BTreeSet::new(),
        }
    }

    /// Build from any triple iterator
    pub fn from_triples(graph_uri: impl Into<String>, triples: impl IntoIterator<Item = Triple>) -> Self {
        Self {
            graph_uri: graph_uri.into(),
            triples: triples.into_iter().collect(),
        }
    }

    /// Add a triple, returns false if it was already present
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    /// Membership
    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Number of triples
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Hashes of every triple
    pub fn hashes(&self) -> BTreeSet<TripleHash> {
        self.triples.iter().map(Triple::hash).collect()
    }

    /// Digest of the whole set, used for staleness detection
    pub fn set_hash(&self) -> String {
        set_digest(&self.hashes())
    }

    /// Validate every triple, reporting the first failure
    pub fn validate(&self) -> Result<(), InvalidTriple> {
        self.triples.iter().try_for_each(Triple::validate)
    }
}

impl<'a> IntoIterator for &'a TripleSet {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}
