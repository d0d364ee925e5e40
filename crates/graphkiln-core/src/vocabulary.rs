//! Vocabulary namespaces and entity IRI resolution
//!
//! A [`Vocabulary`] is built once from configuration at startup and shared as
//! `Arc<Vocabulary>`. Nothing in the crate reads namespaces from a global.

use crate::triple::Term;
use graphkiln_config::VocabularyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable namespace configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    base: String,
    entity_base: String,
}

impl Vocabulary {
    /// Build from validated configuration
    pub fn from_config(config: &VocabularyConfig) -> Self {
        Self {
            base: config.base.clone(),
            entity_base: config.entity_base.clone(),
        }
    }

    /// Namespace for graphkiln's own terms
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Namespace entity IRIs are minted under
    pub fn entity_base(&self) -> &str {
        &self.entity_base
    }

    /// IRI of a term in the base namespace
    pub fn term(&self, local: &str) -> String {
        format!("{}{}", self.base, local)
    }

    /// Whether an IRI names a shared entity
    pub fn is_entity_iri(&self, iri: &str) -> bool {
        iri.len() > self.entity_base.len() && iri.starts_with(&self.entity_base)
    }

    /// Whether a term is an entity IRI
    pub fn is_entity(&self, term: &Term) -> bool {
        term.as_iri().is_some_and(|iri| self.is_entity_iri(iri))
    }

    /// Resolver minting entity IRIs in this vocabulary
    pub fn resolver(&self) -> EntityResolver<'_> {
        EntityResolver { vocabulary: self }
    }
}

/// Canonical IRI of a named entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUri(String);

impl EntityUri {
    /// The IRI
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// As an RDF term
    pub fn to_term(&self) -> Term {
        Term::iri(self.0.clone())
    }
}

impl fmt::Display for EntityUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic entity text → IRI mapping
///
/// `resolve("Person", "Ada  Lovelace")` and `resolve("person", "ada lovelace")`
/// yield the same IRI in every document. When slugging loses information
/// (punctuation, symbols) a short content hash is appended so that `C++` and
/// `C#` stay distinct.
#[derive(Debug, Clone, Copy)]
pub struct EntityResolver<'a> {
    vocabulary: &'a Vocabulary,
}

impl EntityResolver<'_> {
    /// Resolve entity text of a given kind
    pub fn resolve(&self, kind: &str, text: &str) -> EntityUri {
        let kind_slug = slugify(kind).slug;
        let normalized = normalize(text);
        let Slug { slug, lossy } = slugify(&normalized);

        let local = match (slug.is_empty(), lossy) {
            (true, _) => short_digest(&normalized),
            (false, true) => format!("{slug}-{}", short_digest(&normalized)),
            (false, false) => slug,
        };
        let kind_part = if kind_slug.is_empty() { "thing".to_string() } else { kind_slug };

        EntityUri(format!("{}{}/{}", self.vocabulary.entity_base, kind_part, local))
    }
}

/// Collapse whitespace and lowercase
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct Slug {
    slug: String,
    lossy: bool,
}

fn slugify(text: &str) -> Slug {
    let mut slug = String::with_capacity(text.len());
    let mut lossy = false;
    let mut pending_dash = false;

    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            if !(c == ' ' || c == '-') {
                lossy = true;
            }
            pending_dash = true;
        }
    }

    Slug { slug, lossy }
}

fn short_digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex()[..8].to_string()
}
