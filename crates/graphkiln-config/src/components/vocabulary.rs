//! Vocabulary namespaces
//!
//! Loaded once at startup and turned into an immutable `Vocabulary` in
//! graphkiln-core, which is then passed to every component that mints or
//! inspects IRIs.

use serde::{Deserialize, Serialize};

/// Namespace configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Base namespace for graphkiln's own terms (sync metadata predicates)
    pub base: String,

    /// Namespace under which entity IRIs are minted
    ///
    /// Subjects under this namespace are shared across documents.
    pub entity_base: String,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            base: "https://graphkiln.dev/ns#".to_string(),
            entity_base: "https://graphkiln.dev/entity/".to_string(),
        }
    }
}

impl VocabularyConfig {
    pub(crate) fn validate(&self, problems: &mut Vec<String>) {
        for (name, value) in [("base", &self.base), ("entity_base", &self.entity_base)] {
            if url::Url::parse(value).is_err() {
                problems.push(format!("vocabulary.{name} is not an absolute IRI: '{value}'"));
            } else if !(value.ends_with('/') || value.ends_with('#')) {
                problems.push(format!("vocabulary.{name} must end with '/' or '#'"));
            }
        }
    }
}
