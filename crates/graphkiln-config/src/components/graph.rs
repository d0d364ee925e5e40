//! Named graph configuration

use serde::{Deserialize, Serialize};

/// Target named graph for published triples
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraphConfig {
    /// IRI of the named graph every document publishes into
    pub graph_uri: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            graph_uri: "urn:graphkiln:graph:kiln".to_string(),
        }
    }
}

impl GraphConfig {
    pub(crate) fn validate(&self, problems: &mut Vec<String>) {
        if let Err(e) = url::Url::parse(&self.graph_uri) {
            problems.push(format!("graph.graph_uri is not an absolute IRI: {e}"));
        }
        if self.graph_uri.contains(['<', '>', ' ', '"']) {
            problems.push("graph.graph_uri contains characters not allowed in an IRI".to_string());
        }
    }
}
