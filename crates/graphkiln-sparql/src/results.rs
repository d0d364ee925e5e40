//! SPARQL 1.1 Query Results JSON

use crate::error::{SparqlError, SparqlResult};
use serde::Deserialize;
use std::collections::HashMap;

/// Parsed `SELECT` response
#[derive(Debug, Clone, Deserialize)]
pub struct SelectResults {
    pub head: SelectHead,
    pub results: SelectBindings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectHead {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectBindings {
    pub bindings: Vec<HashMap<String, Binding>>,
}

/// One bound value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Binding {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default, rename = "xml:lang")]
    pub lang: Option<String>,
}

impl SelectResults {
    /// Parse a response body
    pub fn parse(json: &str) -> SparqlResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SparqlError::parse(format!("Failed to parse SELECT response: {e}")))
    }

    /// Rows, each a variable → value map
    pub fn rows(&self) -> impl Iterator<Item = &HashMap<String, Binding>> {
        self.results.bindings.iter()
    }

    /// Every value bound to `var`, in row order
    pub fn values<'a>(&'a self, var: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rows()
            .filter_map(move |row| row.get(var).map(|binding| binding.value.as_str()))
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}
