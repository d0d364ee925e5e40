//! SPARQL 1.1 Update and query text builders
//!
//! Every update is scoped to one named graph. Operations are rendered one
//! statement per line:
//!
//! ```text
//! DELETE DATA {
//!   GRAPH <g> {
//!     <s> <p> "old" .
//!   }
//! } ;
//! INSERT DATA {
//!   GRAPH <g> {
//!     <s> <p> "new" .
//!   }
//! }
//! ```

use crate::error::{SparqlError, SparqlResult};
use graphkiln_core::Triple;
use std::fmt::Write;

/// Render `<graph>` after checking it is a usable IRI
pub fn graph_ref(graph_uri: &str) -> SparqlResult<String> {
    let invalid = graph_uri.is_empty()
        || graph_uri
            .chars()
            .any(|c| c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'));
    if invalid {
        return Err(SparqlError::invalid(format!("invalid graph IRI '{graph_uri}'")));
    }
    Ok(format!("<{graph_uri}>"))
}

fn data_block<'a>(
    out: &mut String,
    keyword: &str,
    graph: &str,
    triples: impl IntoIterator<Item = &'a Triple>,
) {
    let _ = writeln!(out, "{keyword} DATA {{");
    let _ = writeln!(out, "  GRAPH {graph} {{");
    for triple in triples {
        let _ = writeln!(out, "    {}", triple.to_ntriples());
    }
    out.push_str("  }\n}");
}

/// `INSERT DATA` for a set of triples
pub fn insert_data<'a>(
    graph_uri: &str,
    triples: impl IntoIterator<Item = &'a Triple>,
) -> SparqlResult<String> {
    let graph = graph_ref(graph_uri)?;
    let mut out = String::new();
    data_block(&mut out, "INSERT", &graph, triples);
    Ok(out)
}

/// `DELETE DATA` for a set of triples
pub fn delete_data<'a>(
    graph_uri: &str,
    triples: impl IntoIterator<Item = &'a Triple>,
) -> SparqlResult<String> {
    let graph = graph_ref(graph_uri)?;
    let mut out = String::new();
    data_block(&mut out, "DELETE", &graph, triples);
    Ok(out)
}

/// One request applying deletes then inserts
///
/// Empty halves are left out. Returns `None` when both are empty.
pub fn upsert<'a, D, I>(graph_uri: &str, deletes: D, inserts: I) -> SparqlResult<Option<String>>
where
    D: IntoIterator<Item = &'a Triple>,
    I: IntoIterator<Item = &'a Triple>,
{
    let graph = graph_ref(graph_uri)?;
    let deletes: Vec<&Triple> = deletes.into_iter().collect();
    let inserts: Vec<&Triple> = inserts.into_iter().collect();

    let mut out = String::new();
    if !deletes.is_empty() {
        data_block(&mut out, "DELETE", &graph, deletes);
    }
    if !inserts.is_empty() {
        if !out.is_empty() {
            out.push_str(" ;\n");
        }
        data_block(&mut out, "INSERT", &graph, inserts);
    }
    Ok((!out.is_empty()).then_some(out))
}

/// `CONSTRUCT` returning every triple in a graph
pub fn construct_graph(graph_uri: &str) -> SparqlResult<String> {
    Ok(format!(
        "CONSTRUCT {{ ?s ?p ?o }} WHERE {{ GRAPH {} {{ ?s ?p ?o }} }}",
        graph_ref(graph_uri)?
    ))
}
