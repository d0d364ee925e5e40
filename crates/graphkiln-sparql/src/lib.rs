//! # Graphkiln SPARQL
//!
//! Talks to a remote triple store over the SPARQL 1.1 Protocol: per-graph
//! `DELETE DATA` / `INSERT DATA` updates, whole-graph read-back through
//! `CONSTRUCT`, and a [`MetadataStore`](graphkiln_core::MetadataStore) that
//! keeps sync records in a named graph of the same store.

pub mod client;
pub mod error;
pub mod metadata_store;
pub mod ntriples;
pub mod results;
pub mod update;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use client::{SparqlClient, SparqlEndpoint};
pub use error::{is_transient_status, SparqlError, SparqlResult};
pub use metadata_store::{
    SparqlBackendFactory, SparqlBackendSettings, SparqlMetadataStore, SPARQL_BACKEND,
};
pub use ntriples::parse_ntriples;
pub use results::SelectResults;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryTripleStore;
