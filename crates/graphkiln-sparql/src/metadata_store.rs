//! Metadata records kept in a named graph of the triple store itself
//!
//! Each record becomes one subject, `<{base}record/{id}>`, carrying its id,
//! keyspace, JSON payload and update time. Only structural filters are
//! evaluated; field filters are reported as unsupported so callers fall back
//! to conservative behaviour.

use crate::client::{SparqlClient, SparqlEndpoint};
use crate::update::{graph_ref, insert_data};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graphkiln_config::{BackendConfig, CURRENT_SCHEMA_VERSION};
use graphkiln_core::storage::{
    BackendDescriptor, Capabilities, MetadataRecord, MetadataStore, RecordFilter, StoreError,
    StoreResult,
};
use graphkiln_core::{BackendFactory, ConfigurationError, FactoryContext, Term, Triple, Vocabulary};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry key of the SPARQL backend
pub const SPARQL_BACKEND: &str = "sparql";

const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

fn sparql_descriptor() -> BackendDescriptor {
    BackendDescriptor::new(
        SPARQL_BACKEND,
        1..=CURRENT_SCHEMA_VERSION,
        Capabilities::DURABLE | Capabilities::REMOTE,
    )
}

/// Predicate IRIs, derived once from the vocabulary
#[derive(Debug, Clone)]
struct Predicates {
    record_base: String,
    record_id: String,
    keyspace: String,
    payload: String,
    updated_at: String,
    schema_version: String,
}

impl Predicates {
    fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            record_base: vocabulary.term("record/"),
            record_id: vocabulary.term("recordId"),
            keyspace: vocabulary.term("keyspace"),
            payload: vocabulary.term("payload"),
            updated_at: vocabulary.term("updatedAt"),
            schema_version: vocabulary.term("recordSchemaVersion"),
        }
    }
}

/// [`MetadataStore`] backed by a SPARQL endpoint
pub struct SparqlMetadataStore {
    endpoint: Arc<dyn SparqlEndpoint>,
    graph: String,
    predicates: Predicates,
    closed: AtomicBool,
    descriptor: BackendDescriptor,
}

impl std::fmt::Debug for SparqlMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlMetadataStore")
            .field("graph", &self.graph)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl SparqlMetadataStore {
    /// Store records in `graph` through `endpoint`
    pub fn new(
        endpoint: Arc<dyn SparqlEndpoint>,
        graph: impl Into<String>,
        vocabulary: &Vocabulary,
    ) -> StoreResult<Self> {
        let graph = graph.into();
        graph_ref(&graph)?;
        Ok(Self {
            endpoint,
            graph,
            predicates: Predicates::new(vocabulary),
            closed: AtomicBool::new(false),
            descriptor: sparql_descriptor(),
        })
    }

    /// Named graph holding the records
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Check (or stamp, on an empty graph) the sync record schema version
    pub async fn ensure_record_schema(&self, expected: u32) -> StoreResult<()> {
        let query = format!(
            "SELECT ?version WHERE {{ GRAPH <{g}> {{ <{g}> <{p}> ?version }} }}",
            g = self.graph,
            p = self.predicates.schema_version,
        );
        let results = self.endpoint.select_results(&query).await?;
        let stored = results.values("version").next().map(str::to_string);

        match stored {
            None => {
                let stamp = Triple::new(
                    Term::iri(&self.graph),
                    Term::iri(&self.predicates.schema_version),
                    Term::literal(expected.to_string()),
                );
                self.endpoint.update(&insert_data(&self.graph, [&stamp])?).await?;
                debug!(version = expected, graph = %self.graph, "Stamped record schema version");
                Ok(())
            }
            Some(value) => {
                let found: u32 = value.parse().map_err(|_| {
                    StoreError::backend(format!("unreadable record schema version '{value}'"))
                })?;
                if found == expected {
                    Ok(())
                } else {
                    Err(StoreError::SchemaMismatch { found, expected })
                }
            }
        }
    }

    fn subject(&self, id: &str) -> String {
        format!("{}{}", self.predicates.record_base, urlencoding::encode(id))
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn delete_subject(&self, subject: &str) -> String {
        format!(
            "DELETE WHERE {{\n  GRAPH <{}> {{\n    <{subject}> ?p ?o .\n  }}\n}}",
            self.graph
        )
    }

    async fn ids_and_keyspaces(&self) -> StoreResult<Vec<(String, String)>> {
        let query = format!(
            "SELECT ?id ?keyspace WHERE {{ GRAPH <{}> {{ ?record <{}> ?id ; <{}> ?keyspace }} }} ORDER BY ?id",
            self.graph, self.predicates.record_id, self.predicates.keyspace,
        );
        let results = self.endpoint.select_results(&query).await?;
        Ok(results
            .rows()
            .filter_map(|row| {
                Some((row.get("id")?.value.clone(), row.get("keyspace")?.value.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl MetadataStore for SparqlMetadataStore {
    async fn save(&self, record: MetadataRecord) -> StoreResult<String> {
        self.ensure_open()?;
        let subject = self.subject(&record.id);
        let payload = serde_json::to_string(&record.payload)?;

        let node = Term::iri(&subject);
        let triples = [
            Triple::new(node.clone(), Term::iri(&self.predicates.record_id), Term::literal(&record.id)),
            Triple::new(node.clone(), Term::iri(&self.predicates.keyspace), Term::literal(&record.keyspace)),
            Triple::new(node.clone(), Term::iri(&self.predicates.payload), Term::literal(payload)),
            Triple::new(
                node,
                Term::iri(&self.predicates.updated_at),
                Term::typed_literal(record.updated_at.to_rfc3339(), XSD_DATE_TIME),
            ),
        ];

        let update = format!(
            "{} ;\n{}",
            self.delete_subject(&subject),
            insert_data(&self.graph, &triples)?
        );
        self.endpoint.update(&update).await?;
        Ok(record.id)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        self.ensure_open()?;
        let query = format!(
            "SELECT ?keyspace ?payload ?updated WHERE {{ GRAPH <{}> {{ <{}> <{}> ?keyspace ; <{}> ?payload ; <{}> ?updated }} }}",
            self.graph,
            self.subject(id),
            self.predicates.keyspace,
            self.predicates.payload,
            self.predicates.updated_at,
        );
        let results = self.endpoint.select_results(&query).await?;
        let Some(row) = results.rows().next() else {
            return Ok(None);
        };

        let field = |name: &str| {
            row.get(name)
                .map(|binding| binding.value.as_str())
                .ok_or_else(|| StoreError::serialization(format!("record {id}: missing {name}")))
        };
        let payload = serde_json::from_str(field("payload")?)
            .map_err(|e| StoreError::serialization(format!("record {id}: {e}")))?;
        let updated_at = DateTime::parse_from_rfc3339(field("updated")?)
            .map_err(|e| StoreError::serialization(format!("record {id}: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(MetadataRecord {
            id: id.to_string(),
            keyspace: field("keyspace")?.to_string(),
            payload,
            updated_at,
        }))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .ids_and_keyspaces()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    async fn search(&self, filter: &RecordFilter) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        if filter.requires_field_filters() {
            return Err(StoreError::unsupported(
                "the sparql backend does not evaluate field filters",
            ));
        }
        Ok(self
            .ids_and_keyspaces()
            .await?
            .into_iter()
            .filter(|(id, keyspace)| {
                filter.matches(&MetadataRecord::new(
                    id.clone(),
                    keyspace.clone(),
                    serde_json::Value::Null,
                ))
            })
            .map(|(id, _)| id)
            .collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.endpoint.update(&self.delete_subject(&self.subject(id))).await?;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(graph = %self.graph, "SPARQL metadata store closed");
        }
        Ok(())
    }

    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }
}

/// `[backend.settings]` for the sparql backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparqlBackendSettings {
    /// Graph the records live in; defaults to `{base}metadata`
    pub metadata_graph: Option<String>,
}

/// Builds a [`SparqlMetadataStore`] on the configured endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct SparqlBackendFactory;

impl SparqlBackendFactory {
    fn settings(config: &BackendConfig) -> Result<SparqlBackendSettings, ConfigurationError> {
        config
            .settings_as::<SparqlBackendSettings>()
            .map_err(|e| invalid_settings(e.to_string()))
    }
}

fn invalid_settings(reason: String) -> ConfigurationError {
    ConfigurationError::InvalidSettings {
        type_key: SPARQL_BACKEND.to_string(),
        reason,
    }
}

#[async_trait]
impl BackendFactory for SparqlBackendFactory {
    fn descriptor(&self) -> BackendDescriptor {
        sparql_descriptor()
    }

    fn validate(&self, config: &BackendConfig) -> Result<(), ConfigurationError> {
        if let Some(graph) = Self::settings(config)?.metadata_graph {
            graph_ref(&graph).map_err(|e| invalid_settings(e.to_string()))?;
        }
        Ok(())
    }

    async fn create(
        &self,
        context: &FactoryContext<'_>,
    ) -> Result<Arc<dyn MetadataStore>, ConfigurationError> {
        let construction = |source: StoreError| ConfigurationError::Construction {
            type_key: SPARQL_BACKEND.to_string(),
            source,
        };

        let settings = Self::settings(context.backend())?;
        let graph = settings
            .metadata_graph
            .unwrap_or_else(|| context.vocabulary.term("metadata"));
        let client = SparqlClient::from_config(&context.config.endpoint)
            .map_err(|e| construction(StoreError::from(e)))?;

        let store = SparqlMetadataStore::new(Arc::new(client), graph, &context.vocabulary)
            .map_err(construction)?;
        store
            .ensure_record_schema(context.backend().schema_version)
            .await
            .map_err(construction)?;

        info!(graph = %store.graph(), "SPARQL metadata store ready");
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_config(settings: &str) -> BackendConfig {
        BackendConfig {
            type_key: SPARQL_BACKEND.to_string(),
            schema_version: 1,
            settings: toml::from_str(settings).unwrap(),
        }
    }

    #[test]
    fn test_validate_settings() {
        let factory = SparqlBackendFactory;
        assert!(factory.validate(&backend_config("")).is_ok());
        assert!(factory
            .validate(&backend_config("metadata_graph = \"urn:graphkiln:meta\""))
            .is_ok());
        assert!(factory
            .validate(&backend_config("metadata_graph = \"not a graph\""))
            .is_err());
        assert!(factory.validate(&backend_config("graph = \"urn:x\"")).is_err());
    }

    #[test]
    fn test_descriptor() {
        let descriptor = SparqlBackendFactory.descriptor();
        assert!(descriptor.has(Capabilities::REMOTE));
        assert!(!descriptor.has(Capabilities::FIELD_FILTERS));
        assert!(descriptor.supports_version(CURRENT_SCHEMA_VERSION));
    }
}
