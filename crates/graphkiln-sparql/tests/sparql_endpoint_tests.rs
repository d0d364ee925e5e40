//! HTTP-level tests against a mock SPARQL endpoint

use graphkiln_config::{EndpointConfig, GraphkilnConfig};
use graphkiln_core::{
    BackendFactory, ConfigurationError, FactoryContext, MetadataRecord, MetadataStore,
    RecordFilter, StoreError, Term, Triple, Vocabulary,
};
use graphkiln_sparql::{
    SparqlBackendFactory, SparqlClient, SparqlEndpoint, SparqlError, SparqlMetadataStore,
    SPARQL_BACKEND,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> EndpointConfig {
    EndpointConfig {
        query_url: format!("{}/kiln/query", server.uri()),
        update_url: format!("{}/kiln/update", server.uri()),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn client(server: &MockServer) -> SparqlClient {
    SparqlClient::from_config(&endpoint(server)).unwrap()
}

fn select_body(rows: serde_json::Value) -> String {
    json!({"head": {"vars": []}, "results": {"bindings": rows}}).to_string()
}

#[tokio::test]
async fn test_update_sends_sparql_update_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/update"))
        .and(header("content-type", "application/sparql-update"))
        .and(basic_auth("admin", "secret"))
        .and(body_string_contains("INSERT DATA"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = EndpointConfig {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        ..endpoint(&server)
    };
    let client = SparqlClient::from_config(&config).unwrap();
    client
        .update("INSERT DATA {\n  GRAPH <urn:g> {\n    <urn:a> <urn:p> <urn:b> .\n  }\n}")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/update"))
        .and(body_string_contains("busy"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kiln/update"))
        .and(body_string_contains("broken"))
        .respond_with(ResponseTemplate::new(400).set_body_string("parse error"))
        .mount(&server)
        .await;

    let client = client(&server);

    let err = client.update("# busy").await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(&err, SparqlError::Status { status: 503, message } if message == "overloaded"));

    let err = client.update("# broken").await.unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    // Non-pooled server so dropping it actually closes the port.
    let server = MockServer::builder().start().await;
    let config = endpoint(&server);
    drop(server);

    let client = SparqlClient::from_config(&config).unwrap();
    let err = client.update("# nobody home").await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn test_fetch_graph_parses_construct_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .and(header("content-type", "application/sparql-query"))
        .and(header("accept", "application/n-triples"))
        .and(body_string_contains("GRAPH <urn:g>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<urn:doc:d1> <urn:p:title> \"Y\" .\n<urn:doc:d1> <urn:p:mentions> <https://graphkiln.dev/entity/person/ada> .\n",
        ))
        .mount(&server)
        .await;

    let graph = client(&server).fetch_graph("urn:g").await.unwrap();
    assert_eq!(graph.graph_uri, "urn:g");
    assert_eq!(graph.len(), 2);
    assert!(graph.contains(&Triple::new(
        Term::iri("urn:doc:d1"),
        Term::iri("urn:p:title"),
        Term::literal("Y"),
    )));
}

fn metadata_store(server: &MockServer) -> SparqlMetadataStore {
    let vocabulary = Vocabulary::from_config(&Default::default());
    SparqlMetadataStore::new(Arc::new(client(server)), "urn:graphkiln:meta", &vocabulary).unwrap()
}

#[tokio::test]
async fn test_metadata_store_save_replaces_subject() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/update"))
        .and(body_string_contains("DELETE WHERE"))
        .and(body_string_contains("<https://graphkiln.dev/ns#record/sync_record%2Fd1>"))
        .and(body_string_contains("\"sync_record\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = metadata_store(&server);
    let id = store
        .save(MetadataRecord::new("sync_record/d1", "sync_record", json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(id, "sync_record/d1");
}

#[tokio::test]
async fn test_metadata_store_get_and_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .and(body_string_contains("?payload"))
        .respond_with(ResponseTemplate::new(200).set_body_string(select_body(json!([{
            "keyspace": {"type": "literal", "value": "sync_record"},
            "payload": {"type": "literal", "value": "{\"n\":1}"},
            "updated": {"type": "literal", "value": "2026-01-02T03:04:05+00:00",
                        "datatype": "http://www.w3.org/2001/XMLSchema#dateTime"}
        }]))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .and(body_string_contains("ORDER BY ?id"))
        .respond_with(ResponseTemplate::new(200).set_body_string(select_body(json!([
            {"id": {"type": "literal", "value": "entity_ref/d1/ab"}, "keyspace": {"type": "literal", "value": "entity_ref"}},
            {"id": {"type": "literal", "value": "sync_record/d1"}, "keyspace": {"type": "literal", "value": "sync_record"}},
            {"id": {"type": "literal", "value": "sync_record/d2"}, "keyspace": {"type": "literal", "value": "sync_record"}}
        ]))))
        .mount(&server)
        .await;

    let store = metadata_store(&server);

    let record = store.get("sync_record/d1").await.unwrap().unwrap();
    assert_eq!(record.keyspace, "sync_record");
    assert_eq!(record.payload, json!({"n": 1}));
    assert_eq!(record.updated_at.to_rfc3339(), "2026-01-02T03:04:05+00:00");

    assert_eq!(store.list().await.unwrap().len(), 3);
    assert_eq!(
        store.search(&RecordFilter::keyspace("sync_record")).await.unwrap(),
        vec!["sync_record/d1".to_string(), "sync_record/d2".to_string()]
    );

    let err = store
        .search(&RecordFilter::field_eq("entity", json!("E")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));

    store.close().await.unwrap();
    assert_eq!(store.get("sync_record/d1").await.unwrap_err(), StoreError::Closed);
}

#[tokio::test]
async fn test_get_absent_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(select_body(json!([]))))
        .mount(&server)
        .await;

    assert!(metadata_store(&server).get("nope").await.unwrap().is_none());
}

fn graphkiln_config(server: &MockServer) -> GraphkilnConfig {
    let mut config = GraphkilnConfig {
        endpoint: endpoint(server),
        ..Default::default()
    };
    config.backend.type_key = SPARQL_BACKEND.to_string();
    config
}

#[tokio::test]
async fn test_factory_stamps_fresh_metadata_graph() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .and(body_string_contains("recordSchemaVersion"))
        .respond_with(ResponseTemplate::new(200).set_body_string(select_body(json!([]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kiln/update"))
        .and(body_string_contains("GRAPH <https://graphkiln.dev/ns#metadata>"))
        .and(body_string_contains("\"1\""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = graphkiln_config(&server);
    let context = FactoryContext {
        config: &config,
        vocabulary: Arc::new(Vocabulary::from_config(&config.vocabulary)),
    };
    let store = SparqlBackendFactory.create(&context).await.unwrap();
    assert_eq!(store.descriptor().type_key, SPARQL_BACKEND);
}

#[tokio::test]
async fn test_factory_rejects_other_schema_version() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kiln/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(select_body(json!([
            {"version": {"type": "literal", "value": "7"}}
        ]))))
        .mount(&server)
        .await;

    let config = graphkiln_config(&server);
    let context = FactoryContext {
        config: &config,
        vocabulary: Arc::new(Vocabulary::from_config(&config.vocabulary)),
    };
    let Err(err) = SparqlBackendFactory.create(&context).await else {
        panic!("endpoint stamped with schema 7 was accepted");
    };
    assert!(matches!(
        err,
        ConfigurationError::Construction {
            source: StoreError::SchemaMismatch { found: 7, expected: 1 },
            ..
        }
    ));
}
