//! SPARQL 1.1 Protocol client

use crate::error::{SparqlError, SparqlResult};
use crate::ntriples::parse_ntriples;
use crate::results::SelectResults;
use crate::update::construct_graph;
use async_trait::async_trait;
use graphkiln_config::EndpointConfig;
use graphkiln_core::TripleSet;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, instrument};

/// The operations the sync engine needs from a triple store
#[async_trait]
pub trait SparqlEndpoint: Send + Sync {
    /// Execute a SPARQL Update request
    async fn update(&self, update: &str) -> SparqlResult<()>;

    /// Execute a `CONSTRUCT` query, returning N-Triples
    async fn construct(&self, query: &str) -> SparqlResult<String>;

    /// Execute a `SELECT` query, returning results JSON
    async fn select(&self, query: &str) -> SparqlResult<String>;

    /// Read back every triple in a named graph
    async fn fetch_graph(&self, graph_uri: &str) -> SparqlResult<TripleSet> {
        let body = self.construct(&construct_graph(graph_uri)?).await?;
        parse_ntriples(&body, graph_uri)
    }

    /// Run a `SELECT` and parse the response
    async fn select_results(&self, query: &str) -> SparqlResult<SelectResults> {
        SelectResults::parse(&self.select(query).await?)
    }
}

#[async_trait]
impl<T: SparqlEndpoint + ?Sized> SparqlEndpoint for std::sync::Arc<T> {
    async fn update(&self, update: &str) -> SparqlResult<()> {
        (**self).update(update).await
    }

    async fn construct(&self, query: &str) -> SparqlResult<String> {
        (**self).construct(query).await
    }

    async fn select(&self, query: &str) -> SparqlResult<String> {
        (**self).select(query).await
    }
}

/// HTTP client for a remote SPARQL endpoint
#[derive(Clone)]
pub struct SparqlClient {
    client: Client,
    config: EndpointConfig,
}

impl std::fmt::Debug for SparqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlClient")
            .field("query_url", &self.config.query_url)
            .field("update_url", &self.config.update_url)
            .field("authenticated", &self.config.credentials().is_some())
            .finish()
    }
}

impl SparqlClient {
    /// Build a client from `[endpoint]`
    pub fn from_config(config: &EndpointConfig) -> SparqlResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10).min(config.timeout()))
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Endpoint settings
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn auth_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.credentials() {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> SparqlResult<Response> {
        let response = self.auth_headers(builder).send().await.map_err(|e| {
            if e.is_connect() {
                SparqlError::Connection(e.to_string())
            } else {
                SparqlError::Http(e)
            }
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(SparqlError::Status { status, message })
        }
    }

    async fn query(&self, query: &str, accept: &str) -> SparqlResult<String> {
        let response = self
            .send(
                self.client
                    .post(&self.config.query_url)
                    .header("Content-Type", "application/sparql-query")
                    .header("Accept", accept)
                    .body(query.to_string()),
            )
            .await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SparqlEndpoint for SparqlClient {
    #[instrument(skip_all, fields(bytes = update.len()))]
    async fn update(&self, update: &str) -> SparqlResult<()> {
        self.send(
            self.client
                .post(&self.config.update_url)
                .header("Content-Type", "application/sparql-update")
                .body(update.to_string()),
        )
        .await?;
        debug!("Update applied");
        Ok(())
    }

    async fn construct(&self, query: &str) -> SparqlResult<String> {
        self.query(query, "application/n-triples").await
    }

    async fn select(&self, query: &str) -> SparqlResult<String> {
        self.query(query, "application/sparql-results+json").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_credentials() {
        let config = EndpointConfig {
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let client = SparqlClient::from_config(&config).unwrap();
        let rendered = format!("{client:?}");
        assert!(rendered.contains("authenticated: true"));
        assert!(!rendered.contains("hunter2"));
    }
}
