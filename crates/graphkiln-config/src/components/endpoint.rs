//! Remote SPARQL endpoint configuration
//!
//! Query and update endpoints are configured separately because most triple
//! stores expose them on different paths (Fuseki: `/ds/query` vs `/ds/update`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote triple store endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    /// SPARQL query endpoint (SELECT / CONSTRUCT)
    pub query_url: String,

    /// SPARQL update endpoint (DELETE DATA / INSERT DATA)
    pub update_url: String,

    /// Basic auth username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password
    ///
    /// Prefer `GRAPHKILN_ENDPOINT_PASSWORD` over storing this in the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Whether the store applies a multi-operation update request atomically
    ///
    /// When false, deletes and inserts are sent as two separate requests.
    pub atomic_updates: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            query_url: "http://localhost:3030/kiln/query".to_string(),
            update_url: "http://localhost:3030/kiln/update".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
            atomic_updates: true,
        }
    }
}

impl EndpointConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credentials, only when both halves are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub(crate) fn validate(&self, problems: &mut Vec<String>) {
        for (name, value) in [("query_url", &self.query_url), ("update_url", &self.update_url)] {
            match url::Url::parse(value) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => problems.push(format!(
                    "endpoint.{name} must use http or https, got '{}'",
                    parsed.scheme()
                )),
                Err(e) => problems.push(format!("endpoint.{name} is not a valid URL: {e}")),
            }
        }
        if self.timeout_secs == 0 {
            problems.push("endpoint.timeout_secs must be greater than 0".to_string());
        }
        if self.username.is_some() != self.password.is_some() {
            problems.push("endpoint.username and endpoint.password must be set together".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_is_valid() {
        let mut problems = Vec::new();
        EndpointConfig::default().validate(&mut problems);
        assert!(problems.is_empty(), "{problems:?}");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = EndpointConfig {
            update_url: "ftp://example.org/update".to_string(),
            ..Default::default()
        };
        let mut problems = Vec::new();
        config.validate(&mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("update_url"));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let config = EndpointConfig {
            username: Some("admin".to_string()),
            ..Default::default()
        };
        let mut problems = Vec::new();
        config.validate(&mut problems);
        assert!(problems.iter().any(|p| p.contains("set together")));
        assert!(config.credentials().is_none());
    }
}
