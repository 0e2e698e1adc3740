//! HTTP gateway to the business API.
//!
//! Every call is independent and never panics: transport, status and
//! decode problems come back as a [`SourceError`] for the aggregator to
//! absorb. No retries happen here.

use crate::config::{EndpointConfig, SourcesConfig};
use crate::models::{Identity, SourceKind};
use anyhow::{Context, Result};
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single source fetch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Uniform async accessor to the four business sources.
#[derive(Debug, Clone)]
pub struct DataGateway {
    client: reqwest::Client,
    config: SourcesConfig,
}

impl DataGateway {
    /// Create a gateway whose requests each time out after the configured duration.
    pub fn new(config: SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client for data sources")?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self, source: SourceKind) -> &EndpointConfig {
        self.config.endpoint(source)
    }

    /// Absolute URL of a source for the given actor.
    pub fn endpoint_url(&self, source: SourceKind, identity: Identity) -> String {
        let path = self
            .endpoint(source)
            .path
            .replace("{user_id}", &identity.scope_id().to_string())
            .replace("{page_size}", &self.config.page_size.to_string());

        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Fetch one source and decode its body as JSON.
    pub async fn fetch(&self, source: SourceKind, identity: Identity) -> Result<Value, SourceError> {
        let url = self.endpoint_url(source, identity);
        debug!("Fetching {} from {}", source, url);

        // The business API reads the actor from the session cookie.
        let cookie = format!("user={}", json!({ "id": identity.scope_id() }));

        let response = self
            .client
            .get(&url)
            .header(COOKIE, cookie)
            .send()
            .await
            .map_err(|e| self.classify(e, SourceError::Transport))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.classify(e, SourceError::Decode))
    }

    fn classify(
        &self,
        error: reqwest::Error,
        otherwise: fn(reqwest::Error) -> SourceError,
    ) -> SourceError {
        if error.is_timeout() {
            SourceError::Timeout(self.config.timeout_seconds)
        } else {
            otherwise(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> DataGateway {
        DataGateway::new(SourcesConfig {
            base_url: server.uri(),
            timeout_seconds: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_url_placeholders() {
        let gateway = DataGateway::new(SourcesConfig {
            base_url: "http://erp:5000/".to_string(),
            page_size: 25,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            gateway.endpoint_url(SourceKind::Orders, Identity::User(9)),
            "http://erp:5000/api/sankhya/pedidos/listar?userId=9"
        );
        assert_eq!(
            gateway.endpoint_url(SourceKind::Products, Identity::Anonymous),
            "http://erp:5000/api/sankhya/produtos?page=1&pageSize=25"
        );
    }

    #[tokio::test]
    async fn test_fetch_sends_identity_cookie() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/leads"))
            .and(header("cookie", r#"user={"id":42}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .mount(&server)
            .await;

        let body = gateway_for(&server)
            .fetch(SourceKind::Leads, Identity::User(42))
            .await
            .unwrap();
        assert_eq!(body, json!([{ "id": 1 }]));
    }

    #[tokio::test]
    async fn test_fetch_orders_scoped_by_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/sankhya/pedidos/listar"))
            .and(query_param("userId", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let body = gateway_for(&server)
            .fetch(SourceKind::Orders, Identity::Anonymous)
            .await
            .unwrap();
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .fetch(SourceKind::Partners, Identity::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_fetch_invalid_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .fetch(SourceKind::Products, Identity::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .fetch(SourceKind::Leads, Identity::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(1)));
    }
}
