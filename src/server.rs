//! HTTP boundary for the dashboard.
//!
//! `POST /api/analysis` answers 200 with an [`AnalysisResult`] for every
//! readable request, degraded ones included. Only a body that cannot be
//! read as a question gets a 400.

use crate::analysis::Pipeline;
use crate::models::{AnalysisRequest, AnalysisResult, Identity};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Name of the session cookie carrying the actor (`{"id": n}`).
const SESSION_COOKIE: &str = "user";

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(alias = "question")]
    prompt: String,
}

/// Build the application router.
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/api/analysis", post(analyze))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(pipeline: Pipeline, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!(
        "Serving analyses with {} on http://{}",
        pipeline.generator_label(),
        listener.local_addr()?
    );

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn analyze(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<AnalysisResult>) {
    let question = match serde_json::from_slice::<AnalyzeBody>(&body) {
        Ok(body) if !body.prompt.trim().is_empty() => body.prompt,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AnalysisResult::degraded("question must not be empty")),
            )
        }
        Err(e) => {
            warn!("Rejecting unreadable analysis request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(AnalysisResult::degraded(format!("invalid request body: {}", e))),
            );
        }
    };

    let identity = identity_from_headers(&headers);
    let result = pipeline
        .run(&AnalysisRequest::new(question, identity))
        .await;

    (StatusCode::OK, Json(result))
}

/// Resolve the actor from the session cookie, anonymous when absent or unreadable.
fn identity_from_headers(headers: &HeaderMap) -> Identity {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| percent_decode(value))
        .map(|value| Identity::from_session_cookie(&value))
        .unwrap_or_default()
}

/// Cookie values set by the web app are percent-encoded JSON.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = (*bytes.get(i + 1)? as char).to_digit(16)?;
            let lo = (*bytes.get(i + 2)? as char).to_digit(16)?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::prompt::PromptComposer;
    use crate::config::SourcesConfig;
    use crate::llm::{GenerationError, TextGenerator};
    use crate::sources::DataGateway;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedGenerator(Result<&'static str, ()>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        fn describe(&self) -> String {
            "fixed:test".to_string()
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(GenerationError::Timeout(30)),
            }
        }
    }

    const ANSWER: &str = r#"{"widgets":[{"tipo":"explicacao","titulo":"Análise","dados":{"texto":"ok"}}]}"#;

    async fn app(generator: FixedGenerator) -> (Router, MockServer) {
        let sources = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&sources)
            .await;

        let gateway = DataGateway::new(SourcesConfig {
            base_url: sources.uri(),
            timeout_seconds: 1,
            ..Default::default()
        })
        .unwrap();
        let pipeline = Pipeline::new(gateway, PromptComposer::new("P", 10), Arc::new(generator));
        (router(pipeline), sources)
    }

    async fn post_analysis(router: Router, body: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/analysis")
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = router
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_analysis_success() {
        let (router, _sources) = app(FixedGenerator(Ok(ANSWER))).await;

        let (status, body) = post_analysis(router, r#"{"prompt": "vendas"}"#, None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("error").is_none());
        assert_eq!(body["widgets"][0]["tipo"], "explicacao");
    }

    #[tokio::test]
    async fn test_degraded_result_is_still_200() {
        let (router, _sources) = app(FixedGenerator(Err(()))).await;

        let (status, body) = post_analysis(router, r#"{"question": "vendas"}"#, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["widgets"], json!([]));
        assert_eq!(body["error"], "generation timed out after 30s");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (router, _sources) = app(FixedGenerator(Ok(ANSWER))).await;

        let (status, body) = post_analysis(router.clone(), "not json", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["widgets"], json!([]));
        assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));

        let (status, _) = post_analysis(router, r#"{"prompt": "  "}"#, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_session_cookie_scopes_sources() {
        let sources = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sankhya/pedidos/listar"))
            .and(header("cookie", r#"user={"id":31}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "NUNOTA": 1 }])))
            .expect(1)
            .mount(&sources)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&sources)
            .await;

        let gateway = DataGateway::new(SourcesConfig {
            base_url: sources.uri(),
            timeout_seconds: 1,
            ..Default::default()
        })
        .unwrap();
        let pipeline = Pipeline::new(
            gateway,
            PromptComposer::new("P", 10),
            Arc::new(FixedGenerator(Ok(ANSWER))),
        );

        let (status, _) = post_analysis(
            router(pipeline),
            r#"{"prompt": "pedidos"}"#,
            Some("theme=dark; user=%7B%22id%22%3A31%7D"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(identity_from_headers(&headers), Identity::Anonymous);

        headers.insert(COOKIE, HeaderValue::from_static(r#"user={"id":8}"#));
        assert_eq!(identity_from_headers(&headers), Identity::User(8));

        headers.insert(COOKIE, HeaderValue::from_static("user=%7B%22id%22%3A12%7D; a=b"));
        assert_eq!(identity_from_headers(&headers), Identity::User(12));

        headers.insert(COOKIE, HeaderValue::from_static("user=garbage"));
        assert_eq!(identity_from_headers(&headers), Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _sources) = app(FixedGenerator(Ok(ANSWER))).await;

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
