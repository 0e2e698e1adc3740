//! Concurrent data aggregation.
//!
//! All sources are requested at once and joined positionally. Each
//! source settles on its own: a failure or an unexpected body shape
//! yields an empty slot without affecting the others, so aggregation
//! itself never fails.

use crate::models::{AnalysisContext, Identity, SourceKind};
use crate::sources::DataGateway;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Gather every source for `identity` into a fresh context.
pub async fn aggregate(gateway: &DataGateway, identity: Identity) -> AnalysisContext {
    let (leads, partners, products, orders) = futures::join!(
        settle(gateway, SourceKind::Leads, identity),
        settle(gateway, SourceKind::Partners, identity),
        settle(gateway, SourceKind::Products, identity),
        settle(gateway, SourceKind::Orders, identity),
    );

    let context = AnalysisContext {
        leads,
        partners,
        products,
        orders,
    };

    let counts = context.record_counts();
    info!(
        "Aggregated {} records (leads {}, partners {}, products {}, orders {})",
        counts.total(),
        counts.leads,
        counts.partners,
        counts.products,
        counts.orders
    );

    context
}

/// Fetch one source, falling back to no records on any failure.
async fn settle(gateway: &DataGateway, source: SourceKind, identity: Identity) -> Vec<Value> {
    let body = match gateway.fetch(source, identity).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Source {} unavailable, continuing without it: {}", source, e);
            return Vec::new();
        }
    };

    let field = gateway.endpoint(source).field.as_deref();
    match coerce_records(body, field, source) {
        Some(records) => {
            debug!("Source {} returned {} records", source, records.len());
            records
        }
        None => {
            warn!("Source {} returned an unexpected shape, ignoring it", source);
            Vec::new()
        }
    }
}

/// Extract the record sequence from a source body.
///
/// Accepts a bare array, or an object holding an array under `field`
/// (falling back to the source's own name). Anything else is `None`.
pub fn coerce_records(body: Value, field: Option<&str>, source: SourceKind) -> Option<Vec<Value>> {
    match body {
        Value::Array(records) => Some(records),
        Value::Object(mut map) => {
            let key = field.unwrap_or_else(|| source.name());
            match map.remove(key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcesConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PATHS: [(SourceKind, &str); 4] = [
        (SourceKind::Leads, "/api/leads"),
        (SourceKind::Partners, "/api/sankhya/parceiros"),
        (SourceKind::Products, "/api/sankhya/produtos"),
        (SourceKind::Orders, "/api/sankhya/pedidos/listar"),
    ];

    fn healthy_body(source: SourceKind) -> Value {
        match source {
            SourceKind::Leads => json!([{ "nome": "Lead A" }, { "nome": "Lead B" }]),
            SourceKind::Partners => json!({ "parceiros": [{ "CODPARC": 1 }], "total": 1 }),
            SourceKind::Products => json!({ "produtos": [{ "CODPROD": 10 }, { "CODPROD": 11 }] }),
            SourceKind::Orders => json!([{ "NUNOTA": 500, "VLRNOTA": 1200.5 }]),
        }
    }

    fn expected_len(source: SourceKind) -> usize {
        match source {
            SourceKind::Leads => 2,
            SourceKind::Partners => 1,
            SourceKind::Products => 2,
            SourceKind::Orders => 1,
        }
    }

    fn gateway_for(base_url: String) -> DataGateway {
        DataGateway::new(SourcesConfig {
            base_url,
            timeout_seconds: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_coerce_bare_array() {
        let records = coerce_records(json!([1, 2, 3]), None, SourceKind::Leads).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_coerce_envelope_field() {
        let body = json!({ "parceiros": [{ "a": 1 }], "page": 1 });
        let records = coerce_records(body, Some("parceiros"), SourceKind::Partners).unwrap();
        assert_eq!(records, vec![json!({ "a": 1 })]);
    }

    #[test]
    fn test_coerce_envelope_falls_back_to_source_name() {
        let body = json!({ "orders": [{ "id": 1 }, { "id": 2 }] });
        let records = coerce_records(body, None, SourceKind::Orders).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_coerce_rejects_other_shapes() {
        assert!(coerce_records(json!({ "parceiros": "none" }), Some("parceiros"), SourceKind::Partners).is_none());
        assert!(coerce_records(json!({ "error": "x" }), None, SourceKind::Leads).is_none());
        assert!(coerce_records(json!("text"), None, SourceKind::Leads).is_none());
        assert!(coerce_records(Value::Null, None, SourceKind::Orders).is_none());
    }

    #[tokio::test]
    async fn test_every_failure_subset_keeps_other_slots() {
        for mask in 0u8..16 {
            let server = MockServer::start().await;

            for (bit, (source, route)) in PATHS.iter().enumerate() {
                let failing = mask & (1 << bit) != 0;
                let response = if failing {
                    ResponseTemplate::new(500)
                } else {
                    ResponseTemplate::new(200).set_body_json(healthy_body(*source))
                };
                Mock::given(method("GET"))
                    .and(path(*route))
                    .respond_with(response)
                    .mount(&server)
                    .await;
            }

            let context = aggregate(&gateway_for(server.uri()), Identity::User(3)).await;

            for (bit, (source, _)) in PATHS.iter().enumerate() {
                let failing = mask & (1 << bit) != 0;
                let expected = if failing { 0 } else { expected_len(*source) };
                assert_eq!(
                    context.slot(*source).len(),
                    expected,
                    "mask {:04b}, source {}",
                    mask,
                    source
                );
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_empty_context() {
        // Nothing listens on port 9 (discard) in test environments.
        let context = aggregate(&gateway_for("http://127.0.0.1:9".to_string()), Identity::Anonymous).await;
        assert_eq!(context, AnalysisContext::default());
    }

    #[tokio::test]
    async fn test_schema_drift_and_timeout_fall_back() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sankhya/parceiros"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(healthy_body(SourceKind::Partners))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sankhya/produtos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(healthy_body(SourceKind::Products)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sankhya/pedidos/listar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(healthy_body(SourceKind::Orders)))
            .mount(&server)
            .await;

        let context = aggregate(&gateway_for(server.uri()), Identity::Anonymous).await;

        assert!(context.leads.is_empty());
        assert!(context.partners.is_empty());
        assert_eq!(context.products.len(), 2);
        assert_eq!(context.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_sources_are_fetched_concurrently() {
        let server = MockServer::start().await;

        for (source, route) in PATHS {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(healthy_body(source))
                        .set_delay(Duration::from_millis(400)),
                )
                .mount(&server)
                .await;
        }

        let started = std::time::Instant::now();
        let context = aggregate(&gateway_for(server.uri()), Identity::Anonymous).await;
        let elapsed = started.elapsed();

        assert_eq!(context.record_counts().total(), 6);
        // Sequential fetching would take at least 1.6s.
        assert!(elapsed < Duration::from_millis(1400), "took {:?}", elapsed);
    }
}
