#![allow(clippy::unwrap_used)]
// Integration tests for `AlertClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skywatch_api::{AlertClient, AlertQuery, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AlertClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = AlertClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn alert_json(id: u64, alert_type: &str, city: &str) -> serde_json::Value {
    json!({
        "id": id,
        "alert_type": alert_type,
        "threshold_value": 35.0,
        "actual_value": 41.5,
        "city": city,
        "message": format!("{alert_type} alert in {city}"),
        "is_resolved": false,
        "created_at": "2024-06-15T10:30:00",
        "resolved_at": null
    })
}

// ── Query tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_alerts() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .and(query_param("hours", "24"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            alert_json(2, "temperature", "Dubai"),
            alert_json(1, "aqi", "Delhi"),
        ])))
        .mount(&server)
        .await;

    let alerts = client.list_alerts(&AlertQuery::default()).await.unwrap();

    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].id.as_deref(), Some("2"));
    assert_eq!(alerts[0].city, "Dubai");
    assert_eq!(alerts[1].alert_type, "aqi");
    assert_eq!(alerts[1].actual_value, Some(41.5));
}

#[tokio::test]
async fn test_list_alerts_sends_filter() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .and(query_param("alert_type", "humidity"))
        .and(query_param("resolved", "false"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([alert_json(5, "humidity", "Singapore")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let query = AlertQuery {
        alert_type: Some("humidity".into()),
        resolved: Some(false),
        ..AlertQuery::default()
    };
    let alerts = client.list_alerts(&query).await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "humidity");
}

#[tokio::test]
async fn test_list_alerts_drops_malformed_items() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            alert_json(3, "temperature", "Paris"),
            { "id": 4, "city": "Paris" },
            { "id": 5, "alert_type": "humidity", "city": "Oslo", "message": "m", "created_at": "not a time" },
        ])))
        .mount(&server)
        .await;

    let alerts = client.list_alerts(&AlertQuery::default()).await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_list_alerts_non_array_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "alerts": [] })))
        .mount(&server)
        .await;

    let result = client.list_alerts(&AlertQuery::default()).await;

    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_list_alerts_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "database unavailable" })),
        )
        .mount(&server)
        .await;

    let err = client.list_alerts(&AlertQuery::default()).await.unwrap_err();

    match err {
        Error::Api { status, ref message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
    assert!(err.is_transient());
}

// ── Resolve tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_resolve_alert() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/alerts/42/resolve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Alert 42 resolved successfully",
            "resolved_at": "2024-06-15T11:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    client.resolve_alert("42").await.unwrap();
}

#[tokio::test]
async fn test_resolve_alert_id_stays_one_segment() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/alerts/site%2F7/resolve"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.resolve_alert("site/7").await.unwrap();
}

#[tokio::test]
async fn test_resolve_alert_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/alerts/999/resolve"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Alert not found" })))
        .mount(&server)
        .await;

    let result = client.resolve_alert("999").await;

    assert!(
        matches!(result, Err(Error::NotFound { ref id }) if id == "999"),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn test_resolve_alert_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/alerts/7/resolve"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = client.resolve_alert("7").await;

    assert!(
        matches!(result, Err(Error::Api { status: 503, ref message }) if message == "maintenance"),
        "expected Api 503, got: {result:?}"
    );
}

// ── Stats tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_alert_stats() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/stats"))
        .and(query_param("hours", "12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_alerts": 9,
            "resolved_alerts": 4,
            "unresolved_alerts": 5,
            "by_type": { "temperature": 5, "humidity": 3, "aqi": 1 }
        })))
        .mount(&server)
        .await;

    let stats = client.alert_stats(12).await.unwrap();

    assert_eq!(stats.total_alerts, 9);
    assert_eq!(stats.resolved_alerts, 4);
    assert_eq!(stats.unresolved_alerts, 5);
    assert_eq!(stats.by_type.aqi, 1);
}

// ── Transport tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts/stats"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_alerts": 0,
            "resolved_alerts": 0,
            "unresolved_alerts": 0,
            "by_type": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TransportConfig {
        bearer_token: Some("s3cret".to_string().into()),
        ..TransportConfig::default()
    };
    let client = AlertClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    let stats = client.alert_stats(24).await.unwrap();
    assert_eq!(stats.total_alerts, 0);
}
