#![allow(clippy::unwrap_used)]
// Integration tests for `StorageClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homelink_api::{Error, StorageClient, TransportConfig, sensor_aliases};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, StorageClient) {
    let server = MockServer::start().await;
    let client = StorageClient::new(
        &Url::parse(&server.uri()).unwrap(),
        &SecretString::from("anon-key".to_owned()),
        &TransportConfig::default(),
    )
    .unwrap();
    (server, client)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_sends_auth_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("select", "*"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "device_id": "lamp-1", "name": "Desk" },
            { "id": 2, "device_id": "fan-1", "name": "Fan" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].broker_id(), "fan-1");
}

#[tokio::test]
async fn test_cloned_client_keeps_auth_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let clone = client.clone();
    drop(client);
    assert!(clone.list_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_device_filters_by_id() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("id", "eq.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "name": "Porch light", "type": "light" }
        ])))
        .mount(&server)
        .await;

    let found = client.get_device("7").await.unwrap().unwrap();
    assert_eq!(found.name.as_deref(), Some("Porch light"));
}

#[tokio::test]
async fn test_get_device_missing_is_none() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(client.get_device("404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_latest_by_types_uses_alias_filter() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/sensor_data"))
        .and(query_param("sensor_type", "in.(gas,可燃气体,煤气浓度)"))
        .and(query_param("order", "timestamp.desc"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device_id": "kitchen", "sensor_type": "煤气浓度", "value": 3.2,
              "timestamp": "2025-03-01T08:00:00+00:00" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client.latest_by_types(&sensor_aliases("gas")).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].device_id.as_deref(), Some("kitchen"));
}

#[tokio::test]
async fn test_postgrest_error_message() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Invalid API key", "hint": "check apikey header"
        })))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Status { status: 401, ref message, .. } if message == "Invalid API key"
    ));
}
