#![allow(clippy::unwrap_used, clippy::float_cmp)]
// Integration tests for `ResilientQueryClient`: a wiremock middleware as
// the primary tier and a second wiremock server as the storage tier.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homelink_api::{MiddlewareClient, StorageClient, TransportConfig};
use homelink_core::{
    AggQuery, CoreError, RawQuery, ResilientQueryClient, SensorKind, SortOrder,
    model::SummarySource,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, MockServer, ResilientQueryClient) {
    let middleware_server = MockServer::start().await;
    let storage_server = MockServer::start().await;

    let middleware = MiddlewareClient::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("{}/", middleware_server.uri())).unwrap(),
    );
    let storage = StorageClient::new(
        &Url::parse(&storage_server.uri()).unwrap(),
        &SecretString::from("anon-key".to_owned()),
        &TransportConfig::default(),
    )
    .unwrap();

    let client = ResilientQueryClient::new(middleware, Some(storage));
    (middleware_server, storage_server, client)
}

fn reading(sensor_type: &str, value: f64) -> serde_json::Value {
    json!({
        "device_id": "env-1",
        "sensor_type": sensor_type,
        "value": value,
        "unit": "C",
        "timestamp": "2025-03-01T08:00:00Z"
    })
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_devices_from_primary_skip_fallback() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                { "id": 1, "device_id": "lamp-1" },
                { "id": 2, "device_id": "lamp-2" },
                { "id": 3, "device_id": "env-1" }
            ],
            "count": 3
        })))
        .expect(1)
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&storage)
        .await;

    let devices = client.get_devices().await.unwrap();
    assert_eq!(devices.len(), 3);
    assert_eq!(devices[2].broker_id(), "env-1");
}

#[tokio::test]
async fn test_devices_fall_back_when_list_missing() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("select", "*"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 7, "name": "Fan" }])),
        )
        .expect(1)
        .mount(&storage)
        .await;

    let devices = client.get_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "7");
}

#[tokio::test]
async fn test_devices_fall_back_to_empty_list_on_error() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&storage)
        .await;

    assert!(client.get_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_devices_double_failure_reports_storage_error() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid API key" })),
        )
        .mount(&storage)
        .await;

    let err = client.get_devices().await.unwrap_err();
    assert!(matches!(err, CoreError::Query { .. }));
    assert!(err.to_string().contains("Invalid API key"), "{err}");
}

#[tokio::test]
async fn test_get_device_matches_broker_id() {
    let (mw, _storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "id": 1, "device_id": "lamp-1", "name": "Desk" }]
        })))
        .mount(&mw)
        .await;

    let found = client.get_device("lamp-1").await.unwrap().unwrap();
    assert_eq!(found.name.as_deref(), Some("Desk"));
    assert!(client.get_device("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_device_falls_back_to_storage_lookup() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/devices"))
        .and(query_param("id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 5 }])))
        .expect(1)
        .mount(&storage)
        .await;

    assert_eq!(client.get_device("5").await.unwrap().unwrap().id, "5");
}

// ── Sensors ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_latest_sensor_from_primary() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .and(query_param("sensor_type", "temperature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [reading("temperature", 21.5)],
            "count": 1
        })))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&storage)
        .await;

    let r = client.latest_sensor_value("temperature").await.unwrap().unwrap();
    assert!((r.value - 21.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_latest_sensor_falls_back_with_aliases() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [], "count": 0 })))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sensor_data"))
        .and(query_param("sensor_type", "in.(humidity,湿度)"))
        .and(query_param("order", "timestamp.desc"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([reading("湿度", 48.0)])))
        .expect(1)
        .mount(&storage)
        .await;

    let r = client.latest_sensor_value("humidity").await.unwrap().unwrap();
    assert_eq!(r.sensor_type, "湿度");
}

#[tokio::test]
async fn test_summary_uses_aggregate_endpoint() {
    let (mw, _storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "temperature": [reading("temperature", 22.0)],
            "humidity": [reading("humidity", 40.0)],
            "gas": [],
            "timestamp": "2025-03-01T08:00:00Z"
        })))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mw)
        .await;

    let summary = client.sensor_summary().await.unwrap();
    assert_eq!(summary.source, SummarySource::Aggregate);
    assert_eq!(summary.latest_value(SensorKind::Temperature), Some(22.0));
    assert_eq!(summary.get(SensorKind::Gas).map(<[_]>::len), Some(0));
    assert!(!summary.is_partial());
}

#[tokio::test]
async fn test_summary_collects_partial_failures() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/summary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .and(query_param("sensor_type", "temperature"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [reading("temperature", 19.0)]
        })))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .and(query_param("sensor_type", "humidity"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/sensor/latest"))
        .and(query_param("sensor_type", "gas"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sensor_data"))
        .and(query_param("sensor_type", "in.(humidity,湿度)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([reading("humidity", 55.0)])))
        .mount(&storage)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/sensor_data"))
        .and(query_param("sensor_type", "in.(gas,可燃气体,煤气浓度)"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&storage)
        .await;

    let summary = client.sensor_summary().await.unwrap();
    assert_eq!(summary.source, SummarySource::PerKind);
    assert_eq!(summary.latest_value(SensorKind::Temperature), Some(19.0));
    assert_eq!(summary.latest_value(SensorKind::Humidity), Some(55.0));
    assert!(summary.gas.is_none());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, SensorKind::Gas);
}

#[tokio::test]
async fn test_summary_fails_when_every_kind_fails() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&storage)
        .await;

    let err = client.sensor_summary().await.unwrap_err();
    assert!(matches!(err, CoreError::Query { .. }));
}

// ── History ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_has_no_fallback() {
    let (mw, storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/history/raw"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mw)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&storage)
        .await;

    let err = client
        .sensor_history_raw(&RawQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Query { .. }));
}

#[tokio::test]
async fn test_history_raw_passes_parameters() {
    let (mw, _storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/history/raw"))
        .and(query_param("device_id", "env-1"))
        .and(query_param("order", "desc"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [reading("gas", 3.0), reading("gas", 2.0)],
            "count": 2
        })))
        .mount(&mw)
        .await;

    let rows = client
        .sensor_history_raw(&RawQuery {
            device_id: Some("env-1".into()),
            order: SortOrder::Desc,
            limit: Some(2),
            ..RawQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_history_raw_rejects_bad_limit() {
    let (_mw, _storage, client) = setup().await;
    for limit in [0, 10_001] {
        let err = client
            .sensor_history_raw(&RawQuery {
                limit: Some(limit),
                ..RawQuery::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }
}

#[tokio::test]
async fn test_history_agg_buckets() {
    let (mw, _storage, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sensor/history/agg"))
        .and(query_param("bucket", "15m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "bucket": "2025-03-01T08:00:00Z", "avg": 21.0, "min": 20.5, "max": 21.4, "count": 12 }
            ],
            "bucket": "15m"
        })))
        .mount(&mw)
        .await;

    let buckets = client
        .sensor_history_agg(&AggQuery {
            bucket: "15m".into(),
            ..AggQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].count, Some(12));
}
