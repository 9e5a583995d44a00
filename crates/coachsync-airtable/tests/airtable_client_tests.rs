//! HTTP-level tests for `AirtableClient` against a local stand-in server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use coachsync_airtable::{AirtableClient, AirtableConfig};
use coachsync_core::error::ExternalStoreError;
use coachsync_core::external::{ExternalStore, FieldMap};
use serde_json::{Value, json};
use url::Url;

fn record(id: &str, fields: &Value) -> Value {
    json!({"id": id, "createdTime": "2026-01-15T10:00:00.000Z", "fields": fields})
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer pat-test")
}

async fn create(
    Path(_table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body["typecast"] != json!(true) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    if body["fields"].get("Colour").is_some() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": {"type": "UNKNOWN_FIELD_NAME", "message": "Unknown field name: \"Colour\""}})),
        )
            .into_response();
    }
    Json(record("recCREATED0000001", &body["fields"])).into_response()
}

async fn list(
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if query.get("pageSize").map(String::as_str) != Some("100") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let formula = query.get("filterByFormula").cloned().unwrap_or_default();
    match query.get("offset").map(String::as_str) {
        None => Json(json!({
            "records": [record("recPAGE1000000001", &json!({"Table": table, "Formula": formula}))],
            "offset": "itrSECOND"
        }))
        .into_response(),
        Some("itrSECOND") => Json(json!({
            "records": [record("recPAGE2000000001", &json!({"Table": table}))]
        }))
        .into_response(),
        Some(_) => StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "AUTHENTICATION_REQUIRED"})),
    )
        .into_response()
}

async fn get_record(Path((_table, id)): Path<(String, String)>) -> Response {
    if id == "recMISSING0000001" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "NOT_FOUND"}))).into_response();
    }
    Json(record(&id, &json!({"Name": "Ada"}))).into_response()
}

async fn update_record(
    Path((_table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if id == "recBUSY0000000001" {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    Json(record(&id, &body["fields"])).into_response()
}

async fn delete_record(Path((_table, id)): Path<(String, String)>) -> Response {
    if id == "recMISSING0000001" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "NOT_FOUND"}))).into_response();
    }
    if id == "recBROKEN00000001" {
        return StatusCode::BAD_GATEWAY.into_response();
    }
    Json(json!({"id": id, "deleted": true})).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK.into_response()
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/v0/appBASE/{table}", get(list).post(create))
        .route(
            "/v0/appBASE/{table}/{id}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .route("/v0/appSLOW/{table}", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, base_id: &str, api_key: &str, timeout: Duration) -> AirtableClient {
    AirtableClient::new(AirtableConfig {
        api_url: Url::parse(&format!("http://{addr}/v0/")).unwrap(),
        base_id: base_id.to_owned(),
        api_key: api_key.to_owned(),
        timeout,
    })
    .unwrap()
}

async fn spawn_client() -> AirtableClient {
    let addr = spawn_server().await;
    client_for(addr, "appBASE", "pat-test", Duration::from_secs(5))
}

fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("fields must be an object"),
    }
}

#[tokio::test]
async fn test_create_record_sends_typecast_and_returns_record() {
    let client = spawn_client().await;

    let created = client
        .create_record("Method Usage", fields(json!({"Remark": "Felt calm"})))
        .await
        .unwrap();

    assert_eq!(created.id, "recCREATED0000001");
    assert_eq!(created.text("Remark").as_deref(), Some("Felt calm"));
}

#[tokio::test]
async fn test_create_record_maps_unknown_field_to_rejection() {
    let client = spawn_client().await;

    let error = client
        .create_record("Programs", fields(json!({"Colour": "blue"})))
        .await
        .unwrap_err();

    assert!(matches!(error, ExternalStoreError::Rejected { status: 422, .. }));
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_list_records_follows_offset_pagination() {
    let client = spawn_client().await;

    let records = client
        .list_records("Program Schedule", Some("LOWER({Email}) = 'ada@example.com'"))
        .await
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["recPAGE1000000001", "recPAGE2000000001"]);
    assert_eq!(records[0].text("Table").as_deref(), Some("Program Schedule"));
    assert_eq!(
        records[0].text("Formula").as_deref(),
        Some("LOWER({Email}) = 'ada@example.com'")
    );
}

#[tokio::test]
async fn test_get_record_returns_none_on_404() {
    let client = spawn_client().await;

    let missing = client.get_record("Users", "recMISSING0000001").await.unwrap();
    let found = client.get_record("Users", "recFOUND000000001").await.unwrap();

    assert!(missing.is_none());
    assert_eq!(found.unwrap().id, "recFOUND000000001");
}

#[tokio::test]
async fn test_update_record_maps_rate_limit_to_retryable() {
    let client = spawn_client().await;

    let error = client
        .update_record("Users", "recBUSY0000000001", fields(json!({"Name": "Ada"})))
        .await
        .unwrap_err();

    assert_eq!(error, ExternalStoreError::RateLimited);
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_delete_record_reports_not_found_and_server_errors() {
    let client = spawn_client().await;

    client.delete_record("Programs", "recPRESENT0000001").await.unwrap();
    let missing = client
        .delete_record("Programs", "recMISSING0000001")
        .await
        .unwrap_err();
    let broken = client
        .delete_record("Programs", "recBROKEN00000001")
        .await
        .unwrap_err();

    assert_eq!(missing, ExternalStoreError::NotFound);
    assert_eq!(broken, ExternalStoreError::Unavailable { status: 502 });
}

#[tokio::test]
async fn test_slow_response_maps_to_timeout() {
    let addr = spawn_server().await;
    let client = client_for(addr, "appSLOW", "pat-test", Duration::from_millis(100));

    let error = client.list_records("Users", None).await.unwrap_err();

    assert_eq!(error, ExternalStoreError::Timeout);
}

#[tokio::test]
async fn test_wrong_credentials_map_to_unauthorized() {
    let addr = spawn_server().await;
    let client = client_for(addr, "appBASE", "pat-wrong", Duration::from_secs(5));

    let error = client.list_records("Users", None).await.unwrap_err();

    assert_eq!(error, ExternalStoreError::Unauthorized { status: 401 });
    assert!(!error.is_retryable());
}
