//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Raw and JSON updates merge counters and replace gauges
//! - Status codes follow the error mapping (501/400/404/500)
//! - Hashes are checked on the way in and attached on the way out
//! - gzip works in both directions

use std::io::Write;

use axum::http::StatusCode;
use flate2::{Compression, write::GzEncoder};
use pretty_assertions::assert_eq;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::{Value, json};
use tallyhub::{IntegrityHasher, Metric};

use crate::helpers::{TEST_KEY, memory_repository, signed, spawn_test_server};

async fn post(client: &reqwest::Client, url: String) -> reqwest::Response {
    client.post(url).send().await.unwrap()
}

#[tokio::test]
async fn test_raw_counter_accumulates() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = post(&client, format!("{base}/update/counter/PollCount/1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "Ok");
    }

    let response = client
        .get(format!("{base}/value/counter/PollCount"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "2");
}

#[tokio::test]
async fn test_raw_gauge_last_write_wins() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    post(&client, format!("{base}/update/gauge/RandomValue/3.14")).await;
    post(&client, format!("{base}/update/gauge/RandomValue/2.71")).await;

    let body = client
        .get(format!("{base}/value/gauge/RandomValue"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "2.710");
}

#[tokio::test]
async fn test_raw_error_statuses() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    let unknown_kind = post(&client, format!("{base}/update/histogram/A/1")).await;
    assert_eq!(unknown_kind.status(), StatusCode::NOT_IMPLEMENTED);

    let bad_value = post(&client, format!("{base}/update/counter/A/1.5")).await;
    assert_eq!(bad_value.status(), StatusCode::BAD_REQUEST);

    let bad_gauge = post(&client, format!("{base}/update/gauge/A/none")).await;
    assert_eq!(bad_gauge.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .get(format!("{base}/value/gauge/Missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown_read_kind = client
        .get(format!("{base}/value/histogram/A"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_read_kind.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_kind_conflict_is_bad_request() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    post(&client, format!("{base}/update/gauge/A/1")).await;
    let conflict = post(&client, format!("{base}/update/counter/A/1")).await;
    assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);

    let wrong_kind = client
        .get(format!("{base}/value/counter/A"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_kind.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_json_update_returns_signed_metric() {
    let base = spawn_test_server(memory_repository().await, Some(TEST_KEY)).await;
    let client = reqwest::Client::new();

    let update = signed(Metric::counter("PollCount", 3), TEST_KEY);
    client
        .post(format!("{base}/update/"))
        .json(&update)
        .send()
        .await
        .unwrap();
    let response = client
        .post(format!("{base}/update/"))
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored: Metric = response.json().await.unwrap();
    assert_eq!(stored, signed(Metric::counter("PollCount", 6), TEST_KEY));
}

#[tokio::test]
async fn test_tampered_hash_is_rejected_without_change() {
    let base = spawn_test_server(memory_repository().await, Some(TEST_KEY)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/update/"))
        .json(&json!({"id": "A", "type": "gauge", "value": 1.0, "hash": "deadbeef"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json: Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("hash mismatch"));

    let lookup = client
        .get(format!("{base}/value/gauge/A"))
        .send()
        .await
        .unwrap();
    assert_eq!(lookup.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsigned_update_accepted_with_key() {
    let base = spawn_test_server(memory_repository().await, Some(TEST_KEY)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/update/"))
        .json(&json!({"id": "A", "type": "gauge", "value": 1.5}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    for body in [
        "{not json",
        r#"{"id":"A","type":"gauge"}"#,
        r#"{"id":"A","type":"counter","value":1.0}"#,
        r#"{"id":"A","type":"summary","value":1.0}"#,
    ] {
        let response = client
            .post(format!("{base}/update/"))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn test_batch_update_stores_every_kind() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/updates/"))
        .json(&json!([
            {"id": "X", "type": "counter", "delta": 5},
            {"id": "Y", "type": "gauge", "value": 9.9},
            {"id": "X", "type": "counter", "delta": 1},
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored: Vec<Metric> = response.json().await.unwrap();
    assert_eq!(
        stored,
        vec![Metric::counter("X", 6), Metric::gauge("Y", 9.9)]
    );

    let x = client
        .get(format!("{base}/value/counter/X"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(x, "6");
}

#[tokio::test]
async fn test_batch_with_tampered_entry_is_rejected_whole() {
    let base = spawn_test_server(memory_repository().await, Some(TEST_KEY)).await;
    let client = reqwest::Client::new();

    let good = signed(Metric::counter("X", 5), TEST_KEY);
    let mut bad = signed(Metric::gauge("Y", 9.9), TEST_KEY);
    bad.hash = Some("00".repeat(32));

    let response = client
        .post(format!("{base}/updates/"))
        .json(&vec![good, bad])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let x = client
        .get(format!("{base}/value/counter/X"))
        .send()
        .await
        .unwrap();
    assert_eq!(x.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_json_value_includes_hash() {
    let base = spawn_test_server(memory_repository().await, Some(TEST_KEY)).await;
    let client = reqwest::Client::new();

    post(&client, format!("{base}/update/gauge/Alloc/12.5")).await;

    let response = client
        .post(format!("{base}/value/"))
        .json(&json!({"id": "Alloc", "type": "gauge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let metric: Metric = response.json().await.unwrap();
    assert!(IntegrityHasher::new(TEST_KEY).verify(&metric).is_ok());
    assert_eq!(metric, signed(Metric::gauge("Alloc", 12.5), TEST_KEY));

    let missing = client
        .post(format!("{base}/value/"))
        .json(&json!({"id": "Alloc", "type": "counter"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_index_lists_metrics() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    post(&client, format!("{base}/update/counter/PollCount/7")).await;
    post(&client, format!("{base}/update/gauge/Alloc/1.25")).await;

    let response = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    let page = response.text().await.unwrap();
    assert!(page.contains("<td>PollCount</td><td>counter</td><td>7</td>"));
    assert!(page.contains("<td>Alloc</td><td>gauge</td><td>1.250</td>"));
}

#[tokio::test]
async fn test_ping_fails_without_durable_medium() {
    let base = spawn_test_server(memory_repository().await, None).await;

    let response = reqwest::get(format!("{base}/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_response_is_gzipped_on_request() {
    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/"))
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_gzipped_request_body_is_decoded() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(br#"[{"id":"Zipped","type":"counter","delta":4}]"#)
        .unwrap();
    let body = encoder.finish().unwrap();

    let base = spawn_test_server(memory_repository().await, None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/updates/"))
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_ENCODING, "gzip")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let value = client
        .get(format!("{base}/value/counter/Zipped"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "4");
}
