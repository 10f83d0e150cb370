//! Agent reporting tests
//!
//! These tests verify that:
//! - A report is one signed JSON batch posted to /updates/
//! - Reported counter deltas are delivered exactly once
//! - Failed reports keep counters for the next attempt
//! - The raw mode sends one request per metric

use clap::Parser;
use pretty_assertions::assert_eq;
use tallyhub::{
    IntegrityHasher, Metric, MetricKind,
    agent::Agent,
    config::AgentConfig,
    storage::Repository,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{TEST_KEY, memory_repository, spawn_test_server};

fn agent_config(address: &str, key: Option<&str>) -> AgentConfig {
    let mut args = vec!["tallyhub-agent", "-a", address];
    if let Some(key) = key {
        args.extend(["-k", key]);
    }
    AgentConfig::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn test_report_posts_signed_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut agent = Agent::new(&agent_config(&mock_server.uri(), Some(TEST_KEY)))
        .await
        .unwrap();
    agent.poll().await;
    let sent = agent.report().await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let batch: Vec<Metric> = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(batch.len(), sent);

    let hasher = IntegrityHasher::new(TEST_KEY);
    for metric in &batch {
        assert!(metric.hash.is_some(), "{} is unsigned", metric.id);
        assert!(hasher.verify(metric).is_ok(), "{} has a bad hash", metric.id);
    }

    let poll_count = batch.iter().find(|m| m.id == "PollCount").unwrap();
    assert_eq!(poll_count.kind(), MetricKind::Counter);
    assert_eq!(poll_count.delta(), Some(1));
}

#[tokio::test]
async fn test_successful_report_settles_counters() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let mut agent = Agent::new(&agent_config(&mock_server.uri(), None))
        .await
        .unwrap();
    agent.poll().await;
    agent.poll().await;
    agent.report().await.unwrap();

    assert_eq!(agent.store().get("PollCount").await.unwrap().delta(), Some(0));
}

#[tokio::test]
async fn test_rejected_report_keeps_counters() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut agent = Agent::new(&agent_config(&mock_server.uri(), None))
        .await
        .unwrap();
    agent.poll().await;

    assert!(agent.report().await.is_err());
    assert_eq!(agent.store().get("PollCount").await.unwrap().delta(), Some(1));
}

#[tokio::test]
async fn test_report_raw_sends_one_request_per_metric() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let mut agent = Agent::new(&agent_config(&mock_server.uri(), None))
        .await
        .unwrap();
    agent.poll().await;
    let sent = agent.report_raw().await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), sent);
    assert!(
        requests
            .iter()
            .any(|r| r.url.path() == "/update/counter/PollCount/1")
    );
    assert!(
        requests
            .iter()
            .all(|r| r.url.path().starts_with("/update/"))
    );
}

#[tokio::test]
async fn test_agent_against_real_server() {
    let repository = memory_repository().await;
    let base = spawn_test_server(repository.clone(), Some(TEST_KEY)).await;

    let mut agent = Agent::new(&agent_config(&base, Some(TEST_KEY)))
        .await
        .unwrap();

    agent.poll().await;
    agent.report().await.unwrap();
    assert_eq!(repository.get("PollCount").await.unwrap().delta(), Some(1));

    agent.poll().await;
    agent.poll().await;
    agent.report().await.unwrap();
    assert_eq!(repository.get("PollCount").await.unwrap().delta(), Some(3));

    let random = repository.get("RandomValue").await.unwrap();
    assert_eq!(random.kind(), MetricKind::Gauge);
}
