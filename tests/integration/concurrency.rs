//! Concurrency and race condition tests
//!
//! These tests verify thread-safety of the shared repository:
//! - Concurrent counter updates on one id are never lost
//! - Concurrent updates on distinct ids all land
//! - Readers never observe a half-applied update

use std::sync::Arc;

use futures::future::join_all;
use tallyhub::Metric;

use crate::helpers::{memory_repository, spawn_test_server};

#[tokio::test]
async fn test_concurrent_http_counter_updates_no_race() {
    let repository = memory_repository().await;
    let base = Arc::new(spawn_test_server(repository.clone(), None).await);
    let client = reqwest::Client::new();

    let requests = (0..100).map(|_| {
        let client = client.clone();
        let base = base.clone();
        async move {
            client
                .post(format!("{base}/update/counter/hits/3"))
                .send()
                .await
                .unwrap()
                .status()
        }
    });

    for status in join_all(requests).await {
        assert!(status.is_success());
    }

    assert_eq!(repository.get("hits").await.unwrap().delta(), Some(300));
}

#[tokio::test]
async fn test_concurrent_distinct_ids_all_stored() {
    let repository = memory_repository().await;

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let repository = repository.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    repository.set(Metric::counter(format!("c{i}"), i)).await
                } else {
                    repository.set(Metric::gauge(format!("g{i}"), i as f64)).await
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let all = repository.get_all().await;
    assert_eq!(all.len(), 64);
    for metric in all {
        let index: i64 = metric.id[1..].parse().unwrap();
        match metric.id.chars().next() {
            Some('c') => assert_eq!(metric.delta(), Some(index)),
            Some('g') => assert_eq!(metric.gauge_value(), Some(index as f64)),
            other => panic!("unexpected id prefix {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_readers_see_whole_updates() {
    let repository = memory_repository().await;
    repository.set(Metric::counter("steps", 0)).await.unwrap();

    let writer = {
        let repository = repository.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                repository.set(Metric::counter("steps", 2)).await.unwrap();
            }
        })
    };

    let reader = {
        let repository = repository.clone();
        tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..200 {
                let delta = repository.get("steps").await.unwrap().delta().unwrap();
                assert_eq!(delta % 2, 0);
                assert!(delta >= last);
                last = delta;
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(repository.get("steps").await.unwrap().delta(), Some(400));
}
