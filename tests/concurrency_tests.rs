//! Concurrency tests for the reservation protocol.
//!
//! These tests validate that:
//! - Concurrent reservations on the same backend add up exactly (no lost
//!   update, no double count) while every request is in flight.
//! - Every backend returns to zero outstanding cost once all requests finish,
//!   whatever mix of successes and failures they had.


use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use media_balancer::dispatch::{BackendKind, LoadModel, SelectionPolicy, StatusSource};
use rand::Rng;
use test_harness::{dispatcher, Behaviour, Gate, ScriptedLink};

const REQUESTS: usize = 64;

fn random_request() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let tag = [b'V', b'M', b'P'][rng.gen_range(0..3)];
    let size: u64 = rng.gen_range(1..=9);
    format!("{}{}", tag as char, size).into_bytes()
}

// ---------------------------------------------------------------------------
// Test 1: all requests parked in flight → outstanding equals reserved costs
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outstanding_cost_matches_in_flight_jobs() {
    let gate = Gate::new(REQUESTS);
    let (dispatcher, links) = dispatcher(
        vec![
            ScriptedLink::new(BackendKind::Video, Behaviour::Echo).with_gate(gate.clone()),
            ScriptedLink::new(BackendKind::Music, Behaviour::Echo).with_gate(gate.clone()),
        ],
        SelectionPolicy::FullScan,
        LoadModel::Outstanding,
        Duration::from_secs(30),
    );

    let tasks: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let request = random_request();
            tokio::spawn(async move { dispatcher.dispatch(&request).await })
        })
        .collect();

    // Every request has reserved and is blocked inside its backend link.
    tokio::time::timeout(Duration::from_secs(10), gate.arrived.wait())
        .await
        .expect("requests never all reached the backends");

    let mut in_flight = 0;
    for (backend, link) in dispatcher.pool().iter().zip(&links) {
        assert_eq!(
            backend.outstanding_cost(),
            link.in_flight_cost(),
            "backend {} outstanding cost differs from the jobs reserved on it",
            backend.endpoint()
        );
        in_flight += backend.in_flight();
    }
    assert_eq!(in_flight, REQUESTS);

    gate.release.wait().await;
    for result in join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    for backend in dispatcher.pool().iter() {
        assert_eq!(backend.outstanding_cost(), 0);
        assert_eq!(backend.in_flight(), 0);
    }
    assert_eq!(dispatcher.stats().completed, REQUESTS as u64);
}

// ---------------------------------------------------------------------------
// Test 2: delayed replies, mixed outcomes → everything drains to zero
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_outcomes_drain_to_zero() {
    let (dispatcher, links) = dispatcher(
        vec![
            ScriptedLink::new(BackendKind::Video, Behaviour::Echo)
                .with_delay(Duration::from_millis(5)),
            ScriptedLink::new(BackendKind::Music, Behaviour::Reset)
                .with_delay(Duration::from_millis(3)),
        ],
        SelectionPolicy::FullScan,
        LoadModel::Outstanding,
        Duration::from_secs(30),
    );

    let tasks: Vec<_> = (0..REQUESTS * 4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let request = random_request();
            tokio::spawn(async move { dispatcher.dispatch(&request).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let failed = results.len() - ok;

    assert_eq!(ok, links[0].calls());
    assert_eq!(failed, links[1].calls());
    for backend in dispatcher.pool().iter() {
        assert_eq!(backend.outstanding_cost(), 0);
        assert_eq!(backend.in_flight(), 0);
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.completed, ok as u64);
    assert_eq!(stats.unavailable, failed as u64);
}

// ---------------------------------------------------------------------------
// Test 3: power of two choices under load
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_power_of_two_under_concurrency() {
    let links = (0..6)
        .map(|i| {
            let kind = if i < 4 {
                BackendKind::Video
            } else {
                BackendKind::Music
            };
            ScriptedLink::new(kind, Behaviour::Echo).with_delay(Duration::from_millis(2))
        })
        .collect();
    let (dispatcher, links) = dispatcher(
        links,
        SelectionPolicy::PowerOfTwo,
        LoadModel::Outstanding,
        Duration::from_secs(30),
    );

    let tasks: Vec<_> = (0..REQUESTS * 4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let request = random_request();
            tokio::spawn(async move { dispatcher.dispatch(&request).await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    let total: usize = links.iter().map(|l| l.calls()).sum();
    assert_eq!(total, REQUESTS * 4);
    for backend in dispatcher.pool().iter() {
        assert_eq!(backend.outstanding_cost(), 0);
    }
}
