//! Concurrent access to a shared memory system

mod common;

use std::sync::Arc;

use common::{init_tracing, session, too_long};
use mnemos_core::prelude::*;
use serde_json::json;

const WRITERS: usize = 8;
const SESSIONS_PER_WRITER: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stores_and_retrievals() {
    init_tracing();
    let memory = Arc::new(MemorySystem::new("alice").unwrap());

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let memory = memory.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..SESSIONS_PER_WRITER {
                memory
                    .store_session(session(&format!("w{}-s{}", writer, n), "ok", Outcome::Neutral))
                    .await
                    .unwrap();
            }
        }));
    }
    for _ in 0..WRITERS {
        let memory = memory.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..SESSIONS_PER_WRITER {
                let context = memory.retrieve("Rust lifetimes", 5).await.unwrap();
                assert!(context.episodes.len() <= 5);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let episodes = memory.episodes().await;
    assert_eq!(episodes.len(), WRITERS * SESSIONS_PER_WRITER);

    // Each writer's sessions keep their relative order.
    for writer in 0..WRITERS {
        let prefix = format!("w{}-", writer);
        let ids: Vec<usize> = episodes
            .iter()
            .filter_map(|s| s.id.strip_prefix(&prefix))
            .filter_map(|n| n.strip_prefix('s'))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(ids, (0..SESSIONS_PER_WRITER).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_converges_on_one_pattern() {
    init_tracing();
    let memory = Arc::new(MemorySystem::new("alice").unwrap());
    let engine = Arc::new(ConsolidationEngine::with_lexical_defaults().unwrap());

    let handles: Vec<_> = (0..10)
        .map(|n| {
            let memory = memory.clone();
            let engine = engine.clone();
            tokio::spawn(async move {
                memory.ingest(too_long(&format!("s{}", n)), &engine).await.unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let long_term = memory.long_term().await;
    assert_eq!(long_term.patterns.len(), 1);
    assert_eq!(long_term.patterns[0].evidence_count, 10);
    assert!((long_term.patterns[0].confidence - engine.curve().score(10)).abs() < 1e-12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_profile_updates_are_all_applied() {
    let memory = Arc::new(MemorySystem::new("alice").unwrap());

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let memory = memory.clone();
            tokio::spawn(async move {
                memory
                    .update_long_term("profile", json!({ format!("key{}", n): n }))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(memory.long_term().await.profile.len(), 16);
}

#[test]
fn memory_system_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MemorySystem>();
    assert_send_sync::<ConsolidationEngine>();
}
