mod common;

use common::*;
use paybridge::config::BridgeConfig;
use paybridge::domain::event::BridgeEvent;
use paybridge::domain::ports::{CredentialCompletion, EphemeralKeyProvider, PaymentContextObserver};
use paybridge::infrastructure::in_memory::StaticCredentialBackend;
use paybridge::{ContextAdapter, PaymentBridge};
use serde_json::json;
use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

fn lifecycle_bridge() -> (PaymentBridge, Events) {
    bridge_with_backend(
        BridgeConfig::default(),
        Arc::new(StaticCredentialBackend::new(json!({"id": "ephkey"}))),
    )
}

/// Sends a result token from every stale adapter, then `token` from the live
/// context, and checks that only the live one comes out.
async fn assert_only_live_context_relayed(
    events: &mut Events,
    adapters: &[ContextAdapter],
    live: &ContextAdapter,
    token: &str,
) {
    for stale in adapters.iter().filter(|a| a.epoch() != live.epoch()) {
        stale.did_create_payment_result("pi_stale");
    }
    live.did_create_payment_result(token);
    assert_eq!(
        next_event(events).await,
        BridgeEvent::PaymentResult {
            result_token: token.into()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_opens_relay_newest_context() {
    let (bridge, mut events) = lifecycle_bridge();

    for round in 0..100 {
        let barrier = Barrier::new(THREADS);
        let (bridge_ref, barrier_ref) = (&bridge, &barrier);
        let adapters: Vec<ContextAdapter> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(move || {
                        barrier_ref.wait();
                        bridge_ref.open_context().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let live = adapters.iter().max_by_key(|a| a.epoch()).unwrap();
        assert_eq!(bridge.active_epoch(), Some(live.epoch()));
        assert_only_live_context_relayed(&mut events, &adapters, live, &format!("pi_{round}")).await;
    }

    bridge.shutdown().await.unwrap();
    assert!(events.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_teardown_and_open() {
    let (bridge, mut events) = lifecycle_bridge();

    for round in 0..100 {
        let barrier = Barrier::new(THREADS);
        let (bridge_ref, barrier_ref) = (&bridge, &barrier);
        let adapters: Vec<ContextAdapter> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|n| {
                    scope.spawn(move || {
                        barrier_ref.wait();
                        if n % 2 == 0 {
                            Some(bridge_ref.open_context().unwrap())
                        } else {
                            bridge_ref.teardown().unwrap();
                            None
                        }
                    })
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        // Whichever command came last decides whether a context survived.
        let live = match bridge.active_epoch() {
            Some(epoch) => adapters
                .iter()
                .find(|a| a.epoch() == epoch)
                .cloned()
                .expect("the live epoch belongs to one of the opened contexts"),
            None => bridge.open_context().unwrap(),
        };
        assert_only_live_context_relayed(&mut events, &adapters, &live, &format!("pi_{round}")).await;
    }

    bridge.shutdown().await.unwrap();
    assert!(events.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_teardown_waits_for_result_being_delivered() {
    let (bridge, _events) = lifecycle_bridge();
    let bridge = Arc::new(bridge);
    let adapter = bridge.open_context().unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = mpsc::channel();
    let completion: CredentialCompletion = {
        let log = log.clone();
        Box::new(move |result| {
            assert!(result.is_success());
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            log.lock().unwrap().push("completed");
        })
    };
    adapter.provide("2020-08-27", completion);

    let teardown = {
        let (bridge, log) = (bridge.clone(), log.clone());
        tokio::task::spawn_blocking(move || {
            started_rx.recv().unwrap();
            bridge.teardown().unwrap();
            log.lock().unwrap().push("torn down");
        })
    };
    teardown.await.unwrap();

    assert_eq!(*log.lock().unwrap(), ["completed", "torn down"]);
    assert_eq!(bridge.active_epoch(), None);

    let bridge = Arc::try_unwrap(bridge).ok().expect("no other bridge handles remain");
    bridge.shutdown().await.unwrap();
}
