mod common;

use common::*;
use paybridge::config::{BridgeConfig, CredentialEndpoint};
use paybridge::domain::credential::EphemeralCredentialResult;
use paybridge::domain::ports::EphemeralKeyProvider;
use paybridge::infrastructure::in_memory::{ChannelEventSink, StaticCredentialBackend};
use paybridge::infrastructure::simulated::SimulatedPaymentSdk;
use paybridge::PaymentBridge;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_credential_supplied_for_api_version() {
    let backend = Arc::new(StaticCredentialBackend::new(json!({
        "credential": {"id": "ephkey_1", "secret": "ek_test_1"}
    })));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend.clone());
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);

    assert_eq!(
        completed(&mut results).await,
        Some(EphemeralCredentialResult::Success(
            json!({"id": "ephkey_1", "secret": "ek_test_1"})
        ))
    );
    // Exactly once: the completion is gone after its single call.
    assert_eq!(completed(&mut results).await, None);
    assert_eq!(backend.api_versions(), vec!["2020-08-27".to_string()]);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_provide_returns_before_completion() {
    let backend = Arc::new(GatedBackend::new(json!({"id": "ephkey_2"})));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend.clone());
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);
    assert!(matches!(results.try_recv(), Err(TryRecvError::Empty)));

    backend.open();
    assert_eq!(
        completed(&mut results).await,
        Some(EphemeralCredentialResult::Success(json!({"id": "ephkey_2"})))
    );

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_completes_with_failure() {
    let (bridge, _events) = bridge_with_backend(config_with_timeout(50), Arc::new(SilentBackend));
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);

    match completed(&mut results).await {
        Some(EphemeralCredentialResult::Failure(message)) => {
            assert!(!message.is_empty());
            assert!(message.contains("timed out"), "unexpected message: {message}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }
    assert_eq!(completed(&mut results).await, None);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_credential_completes_with_failure() {
    let backend = Arc::new(StaticCredentialBackend::new(
        json!({"error": "customer not found"}),
    ));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend);
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);

    match completed(&mut results).await {
        Some(EphemeralCredentialResult::Failure(message)) => {
            assert!(message.contains("customer not found"));
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_result_after_teardown_is_discarded() {
    let backend = Arc::new(GatedBackend::new(json!({"id": "ephkey_late"})));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend.clone());
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);
    bridge.teardown().unwrap();
    backend.open();

    // The completion is dropped without ever being called.
    assert_eq!(completed(&mut results).await, None);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overlapping_requests_each_complete_once() {
    let backend = Arc::new(StaticCredentialBackend::new(json!({"id": "ephkey_3"})));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend.clone());
    let adapter = bridge.open_context().unwrap();

    let (first, mut first_results) = completion_recorder();
    let (second, mut second_results) = completion_recorder();
    adapter.provide("2020-08-27", first);
    adapter.provide("2022-11-15", second);

    for results in [&mut first_results, &mut second_results] {
        assert!(completed(results).await.unwrap().is_success());
        assert_eq!(completed(results).await, None);
    }
    let mut versions = backend.api_versions();
    versions.sort();
    assert_eq!(versions, vec!["2020-08-27", "2022-11-15"]);

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_provide_from_foreign_thread() {
    let backend = Arc::new(StaticCredentialBackend::new(json!({"id": "ephkey_4"})));
    let (bridge, _events) = bridge_with_backend(BridgeConfig::default(), backend);
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    std::thread::spawn(move || adapter.provide("2020-08-27", completion))
        .join()
        .unwrap();

    assert_eq!(
        completed(&mut results).await,
        Some(EphemeralCredentialResult::Success(json!({"id": "ephkey_4"})))
    );

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_endpoint_supplies_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ephemeral_keys"))
        .and(body_json(json!({"api_version": "2020-08-27"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ephkey_http",
            "object": "ephemeral_key",
            "secret": "ek_test_http"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = BridgeConfig::with_endpoint(CredentialEndpoint::new(format!(
        "{}/ephemeral_keys",
        server.uri()
    )));
    let (sink, _events) = ChannelEventSink::new();
    let bridge = PaymentBridge::new(
        config,
        Arc::new(SimulatedPaymentSdk::default()),
        Arc::new(sink),
    )
    .unwrap();
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);

    assert_eq!(
        completed(&mut results).await,
        Some(EphemeralCredentialResult::Success(json!({
            "id": "ephkey_http",
            "object": "ephemeral_key",
            "secret": "ek_test_http"
        })))
    );

    bridge.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_endpoint_error_completes_with_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .mount(&server)
        .await;

    let config = BridgeConfig::with_endpoint(CredentialEndpoint::new(server.uri()));
    let (sink, _events) = ChannelEventSink::new();
    let bridge = PaymentBridge::new(
        config,
        Arc::new(SimulatedPaymentSdk::default()),
        Arc::new(sink),
    )
    .unwrap();
    let adapter = bridge.open_context().unwrap();

    let (completion, mut results) = completion_recorder();
    adapter.provide("2020-08-27", completion);

    match completed(&mut results).await {
        Some(EphemeralCredentialResult::Failure(message)) => {
            assert!(message.contains("500"), "unexpected message: {message}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    bridge.shutdown().await.unwrap();
}
