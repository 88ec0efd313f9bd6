#![allow(dead_code)]

use async_trait::async_trait;
use paybridge::config::BridgeConfig;
use paybridge::domain::credential::{EphemeralCredentialRequest, EphemeralCredentialResult};
use paybridge::domain::event::BridgeEvent;
use paybridge::domain::ports::{CredentialBackend, CredentialBackendRef, CredentialCompletion};
use paybridge::infrastructure::in_memory::ChannelEventSink;
use paybridge::infrastructure::simulated::SimulatedPaymentSdk;
use paybridge::{PaymentBridge, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

pub type Events = mpsc::UnboundedReceiver<BridgeEvent>;

/// Bridge over `backend` and a default simulated SDK, with its events on a channel.
pub fn bridge_with_backend(config: BridgeConfig, backend: CredentialBackendRef) -> (PaymentBridge, Events) {
    bridge_with_sdk(config, SimulatedPaymentSdk::default(), backend)
}

pub fn bridge_with_sdk(
    config: BridgeConfig,
    sdk: SimulatedPaymentSdk,
    backend: CredentialBackendRef,
) -> (PaymentBridge, Events) {
    let (sink, events) = ChannelEventSink::new();
    let bridge = PaymentBridge::with_backend(config, Arc::new(sdk), Arc::new(sink), backend)
        .expect("bridge should start");
    (bridge, events)
}

/// Bridge whose ephemeral keys are supplied by the runtime through events.
pub fn runtime_bridge(sdk: SimulatedPaymentSdk) -> (PaymentBridge, Events) {
    let (sink, events) = ChannelEventSink::new();
    let bridge = PaymentBridge::new(BridgeConfig::default(), Arc::new(sdk), Arc::new(sink))
        .expect("bridge should start");
    (bridge, events)
}

pub fn config_with_timeout(ms: u64) -> BridgeConfig {
    BridgeConfig {
        credential_timeout_ms: ms,
        ..BridgeConfig::default()
    }
}

pub async fn next_event(events: &mut Events) -> BridgeEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub async fn collect_events(events: &mut Events, count: usize) -> Vec<BridgeEvent> {
    let mut collected = Vec::with_capacity(count);
    for _ in 0..count {
        collected.push(next_event(events).await);
    }
    collected
}

/// A completion that reports every invocation on a channel.
///
/// The channel closes once the completion is consumed or dropped, so a second
/// `recv` returning `None` proves it ran at most once.
pub fn completion_recorder() -> (CredentialCompletion, mpsc::UnboundedReceiver<EphemeralCredentialResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let completion: CredentialCompletion = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (completion, rx)
}

pub async fn completed(
    results: &mut mpsc::UnboundedReceiver<EphemeralCredentialResult>,
) -> Option<EphemeralCredentialResult> {
    tokio::time::timeout(WAIT, results.recv())
        .await
        .expect("timed out waiting for the completion")
}

/// Backend that holds every request until [`GatedBackend::open`] is called.
pub struct GatedBackend {
    gate: Notify,
    response: Value,
}

impl GatedBackend {
    pub fn new(response: Value) -> Self {
        Self {
            gate: Notify::new(),
            response,
        }
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl CredentialBackend for GatedBackend {
    async fn fetch_credential(&self, _request: &EphemeralCredentialRequest) -> Result<Value> {
        self.gate.notified().await;
        Ok(self.response.clone())
    }
}

/// Backend that never answers.
pub struct SilentBackend;

#[async_trait]
impl CredentialBackend for SilentBackend {
    async fn fetch_credential(&self, _request: &EphemeralCredentialRequest) -> Result<Value> {
        std::future::pending().await
    }
}
