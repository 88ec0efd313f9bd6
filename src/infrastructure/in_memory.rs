use crate::domain::credential::{EphemeralCredentialRequest, extract_credential};
use crate::domain::event::BridgeEvent;
use crate::domain::ports::{CredentialBackend, EventSink};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Event sink that hands every emitted event to an in-process channel.
///
/// Useful when the embedding runtime lives in the same process, and for tests.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: BridgeEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Credential backend answering every request with a fixed response.
///
/// The response goes through the same extraction as a real backend's body,
/// so `{"error": "..."}` produces a failure.
#[derive(Debug, Clone)]
pub struct StaticCredentialBackend {
    response: Value,
    api_versions: Arc<Mutex<Vec<String>>>,
}

impl StaticCredentialBackend {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            api_versions: Arc::default(),
        }
    }

    /// API versions of the requests served so far, in order.
    pub fn api_versions(&self) -> Vec<String> {
        self.api_versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialBackend for StaticCredentialBackend {
    async fn fetch_credential(&self, request: &EphemeralCredentialRequest) -> Result<Value> {
        self.api_versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.api_version.clone());
        extract_credential(self.response.clone())
    }
}
