use crate::domain::credential::{EphemeralCredentialRequest, RequestId};
use crate::domain::event::BridgeEvent;
use crate::domain::ports::{CredentialBackend, EventSinkRef};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

type PendingRequests = Mutex<HashMap<RequestId, oneshot::Sender<Result<Value>>>>;

/// Asks the embedding runtime for ephemeral keys.
///
/// Each request is announced with an `onCreateEphemeralKey` event and stays
/// pending until the runtime answers with the same request id.
pub struct RuntimeCredentialBackend {
    events: EventSinkRef,
    pending: PendingRequests,
}

impl RuntimeCredentialBackend {
    pub fn new(events: EventSinkRef) -> Self {
        Self {
            events,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Completes the pending request `id` with the runtime's answer.
    pub fn resolve(&self, id: RequestId, result: Result<Value>) -> Result<()> {
        let sender = self
            .lock()
            .remove(&id)
            .ok_or(BridgeError::UnknownCredentialRequest(id))?;
        sender
            .send(result)
            .map_err(|_| BridgeError::UnknownCredentialRequest(id))
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Result<Value>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a request from the pending table when its fetch ends, however it ends.
struct PendingEntry<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[async_trait]
impl CredentialBackend for RuntimeCredentialBackend {
    async fn fetch_credential(&self, request: &EphemeralCredentialRequest) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(request.id, tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            id: request.id,
        };

        self.events.emit(BridgeEvent::CreateEphemeralKey {
            api_version: request.api_version.clone(),
            request_id: request.id,
        })?;
        debug!(request_id = %request.id, "waiting for the runtime to supply an ephemeral key");

        rx.await.map_err(|_| BridgeError::ContextTornDown)?
    }

    fn cancel_pending(&self) {
        let cancelled = std::mem::take(&mut *self.lock());
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "cancelled pending runtime key requests");
        }
    }
}
