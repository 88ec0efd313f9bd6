use crate::application::dispatcher::{Dispatch, EventQueue};
use crate::domain::credential::{EphemeralCredentialRequest, EphemeralCredentialResult, RequestId};
use crate::domain::event::{
    MethodSummary, PayloadError, PaymentContextEvent, PaymentOutcome, ResultToken,
};
use crate::domain::ports::{
    CredentialBackendRef, CredentialCompletion, EphemeralKeyProvider, PaymentContextObserver,
};
use crate::error::{self, BridgeError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Epochs {
    current: u64,
    active: bool,
}

/// State shared by the bridge and every context adapter it hands out.
pub(crate) struct BridgeCore {
    pub(crate) queue: EventQueue,
    pub(crate) backend: CredentialBackendRef,
    runtime: Handle,
    credential_timeout: Duration,
    epochs: Mutex<Epochs>,
    next_request: AtomicU64,
    outstanding: Mutex<Option<RequestId>>,
}

impl BridgeCore {
    pub(crate) fn new(
        queue: EventQueue,
        backend: CredentialBackendRef,
        runtime: Handle,
        credential_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            backend,
            runtime,
            credential_timeout,
            epochs: Mutex::new(Epochs::default()),
            next_request: AtomicU64::new(1),
            outstanding: Mutex::new(None),
        }
    }

    /// Starts a new context epoch. Returns the epoch it replaced, if any.
    ///
    /// The dispatcher learns about the new epoch before the lock is released,
    /// so it sees context changes in the same order as this core does.
    pub(crate) fn begin_context(&self) -> error::Result<(Option<u64>, u64)> {
        let mut epochs = lock(&self.epochs);
        let previous = epochs.active.then_some(epochs.current);
        let epoch = epochs.current + 1;
        self.queue.post(Dispatch::ContextStarted { epoch })?;
        epochs.current = epoch;
        epochs.active = true;
        Ok((previous, epoch))
    }

    /// Ends the active context, returning its epoch.
    pub(crate) fn end_context(&self) -> error::Result<Option<u64>> {
        let mut epochs = lock(&self.epochs);
        if !epochs.active {
            return Ok(None);
        }
        let ended = epochs.current;
        self.queue.post(Dispatch::ContextEnded { epoch: ended })?;
        epochs.current += 1;
        epochs.active = false;
        Ok(Some(ended))
    }

    pub(crate) fn active_epoch(&self) -> Option<u64> {
        let epochs = lock(&self.epochs);
        epochs.active.then_some(epochs.current)
    }

    fn issue_request(&self, epoch: u64, api_version: &str) -> EphemeralCredentialRequest {
        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        if let Some(previous) = lock(&self.outstanding).replace(id) {
            warn!(
                request_id = %id,
                outstanding = %previous,
                "ephemeral key requested while another request is outstanding"
            );
        }
        EphemeralCredentialRequest::new(id, epoch, api_version)
    }

    async fn supply(&self, request: EphemeralCredentialRequest, completion: CredentialCompletion) {
        info!(request_id = %request.id, api_version = %request.api_version, "requesting ephemeral key");

        let result = match tokio::time::timeout(
            self.credential_timeout,
            self.backend.fetch_credential(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(self.credential_timeout)),
        };

        {
            let mut outstanding = lock(&self.outstanding);
            if *outstanding == Some(request.id) {
                *outstanding = None;
            }
        }

        // Held until the completion returns, so a teardown either happens
        // before the check or waits for the result to be delivered.
        let epochs = lock(&self.epochs);
        if !(epochs.active && epochs.current == request.epoch) {
            debug!(
                request_id = %request.id,
                epoch = request.epoch,
                "discarding ephemeral key result for a torn down payment context"
            );
            return;
        }

        match &result {
            Ok(_) => info!(request_id = %request.id, "ephemeral key retrieved"),
            Err(e) => warn!(request_id = %request.id, error = %e, "failed to retrieve ephemeral key"),
        }
        completion(EphemeralCredentialResult::from(result));
        drop(epochs);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The adapter object registered with the payment SDK for one payment context.
///
/// Implements both foreign protocols. Every callback is turned into a message
/// for the dispatcher, so it is safe to call from any thread and never blocks.
#[derive(Clone)]
pub struct ContextAdapter {
    core: Arc<BridgeCore>,
    epoch: u64,
}

impl ContextAdapter {
    pub(crate) fn new(core: Arc<BridgeCore>, epoch: u64) -> Self {
        Self { core, epoch }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn relay(&self, event: Result<PaymentContextEvent, PayloadError>) {
        let notification = match &event {
            Ok(event) => event.notification(),
            Err(e) => e.notification,
        };
        debug!(epoch = self.epoch, notification, "payment context notification");
        if let Err(e) = self.core.queue.post(Dispatch::Notification {
            epoch: self.epoch,
            event,
        }) {
            warn!(notification, error = %e, "notification arrived after the bridge shut down");
        }
    }
}

impl PaymentContextObserver for ContextAdapter {
    fn selected_method_changed(&self, summary: &str) {
        self.relay(MethodSummary::from_json(summary).map(PaymentContextEvent::SelectedMethodChanged));
    }

    fn did_create_payment_result(&self, result_token: &str) {
        self.relay(Ok(PaymentContextEvent::DidCreatePaymentResult(
            ResultToken::from(result_token),
        )));
    }

    fn did_fail_to_load(&self, error: &str) {
        self.relay(Ok(PaymentContextEvent::DidFailToLoad(error.to_string())));
    }

    fn did_finish(&self, outcome: PaymentOutcome) {
        self.relay(Ok(PaymentContextEvent::DidFinish(outcome)));
    }

    fn requires_action(&self, authorization_url: &str) {
        self.relay(Ok(PaymentContextEvent::RequiresAction(
            authorization_url.to_string(),
        )));
    }

    fn ready_to_charge(&self, error: bool) {
        self.relay(Ok(PaymentContextEvent::ReadyToCharge { error }));
    }
}

impl EphemeralKeyProvider for ContextAdapter {
    fn provide(&self, api_version: &str, completion: CredentialCompletion) {
        let request = self.core.issue_request(self.epoch, api_version);
        let core = Arc::clone(&self.core);
        self.core.runtime.spawn(async move {
            core.supply(request, completion).await;
        });
    }
}
