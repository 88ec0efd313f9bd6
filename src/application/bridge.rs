use crate::application::adapter::{BridgeCore, ContextAdapter};
use crate::application::dispatcher::{self, Dispatch};
use crate::config::{BridgeConfig, CredentialSource};
use crate::domain::credential::{RequestId, extract_credential};
use crate::domain::event::{MethodSummary, PaymentOutcome};
use crate::domain::options::{InitOptions, PaymentContextOptions, PaymentIntentOptions};
use crate::domain::ports::{CredentialBackendRef, EventSinkRef, PaymentSdkRef};
use crate::error::{BridgeError, Result};
use crate::infrastructure::http_credentials::HttpCredentialBackend;
use crate::infrastructure::runtime_credentials::RuntimeCredentialBackend;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The adapter between the embedding runtime and the native payment SDK.
///
/// `PaymentBridge` owns the event dispatcher and the SDK's payment context.
/// Runtime commands come in through its methods; the SDK talks back through
/// the [`ContextAdapter`] it receives in [`PaymentBridge::init_payment_context`].
///
/// Must be created inside a tokio runtime. Call [`PaymentBridge::shutdown`]
/// to flush pending events and stop the dispatcher.
pub struct PaymentBridge {
    core: Arc<BridgeCore>,
    sdk: PaymentSdkRef,
    runtime_keys: Option<Arc<RuntimeCredentialBackend>>,
    configured: AtomicBool,
    init_pending: AtomicBool,
    dispatcher: Option<JoinHandle<()>>,
}

impl PaymentBridge {
    /// Creates a bridge whose credential backend is chosen by `config`.
    pub fn new(config: BridgeConfig, sdk: PaymentSdkRef, sink: EventSinkRef) -> Result<Self> {
        config.validate()?;
        let runtime = current_runtime()?;
        let (queue, dispatcher) = dispatcher::spawn(sink);

        let (backend, runtime_keys) = match &config.credential_source {
            CredentialSource::Runtime => {
                let keys = Arc::new(RuntimeCredentialBackend::new(Arc::new(queue.clone())));
                let backend: CredentialBackendRef = keys.clone();
                (backend, Some(keys))
            }
            CredentialSource::Http(endpoint) => {
                let backend: CredentialBackendRef =
                    Arc::new(HttpCredentialBackend::new(endpoint.clone())?);
                (backend, None)
            }
        };

        let core = BridgeCore::new(queue, backend, runtime, config.credential_timeout());
        Ok(Self::assemble(core, sdk, runtime_keys, dispatcher))
    }

    /// Creates a bridge around an already constructed credential backend.
    pub fn with_backend(
        config: BridgeConfig,
        sdk: PaymentSdkRef,
        sink: EventSinkRef,
        backend: CredentialBackendRef,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = current_runtime()?;
        let (queue, dispatcher) = dispatcher::spawn(sink);
        let core = BridgeCore::new(queue, backend, runtime, config.credential_timeout());
        Ok(Self::assemble(core, sdk, None, dispatcher))
    }

    fn assemble(
        core: BridgeCore,
        sdk: PaymentSdkRef,
        runtime_keys: Option<Arc<RuntimeCredentialBackend>>,
        dispatcher: JoinHandle<()>,
    ) -> Self {
        Self {
            core: Arc::new(core),
            sdk,
            runtime_keys,
            configured: AtomicBool::new(false),
            init_pending: AtomicBool::new(false),
            dispatcher: Some(dispatcher),
        }
    }

    /// Configures the payment SDK with the application's publishable key.
    pub fn initialize(&self, options: InitOptions) -> Result<()> {
        options.validate()?;
        self.sdk.configure(&options.publishable_key)?;
        self.configured.store(true, Ordering::SeqCst);
        info!("payment SDK configured");
        Ok(())
    }

    /// Creates the SDK's payment context with this bridge as its key provider
    /// and observer, and resolves with the first selected payment method.
    ///
    /// Any previous context is torn down first.
    pub async fn init_payment_context(
        &self,
        options: PaymentContextOptions,
    ) -> Result<MethodSummary> {
        if !self.configured.load(Ordering::SeqCst) {
            return Err(BridgeError::NotInitialized);
        }
        options.validate()?;
        let _pending = InitPending::acquire(&self.init_pending)?;

        if self.core.active_epoch().is_some() {
            self.sdk.release_payment_context();
        }
        let adapter = Arc::new(self.open_context()?);
        let epoch = adapter.epoch();

        let (reply, selection) = oneshot::channel();
        self.core
            .queue
            .post(Dispatch::AwaitSelection { epoch, reply })?;

        if let Err(e) = self
            .sdk
            .create_payment_context(&options, adapter.clone(), adapter)
        {
            warn!(epoch, error = %e, "payment SDK refused to create a payment context");
            self.teardown()?;
            return Err(e);
        }
        info!(
            epoch,
            currency = %options.currency,
            amount = %options.amount.value(),
            "payment context initialized"
        );

        selection.await.map_err(|_| BridgeError::ChannelClosed)?
    }

    /// Starts a new payment context and returns its adapter without involving
    /// the SDK. The previous context, if any, ends.
    pub fn open_context(&self) -> Result<ContextAdapter> {
        let (previous, epoch) = self.core.begin_context()?;
        if let Some(previous) = previous {
            self.core.backend.cancel_pending();
            info!(epoch = previous, "payment context replaced");
        }
        Ok(ContextAdapter::new(Arc::clone(&self.core), epoch))
    }

    pub fn present_payment_method_selector(&self) -> Result<()> {
        self.require_context()?;
        self.sdk.present_payment_method_selector()
    }

    /// Confirms the payment intent in `options` and resolves with the SDK's
    /// final outcome.
    ///
    /// If the customer has to authorize the payment elsewhere, the runtime
    /// receives `onPaymentRequiresAction` and the call stays pending until
    /// [`PaymentBridge::handle_redirect_return`] lets the SDK finish.
    pub async fn request_payment(&self, options: PaymentIntentOptions) -> Result<PaymentOutcome> {
        let epoch = self.require_context()?;
        options.validate()?;
        let (reply, outcome) = oneshot::channel();
        self.core
            .queue
            .post(Dispatch::AwaitOutcome { epoch, reply })?;
        self.sdk.request_payment(&options)?;
        info!(epoch, redirect = options.return_url.is_some(), "payment submitted");
        outcome.await.map_err(|_| BridgeError::ChannelClosed)?
    }

    /// Tells the SDK the customer returned from an authorization redirect.
    pub fn handle_redirect_return(&self) -> Result<()> {
        let epoch = self.require_context()?;
        info!(epoch, "customer returned from payment authorization");
        self.sdk.handle_redirect_return()
    }

    /// Answers an `onCreateEphemeralKey` event with the runtime's response,
    /// either `{"credential": {...}}` or `{"error": "..."}`.
    pub fn respond_to_credential_request(&self, request_id: RequestId, response: Value) -> Result<()> {
        self.runtime_keys()?
            .resolve(request_id, extract_credential(response))
    }

    pub fn retrieved_customer_key(&self, request_id: RequestId, credential: Value) -> Result<()> {
        self.respond_to_credential_request(request_id, credential)
    }

    pub fn failed_retrieving_customer_key(&self, request_id: RequestId, message: &str) -> Result<()> {
        self.runtime_keys()?.resolve(
            request_id,
            Err(BridgeError::CredentialRejected(message.to_string())),
        )
    }

    /// Ends the active payment context. Credential results and notifications
    /// still in flight for it are discarded.
    pub fn teardown(&self) -> Result<()> {
        if let Some(epoch) = self.core.end_context()? {
            self.core.backend.cancel_pending();
            self.sdk.release_payment_context();
            info!(epoch, "payment context torn down");
        }
        Ok(())
    }

    /// Tears down, delivers every queued event, and stops the dispatcher.
    pub async fn shutdown(mut self) -> Result<()> {
        self.teardown()?;
        self.core.queue.post(Dispatch::Shutdown)?;
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher
                .await
                .map_err(|e| BridgeError::Dispatcher(e.to_string()))?;
        }
        Ok(())
    }

    /// Epoch of the live payment context, if there is one.
    pub fn active_epoch(&self) -> Option<u64> {
        self.core.active_epoch()
    }

    fn require_context(&self) -> Result<u64> {
        if !self.configured.load(Ordering::SeqCst) {
            return Err(BridgeError::NotInitialized);
        }
        self.core
            .active_epoch()
            .ok_or(BridgeError::NoPaymentContext)
    }

    fn runtime_keys(&self) -> Result<&RuntimeCredentialBackend> {
        self.runtime_keys.as_deref().ok_or_else(|| {
            BridgeError::InvalidCommand(
                "ephemeral keys are not supplied by the runtime in this configuration".to_string(),
            )
        })
    }
}

impl Drop for PaymentBridge {
    fn drop(&mut self) {
        if self.dispatcher.is_some() {
            let _ = self.core.queue.post(Dispatch::Shutdown);
        }
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| {
        BridgeError::Config(format!("the bridge must be created inside a tokio runtime: {e}"))
    })
}

/// Marks an `init_payment_context` call as in progress until dropped.
struct InitPending<'a>(&'a AtomicBool);

impl<'a> InitPending<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| BridgeError::InitInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InitPending<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
