use super::credential::{EphemeralCredentialRequest, EphemeralCredentialResult};
use super::event::{BridgeEvent, PaymentOutcome};
use super::options::{PaymentContextOptions, PaymentIntentOptions};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Completion handed over by the payment SDK with each key request.
pub type CredentialCompletion = Box<dyn FnOnce(EphemeralCredentialResult) + Send + 'static>;

/// Supplies short-lived customer keys to the payment SDK.
pub trait EphemeralKeyProvider: Send + Sync {
    /// Must return without blocking; `completion` fires later, exactly once.
    ///
    /// The bridge cannot open or tear down payment contexts while a
    /// completion runs, so a completion must not call back into those
    /// commands synchronously.
    fn provide(&self, api_version: &str, completion: CredentialCompletion);
}

/// One-way notifications from the payment SDK's payment context.
///
/// Called from whatever thread the SDK happens to be on.
pub trait PaymentContextObserver: Send + Sync {
    /// `summary` is the raw JSON summary of the newly selected method.
    fn selected_method_changed(&self, summary: &str);
    fn did_create_payment_result(&self, result_token: &str);
    fn did_fail_to_load(&self, error: &str);
    fn did_finish(&self, outcome: PaymentOutcome);
    /// The payment intent needs out-of-app customer authorization.
    fn requires_action(&self, authorization_url: &str);
    fn ready_to_charge(&self, error: bool);
}

/// Where ephemeral keys come from: the application's backend or the runtime.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn fetch_credential(&self, request: &EphemeralCredentialRequest) -> Result<Value>;

    /// Drops every request still waiting on this backend.
    fn cancel_pending(&self) {}
}

/// The embedding runtime's event channel.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BridgeEvent) -> Result<()>;
}

/// Operations of the native payment SDK used by the command surface.
pub trait PaymentSdk: Send + Sync {
    fn configure(&self, publishable_key: &str) -> Result<()>;
    fn create_payment_context(
        &self,
        options: &PaymentContextOptions,
        key_provider: EphemeralKeyProviderRef,
        observer: PaymentContextObserverRef,
    ) -> Result<()>;
    fn present_payment_method_selector(&self) -> Result<()>;
    fn request_payment(&self, options: &PaymentIntentOptions) -> Result<()>;
    /// The customer is back from the authorization page of a payment that
    /// required action.
    fn handle_redirect_return(&self) -> Result<()>;
    fn release_payment_context(&self);
}

pub type EphemeralKeyProviderRef = Arc<dyn EphemeralKeyProvider>;
pub type PaymentContextObserverRef = Arc<dyn PaymentContextObserver>;
pub type CredentialBackendRef = Arc<dyn CredentialBackend>;
pub type EventSinkRef = Arc<dyn EventSink>;
pub type PaymentSdkRef = Arc<dyn PaymentSdk>;
