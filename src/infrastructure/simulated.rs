use crate::domain::credential::EphemeralCredentialResult;
use crate::domain::event::{MethodSummary, PaymentOutcome};
use crate::domain::options::{PaymentContextOptions, PaymentIntentOptions};
use crate::domain::ports::{
    EphemeralKeyProviderRef, PaymentContextObserver, PaymentContextObserverRef, PaymentSdk,
};
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::debug;

/// How a scripted payment attempt ends.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedPayment {
    Succeed { result_token: String },
    Decline { message: String },
    Cancel,
    /// The intent needs customer authorization at `authorization_url` and
    /// succeeds once the customer returns.
    RequireAction {
        authorization_url: String,
        result_token: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedScript {
    pub api_version: String,
    /// Raw JSON summaries reported on context creation and on each
    /// selector presentation, in turn. The last one repeats.
    pub methods: Vec<String>,
    pub payment: SimulatedPayment,
}

impl Default for SimulatedScript {
    fn default() -> Self {
        Self {
            api_version: "2020-08-27".to_string(),
            methods: vec![MethodSummary::card(Some("visa"), "4242").to_json()],
            payment: SimulatedPayment::Succeed {
                result_token: "pi_simulated".to_string(),
            },
        }
    }
}

/// Calls received by the simulated SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    Configure(String),
    CreatePaymentContext {
        amount_minor_units: i64,
        currency: String,
        company_name: Option<String>,
        requires_shipping: bool,
    },
    PresentPaymentMethodSelector,
    RequestPayment {
        client_secret: String,
        return_url: Option<String>,
    },
    HandleRedirectReturn,
    ReleasePaymentContext,
}

struct ActiveContext {
    observer: PaymentContextObserverRef,
    presented: usize,
    /// Result token of a payment waiting for the customer to come back.
    awaiting_return: Option<String>,
}

#[derive(Default)]
struct SdkState {
    publishable_key: Option<String>,
    context: Option<ActiveContext>,
    calls: Vec<SdkCall>,
    credentials: Vec<EphemeralCredentialResult>,
}

/// Scripted stand-in for the native payment SDK.
///
/// Behaves like the SDK from the adapter's point of view: it asks for an
/// ephemeral key when a payment context is created and reports every step
/// through the observer from its own background threads.
#[derive(Clone, Default)]
pub struct SimulatedPaymentSdk {
    script: Arc<SimulatedScript>,
    state: Arc<Mutex<SdkState>>,
}

impl SimulatedPaymentSdk {
    pub fn new(script: SimulatedScript) -> Self {
        Self {
            script: Arc::new(script),
            state: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<SdkCall> {
        self.lock().calls.clone()
    }

    /// Credential results the SDK received from its key provider.
    pub fn credentials(&self) -> Vec<EphemeralCredentialResult> {
        self.lock().credentials.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SdkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn method(&self, index: usize) -> Option<String> {
        self.script
            .methods
            .get(index)
            .or_else(|| self.script.methods.last())
            .cloned()
    }

}

impl PaymentSdk for SimulatedPaymentSdk {
    fn configure(&self, publishable_key: &str) -> Result<()> {
        let mut state = self.lock();
        state.publishable_key = Some(publishable_key.to_string());
        state.calls.push(SdkCall::Configure(publishable_key.to_string()));
        Ok(())
    }

    fn create_payment_context(
        &self,
        options: &PaymentContextOptions,
        key_provider: EphemeralKeyProviderRef,
        observer: PaymentContextObserverRef,
    ) -> Result<()> {
        let amount_minor_units = options.amount_minor_units()?;
        {
            let mut state = self.lock();
            if state.publishable_key.is_none() {
                return Err(BridgeError::SdkReported(
                    "publishable key not configured".to_string(),
                ));
            }
            state.calls.push(SdkCall::CreatePaymentContext {
                amount_minor_units,
                currency: options.currency.to_ascii_lowercase(),
                company_name: options.company_name.clone(),
                requires_shipping: options.requires_shipping,
            });
            state.context = Some(ActiveContext {
                observer: Arc::clone(&observer),
                presented: 0,
                awaiting_return: None,
            });
        }

        // The SDK loads the customer before reporting a default method.
        let sdk = self.clone();
        let default_method = self.method(0);
        key_provider.provide(
            &self.script.api_version,
            Box::new(move |result| {
                debug!(success = result.is_success(), "simulated SDK received ephemeral key");
                sdk.lock().credentials.push(result.clone());
                match result {
                    EphemeralCredentialResult::Success(Value::Object(_)) => {
                        if let Some(summary) = default_method {
                            observer.selected_method_changed(&summary);
                        }
                    }
                    EphemeralCredentialResult::Success(other) => {
                        observer.did_fail_to_load(&format!("unusable ephemeral key: {other}"));
                    }
                    EphemeralCredentialResult::Failure(message) => {
                        observer.did_fail_to_load(&message);
                    }
                }
            }),
        );
        Ok(())
    }

    fn present_payment_method_selector(&self) -> Result<()> {
        let (observer, index) = {
            let mut state = self.lock();
            state.calls.push(SdkCall::PresentPaymentMethodSelector);
            let context = state
                .context
                .as_mut()
                .ok_or_else(|| BridgeError::SdkReported("no payment context".to_string()))?;
            context.presented += 1;
            (Arc::clone(&context.observer), context.presented)
        };
        if let Some(summary) = self.method(index) {
            thread::spawn(move || observer.selected_method_changed(&summary));
        }
        Ok(())
    }

    fn request_payment(&self, options: &PaymentIntentOptions) -> Result<()> {
        let observer = {
            let mut state = self.lock();
            state.calls.push(SdkCall::RequestPayment {
                client_secret: options.client_secret.clone(),
                return_url: options.return_url.clone(),
            });
            let context = state
                .context
                .as_mut()
                .ok_or_else(|| BridgeError::SdkReported("no payment context".to_string()))?;
            if let SimulatedPayment::RequireAction { result_token, .. } = &self.script.payment
                && options.return_url.is_some()
            {
                context.awaiting_return = Some(result_token.clone());
            }
            Arc::clone(&context.observer)
        };
        let payment = self.script.payment.clone();
        let can_redirect = options.return_url.is_some();
        thread::spawn(move || match payment {
            SimulatedPayment::Succeed { result_token } => succeed(observer.as_ref(), &result_token),
            SimulatedPayment::Decline { message } => decline(observer.as_ref(), &message),
            SimulatedPayment::Cancel => observer.did_finish(PaymentOutcome::Canceled),
            SimulatedPayment::RequireAction {
                authorization_url, ..
            } => {
                if can_redirect {
                    observer.requires_action(&authorization_url);
                } else {
                    decline(observer.as_ref(), "a return URL is required to authorize this payment");
                }
            }
        });
        Ok(())
    }

    fn handle_redirect_return(&self) -> Result<()> {
        let (observer, result_token) = {
            let mut state = self.lock();
            state.calls.push(SdkCall::HandleRedirectReturn);
            let context = state
                .context
                .as_mut()
                .ok_or_else(|| BridgeError::SdkReported("no payment context".to_string()))?;
            let result_token = context.awaiting_return.take().ok_or_else(|| {
                BridgeError::SdkReported("no payment is waiting for authorization".to_string())
            })?;
            (Arc::clone(&context.observer), result_token)
        };
        thread::spawn(move || succeed(observer.as_ref(), &result_token));
        Ok(())
    }

    fn release_payment_context(&self) {
        let mut state = self.lock();
        state.calls.push(SdkCall::ReleasePaymentContext);
        state.context = None;
    }
}

fn succeed(observer: &dyn PaymentContextObserver, result_token: &str) {
    observer.ready_to_charge(false);
    observer.did_create_payment_result(result_token);
    observer.did_finish(PaymentOutcome::Completed);
}

fn decline(observer: &dyn PaymentContextObserver, message: &str) {
    observer.did_fail_to_load(message);
    observer.ready_to_charge(true);
    observer.did_finish(PaymentOutcome::Failed);
}
