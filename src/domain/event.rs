use crate::domain::credential::RequestId;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize, Serializer, ser};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Display summary of the selected payment method.
///
/// Keeps the SDK's JSON text exactly as received. It is checked to be an
/// object but never re-encoded, so key order and number precision survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary(String);

impl MethodSummary {
    /// Checks the raw JSON summary handed over by the payment SDK.
    pub fn from_json(raw: &str) -> std::result::Result<Self, PayloadError> {
        let summary: &RawValue = serde_json::from_str(raw)
            .map_err(|e| PayloadError::new(NOTIFICATION_METHOD_SELECTED, e.to_string()))?;
        if !summary.get().starts_with('{') {
            return Err(PayloadError::new(
                NOTIFICATION_METHOD_SELECTED,
                format!("method summary must be a JSON object, got `{}`", summary.get()),
            ));
        }
        Ok(Self(summary.get().to_string()))
    }

    /// Summary for a card, the shape the SDK reports for card sources.
    pub fn card(brand: Option<&str>, last4: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), Value::from("card"));
        if let Some(brand) = brand {
            fields.insert("brand".into(), Value::from(brand));
        }
        fields.insert("last4".into(), Value::from(last4));
        Self(Value::Object(fields).to_string())
    }

    pub fn method_type(&self) -> Option<String> {
        let fields: Map<String, Value> = serde_json::from_str(&self.0).ok()?;
        fields.get("type").and_then(Value::as_str).map(str::to_string)
    }

    pub fn as_json(&self) -> &str {
        &self.0
    }

    pub fn to_json(&self) -> String {
        self.0.clone()
    }
}

impl Serialize for MethodSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let raw: &RawValue = serde_json::from_str(&self.0).map_err(ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

/// Opaque token identifying the payment result created by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultToken(pub String);

impl From<&str> for ResultToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Completed,
    Canceled,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentOutcome {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" | "success" => Ok(Self::Completed),
            "canceled" | "cancelled" | "user_cancellation" => Ok(Self::Canceled),
            "failed" | "error" => Ok(Self::Failed),
            other => Err(BridgeError::InvalidCommand(format!(
                "unknown payment outcome `{other}`"
            ))),
        }
    }
}

/// Lifecycle notification reported by the payment SDK's context.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentContextEvent {
    SelectedMethodChanged(MethodSummary),
    DidCreatePaymentResult(ResultToken),
    DidFailToLoad(String),
    DidFinish(PaymentOutcome),
    /// The payment intent needs the customer to authorize it at this URL.
    RequiresAction(String),
    /// The payment intent settled; `error` is set when it cannot be charged.
    ReadyToCharge { error: bool },
}

pub const NOTIFICATION_METHOD_SELECTED: &str = "selectedMethodChanged";
pub const NOTIFICATION_PAYMENT_RESULT: &str = "didCreatePaymentResult";
pub const NOTIFICATION_FAIL_TO_LOAD: &str = "didFailToLoad";
pub const NOTIFICATION_FINISH: &str = "didFinish";
pub const NOTIFICATION_REQUIRES_ACTION: &str = "requiresAction";
pub const NOTIFICATION_READY_TO_CHARGE: &str = "readyToCharge";

impl PaymentContextEvent {
    pub fn notification(&self) -> &'static str {
        match self {
            Self::SelectedMethodChanged(_) => NOTIFICATION_METHOD_SELECTED,
            Self::DidCreatePaymentResult(_) => NOTIFICATION_PAYMENT_RESULT,
            Self::DidFailToLoad(_) => NOTIFICATION_FAIL_TO_LOAD,
            Self::DidFinish(_) => NOTIFICATION_FINISH,
            Self::RequiresAction(_) => NOTIFICATION_REQUIRES_ACTION,
            Self::ReadyToCharge { .. } => NOTIFICATION_READY_TO_CHARGE,
        }
    }
}

/// A notification whose payload could not be encoded for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError {
    pub notification: &'static str,
    pub reason: String,
}

impl PayloadError {
    pub fn new(notification: &'static str, reason: impl Into<String>) -> Self {
        Self {
            notification,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not encode {} payload: {}",
            self.notification, self.reason
        )
    }
}

impl From<PayloadError> for BridgeError {
    fn from(e: PayloadError) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Named event delivered on the embedding runtime's event channel.
///
/// Serializes as `{"event": "<name>", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum BridgeEvent {
    #[serde(rename = "onCreateEphemeralKey", rename_all = "camelCase")]
    CreateEphemeralKey {
        api_version: String,
        request_id: RequestId,
    },
    #[serde(rename = "onSelectedMethodChanged", rename_all = "camelCase")]
    SelectedMethodChanged { method_summary: MethodSummary },
    #[serde(rename = "onPaymentResult", rename_all = "camelCase")]
    PaymentResult { result_token: ResultToken },
    #[serde(rename = "onPaymentError")]
    PaymentError { message: String },
    #[serde(rename = "onPaymentFinished")]
    PaymentFinished { outcome: PaymentOutcome },
    #[serde(rename = "onPaymentRequiresAction", rename_all = "camelCase")]
    PaymentRequiresAction { authorization_url: String },
    #[serde(rename = "onReadyToChargeIntent")]
    ReadyToChargeIntent { error: bool },
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateEphemeralKey { .. } => "onCreateEphemeralKey",
            Self::SelectedMethodChanged { .. } => "onSelectedMethodChanged",
            Self::PaymentResult { .. } => "onPaymentResult",
            Self::PaymentError { .. } => "onPaymentError",
            Self::PaymentFinished { .. } => "onPaymentFinished",
            Self::PaymentRequiresAction { .. } => "onPaymentRequiresAction",
            Self::ReadyToChargeIntent { .. } => "onReadyToChargeIntent",
        }
    }

    /// The event's payload object, without the name envelope.
    pub fn payload(&self) -> Result<Value> {
        let mut envelope = serde_json::to_value(self)?;
        envelope
            .get_mut("payload")
            .map(Value::take)
            .ok_or_else(|| BridgeError::Serialization(format!("{} has no payload", self.name())))
    }
}

impl From<PaymentContextEvent> for BridgeEvent {
    fn from(event: PaymentContextEvent) -> Self {
        match event {
            PaymentContextEvent::SelectedMethodChanged(method_summary) => {
                Self::SelectedMethodChanged { method_summary }
            }
            PaymentContextEvent::DidCreatePaymentResult(result_token) => {
                Self::PaymentResult { result_token }
            }
            PaymentContextEvent::DidFailToLoad(message) => Self::PaymentError { message },
            PaymentContextEvent::DidFinish(outcome) => Self::PaymentFinished { outcome },
            PaymentContextEvent::RequiresAction(authorization_url) => {
                Self::PaymentRequiresAction { authorization_url }
            }
            PaymentContextEvent::ReadyToCharge { error } => Self::ReadyToChargeIntent { error },
        }
    }
}

impl From<PayloadError> for BridgeEvent {
    fn from(e: PayloadError) -> Self {
        Self::PaymentError {
            message: BridgeError::from(e).to_string(),
        }
    }
}
