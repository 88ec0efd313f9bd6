use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a single credential request issued by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request from the payment SDK for a short-lived customer key.
///
/// The SDK only supplies the API version. The adapter stamps the request with
/// its own id and the epoch of the payment context that asked for it, so a
/// result arriving after teardown can be recognised as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralCredentialRequest {
    pub id: RequestId,
    pub epoch: u64,
    pub api_version: String,
}

impl EphemeralCredentialRequest {
    pub fn new(id: RequestId, epoch: u64, api_version: impl Into<String>) -> Self {
        Self {
            id,
            epoch,
            api_version: api_version.into(),
        }
    }
}

/// Outcome handed back to the payment SDK, exactly once per request.
#[derive(Debug, Clone, PartialEq)]
pub enum EphemeralCredentialResult {
    Success(Value),
    Failure(String),
}

impl EphemeralCredentialResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<Value>> for EphemeralCredentialResult {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(credential) => Self::Success(credential),
            Err(e) => Self::Failure(e.to_string()),
        }
    }
}

/// Pulls the credential object out of a backend or runtime answer.
///
/// Accepts `{"credential": {...}}`, `{"error": "..."}`, or a bare credential
/// object as issuing backends return it.
pub fn extract_credential(response: Value) -> Result<Value> {
    let mut fields = match response {
        Value::Object(fields) => fields,
        other => {
            return Err(BridgeError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    if let Some(credential) = fields.remove("credential") {
        return match credential {
            Value::Object(_) => Ok(credential),
            other => Err(BridgeError::MalformedResponse(format!(
                "`credential` must be an object, got {}",
                json_kind(&other)
            ))),
        };
    }

    if let Some(error) = fields.remove("error") {
        let message = match error {
            Value::String(message) if !message.is_empty() => message,
            Value::String(_) | Value::Null => "no reason given".to_string(),
            other => other.to_string(),
        };
        return Err(BridgeError::CredentialRejected(message));
    }

    if fields.is_empty() {
        return Err(BridgeError::MalformedResponse(
            "credential object is empty".to_string(),
        ));
    }
    Ok(Value::Object(fields))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
