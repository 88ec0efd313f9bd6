use crate::domain::credential::RequestId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Credential request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Credential request rejected: {0}")]
    CredentialRejected(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Payment SDK error: {0}")]
    SdkReported(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Payment SDK is not initialized, call initialize first")]
    NotInitialized,
    #[error("initPaymentContext already called, but initialization is not yet completed")]
    InitInProgress,
    #[error("No active payment context")]
    NoPaymentContext,
    #[error("Credential request {0} is not pending")]
    UnknownCredentialRequest(RequestId),
    #[error("Payment context was torn down")]
    ContextTornDown,
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
