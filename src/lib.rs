pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;

pub use application::adapter::ContextAdapter;
pub use application::bridge::PaymentBridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
