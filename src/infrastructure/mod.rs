//! Adapters for the ports: credential backends, event sinks, and a scripted
//! stand-in for the native payment SDK.

pub mod http_credentials;
pub mod in_memory;
pub mod runtime_credentials;
pub mod simulated;
