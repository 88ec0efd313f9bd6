//! Application layer: the adapter between the embedding runtime and the SDK.
//!
//! `PaymentBridge` is the entry point. SDK callbacks never touch the runtime
//! directly; they are posted as messages to a single dispatcher task, an
//! actor-like pattern built on `tokio` channels, which owns event delivery.

pub mod adapter;
pub mod bridge;
pub mod dispatcher;
