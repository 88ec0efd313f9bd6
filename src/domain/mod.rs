//! Domain types and the ports the adapter is wired through.

pub mod credential;
pub mod event;
pub mod flow;
pub mod options;
pub mod ports;
