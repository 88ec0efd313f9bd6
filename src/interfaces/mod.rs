//! Outer surfaces: scripted notification input and JSON-lines event output.

pub mod csv;
pub mod json;
