//! gds-flight: offline tooling for GDS Flight imports.
//!
//! Checks graph model files, shows how a source tag resolves against a
//! model, and renders the tickets a read would send.

pub mod commands;
pub mod error;
