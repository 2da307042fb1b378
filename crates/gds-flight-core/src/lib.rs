//! gds-flight-core: Graph model, error classification, and configuration
//! shared by the GDS Flight client and its tooling.
//!
//! - Node and edge definitions with source-tag resolution
//! - Transport failure types and the service error taxonomy
//! - Client configuration

pub mod config;
pub mod error;
pub mod model;

pub use config::{ClientConfig, ConfigError};
pub use error::{classify, FlightStatus, ServiceError, TransportError};
pub use model::{Edge, Graph, LoadError, Node, PropertyMap, ValidationError};
