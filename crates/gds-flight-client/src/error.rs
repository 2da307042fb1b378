//! Errors surfaced by client operations.

use gds_flight_core::{classify, ConfigError, ServiceError, TransportError, ValidationError};

use crate::lifecycle::{ClientState, Operation};
use crate::mapper::MappingError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Invalid graph model: {0}")]
    Validation(#[from] ValidationError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The server replied, but not with the expected echo of the graph name.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Illegal state: cannot {operation} while {state}")]
    IllegalState {
        operation: Operation,
        state: ClientState,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("no record batches provided")]
    EmptyInput,

    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Service(classify(err))
    }
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Service(ServiceError::NotFound(_)))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Service(ServiceError::AlreadyExists(_)))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
