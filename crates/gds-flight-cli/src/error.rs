//! Error types for the gds-flight command-line tools.

use thiserror::Error;

use gds_flight_client::EntityType;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load model: {0}")]
    Load(#[from] gds_flight_core::LoadError),

    #[error("Invalid model: {0}")]
    Validation(#[from] gds_flight_core::ValidationError),

    #[error("Client error: {0}")]
    Client(#[from] gds_flight_client::ClientError),

    #[error("No {kind} in model matches source '{tag}'")]
    NoMatch { kind: EntityType, tag: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
