//! Bulk import and export of property graphs through the Neo4j GDS Arrow
//! Flight service.
//!
//! [`GdsFlightClient`] drives an import session (start, feed nodes, feed
//! relationships, wait) and opens read streams over an existing graph. The
//! network side is abstracted behind [`FlightTransport`].

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod mapper;
pub mod reader;
pub mod transport;
pub mod writer;

pub use client::{
    CompletionHandle, CreateDatabaseOptions, CreateGraphOptions, GdsFlightClient, ImportKind,
};
pub use error::{ClientError, Result};
pub use lifecycle::{ClientState, Operation};
pub use mapper::{Mapper, MappingError};
pub use reader::{ProcedureNames, RecordBatchStream, Ticket};
pub use transport::{Action, BatchSink, EntityType, FlightTransport, PutDescriptor, TransportStream};
pub use writer::{Entities, RetryPolicy, WriteSummary};
