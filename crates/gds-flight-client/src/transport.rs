//! The Flight transport boundary.
//!
//! Connection setup, authentication, and the wire encoding of batches live
//! behind [`FlightTransport`]. Implementations are expected to connect
//! lazily on first use; the client only ever sees the four capabilities
//! below and [`TransportError`]s carrying a status category.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use gds_flight_core::{FlightStatus, TransportError};

/// Batches delivered by a download stream, in transport order.
pub type TransportStream = BoxStream<'static, Result<RecordBatch, TransportError>>;

/// Capabilities the client needs from a Flight connection.
#[async_trait]
pub trait FlightTransport: Send + Sync {
    /// Perform a named action with a JSON body and return the JSON reply.
    async fn do_action(
        &self,
        action: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;

    /// Open an upload stream routed by `descriptor` for batches of `schema`.
    async fn do_put(
        &self,
        descriptor: &serde_json::Value,
        schema: SchemaRef,
    ) -> Result<Box<dyn BatchSink>, TransportError>;

    /// Open a download stream for `ticket`.
    async fn do_get(&self, ticket: &serde_json::Value) -> Result<TransportStream, TransportError>;
}

/// The writing half of an upload stream.
#[async_trait]
pub trait BatchSink: Send {
    async fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), TransportError>;

    /// Signal end of stream and wait for the server to acknowledge it.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ── Actions and descriptors ──────────────────────────────────────

/// Control-plane actions understood by the GDS Flight service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateGraph,
    CreateDatabase,
    NodeLoadDone,
    RelationshipLoadDone,
    Abort,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateGraph => "CREATE_GRAPH",
            Self::CreateDatabase => "CREATE_DATABASE",
            Self::NodeLoadDone => "NODE_LOAD_DONE",
            Self::RelationshipLoadDone => "RELATIONSHIP_LOAD_DONE",
            Self::Abort => "ABORT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity carried by an upload stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Node,
    Relationship,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Relationship => f.write_str("relationship"),
        }
    }
}

/// Routing descriptor attached to an upload stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutDescriptor {
    pub name: String,
    pub entity_type: EntityType,
}

// ── Helpers ──────────────────────────────────────────────────────

/// Bound a transport call by the per-instance timeout, reporting expiry as
/// a `TimedOut` transport failure.
pub(crate) async fn bounded<T, F>(
    limit: Option<Duration>,
    what: &str,
    call: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                FlightStatus::TimedOut,
                format!("{what} timed out after {limit:?}"),
            )),
        },
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_wire_format() {
        let desc = PutDescriptor {
            name: "g".to_string(),
            entity_type: EntityType::Relationship,
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "g", "entity_type": "relationship"})
        );
    }

    #[test]
    fn action_names() {
        assert_eq!(Action::CreateGraph.as_str(), "CREATE_GRAPH");
        assert_eq!(Action::CreateDatabase.as_str(), "CREATE_DATABASE");
        assert_eq!(Action::NodeLoadDone.as_str(), "NODE_LOAD_DONE");
        assert_eq!(Action::RelationshipLoadDone.as_str(), "RELATIONSHIP_LOAD_DONE");
        assert_eq!(Action::Abort.to_string(), "ABORT");
    }

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TransportError>(())
        };
        let err = bounded(Some(Duration::from_millis(10)), "probe", slow)
            .await
            .unwrap_err();
        assert_eq!(err.status, FlightStatus::TimedOut);
        assert!(err.message.starts_with("probe timed out"));
    }

    #[tokio::test]
    async fn bounded_without_limit_passes_through() {
        let result = bounded(None, "probe", async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
