//! Stream nodes and relationships out of a projected graph.
//!
//! Reads are described by a JSON [`Ticket`] naming a GDS stream procedure.
//! The returned stream is cold: nothing is sent until it is first polled.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arrow_array::RecordBatch;
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use serde_json::json;

use crate::error::{ClientError, Result};
use crate::transport::{bounded, FlightTransport};

/// Batches delivered in server order.
pub type RecordBatchStream = Pin<Box<dyn Stream<Item = Result<RecordBatch>> + Send>>;

/// Server-side procedures used to serve reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureNames {
    pub nodes_single_property: String,
    pub nodes_multiple_property: String,
    pub edges_single_property: String,
    pub edges_multiple_property: String,
    pub edges_topology: String,
}

impl Default for ProcedureNames {
    fn default() -> Self {
        Self {
            nodes_single_property: "gds.graph.nodeProperty.stream".to_string(),
            nodes_multiple_property: "gds.graph.nodeProperties.stream".to_string(),
            edges_single_property: "gds.graph.relationshipProperty.stream".to_string(),
            edges_multiple_property: "gds.graph.relationshipProperties.stream".to_string(),
            edges_topology: "gds.graph.relationships.stream".to_string(),
        }
    }
}

impl ProcedureNames {
    /// Names for a given server version. Releases before 2.5 still expose
    /// relationship topology under the beta namespace.
    pub fn for_version(version: Option<&str>) -> Self {
        match version {
            None | Some("") => Self::default(),
            Some(v) if v.starts_with("2.5") => Self::default(),
            Some(_) => Self {
                edges_topology: "gds.beta.graph.relationships.stream".to_string(),
                ..Self::default()
            },
        }
    }
}

/// Download request sent with `do_get`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub graph_name: String,
    pub database_name: String,
    pub procedure_name: String,
    pub configuration: serde_json::Value,
    pub concurrency: usize,
}

impl Ticket {
    /// Node properties for the given labels; all labels when `labels` is `None`.
    /// An empty property list streams node ids and labels only.
    pub fn for_nodes(
        graph: &str,
        database: &str,
        procedures: &ProcedureNames,
        properties: &[&str],
        labels: Option<&[&str]>,
        concurrency: usize,
    ) -> Result<Self> {
        check_concurrency(concurrency)?;
        Ok(Self {
            graph_name: graph.to_string(),
            database_name: database.to_string(),
            procedure_name: procedures.nodes_multiple_property.clone(),
            configuration: json!({
                "node_labels": labels.unwrap_or(&["*"]),
                "node_properties": properties,
                "list_node_labels": true,
            }),
            concurrency,
        })
    }

    /// Relationship properties, or plain topology when no properties are
    /// requested. All types when `relationship_types` is `None`.
    pub fn for_edges(
        graph: &str,
        database: &str,
        procedures: &ProcedureNames,
        properties: &[&str],
        relationship_types: Option<&[&str]>,
        concurrency: usize,
    ) -> Result<Self> {
        check_concurrency(concurrency)?;
        let types = relationship_types.unwrap_or(&["*"]);
        let (procedure_name, configuration) = if properties.is_empty() {
            (
                procedures.edges_topology.clone(),
                json!({ "relationship_types": types }),
            )
        } else {
            (
                procedures.edges_multiple_property.clone(),
                json!({
                    "relationship_properties": properties,
                    "relationship_types": types,
                }),
            )
        };
        Ok(Self {
            graph_name: graph.to_string(),
            database_name: database.to_string(),
            procedure_name,
            configuration,
            concurrency,
        })
    }
}

fn check_concurrency(concurrency: usize) -> Result<()> {
    if concurrency < 1 {
        return Err(ClientError::InvalidConcurrency(concurrency));
    }
    Ok(())
}

/// Open a cold download stream for `ticket`. The `do_get` call happens on
/// first poll; transport failures surface as classified items.
pub fn open_stream(
    transport: Arc<dyn FlightTransport>,
    ticket: Ticket,
    timeout: Option<Duration>,
) -> Result<RecordBatchStream> {
    let body = serde_json::to_value(&ticket)?;
    let stream = futures::stream::once(async move {
        tracing::debug!(
            graph = %ticket.graph_name,
            procedure = %ticket.procedure_name,
            "Opening download stream"
        );
        bounded(timeout, "download open", transport.do_get(&body)).await
    })
    .try_flatten()
    .map_err(ClientError::from);
    Ok(Box::pin(stream))
}
