//! Subcommand implementations. Each returns a serializable report.

use std::path::Path;

use serde::Serialize;

use gds_flight_client::mapper::{
    LABELS, NODE_ID, RELATIONSHIP_TYPE, SOURCE_NODE_ID, TARGET_NODE_ID,
};
use gds_flight_client::{EntityType, ProcedureNames, Ticket};
use gds_flight_core::{ClientConfig, Graph};

use crate::error::{CliError, Result};

/// Summary of a valid model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub db: String,
    pub nodes: usize,
    pub edges: usize,
}

/// How a source tag maps onto the canonical upload layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The model entry's `source`, literal or pattern.
    pub matched: String,
    /// Input columns read from each batch.
    pub reads: Vec<String>,
    /// Output columns, in upload order.
    pub columns: Vec<String>,
}

pub fn validate_model(path: &Path) -> Result<ModelSummary> {
    let model = Graph::from_file(path)?;
    model.validate()?;
    tracing::info!(model = %model.name, path = %path.display(), "Model is valid");
    Ok(ModelSummary {
        name: model.name.clone(),
        db: model.db.clone(),
        nodes: model.nodes.len(),
        edges: model.edges.len(),
    })
}

pub fn resolve_source(model: &Graph, kind: EntityType, tag: &str) -> Result<Resolution> {
    model.validate()?;
    let no_match = || CliError::NoMatch {
        kind,
        tag: tag.to_string(),
    };
    match kind {
        EntityType::Node => {
            let node = model.node_for_src(tag).ok_or_else(no_match)?;
            let mut reads = vec![node.key_field.clone()];
            let mut columns = vec![NODE_ID.to_string(), LABELS.to_string()];
            if node.fixed_label().is_none() {
                reads.extend(node.label_column().map(str::to_string));
            }
            reads.extend(node.properties.keys().cloned());
            columns.extend(node.properties.values().cloned());
            Ok(Resolution {
                matched: node.source.clone(),
                reads,
                columns,
            })
        }
        EntityType::Relationship => {
            let edge = model.edge_for_src(tag).ok_or_else(no_match)?;
            let mut reads = vec![edge.source_field.clone(), edge.target_field.clone()];
            let mut columns = vec![
                SOURCE_NODE_ID.to_string(),
                TARGET_NODE_ID.to_string(),
                RELATIONSHIP_TYPE.to_string(),
            ];
            if edge.fixed_type().is_none() {
                reads.extend(edge.type_column().map(str::to_string));
            }
            reads.extend(edge.properties.keys().cloned());
            columns.extend(edge.properties.values().cloned());
            Ok(Resolution {
                matched: edge.source.clone(),
                reads,
                columns,
            })
        }
    }
}

/// The ticket a read of `kind` would send for the configured graph.
pub fn read_ticket(
    config: &ClientConfig,
    kind: EntityType,
    properties: &[String],
    filter: Option<&[String]>,
    concurrency: usize,
) -> Result<Ticket> {
    let procedures = ProcedureNames::for_version(config.gds_version.as_deref());
    let properties: Vec<&str> = properties.iter().map(String::as_str).collect();
    let filter: Option<Vec<&str>> = filter.map(|f| f.iter().map(String::as_str).collect());
    let ticket = match kind {
        EntityType::Node => Ticket::for_nodes(
            &config.graph,
            &config.database,
            &procedures,
            &properties,
            filter.as_deref(),
            concurrency,
        )?,
        EntityType::Relationship => Ticket::for_edges(
            &config.graph,
            &config.database,
            &procedures,
            &properties,
            filter.as_deref(),
            concurrency,
        )?,
    };
    Ok(ticket)
}
