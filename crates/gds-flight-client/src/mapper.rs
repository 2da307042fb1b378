//! Reshape user record batches into the canonical GDS column layout.
//!
//! Node batches become `nodeId`, `labels`, then the mapped properties in
//! model order. Edge batches become `sourceNodeId`, `targetNodeId`,
//! `relationshipType`, then properties. Columns the model does not mention
//! are dropped. The model entry is found either through a source tag stored
//! in the batch's schema metadata or, without one, by sniffing the first
//! row of a `labels` (nodes) or `type` (edges) column.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef, GenericStringArray, OffsetSizeTrait, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, FieldRef, Schema};

use gds_flight_core::{Edge, Graph, Node};

use crate::transport::EntityType;

pub const NODE_ID: &str = "nodeId";
pub const LABELS: &str = "labels";
pub const SOURCE_NODE_ID: &str = "sourceNodeId";
pub const TARGET_NODE_ID: &str = "targetNodeId";
pub const RELATIONSHIP_TYPE: &str = "relationshipType";

const NODE_SNIFF_COLUMN: &str = "labels";
const EDGE_SNIFF_COLUMN: &str = "type";

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("no '{key}' entry in schema metadata: {schema}")]
    MissingSourceTag { key: String, schema: String },

    #[error("cannot find matching {kind} in model given {schema}")]
    Unresolved { kind: EntityType, schema: String },

    #[error("column '{column}' not found in {schema}")]
    MissingColumn { column: String, schema: String },

    #[error("column '{column}' must be a string column to identify the model entry, got {data_type}")]
    NotAString { column: String, data_type: String },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// How batches are transformed before upload.
#[derive(Debug, Clone, Copy)]
pub enum Mapper<'g> {
    /// Batches are already in canonical layout.
    Identity,
    Nodes {
        model: &'g Graph,
        source_key: Option<&'g str>,
    },
    Edges {
        model: &'g Graph,
        source_key: Option<&'g str>,
    },
}

impl<'g> Mapper<'g> {
    pub fn nodes(model: &'g Graph, source_key: Option<&'g str>) -> Self {
        Self::Nodes { model, source_key }
    }

    pub fn edges(model: &'g Graph, source_key: Option<&'g str>) -> Self {
        Self::Edges { model, source_key }
    }

    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, MappingError> {
        match *self {
            Self::Identity => Ok(batch.clone()),
            Self::Nodes { model, source_key } => {
                let node = resolve_node(model, source_key, batch)?;
                map_node(node, batch)
            }
            Self::Edges { model, source_key } => {
                let edge = resolve_edge(model, source_key, batch)?;
                map_edge(edge, batch)
            }
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────

fn resolve_node<'g>(
    model: &'g Graph,
    source_key: Option<&str>,
    batch: &RecordBatch,
) -> Result<&'g Node, MappingError> {
    let found = match source_key {
        Some(key) => model.node_for_src(&source_tag(batch, key)?),
        None => sniff(batch, NODE_SNIFF_COLUMN)?.and_then(|label| model.node_by_label(&label)),
    };
    found.ok_or_else(|| MappingError::Unresolved {
        kind: EntityType::Node,
        schema: describe(&batch.schema()),
    })
}

fn resolve_edge<'g>(
    model: &'g Graph,
    source_key: Option<&str>,
    batch: &RecordBatch,
) -> Result<&'g Edge, MappingError> {
    let found = match source_key {
        Some(key) => model.edge_for_src(&source_tag(batch, key)?),
        None => sniff(batch, EDGE_SNIFF_COLUMN)?.and_then(|t| model.edge_by_type(&t)),
    };
    found.ok_or_else(|| MappingError::Unresolved {
        kind: EntityType::Relationship,
        schema: describe(&batch.schema()),
    })
}

fn source_tag(batch: &RecordBatch, key: &str) -> Result<String, MappingError> {
    let schema = batch.schema();
    schema
        .metadata()
        .get(key)
        .cloned()
        .ok_or_else(|| MappingError::MissingSourceTag {
            key: key.to_string(),
            schema: describe(&schema),
        })
}

/// First-row value of a string column. Only row 0 is inspected.
fn sniff(batch: &RecordBatch, column: &str) -> Result<Option<String>, MappingError> {
    let Some(array) = batch.column_by_name(column) else {
        return Ok(None);
    };
    match array.data_type() {
        DataType::Utf8 => Ok(first_value(array.as_string::<i32>())),
        DataType::LargeUtf8 => Ok(first_value(array.as_string::<i64>())),
        other => Err(MappingError::NotAString {
            column: column.to_string(),
            data_type: other.to_string(),
        }),
    }
}

fn first_value<O: OffsetSizeTrait>(array: &GenericStringArray<O>) -> Option<String> {
    (!array.is_empty() && array.is_valid(0)).then(|| array.value(0).to_string())
}

// ── Projection ───────────────────────────────────────────────────

pub fn map_node(node: &Node, batch: &RecordBatch) -> Result<RecordBatch, MappingError> {
    let mut out = Projection::new(batch);
    out.rename(&node.key_field, NODE_ID)?;
    if let Some(label) = node.fixed_label() {
        out.constant(LABELS, label);
    } else if let Some(column) = node.label_column() {
        out.rename(column, LABELS)?;
    }
    for (column, name) in &node.properties {
        out.rename(column, name)?;
    }
    out.finish()
}

pub fn map_edge(edge: &Edge, batch: &RecordBatch) -> Result<RecordBatch, MappingError> {
    let mut out = Projection::new(batch);
    out.rename(&edge.source_field, SOURCE_NODE_ID)?;
    out.rename(&edge.target_field, TARGET_NODE_ID)?;
    if let Some(rel_type) = edge.fixed_type() {
        out.constant(RELATIONSHIP_TYPE, rel_type);
    } else if let Some(column) = edge.type_column() {
        out.rename(column, RELATIONSHIP_TYPE)?;
    }
    for (column, name) in &edge.properties {
        out.rename(column, name)?;
    }
    out.finish()
}

/// Output columns collected in order. The output schema carries no metadata.
struct Projection<'b> {
    input: &'b RecordBatch,
    fields: Vec<FieldRef>,
    columns: Vec<ArrayRef>,
}

impl<'b> Projection<'b> {
    fn new(input: &'b RecordBatch) -> Self {
        Self {
            input,
            fields: Vec::new(),
            columns: Vec::new(),
        }
    }

    fn rename(&mut self, column: &str, name: &str) -> Result<(), MappingError> {
        let schema = self.input.schema();
        let (index, field) =
            schema
                .column_with_name(column)
                .ok_or_else(|| MappingError::MissingColumn {
                    column: column.to_string(),
                    schema: describe(&schema),
                })?;
        self.fields.push(Arc::new(field.clone().with_name(name)));
        self.columns.push(Arc::clone(self.input.column(index)));
        Ok(())
    }

    fn constant(&mut self, name: &str, value: &str) {
        let rows = self.input.num_rows();
        let array = StringArray::from_iter_values(std::iter::repeat(value).take(rows));
        self.fields.push(Arc::new(Field::new(name, DataType::Utf8, true)));
        self.columns.push(Arc::new(array));
    }

    fn finish(self) -> Result<RecordBatch, MappingError> {
        let schema = Arc::new(Schema::new(self.fields));
        Ok(RecordBatch::try_new(schema, self.columns)?)
    }
}

fn describe(schema: &Schema) -> String {
    let fields: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect();
    let mut metadata: Vec<String> = schema
        .metadata()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    metadata.sort();
    format!("schema [{}] metadata {{{}}}", fields.join(", "), metadata.join(", "))
}
