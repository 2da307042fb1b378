//! Declarative graph model: which tables become nodes and edges, and how
//! their columns map onto the service's schema.
//!
//! A [`Graph`] is a plain value. Builders consume and return it, so a model
//! handed to a client session is never mutated behind the caller's back.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Source column name -> output property name, in declaration order.
pub type PropertyMap = IndexMap<String, String>;

// ── Errors ───────────────────────────────────────────────────────

/// A model invariant was violated. Raised before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("source must be provided in {entity}")]
    MissingSource { entity: String },

    #[error("key_field must be provided in {entity}")]
    MissingKeyField { entity: String },

    #[error("either label or label_field must be provided in {entity}")]
    MissingLabel { entity: String },

    #[error("use of label and label_field at the same time is not allowed in {entity}")]
    AmbiguousLabel { entity: String },

    #[error("source_field must be provided in {entity}")]
    MissingSourceField { entity: String },

    #[error("target_field must be provided in {entity}")]
    MissingTargetField { entity: String },

    #[error("either type or type_field must be provided in {entity}")]
    MissingType { entity: String },

    #[error("use of type and type_field at the same time is not allowed in {entity}")]
    AmbiguousType { entity: String },

    #[error("duplicate node source '{src}' in graph {graph}")]
    DuplicateNodeSource { src: String, graph: String },

    #[error("duplicate edge source '{src}' in graph {graph}")]
    DuplicateEdgeSource { src: String, graph: String },
}

/// Failure loading a model from disk.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Node ─────────────────────────────────────────────────────────

/// How rows of a source table become nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Literal source name or regular expression matched against source tags.
    pub source: String,
    /// Fixed label applied to every row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Column carrying each row's label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field: Option<String>,
    /// Column carrying the node identifier.
    pub key_field: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(source: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            label: None,
            label_field: None,
            key_field: key_field.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_label_field(mut self, field: impl Into<String>) -> Self {
        self.label_field = Some(field.into());
        self
    }

    /// Carry `column` over as property `name`.
    pub fn with_property(mut self, column: impl Into<String>, name: impl Into<String>) -> Self {
        self.properties.insert(column.into(), name.into());
        self
    }

    /// The fixed label, if one is set and non-empty.
    pub fn fixed_label(&self) -> Option<&str> {
        non_empty(&self.label)
    }

    /// The label-bearing column, if one is set and non-empty.
    pub fn label_column(&self) -> Option<&str> {
        non_empty(&self.label_field)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let entity = || self.to_string();
        if self.source.is_empty() {
            return Err(ValidationError::MissingSource { entity: entity() });
        }
        if self.key_field.is_empty() {
            return Err(ValidationError::MissingKeyField { entity: entity() });
        }
        match (self.fixed_label(), self.label_column()) {
            (None, None) => Err(ValidationError::MissingLabel { entity: entity() }),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousLabel { entity: entity() }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(source={:?}, key_field={:?}", self.source, self.key_field)?;
        if let Some(label) = &self.label {
            write!(f, ", label={label:?}")?;
        }
        if let Some(field) = &self.label_field {
            write!(f, ", label_field={field:?}")?;
        }
        write!(f, ", properties={:?})", self.properties)
    }
}

// ── Edge ─────────────────────────────────────────────────────────

/// How rows of a source table become relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Literal source name or regular expression matched against source tags.
    pub source: String,
    /// Column carrying the start node identifier.
    pub source_field: String,
    /// Column carrying the end node identifier.
    pub target_field: String,
    /// Fixed relationship type applied to every row.
    #[serde(
        rename = "type",
        alias = "edge_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rel_type: Option<String>,
    /// Column carrying each row's relationship type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_field: Option<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_field: source_field.into(),
            target_field: target_field.into(),
            rel_type: None,
            type_field: None,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_type(mut self, rel_type: impl Into<String>) -> Self {
        self.rel_type = Some(rel_type.into());
        self
    }

    pub fn with_type_field(mut self, field: impl Into<String>) -> Self {
        self.type_field = Some(field.into());
        self
    }

    /// Carry `column` over as property `name`.
    pub fn with_property(mut self, column: impl Into<String>, name: impl Into<String>) -> Self {
        self.properties.insert(column.into(), name.into());
        self
    }

    /// The fixed relationship type, if one is set and non-empty.
    pub fn fixed_type(&self) -> Option<&str> {
        non_empty(&self.rel_type)
    }

    /// The type-bearing column, if one is set and non-empty.
    pub fn type_column(&self) -> Option<&str> {
        non_empty(&self.type_field)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let entity = || self.to_string();
        if self.source.is_empty() {
            return Err(ValidationError::MissingSource { entity: entity() });
        }
        if self.source_field.is_empty() {
            return Err(ValidationError::MissingSourceField { entity: entity() });
        }
        if self.target_field.is_empty() {
            return Err(ValidationError::MissingTargetField { entity: entity() });
        }
        match (self.fixed_type(), self.type_column()) {
            (None, None) => Err(ValidationError::MissingType { entity: entity() }),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousType { entity: entity() }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Edge(source={:?}, source_field={:?}, target_field={:?}",
            self.source, self.source_field, self.target_field
        )?;
        if let Some(t) = &self.rel_type {
            write!(f, ", type={t:?}")?;
        }
        if let Some(field) = &self.type_field {
            write!(f, ", type_field={field:?}")?;
        }
        write!(f, ", properties={:?})", self.properties)
    }
}

// ── Graph ────────────────────────────────────────────────────────

/// A named set of node and edge definitions targeting one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    #[serde(default)]
    pub db: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(name: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db: db.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Validate every definition, then uniqueness of sources.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for node in &self.nodes {
            node.validate()?;
        }
        for edge in &self.edges {
            edge.validate()?;
        }
        if let Some(src) = first_duplicate(self.nodes.iter().map(|n| n.source.as_str())) {
            return Err(ValidationError::DuplicateNodeSource {
                src: src.to_string(),
                graph: self.name.clone(),
            });
        }
        if let Some(src) = first_duplicate(self.edges.iter().map(|e| e.source.as_str())) {
            return Err(ValidationError::DuplicateEdgeSource {
                src: src.to_string(),
                graph: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Resolve a source tag to a node definition: exact match first, then
    /// the first source whose pattern matches somewhere in the tag.
    pub fn node_for_src(&self, tag: &str) -> Option<&Node> {
        resolve(&self.nodes, tag, |n| &n.source)
    }

    /// Resolve a source tag to an edge definition. See [`Graph::node_for_src`].
    pub fn edge_for_src(&self, tag: &str) -> Option<&Edge> {
        resolve(&self.edges, tag, |e| &e.source)
    }

    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.fixed_label() == Some(label))
    }

    pub fn edge_by_type(&self, rel_type: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.fixed_type() == Some(rel_type))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_json(&json)?)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn non_empty(opt: &Option<String>) -> Option<&str> {
    opt.as_deref().filter(|s| !s.is_empty())
}

fn resolve<'a, T>(defs: &'a [T], tag: &str, source: impl Fn(&T) -> &String) -> Option<&'a T> {
    if let Some(def) = defs.iter().find(|d| source(d) == tag) {
        return Some(def);
    }
    defs.iter().find(|d| {
        let pattern = source(d);
        match Regex::new(pattern) {
            Ok(re) => re.is_match(tag),
            Err(e) => {
                tracing::debug!(source = %pattern, error = %e, "Source is not a valid pattern");
                false
            }
        }
    })
}

fn first_duplicate<'a>(mut sources: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    sources.find(|s| !seen.insert(*s))
}
