//! The import/export session facade.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use gds_flight_core::{ClientConfig, Graph, ServiceError};

use crate::error::{ClientError, Result};
use crate::lifecycle::{ClientState, Lifecycle, Operation};
use crate::mapper::Mapper;
use crate::reader::{open_stream, ProcedureNames, RecordBatchStream, Ticket};
use crate::transport::{bounded, Action, EntityType, FlightTransport, PutDescriptor};
use crate::writer::{BatchWriter, Entities, RetryPolicy, WriteSummary};

/// What a new import job creates on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// An in-memory graph projection.
    Graph,
    /// A new Neo4j database.
    Database,
}

impl ImportKind {
    fn action(self) -> Action {
        match self {
            Self::Graph => Action::CreateGraph,
            Self::Database => Action::CreateDatabase,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateGraphOptions {
    pub force: bool,
    pub undirected_rel_types: Vec<String>,
    pub inverse_indexed_rel_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDatabaseOptions {
    pub force: bool,
    pub id_type: Option<String>,
    pub id_property: Option<String>,
    pub record_format: Option<String>,
    pub high_io: bool,
    pub use_bad_collector: bool,
}

impl Default for CreateDatabaseOptions {
    fn default() -> Self {
        Self {
            force: false,
            id_type: None,
            id_property: None,
            record_format: None,
            high_io: true,
            use_bad_collector: false,
        }
    }
}

/// Marks a graph as loaded, releasing any pending [`GdsFlightClient::wait`].
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CompletionHandle {
    pub fn signal(&self) {
        self.tx.send_replace(true);
    }
}

/// One import session against a GDS Flight service.
///
/// Lifecycle operations take `&mut self`, so a session has a single driver.
/// Use [`GdsFlightClient::for_graph`] to run several sessions over one transport.
pub struct GdsFlightClient {
    config: ClientConfig,
    transport: Arc<dyn FlightTransport>,
    lifecycle: Lifecycle,
    procedures: ProcedureNames,
    retry: RetryPolicy,
    completion: Arc<watch::Sender<bool>>,
}

impl GdsFlightClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn FlightTransport>) -> Result<Self> {
        config.validate()?;
        let procedures = ProcedureNames::for_version(config.gds_version.as_deref());
        let (tx, _rx) = watch::channel(false);
        Ok(Self {
            lifecycle: Lifecycle::new(config.debug),
            config,
            transport,
            procedures,
            retry: RetryPolicy::default(),
            completion: Arc::new(tx),
        })
    }

    pub fn with_procedure_names(mut self, procedures: ProcedureNames) -> Self {
        self.procedures = procedures;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A fresh session for another graph, sharing this client's transport
    /// and settings.
    pub fn for_graph(&self, graph: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            config: ClientConfig {
                graph: graph.into(),
                ..self.config.clone()
            },
            transport: Arc::clone(&self.transport),
            lifecycle: Lifecycle::new(self.config.debug),
            procedures: self.procedures.clone(),
            retry: self.retry.clone(),
            completion: Arc::new(tx),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle.state()
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle {
            tx: Arc::clone(&self.completion),
        }
    }

    // ── Import lifecycle ─────────────────────────────────────────

    /// Start an import job. Without an explicit `config` body a default one
    /// is built from the client settings.
    pub async fn start(
        &mut self,
        kind: ImportKind,
        config: Option<Value>,
        force: bool,
    ) -> Result<Value> {
        let body = match config {
            Some(body) => body,
            None => {
                let mut body = json!({
                    "name": self.config.graph,
                    "concurrency": self.config.concurrency,
                });
                match kind {
                    ImportKind::Graph => body["database_name"] = json!(self.config.database),
                    ImportKind::Database if force => body["force"] = json!(true),
                    ImportKind::Database => {}
                }
                body
            }
        };
        self.start_with(kind.action(), body, force).await
    }

    pub async fn start_create_graph(&mut self, options: CreateGraphOptions) -> Result<Value> {
        let body = json!({
            "name": self.config.graph,
            "database_name": self.config.database,
            "concurrency": self.config.concurrency,
            "undirected_relationship_types": options.undirected_rel_types,
            "inverse_indexed_relationship_types": options.inverse_indexed_rel_types,
        });
        self.start_with(Action::CreateGraph, body, options.force).await
    }

    pub async fn start_create_database(&mut self, options: CreateDatabaseOptions) -> Result<Value> {
        let mut body = json!({
            "name": self.config.graph,
            "concurrency": self.config.concurrency,
            "high_io": options.high_io,
            "use_bad_collector": options.use_bad_collector,
            "force": options.force,
        });
        for (key, value) in [
            ("id_type", &options.id_type),
            ("id_property", &options.id_property),
            ("record_format", &options.record_format),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                body[key] = json!(value);
            }
        }
        self.start_with(Action::CreateDatabase, body, options.force).await
    }

    async fn start_with(&mut self, action: Action, mut body: Value, force: bool) -> Result<Value> {
        self.lifecycle.guard(Operation::Start)?;
        if !body.is_object() {
            return Err(ClientError::InvalidRequest(format!(
                "{action} body must be a JSON object, got {body}"
            )));
        }
        let name = match body.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(ClientError::InvalidRequest(format!(
                    "{action} body name must be a string, got {other}"
                )));
            }
            None => {
                body["name"] = json!(self.config.graph);
                self.config.graph.clone()
            }
        };

        let mut forced = force;
        loop {
            match self.send_action(action, &body).await {
                Ok(reply) => {
                    expect_echo(&reply, &name, action.as_str())?;
                    self.lifecycle.advance(Operation::Start);
                    self.completion.send_replace(false);
                    tracing::info!(graph = %name, action = %action, "Import job started");
                    return Ok(reply);
                }
                Err(ClientError::Service(ServiceError::AlreadyExists(msg))) if forced => {
                    forced = false;
                    tracing::warn!(graph = %name, "Import job already exists, forcing cancellation");
                    if !self.abort(Some(&name)).await? {
                        return Err(ServiceError::AlreadyExists(msg).into());
                    }
                }
                Err(e) => {
                    if e.is_already_exists() {
                        tracing::error!(graph = %name, "Import job already exists");
                    } else {
                        tracing::error!(graph = %name, error = %e, "Failed to start import job");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Upload nodes. With a `model`, batches are mapped to the canonical
    /// layout first; `source_key` selects the schema metadata entry that
    /// names each batch's source.
    pub async fn write_nodes(
        &mut self,
        nodes: impl Into<Entities>,
        model: Option<&Graph>,
        source_key: Option<&str>,
    ) -> Result<WriteSummary> {
        self.lifecycle.guard(Operation::WriteNodes)?;
        let mapper = match model {
            Some(model) => {
                model.validate()?;
                Mapper::nodes(model, source_key)
            }
            None => Mapper::Identity,
        };
        self.write_entities(Operation::WriteNodes, EntityType::Node, nodes.into(), &mapper)
            .await
    }

    pub async fn nodes_done(&mut self) -> Result<Value> {
        self.finish_phase(Operation::NodesDone, Action::NodeLoadDone)
            .await
    }

    /// Upload relationships. See [`GdsFlightClient::write_nodes`].
    pub async fn write_edges(
        &mut self,
        edges: impl Into<Entities>,
        model: Option<&Graph>,
        source_key: Option<&str>,
    ) -> Result<WriteSummary> {
        self.lifecycle.guard(Operation::WriteEdges)?;
        let mapper = match model {
            Some(model) => {
                model.validate()?;
                Mapper::edges(model, source_key)
            }
            None => Mapper::Identity,
        };
        self.write_entities(
            Operation::WriteEdges,
            EntityType::Relationship,
            edges.into(),
            &mapper,
        )
        .await
    }

    pub async fn edges_done(&mut self) -> Result<Value> {
        self.finish_phase(Operation::EdgesDone, Action::RelationshipLoadDone)
            .await
    }

    /// Wait for the server to finish building the graph. Returns `true`
    /// once completion is signalled, `false` if `timeout` elapses first.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        self.lifecycle.guard(Operation::Wait)?;
        self.lifecycle.advance(Operation::Wait);

        let mut rx = self.completion.subscribe();
        let signalled = async move { rx.wait_for(|done| *done).await.is_ok() };
        let done = match timeout {
            Some(limit) => tokio::time::timeout(limit, signalled).await.unwrap_or(false),
            None => signalled.await,
        };
        if done {
            self.lifecycle.complete();
            tracing::info!(graph = %self.config.graph, "Graph ready");
        }
        Ok(done)
    }

    /// Abort the import for `name` (default: this client's graph).
    /// Returns `false` if the server has no such import.
    pub async fn abort(&mut self, name: Option<&str>) -> Result<bool> {
        self.lifecycle.guard(Operation::Abort)?;
        let name = name.unwrap_or(&self.config.graph).to_string();
        match self.send_action(Action::Abort, &json!({ "name": name })).await {
            Ok(reply) => {
                expect_echo(&reply, &name, "abort")?;
                self.lifecycle.advance(Operation::Abort);
                tracing::info!(graph = %name, "Import aborted");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(graph = %name, "No existing import to abort");
                Ok(false)
            }
            Err(e) => {
                tracing::error!(graph = %name, error = %e, "Failed to abort import");
                Err(e)
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Stream node properties from the projected graph. Independent of the
    /// import lifecycle.
    pub fn read_nodes(
        &self,
        properties: &[&str],
        labels: Option<&[&str]>,
        concurrency: usize,
    ) -> Result<RecordBatchStream> {
        let ticket = Ticket::for_nodes(
            &self.config.graph,
            &self.config.database,
            &self.procedures,
            properties,
            labels,
            concurrency,
        )?;
        open_stream(Arc::clone(&self.transport), ticket, self.config.timeout())
    }

    /// Stream relationships from the projected graph. Independent of the
    /// import lifecycle.
    pub fn read_edges(
        &self,
        properties: &[&str],
        relationship_types: Option<&[&str]>,
        concurrency: usize,
    ) -> Result<RecordBatchStream> {
        let ticket = Ticket::for_edges(
            &self.config.graph,
            &self.config.database,
            &self.procedures,
            properties,
            relationship_types,
            concurrency,
        )?;
        open_stream(Arc::clone(&self.transport), ticket, self.config.timeout())
    }

    // ── Internals ────────────────────────────────────────────────

    async fn send_action(&self, action: Action, body: &Value) -> Result<Value> {
        let reply = bounded(
            self.config.timeout(),
            action.as_str(),
            self.transport.do_action(action.as_str(), body),
        )
        .await?;
        Ok(reply)
    }

    async fn finish_phase(&mut self, op: Operation, action: Action) -> Result<Value> {
        self.lifecycle.guard(op)?;
        let name = self.config.graph.clone();
        let reply = match self.send_action(action, &json!({ "name": name })).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(graph = %name, action = %action, error = %e, "Phase signal failed");
                return Err(e);
            }
        };
        expect_echo(&reply, &name, &op.to_string())?;
        self.lifecycle.advance(op);
        tracing::info!(graph = %name, state = %self.lifecycle.state(), "{op} acknowledged");
        Ok(reply)
    }

    async fn write_entities(
        &mut self,
        op: Operation,
        entity_type: EntityType,
        entities: Entities,
        mapper: &Mapper<'_>,
    ) -> Result<WriteSummary> {
        let descriptor = PutDescriptor {
            name: self.config.graph.clone(),
            entity_type,
        };
        let writer = BatchWriter::new(self.transport.as_ref(), &self.retry, self.config.timeout());
        match writer
            .write_entities(&descriptor, entities, mapper, self.config.max_chunk_size)
            .await
        {
            Ok(summary) => {
                self.lifecycle.advance(op);
                tracing::info!(
                    graph = %descriptor.name,
                    entity_type = %entity_type,
                    rows = summary.rows,
                    bytes = summary.bytes,
                    retries = summary.retries,
                    "Entities written"
                );
                Ok(summary)
            }
            Err(e) if e.is_not_found() => {
                tracing::error!(graph = %descriptor.name, "No existing import job found");
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    graph = %descriptor.name,
                    entity_type = %entity_type,
                    error = %e,
                    "Fatal error while feeding entities"
                );
                Err(e)
            }
        }
    }
}

impl fmt::Display for GdsFlightClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GdsFlightClient{{{}}}", self.config)
    }
}

/// Control replies must echo the graph name they act on.
fn expect_echo(reply: &Value, name: &str, what: &str) -> Result<()> {
    if reply.get("name").and_then(Value::as_str) == Some(name) {
        Ok(())
    } else {
        Err(ClientError::Protocol(format!(
            "invalid response for {what} of graph {name}, got {reply}"
        )))
    }
}
