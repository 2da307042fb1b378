//! End-to-end session tests against an in-memory Flight service.
//!
//! The scripted transport echoes control actions by default, records every
//! upload, and serves canned batches for downloads.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::{json, Value};

use gds_flight_client::{
    BatchSink, ClientError, ClientState, CreateDatabaseOptions, CreateGraphOptions,
    FlightTransport, GdsFlightClient, ImportKind, Operation, RetryPolicy, TransportStream,
};
use gds_flight_core::{ClientConfig, Edge, FlightStatus, Graph, Node, ServiceError, TransportError};

// ── Scripted transport ───────────────────────────────────────────

#[derive(Debug, Clone)]
struct Upload {
    descriptor: Value,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    closed: bool,
}

#[derive(Default)]
struct Service {
    actions: Mutex<Vec<(String, Value)>>,
    replies: Mutex<VecDeque<Result<Value, TransportError>>>,
    uploads: Arc<Mutex<Vec<Upload>>>,
    write_failures: Arc<Mutex<VecDeque<TransportError>>>,
    downloads: Mutex<Vec<RecordBatch>>,
    tickets: Mutex<Vec<Value>>,
    gets: AtomicUsize,
}

impl Service {
    fn reply_next(&self, reply: Result<Value, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn fail_writes(&self, status: FlightStatus, count: usize) {
        let mut failures = self.write_failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back(TransportError::new(status, "stream hiccup"));
        }
    }

    fn action_names(&self) -> Vec<String> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .map(|(a, _)| a.clone())
            .collect()
    }

    fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

struct Sink {
    index: usize,
    uploads: Arc<Mutex<Vec<Upload>>>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
}

#[async_trait]
impl BatchSink for Sink {
    async fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), TransportError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.uploads.lock().unwrap()[self.index]
            .batches
            .push(batch.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.uploads.lock().unwrap()[self.index].closed = true;
        Ok(())
    }
}

#[async_trait]
impl FlightTransport for Service {
    async fn do_action(&self, action: &str, body: &Value) -> Result<Value, TransportError> {
        self.actions
            .lock()
            .unwrap()
            .push((action.to_string(), body.clone()));
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(json!({ "name": body["name"] })),
        }
    }

    async fn do_put(
        &self,
        descriptor: &Value,
        schema: SchemaRef,
    ) -> Result<Box<dyn BatchSink>, TransportError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(Upload {
            descriptor: descriptor.clone(),
            schema,
            batches: Vec::new(),
            closed: false,
        });
        Ok(Box::new(Sink {
            index: uploads.len() - 1,
            uploads: Arc::clone(&self.uploads),
            failures: Arc::clone(&self.write_failures),
        }))
    }

    async fn do_get(&self, ticket: &Value) -> Result<TransportStream, TransportError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.tickets.lock().unwrap().push(ticket.clone());
        let batches: Vec<Result<RecordBatch, TransportError>> = self
            .downloads
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        Ok(futures::stream::iter(batches).boxed())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

fn tagged(schema: Schema, tag: &str) -> Arc<Schema> {
    Arc::new(schema.with_metadata(HashMap::from([(
        "_table".to_string(),
        tag.to_string(),
    )])))
}

fn users(rows: i64) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("score", DataType::Int64, true),
    ]);
    RecordBatch::try_new(
        tagged(schema, "users"),
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows)) as ArrayRef,
            Arc::new(StringArray::from_iter_values(
                (0..rows).map(|i| format!("user{i}")),
            )),
            Arc::new(Int64Array::from_iter_values((0..rows).map(|i| i * 10))),
        ],
    )
    .unwrap()
}

fn follows(rows: i64) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("src", DataType::Int64, false),
        Field::new("dst", DataType::Int64, false),
    ]);
    RecordBatch::try_new(
        tagged(schema, "follows"),
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows)) as ArrayRef,
            Arc::new(Int64Array::from_iter_values((0..rows).map(|i| (i + 1) % rows))),
        ],
    )
    .unwrap()
}

fn model() -> Graph {
    Graph::new("social", "neo4j")
        .with_node(
            Node::new("users", "id")
                .with_label("User")
                .with_property("name", "name"),
        )
        .with_edge(Edge::new("follows", "src", "dst").with_type("FOLLOWS"))
}

fn client(service: &Arc<Service>, debug: bool) -> GdsFlightClient {
    let config = ClientConfig {
        debug,
        ..ClientConfig::for_graph("localhost", "social")
    };
    GdsFlightClient::new(config, service.clone())
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::ZERO,
        })
}

fn field_names(schema: &SchemaRef) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

// ── Import sessions ──────────────────────────────────────────────

#[tokio::test]
async fn test_full_import_session() {
    let service = Arc::new(Service::default());
    let mut client = client(&service, true);
    let model = model();

    let reply = client.start(ImportKind::Graph, None, false).await.unwrap();
    assert_eq!(reply["name"], "social");
    assert_eq!(client.state(), ClientState::FeedingNodes);

    let nodes = client
        .write_nodes(users(10), Some(&model), Some("_table"))
        .await
        .unwrap();
    assert_eq!(nodes.rows, 10);
    assert_eq!(nodes.retries, 0);
    client.nodes_done().await.unwrap();
    assert_eq!(client.state(), ClientState::FeedingEdges);

    let edges = client
        .write_edges(follows(5), Some(&model), Some("_table"))
        .await
        .unwrap();
    assert_eq!(edges.rows, 5);
    client.edges_done().await.unwrap();
    assert_eq!(client.state(), ClientState::AwaitingGraph);

    assert_eq!(
        service.action_names(),
        ["CREATE_GRAPH", "NODE_LOAD_DONE", "RELATIONSHIP_LOAD_DONE"]
    );

    let uploads = service.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(
        uploads[0].descriptor,
        json!({"name": "social", "entity_type": "node"})
    );
    assert_eq!(field_names(&uploads[0].schema), ["nodeId", "labels", "name"]);
    assert_eq!(
        uploads[1].descriptor,
        json!({"name": "social", "entity_type": "relationship"})
    );
    assert_eq!(
        field_names(&uploads[1].schema),
        ["sourceNodeId", "targetNodeId", "relationshipType"]
    );
    assert!(uploads.iter().all(|u| u.closed));
}

#[tokio::test]
async fn test_default_start_bodies() {
    let service = Arc::new(Service::default());
    let mut graph_client = client(&service, false);
    graph_client.start(ImportKind::Graph, None, false).await.unwrap();

    let mut db_client = graph_client.for_graph("newdb");
    db_client.start(ImportKind::Database, None, true).await.unwrap();

    let actions = service.actions.lock().unwrap().clone();
    assert_eq!(
        actions[0].1,
        json!({"name": "social", "concurrency": 4, "database_name": "neo4j"})
    );
    assert_eq!(actions[1].0, "CREATE_DATABASE");
    assert_eq!(
        actions[1].1,
        json!({"name": "newdb", "concurrency": 4, "force": true})
    );
}

#[tokio::test]
async fn test_start_body_name_must_be_a_string() {
    let service = Arc::new(Service::default());
    let mut c = client(&service, false);
    let err = c
        .start(ImportKind::Graph, Some(json!({"name": 5})), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));
    assert!(service.action_names().is_empty());
    assert_eq!(c.state(), ClientState::Ready);

    // An absent name falls back to the configured graph.
    c.start(ImportKind::Graph, Some(json!({"concurrency": 2})), false)
        .await
        .unwrap();
    let actions = service.actions.lock().unwrap().clone();
    assert_eq!(actions[0].1, json!({"name": "social", "concurrency": 2}));
    assert_eq!(c.state(), ClientState::FeedingNodes);
}

#[tokio::test]
async fn test_start_option_bodies() {
    let service = Arc::new(Service::default());
    let mut c = client(&service, false);
    c.start_create_graph(CreateGraphOptions {
        undirected_rel_types: vec!["KNOWS".to_string()],
        ..Default::default()
    })
    .await
    .unwrap();
    c.abort(None).await.unwrap();
    c.start_create_database(CreateDatabaseOptions {
        id_type: Some("STRING".to_string()),
        record_format: Some(String::new()),
        ..Default::default()
    })
    .await
    .unwrap();

    let actions = service.actions.lock().unwrap().clone();
    assert_eq!(
        actions[0].1["undirected_relationship_types"],
        json!(["KNOWS"])
    );
    assert_eq!(actions[0].1["inverse_indexed_relationship_types"], json!([]));
    let db = &actions[2].1;
    assert_eq!(db["id_type"], "STRING");
    assert_eq!(db["high_io"], true);
    assert_eq!(db["force"], false);
    assert!(db.get("record_format").is_none());
    assert!(db.get("id_property").is_none());
}

#[tokio::test]
async fn test_strict_mode_rejects_out_of_order() {
    let service = Arc::new(Service::default());
    let mut client = client(&service, true);
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let err = client
        .write_edges(follows(3), Some(&model()), Some("_table"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::IllegalState {
            operation: Operation::WriteEdges,
            state: ClientState::FeedingNodes,
        }
    ));
    assert!(service.uploads().is_empty());
    assert!(matches!(
        client.wait(None).await,
        Err(ClientError::IllegalState { .. })
    ));
}

#[tokio::test]
async fn test_lenient_mode_defers_to_server() {
    let service = Arc::new(Service::default());
    let mut client = client(&service, false);
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let summary = client
        .write_edges(follows(3), Some(&model()), Some("_table"))
        .await
        .unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(service.uploads().len(), 1);
}

#[tokio::test]
async fn test_force_restart_aborts_existing_job() {
    let service = Arc::new(Service::default());
    service.reply_next(Err(TransportError::new(
        FlightStatus::Failed,
        "ALREADY_EXISTS: import for social",
    )));
    let mut client = client(&service, true);

    client.start(ImportKind::Graph, None, true).await.unwrap();
    assert_eq!(
        service.action_names(),
        ["CREATE_GRAPH", "ABORT", "CREATE_GRAPH"]
    );
    assert_eq!(client.state(), ClientState::FeedingNodes);
}

#[tokio::test]
async fn test_existing_job_without_force_fails() {
    let service = Arc::new(Service::default());
    service.reply_next(Err(TransportError::new(
        FlightStatus::Failed,
        "ALREADY_EXISTS: import for social",
    )));
    let mut client = client(&service, true);

    let err = client
        .start(ImportKind::Graph, None, false)
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(client.state(), ClientState::Ready);
    assert_eq!(service.action_names(), ["CREATE_GRAPH"]);
}

#[tokio::test]
async fn test_mismatched_echo_is_protocol_error() {
    let service = Arc::new(Service::default());
    service.reply_next(Ok(json!({"name": "someone-else"})));
    let mut client = client(&service, true);

    let err = client
        .start(ImportKind::Graph, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert_eq!(client.state(), ClientState::Ready);
}

#[tokio::test]
async fn test_abort_without_job() {
    let service = Arc::new(Service::default());
    service.reply_next(Err(TransportError::new(
        FlightStatus::Failed,
        "NOT_FOUND: no import for social",
    )));
    let mut client = client(&service, true);
    assert!(!client.abort(None).await.unwrap());

    service.reply_next(Err(TransportError::new(
        FlightStatus::Unauthenticated,
        "bad credentials",
    )));
    assert!(client.abort(Some("other")).await.is_err());
}

#[tokio::test]
async fn test_writes_retry_transient_failures() {
    let service = Arc::new(Service::default());
    service.fail_writes(FlightStatus::Unavailable, 3);
    let mut client = client(&service, true);
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let summary = client
        .write_nodes(users(4), Some(&model()), Some("_table"))
        .await
        .unwrap();
    assert_eq!(summary.retries, 3);
    assert_eq!(service.uploads()[0].batches.len(), 1);
}

#[tokio::test]
async fn test_writes_give_up_on_permanent_failure() {
    let service = Arc::new(Service::default());
    service.fail_writes(FlightStatus::Failed, 1);
    let mut client = client(&service, true);
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let err = client
        .write_nodes(users(4), Some(&model()), Some("_table"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Service(ServiceError::Transport(_))
    ));
    assert_eq!(client.state(), ClientState::FeedingNodes);
}

#[tokio::test]
async fn test_invalid_model_rejected_before_upload() {
    let service = Arc::new(Service::default());
    let mut client = client(&service, true);
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let bad = Graph::new("social", "neo4j").with_node(Node::new("users", "id"));
    let err = client
        .write_nodes(users(2), Some(&bad), Some("_table"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(service.uploads().is_empty());
}

#[tokio::test]
async fn test_large_table_is_chunked() {
    let service = Arc::new(Service::default());
    let config = ClientConfig {
        max_chunk_size: 4,
        ..ClientConfig::for_graph("localhost", "social")
    };
    let mut client = GdsFlightClient::new(config, service.clone()).unwrap();
    client.start(ImportKind::Graph, None, false).await.unwrap();

    let summary = client
        .write_nodes(users(10), Some(&model()), Some("_table"))
        .await
        .unwrap();
    assert_eq!(summary.rows, 10);
    let rows: Vec<usize> = service.uploads()[0]
        .batches
        .iter()
        .map(RecordBatch::num_rows)
        .collect();
    assert_eq!(rows, [4, 4, 2]);
}

#[tokio::test]
async fn test_wait_for_completion() {
    let service = Arc::new(Service::default());
    let mut client = client(&service, true);
    client.start(ImportKind::Graph, None, false).await.unwrap();
    client.nodes_done().await.unwrap();
    client.edges_done().await.unwrap();

    assert!(!client.wait(Some(Duration::from_millis(20))).await.unwrap());
    assert_eq!(client.state(), ClientState::AwaitingGraph);

    let handle = client.completion_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.signal();
    });
    assert!(client.wait(Some(Duration::from_secs(5))).await.unwrap());
    assert_eq!(client.state(), ClientState::GraphReady);
}

// ── Reads ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reads_are_lazy_and_ordered() {
    let service = Arc::new(Service::default());
    *service.downloads.lock().unwrap() = vec![users(1), users(2), users(3)];
    let client = client(&service, true);

    let stream = client.read_nodes(&["name"], Some(&["User"]), 2).unwrap();
    assert_eq!(service.gets.load(Ordering::SeqCst), 0);

    let batches: Vec<RecordBatch> = stream.try_collect().await.unwrap();
    let rows: Vec<usize> = batches.iter().map(RecordBatch::num_rows).collect();
    assert_eq!(rows, [1, 2, 3]);

    let tickets = service.tickets.lock().unwrap().clone();
    assert_eq!(
        tickets[0],
        json!({
            "graph_name": "social",
            "database_name": "neo4j",
            "procedure_name": "gds.graph.nodeProperties.stream",
            "configuration": {
                "node_labels": ["User"],
                "node_properties": ["name"],
                "list_node_labels": true,
            },
            "concurrency": 2,
        })
    );
}

#[tokio::test]
async fn test_read_edges_topology() {
    let service = Arc::new(Service::default());
    let client = client(&service, true);
    let mut stream = client.read_edges(&[], None, 4).unwrap();
    assert!(stream.next().await.is_none());

    let tickets = service.tickets.lock().unwrap().clone();
    assert_eq!(tickets[0]["procedure_name"], "gds.graph.relationships.stream");
    assert_eq!(
        tickets[0]["configuration"],
        json!({"relationship_types": ["*"]})
    );
}

#[tokio::test]
async fn test_read_rejects_zero_concurrency() {
    let service = Arc::new(Service::default());
    let client = client(&service, true);
    assert!(matches!(
        client.read_nodes(&[], None, 0),
        Err(ClientError::InvalidConcurrency(0))
    ));
    assert_eq!(service.gets.load(Ordering::SeqCst), 0);
}

#[test]
fn test_display_omits_password() {
    let service = Arc::new(Service::default());
    let mut config = ClientConfig::for_graph("localhost", "social");
    config.password = "hunter2".to_string();
    let client = GdsFlightClient::new(config, service).unwrap();
    let shown = client.to_string();
    assert!(shown.starts_with("GdsFlightClient{neo4j@localhost:8491/neo4j?graph=social"));
    assert!(!shown.contains("hunter2"));
}
