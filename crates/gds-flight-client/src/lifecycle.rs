//! Import session lifecycle.
//!
//! A session moves `ready → feeding_nodes → feeding_edges → awaiting_graph`
//! and reaches `done` once the server reports the graph as loaded. Abort
//! returns it to `ready` from anywhere.
//!
//! In strict mode operations are checked against the table before any
//! network call. Otherwise the server stays the source of truth: calls are
//! always attempted and the local state simply follows them.

use std::fmt;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Ready,
    FeedingNodes,
    FeedingEdges,
    AwaitingGraph,
    GraphReady,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::FeedingNodes => "feeding_nodes",
            Self::FeedingEdges => "feeding_edges",
            Self::AwaitingGraph => "awaiting_graph",
            Self::GraphReady => "done",
        };
        f.write_str(s)
    }
}

/// Operations that interact with the import lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    WriteNodes,
    NodesDone,
    WriteEdges,
    EdgesDone,
    Wait,
    Abort,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::WriteNodes => "write_nodes",
            Self::NodesDone => "nodes_done",
            Self::WriteEdges => "write_edges",
            Self::EdgesDone => "edges_done",
            Self::Wait => "wait",
            Self::Abort => "abort",
        };
        f.write_str(s)
    }
}

impl Operation {
    /// The state reached by performing this operation in `from`, if allowed.
    pub fn transition(self, from: ClientState) -> Option<ClientState> {
        use ClientState::*;
        match (from, self) {
            (_, Operation::Abort) => Some(Ready),
            (Ready, Operation::Start) => Some(FeedingNodes),
            (FeedingNodes, Operation::WriteNodes) => Some(FeedingNodes),
            (FeedingNodes, Operation::NodesDone) => Some(FeedingEdges),
            (FeedingEdges, Operation::WriteEdges) => Some(FeedingEdges),
            (FeedingEdges, Operation::EdgesDone) => Some(AwaitingGraph),
            (AwaitingGraph, Operation::Wait) => Some(AwaitingGraph),
            (GraphReady, Operation::Wait) => Some(GraphReady),
            _ => None,
        }
    }

    /// The state recorded after a successful call outside the table.
    /// Writes leave the state untouched.
    fn settled_state(self) -> Option<ClientState> {
        match self {
            Self::Start => Some(ClientState::FeedingNodes),
            Self::NodesDone => Some(ClientState::FeedingEdges),
            Self::EdgesDone | Self::Wait => Some(ClientState::AwaitingGraph),
            Self::Abort => Some(ClientState::Ready),
            Self::WriteNodes | Self::WriteEdges => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ClientState,
    strict: bool,
}

impl Lifecycle {
    pub fn new(strict: bool) -> Self {
        Self {
            state: ClientState::Ready,
            strict,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Check `op` before any network traffic. Only strict mode rejects.
    pub fn guard(&self, op: Operation) -> Result<()> {
        if self.strict && op.transition(self.state).is_none() {
            return Err(ClientError::IllegalState {
                operation: op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Record that `op` completed successfully.
    pub fn advance(&mut self, op: Operation) {
        if let Some(next) = op.transition(self.state).or_else(|| op.settled_state()) {
            self.state = next;
        }
    }

    /// Record that the server reported the graph as loaded.
    pub fn complete(&mut self) {
        self.state = ClientState::GraphReady;
    }
}
