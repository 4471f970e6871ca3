use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::Result;
use crate::node::{GraphNode, RelationTriple, VectorIndex};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An open write transaction.
///
/// Returned by [`GraphStore::begin`], threaded through [`GraphStore::insert_node`]
/// and consumed by [`GraphStore::commit`] or [`GraphStore::rollback`]. A finished
/// transaction cannot be used again.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an open transaction must be committed or rolled back"]
pub struct Transaction {
    handle: String,
    writes: usize,
}

impl Transaction {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            writes: 0,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Number of successful writes staged in this transaction.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }
}

/// Parameters of a vector similarity lookup.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    pub index: VectorIndex,
    pub top_k: usize,
    pub vector: &'a [f32],
    /// Candidates scoring below this value are excluded.
    pub min_score: f32,
}

/// A similarity hit together with its one-hop neighbours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNode {
    pub node: GraphNode,
    pub related: Vec<GraphNode>,
    pub score: f32,
}

/// Edge counts of one node alongside the largest counts in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeDegree {
    pub incoming: u64,
    pub outgoing: u64,
    pub max_incoming: u64,
    pub max_outgoing: u64,
}

pub trait GraphStore: Send + Sync {
    /// Fails with a connection error when the store is unreachable.
    fn verify_connectivity(&self) -> BoxFuture<'_, Result<()>>;

    fn begin(&self) -> BoxFuture<'_, Result<Transaction>>;

    fn insert_node<'a>(
        &'a self,
        tx: &'a mut Transaction,
        node: &'a GraphNode,
    ) -> BoxFuture<'a, Result<()>>;

    fn commit(&self, tx: Transaction) -> BoxFuture<'_, Result<()>>;

    fn rollback(&self, tx: Transaction) -> BoxFuture<'_, Result<()>>;

    /// Create one edge outside of any transaction.
    ///
    /// Fails with [`crate::GraphStoreError::NotFound`] when either endpoint is missing.
    fn create_relation<'a>(&'a self, triple: &'a RelationTriple) -> BoxFuture<'a, Result<()>>;

    /// Drop every node and edge, then recreate the vector indexes.
    fn purge(&self, dimensions: usize) -> BoxFuture<'_, Result<()>>;

    /// Similarity search ordered by descending score.
    fn query_nodes<'a>(&'a self, query: VectorQuery<'a>)
    -> BoxFuture<'a, Result<Vec<ScoredNode>>>;

    /// Degree of the node `id`; `None` when no such node exists.
    fn degree<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<NodeDegree>>>;
}
