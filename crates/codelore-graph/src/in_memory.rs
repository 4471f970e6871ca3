use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{GraphStoreError, Result};
use crate::node::{GraphNode, RelationTriple};
use crate::store::{BoxFuture, GraphStore, NodeDegree, ScoredNode, Transaction, VectorQuery};

/// Observable store-side effect, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Commit { handle: String, ids: Vec<String> },
    Rollback { handle: String },
    Relation(RelationTriple),
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<RelationTriple>,
    staged: HashMap<String, Vec<GraphNode>>,
    events: Vec<StoreEvent>,
    failing_ids: HashSet<String>,
    purges: usize,
}

/// Graph store kept entirely in process memory.
///
/// Writes are staged per transaction and only become visible on commit.
/// Supports fault injection for exercising failure paths.
pub struct InMemoryGraphStore {
    state: RwLock<State>,
    next_tx: AtomicU64,
    unreachable: AtomicBool,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_tx: AtomicU64::new(1),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Inserting any node whose id is in `ids` fails with a statement error.
    #[must_use]
    pub fn with_failing_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut state) = self.state.write() {
            state.failing_ids.extend(ids.into_iter().map(Into::into));
        }
        self
    }

    /// Make connectivity checks and new transactions fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| GraphStoreError::Connection(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| GraphStoreError::Connection(e.to_string()))
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GraphStoreError::Connection("store unreachable".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<GraphNode> {
        self.read().ok()?.nodes.get(id).cloned()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.read().map(|s| s.nodes.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn edges(&self) -> Vec<RelationTriple> {
        self.read().map(|s| s.edges.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.read().map(|s| s.events.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn purge_count(&self) -> usize {
        self.read().map(|s| s.purges).unwrap_or(0)
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore").finish_non_exhaustive()
    }
}

/// Cosine similarity; empty, zero-norm or mismatched vectors score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl GraphStore for InMemoryGraphStore {
    fn verify_connectivity(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.check_reachable() })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Transaction>> {
        Box::pin(async move {
            self.check_reachable()?;
            let handle = format!("mem-tx-{}", self.next_tx.fetch_add(1, Ordering::SeqCst));
            self.write()?.staged.insert(handle.clone(), Vec::new());
            Ok(Transaction::new(handle))
        })
    }

    fn insert_node<'a>(
        &'a self,
        tx: &'a mut Transaction,
        node: &'a GraphNode,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.write()?;
            if state.failing_ids.contains(node.id()) {
                return Err(GraphStoreError::Statement {
                    code: "Injected.InsertFailure".into(),
                    message: format!("insert of {} rejected", node.id()),
                });
            }
            let staged = state.staged.get_mut(tx.handle()).ok_or_else(|| {
                GraphStoreError::Transaction(format!("unknown transaction {}", tx.handle()))
            })?;
            staged.push(node.clone());
            drop(state);
            tx.record_write();
            Ok(())
        })
    }

    fn commit(&self, tx: Transaction) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.write()?;
            let staged = state.staged.remove(tx.handle()).ok_or_else(|| {
                GraphStoreError::Transaction(format!("unknown transaction {}", tx.handle()))
            })?;
            let ids = staged.iter().map(|n| n.id().to_owned()).collect();
            for node in staged {
                state.nodes.insert(node.id().to_owned(), node);
            }
            state.events.push(StoreEvent::Commit {
                handle: tx.handle().to_owned(),
                ids,
            });
            Ok(())
        })
    }

    fn rollback(&self, tx: Transaction) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.write()?;
            state.staged.remove(tx.handle()).ok_or_else(|| {
                GraphStoreError::Transaction(format!("unknown transaction {}", tx.handle()))
            })?;
            state.events.push(StoreEvent::Rollback {
                handle: tx.handle().to_owned(),
            });
            Ok(())
        })
    }

    fn create_relation<'a>(&'a self, triple: &'a RelationTriple) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.write()?;
            for id in [&triple.source, &triple.target] {
                if !state.nodes.contains_key(id) {
                    return Err(GraphStoreError::NotFound(id.clone()));
                }
            }
            state.edges.push(triple.clone());
            state.events.push(StoreEvent::Relation(triple.clone()));
            Ok(())
        })
    }

    fn purge(&self, _dimensions: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.check_reachable()?;
            let mut state = self.write()?;
            state.nodes.clear();
            state.edges.clear();
            state.purges += 1;
            Ok(())
        })
    }

    fn query_nodes<'a>(
        &'a self,
        query: VectorQuery<'a>,
    ) -> BoxFuture<'a, Result<Vec<ScoredNode>>> {
        Box::pin(async move {
            let state = self.read()?;
            let mut scored: Vec<(&GraphNode, f32)> = state
                .nodes
                .values()
                .filter_map(|n| {
                    n.embedding(query.index)
                        .map(|v| (n, cosine_similarity(query.vector, v)))
                })
                .collect();

            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.id().cmp(b.0.id()))
            });
            scored.truncate(query.top_k);

            let hits = scored
                .into_iter()
                .filter(|(_, score)| *score >= query.min_score)
                .map(|(node, score)| {
                    let related = state
                        .edges
                        .iter()
                        .filter(|e| e.source == node.id())
                        .filter_map(|e| state.nodes.get(&e.target).cloned())
                        .collect();
                    ScoredNode {
                        node: node.clone(),
                        related,
                        score,
                    }
                })
                .collect();
            Ok(hits)
        })
    }

    fn degree<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<NodeDegree>>> {
        Box::pin(async move {
            let state = self.read()?;
            if !state.nodes.contains_key(id) {
                return Ok(None);
            }
            let mut incoming: HashMap<&str, u64> = HashMap::new();
            let mut outgoing: HashMap<&str, u64> = HashMap::new();
            for edge in &state.edges {
                *outgoing.entry(edge.source.as_str()).or_default() += 1;
                *incoming.entry(edge.target.as_str()).or_default() += 1;
            }
            Ok(Some(NodeDegree {
                incoming: incoming.get(id).copied().unwrap_or(0),
                outgoing: outgoing.get(id).copied().unwrap_or(0),
                max_incoming: incoming.values().copied().max().unwrap_or(0),
                max_outgoing: outgoing.values().copied().max().unwrap_or(0),
            }))
        })
    }
}
