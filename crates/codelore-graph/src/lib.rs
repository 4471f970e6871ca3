//! Graph node model and transactional graph store backends.
//!
//! Nodes are either code symbols or documentation fragments. Stores accept
//! nodes inside explicit [`Transaction`] values, relations as independent
//! writes, and answer vector similarity queries with one-hop expansion.

pub mod error;
pub mod in_memory;
pub mod neo4j;
pub mod node;
pub mod store;
pub mod wire;

pub use error::{GraphStoreError, Result};
pub use in_memory::{InMemoryGraphStore, StoreEvent};
pub use neo4j::{Neo4jConfig, Neo4jStore};
pub use node::{
    CodeNode, DocumentNode, EmbeddingSlot, GraphNode, Relation, RelationKind, RelationTriple,
    Statement, VectorIndex,
};
pub use store::{GraphStore, NodeDegree, ScoredNode, Transaction, VectorQuery};
pub use wire::{EstablishRelationsRequest, IngestRequest, IngestResponse, StatusResponse};
