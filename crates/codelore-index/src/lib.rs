//! Code graph indexing and retrieval.
//!
//! tree-sitter parses TypeScript and JavaScript into declarations, imports
//! are resolved into global node ids, nodes are embedded and committed batch
//! by batch into a [`codelore_graph::GraphStore`], and questions are answered
//! by keyword extraction, vector lookup and one-hop graph expansion.

pub mod docs;
pub mod error;
pub mod extractor;
pub mod languages;
pub mod pipeline;
pub mod resolver;
pub mod retriever;
pub mod symbol;

pub use error::{IndexError, Result};
pub use pipeline::{IngestConfig, IngestPipeline, IngestReport, IngestStage, RelationReport};
pub use retriever::{CodeRetriever, DocsAnswer, Importance, Retrieval, RetrievalConfig};
