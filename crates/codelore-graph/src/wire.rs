//! Request and response bodies exchanged at the ingestion boundary.

use serde::{Deserialize, Serialize};

use crate::node::{GraphNode, RelationTriple};

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;

/// A batch of already-extracted nodes to embed and commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "batchID")]
    pub batch_id: String,
    pub nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(rename = "batchID")]
    pub batch_id: String,
    pub status: u16,
}

impl IngestResponse {
    #[must_use]
    pub fn new(batch_id: impl Into<String>, committed: bool) -> Self {
        Self {
            batch_id: batch_id.into(),
            status: if committed { STATUS_OK } else { STATUS_FAILED },
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishRelationsRequest {
    pub relations: Vec<RelationTriple>,
}

/// Bare `{status}` answer used by relation establishment and purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: u16,
}

impl StatusResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self { status: STATUS_OK }
    }

    #[must_use]
    pub fn failed() -> Self {
        Self {
            status: STATUS_FAILED,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
