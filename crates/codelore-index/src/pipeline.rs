//! Ingestion orchestrator: discover → extract → embed → commit → relations.
//!
//! Nodes are committed batch by batch, one transaction per batch. Relations
//! are only established once every batch has gone through the commit phase,
//! so an edge never targets a node from a batch that has not been written yet.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use codelore_graph::{
    GraphNode, GraphStore, IngestRequest, IngestResponse, RelationTriple, StatusResponse,
};
use codelore_llm::provider::LlmProvider;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::docs::document_nodes;
use crate::error::{IndexError, Result};
use crate::extractor::analyze_file;
use crate::languages::{detect_language, is_indexable};

/// Ingestion tuning knobs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Files per extraction batch and transaction.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    pub relation_group_size: usize,
    pub relation_cooldown: Duration,
    /// Attempts per embedding call before falling back to an empty vector.
    pub embed_attempts: u32,
    /// Concurrent embedding calls in flight.
    pub embed_concurrency: usize,
    /// Vector index dimensionality used when purging.
    pub dimensions: usize,
    /// File extensions considered source code.
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay: Duration::from_secs(3),
            relation_group_size: 1000,
            relation_cooldown: Duration::from_secs(1),
            embed_attempts: 5,
            embed_concurrency: 32,
            dimensions: 768,
            extensions: vec!["ts".into(), "js".into()],
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestStage {
    Idle,
    Discovering,
    ExtractingBatch(usize),
    Embedding,
    Committing,
    EstablishingRelations,
    Done,
    Failed,
}

/// Summary of an ingestion run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_failed: usize,
    pub nodes_extracted: usize,
    pub nodes_committed: usize,
    pub batches_committed: usize,
    pub failed_batches: Vec<String>,
    pub relations_established: usize,
    pub relations_failed: usize,
    pub duration_ms: u64,
}

/// Outcome of one relation-establishment pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationReport {
    pub established: usize,
    pub failed: usize,
}

pub struct IngestPipeline<P: LlmProvider> {
    store: Arc<dyn GraphStore>,
    embedder: Arc<P>,
    config: IngestConfig,
    stage: watch::Sender<IngestStage>,
}

impl<P: LlmProvider + 'static> IngestPipeline<P> {
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<P>, config: IngestConfig) -> Self {
        let (stage, _) = watch::channel(IngestStage::Idle);
        Self {
            store,
            embedder,
            config,
            stage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Observe stage transitions of the current run.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IngestStage> {
        self.stage.subscribe()
    }

    fn enter(&self, stage: IngestStage) {
        tracing::debug!(?stage, "ingest stage");
        self.stage.send_replace(stage);
    }

    /// Rebuild the graph from every source file under `root`.
    ///
    /// The store is checked and purged first; those are the only failures
    /// that abort the run. Everything after degrades to per-file, per-batch
    /// or per-edge failures recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or cannot be purged.
    pub async fn ingest_codebase(&self, root: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        self.enter(IngestStage::Discovering);
        if let Err(e) = self.prepare_store().await {
            self.enter(IngestStage::Failed);
            return Err(e);
        }

        let files = discover(root, |path| is_indexable(path, &self.config.extensions));
        report.files_scanned = files.len();
        let batch_size = self.config.batch_size.max(1);
        let total_batches = files.len().div_ceil(batch_size);
        tracing::info!(files = files.len(), batches = total_batches, "ingestion started");

        let mut triples = Vec::new();
        for (i, batch) in files.chunks(batch_size).enumerate() {
            if i > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            self.enter(IngestStage::ExtractingBatch(i));
            let (nodes, failed) = extract_batch(root, batch).await;
            report.files_failed += failed;
            report.nodes_extracted += nodes.len();

            let batch_id = uuid::Uuid::new_v4().to_string();
            if let Some(committed) = self.embed_and_commit(&batch_id, nodes, &mut report).await {
                triples.extend(committed);
            }
            tracing::info!(
                batch_id,
                progress = format_args!("{}/{total_batches}", i + 1),
                failed_files = failed,
                "batch processed"
            );
        }

        let relations = self.establish_relations(&triples).await;
        report.relations_established = relations.established;
        report.relations_failed = relations.failed;
        report.duration_ms = elapsed_ms(start);
        self.enter(IngestStage::Done);

        tracing::info!(
            nodes = report.nodes_committed,
            failed_batches = report.failed_batches.len(),
            relations = report.relations_established,
            duration_ms = report.duration_ms,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn prepare_store(&self) -> Result<()> {
        self.store.verify_connectivity().await?;
        self.purge().await
    }

    /// Drop every node and edge and recreate the vector indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the reset.
    pub async fn purge(&self) -> Result<()> {
        self.store.purge(self.config.dimensions).await?;
        tracing::info!(dimensions = self.config.dimensions, "graph purged");
        Ok(())
    }

    /// Add Markdown documentation under `root` to the existing graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn ingest_docs(&self, root: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        self.enter(IngestStage::Discovering);
        if let Err(e) = self.store.verify_connectivity().await {
            self.enter(IngestStage::Failed);
            return Err(e.into());
        }

        let files = discover(root, is_markdown);
        report.files_scanned = files.len();

        let mut triples = Vec::new();
        for (i, batch) in files.chunks(self.config.batch_size.max(1)).enumerate() {
            if i > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            self.enter(IngestStage::ExtractingBatch(i));

            let mut nodes = Vec::new();
            for rel in batch {
                match tokio::fs::read_to_string(root.join(rel)).await {
                    Ok(text) => nodes.extend(document_nodes(rel, &text).into_iter().map(GraphNode::from)),
                    Err(e) => {
                        report.files_failed += 1;
                        tracing::warn!(file = %rel, error = %e, "failed to read document");
                    }
                }
            }
            report.nodes_extracted += nodes.len();

            let batch_id = uuid::Uuid::new_v4().to_string();
            if let Some(committed) = self.embed_and_commit(&batch_id, nodes, &mut report).await {
                triples.extend(committed);
            }
        }

        let relations = self.establish_relations(&triples).await;
        report.relations_established = relations.established;
        report.relations_failed = relations.failed;
        report.duration_ms = elapsed_ms(start);
        self.enter(IngestStage::Done);
        Ok(report)
    }

    /// Embed and commit an externally prepared batch. Relations are not
    /// created; they go through [`Self::establish_relations`] separately.
    pub async fn ingest_request(&self, request: IngestRequest) -> IngestResponse {
        let mut report = IngestReport::default();
        let committed = self
            .embed_and_commit(&request.batch_id, request.nodes, &mut report)
            .await
            .is_some();
        IngestResponse::new(request.batch_id, committed)
    }

    /// Embed every node, then write the batch in one transaction.
    ///
    /// Returns the batch's relation triples if it committed, `None` if it was
    /// rolled back.
    async fn embed_and_commit(
        &self,
        batch_id: &str,
        mut nodes: Vec<GraphNode>,
        report: &mut IngestReport,
    ) -> Option<Vec<RelationTriple>> {
        self.enter(IngestStage::Embedding);
        self.embed_nodes(&mut nodes).await;

        self.enter(IngestStage::Committing);
        match self.commit_batch(batch_id, &nodes).await {
            Ok(()) => {
                report.batches_committed += 1;
                report.nodes_committed += nodes.len();
                Some(nodes.iter().flat_map(GraphNode::triples).collect())
            }
            Err(e) => {
                tracing::warn!(batch_id, nodes = nodes.len(), error = %e, "batch rolled back");
                report.failed_batches.push(batch_id.to_owned());
                None
            }
        }
    }

    async fn commit_batch(&self, batch_id: &str, nodes: &[GraphNode]) -> Result<()> {
        let mut tx = self.store.begin().await?;
        for node in nodes {
            if let Err(e) = self.store.insert_node(&mut tx, node).await {
                tracing::warn!(batch_id, node = node.id(), error = %e, "node insert failed");
                if let Err(rollback) = self.store.rollback(tx).await {
                    tracing::warn!(batch_id, error = %rollback, "rollback failed");
                }
                return Err(e.into());
            }
        }
        self.store.commit(tx).await?;
        tracing::debug!(batch_id, nodes = nodes.len(), "batch committed");
        Ok(())
    }

    /// Fill every embedding slot of every node, concurrently.
    pub async fn embed_nodes(&self, nodes: &mut [GraphNode]) {
        let jobs: Vec<_> = nodes
            .iter()
            .enumerate()
            .flat_map(|(i, n)| {
                n.embedding_inputs()
                    .into_iter()
                    .map(move |(slot, text)| (i, slot, text))
            })
            .collect();

        let calls: Vec<_> = jobs
            .into_iter()
            .map(|(i, slot, text)| async move { (i, slot, self.embed_with_retry(text).await) })
            .collect();
        let results: Vec<_> = futures::stream::iter(calls)
            .buffer_unordered(self.config.embed_concurrency.max(1))
            .collect()
            .await;

        for (i, slot, vector) in results {
            nodes[i].set_embedding(slot, vector);
        }
    }

    /// Embed `text`, retrying immediately; the final failure yields an empty vector.
    async fn embed_with_retry(&self, text: &str) -> Vec<f32> {
        let attempts = self.config.embed_attempts.max(1);
        for attempt in 1..=attempts {
            match self.embedder.embed(text).await {
                Ok(vector) => return vector,
                Err(e) => tracing::debug!(attempt, attempts, error = %e, "embedding failed"),
            }
        }
        tracing::warn!(
            attempts,
            chars = text.len(),
            "embedding failed after retries, storing empty vector"
        );
        Vec::new()
    }

    /// Create every edge independently, in groups with a cool-down between them.
    pub async fn establish_relations(&self, triples: &[RelationTriple]) -> RelationReport {
        self.enter(IngestStage::EstablishingRelations);
        let mut report = RelationReport::default();
        let group_size = self.config.relation_group_size.max(1);

        for (i, group) in triples.chunks(group_size).enumerate() {
            if i > 0 && !self.config.relation_cooldown.is_zero() {
                tokio::time::sleep(self.config.relation_cooldown).await;
            }
            let outcomes =
                futures::future::join_all(group.iter().map(|t| self.store.create_relation(t)))
                    .await;
            for (triple, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => report.established += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            source = %triple.source,
                            target = %triple.target,
                            relation = %triple.kind,
                            error = %e,
                            "relation not established"
                        );
                    }
                }
            }
        }
        tracing::info!(
            established = report.established,
            failed = report.failed,
            "relations established"
        );
        report
    }

    /// Serve an establish-relations request body.
    pub async fn establish_request(&self, triples: &[RelationTriple]) -> StatusResponse {
        let report = self.establish_relations(triples).await;
        if report.failed == 0 {
            StatusResponse::ok()
        } else {
            StatusResponse::failed()
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// Relative `/`-separated paths of every file under `root` accepted by
/// `filter`, sorted. Hidden and git-ignored files are skipped.
fn discover(root: &Path, filter: impl Fn(&Path) -> bool) -> Vec<String> {
    let mut files: Vec<String> = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
        .filter(|e| {
            e.file_type().is_some_and(|ft| ft.is_file()) && filter(e.path())
        })
        .map(|e| relative_path(root, e.path()))
        .collect();
    files.sort();
    files
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Extract a batch of files concurrently.
///
/// Each task owns its file and returns its own nodes; only this coordinator
/// merges them. Returns the merged nodes and the number of failed files.
async fn extract_batch(root: &Path, files: &[String]) -> (Vec<GraphNode>, usize) {
    let mut tasks = JoinSet::new();
    for rel in files {
        let abs: PathBuf = root.join(rel);
        let rel = rel.clone();
        tasks.spawn_blocking(move || {
            let result = std::fs::read_to_string(&abs)
                .map_err(IndexError::from)
                .and_then(|source| {
                    let lang = detect_language(&abs).ok_or(IndexError::UnsupportedLanguage)?;
                    analyze_file(&source, &rel, lang)
                });
            (rel, result)
        });
    }

    let mut merged: BTreeMap<String, GraphNode> = BTreeMap::new();
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(nodes))) => {
                for node in nodes {
                    merged.insert(node.id().to_owned(), node);
                }
            }
            Ok((file, Err(e))) => {
                failed += 1;
                tracing::warn!(file, error = %e, "file skipped");
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "extraction task failed");
            }
        }
    }
    (merged.into_values().collect(), failed)
}

#[cfg(test)]
mod tests {
    use codelore_graph::InMemoryGraphStore;
    use codelore_llm::mock::MockProvider;

    use super::*;

    fn fast_config() -> IngestConfig {
        IngestConfig {
            batch_size: 2,
            batch_delay: Duration::ZERO,
            relation_cooldown: Duration::ZERO,
            ..IngestConfig::default()
        }
    }

    fn pipeline(store: Arc<InMemoryGraphStore>, embedder: MockProvider) -> IngestPipeline<MockProvider> {
        IngestPipeline::new(store, Arc::new(embedder), fast_config())
    }

    #[test]
    fn default_config_values() {
        let c = IngestConfig::default();
        assert_eq!(c.batch_size, 50);
        assert_eq!(c.batch_delay, Duration::from_secs(3));
        assert_eq!(c.relation_group_size, 1000);
        assert_eq!(c.embed_attempts, 5);
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.ts"), "").unwrap();
        std::fs::write(dir.path().join("a.js"), "").unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();
        let extensions = fast_config().extensions;
        let files = discover(dir.path(), |p| is_indexable(p, &extensions));
        assert_eq!(files, ["a.js", "sub/b.ts"]);
        assert_eq!(discover(dir.path(), is_markdown), ["notes.md"]);
    }

    #[tokio::test]
    async fn embedding_failure_yields_empty_vector_after_cap() {
        let store = Arc::new(InMemoryGraphStore::new());
        let mock = MockProvider::failing();
        let p = pipeline(store, mock.clone());
        assert!(p.embed_with_retry("x").await.is_empty());
        assert_eq!(mock.embed_calls(), 5);
    }

    #[tokio::test]
    async fn embedding_recovers_within_cap() {
        let store = Arc::new(InMemoryGraphStore::new());
        let mock = MockProvider::default().with_embed_failures(3);
        let p = pipeline(store, mock.clone());
        assert_eq!(p.embed_with_retry("x").await.len(), 8);
        assert_eq!(mock.embed_calls(), 4);
    }

    #[tokio::test]
    async fn establish_relations_counts_each_edge() {
        let store = Arc::new(InMemoryGraphStore::new());
        let p = pipeline(Arc::clone(&store), MockProvider::default());
        let request = IngestRequest {
            batch_id: "b".into(),
            nodes: serde_json::from_value(serde_json::json!([
                {"id": "a", "name": "a", "type": "Function", "code": "", "filePath": "a.ts"},
                {"id": "b", "name": "b", "type": "Function", "code": "", "filePath": "a.ts"}
            ]))
            .unwrap(),
        };
        assert!(p.ingest_request(request).await.is_ok());

        let triples: Vec<RelationTriple> = serde_json::from_value(serde_json::json!([
            {"source": "a", "target": "b", "relation": "USES"},
            {"source": "a", "target": "ghost", "relation": "USES"}
        ]))
        .unwrap();
        let report = p.establish_relations(&triples).await;
        assert_eq!(report, RelationReport { established: 1, failed: 1 });
        assert_eq!(p.establish_request(&triples[..1]).await, StatusResponse::ok());
    }

    #[tokio::test]
    async fn stage_ends_done() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "function a() {}").unwrap();
        let store = Arc::new(InMemoryGraphStore::new());
        let p = pipeline(store, MockProvider::default());
        let rx = p.subscribe();
        p.ingest_codebase(dir.path()).await.unwrap();
        assert_eq!(*rx.borrow(), IngestStage::Done);
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryGraphStore::new());
        store.set_unreachable(true);
        let p = pipeline(store, MockProvider::default());
        assert!(p.ingest_codebase(dir.path()).await.is_err());
        assert_eq!(*p.subscribe().borrow(), IngestStage::Failed);
    }
}
