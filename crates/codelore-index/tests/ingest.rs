use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codelore_graph::{
    GraphNode, InMemoryGraphStore, IngestRequest, RelationKind, StoreEvent,
};
use codelore_index::{IngestConfig, IngestPipeline};
use codelore_llm::mock::MockProvider;

fn config(batch_size: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        batch_delay: Duration::ZERO,
        relation_cooldown: Duration::ZERO,
        ..IngestConfig::default()
    }
}

fn write(root: &Path, rel: &str, source: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, source).unwrap();
}

fn pipeline(store: &Arc<InMemoryGraphStore>, batch_size: usize) -> IngestPipeline<MockProvider> {
    IngestPipeline::new(
        store.clone(),
        Arc::new(MockProvider::default()),
        config(batch_size),
    )
}

fn code_node(id: &str) -> GraphNode {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": id,
        "type": "Function",
        "code": "",
        "filePath": "x.ts",
    }))
    .unwrap()
}

#[tokio::test]
async fn import_resolves_across_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function helper() { return 1; }");
    write(
        dir.path(),
        "b.ts",
        "import { helper } from './a';\nexport function caller() { helper(); }",
    );

    let store = Arc::new(InMemoryGraphStore::new());
    let report = pipeline(&store, 50).ingest_codebase(dir.path()).await.unwrap();

    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.files_failed, 0);
    assert!(report.failed_batches.is_empty());

    let Some(GraphNode::Code(caller)) = store.node("b.ts:caller") else {
        panic!("b.ts:caller missing");
    };
    assert!(
        caller
            .relations
            .iter()
            .any(|r| r.target == "a.ts:helper" && r.kind == RelationKind::Uses)
    );
    assert!(store.edges().iter().any(|e| e.source == "b.ts:caller"
        && e.target == "a.ts:helper"
        && e.kind == RelationKind::Uses));
    assert!(store.node("a.ts").is_some_and(|n| matches!(n, GraphNode::Code(c) if c.is_file)));
}

#[tokio::test]
async fn failing_insert_rolls_back_whole_batch() {
    let ids: Vec<String> = (0..10).map(|i| format!("x.ts:n{i}")).collect();
    let store = Arc::new(InMemoryGraphStore::new().with_failing_ids(["x.ts:n3", "x.ts:n7"]));
    let p = pipeline(&store, 50);

    let response = p
        .ingest_request(IngestRequest {
            batch_id: "batch-1".into(),
            nodes: ids.iter().map(|id| code_node(id)).collect(),
        })
        .await;
    assert!(!response.is_ok());
    assert_eq!(response.batch_id, "batch-1");
    assert_eq!(store.node_count(), 0);
    assert!(matches!(store.events().as_slice(), [StoreEvent::Rollback { .. }]));

    let next = p
        .ingest_request(IngestRequest {
            batch_id: "batch-2".into(),
            nodes: vec![code_node("x.ts:other")],
        })
        .await;
    assert!(next.is_ok());
    assert_eq!(store.node_count(), 1);
}

#[tokio::test]
async fn failed_batch_is_recorded_and_later_batches_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function alpha() {}");
    write(dir.path(), "b.ts", "export function beta() {}");
    write(dir.path(), "c.ts", "export function gamma() {}");

    let store = Arc::new(InMemoryGraphStore::new().with_failing_ids(["a.ts:alpha"]));
    let report = pipeline(&store, 2).ingest_codebase(dir.path()).await.unwrap();

    assert_eq!(report.failed_batches.len(), 1);
    assert_eq!(report.batches_committed, 1);
    assert!(store.node("a.ts:alpha").is_none());
    assert!(store.node("b.ts:beta").is_none());
    assert!(store.node("c.ts:gamma").is_some());
    // only c.ts's CONTAINS edge can be established
    assert_eq!(report.relations_established, 1);
}

#[tokio::test]
async fn relations_follow_every_commit() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function one() { two(); }");
    write(dir.path(), "b.ts", "import { three } from './c';\nexport function two() { three(); }");
    write(dir.path(), "c.ts", "export function three() {}");
    write(dir.path(), "d.ts", "import { one } from './a';\nexport const x = one();");

    let store = Arc::new(InMemoryGraphStore::new());
    pipeline(&store, 1).ingest_codebase(dir.path()).await.unwrap();

    let events = store.events();
    let last_commit = events
        .iter()
        .rposition(|e| matches!(e, StoreEvent::Commit { .. }))
        .unwrap();
    let first_relation = events
        .iter()
        .position(|e| matches!(e, StoreEvent::Relation(_)))
        .unwrap();
    assert!(last_commit < first_relation);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StoreEvent::Commit { .. }))
            .count(),
        4
    );
}

#[tokio::test]
async fn unparsable_file_does_not_affect_its_batch() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function a() {}");
    write(dir.path(), "b.ts", "export function (");
    write(dir.path(), "c.ts", "export class C {}");

    let store = Arc::new(InMemoryGraphStore::new());
    let report = pipeline(&store, 50).ingest_codebase(dir.path()).await.unwrap();

    assert_eq!(report.files_failed, 1);
    assert!(report.failed_batches.is_empty());
    assert!(store.node("a.ts:a").is_some());
    assert!(store.node("c.ts:C").is_some());
    assert!(store.node("b.ts").is_none());
    // a, a.ts, C, c.ts
    assert_eq!(store.node_count(), 4);
}

#[tokio::test]
async fn embeddings_are_filled_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/m.ts", "export function run() {}");

    let store = Arc::new(InMemoryGraphStore::new());
    pipeline(&store, 50).ingest_codebase(dir.path()).await.unwrap();

    let Some(GraphNode::Code(run)) = store.node("src/m.ts:run") else {
        panic!("src/m.ts:run missing");
    };
    assert_eq!(run.name_embeddings.len(), 8);
    assert_eq!(run.code_embeddings.len(), 8);
}

#[tokio::test]
async fn ingestion_purges_the_previous_graph() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.ts", "export function a() {}");

    let store = Arc::new(InMemoryGraphStore::new());
    let p = pipeline(&store, 50);
    p.ingest_codebase(dir.path()).await.unwrap();
    p.ingest_codebase(dir.path()).await.unwrap();

    assert_eq!(store.purge_count(), 2);
    assert_eq!(store.node_count(), 2);
    assert_eq!(store.edges().len(), 1);
}

#[tokio::test]
async fn markdown_docs_are_ingested_with_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "docs/guide.md", "# Guide\n\nHello.\n\n## Setup\n\nSteps.");
    write(dir.path(), "a.ts", "export function a() {}");

    let store = Arc::new(InMemoryGraphStore::new());
    let report = pipeline(&store, 50).ingest_docs(dir.path()).await.unwrap();

    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.nodes_committed, 4);
    assert_eq!(report.relations_established, 3);
    assert_eq!(store.purge_count(), 0);
}
