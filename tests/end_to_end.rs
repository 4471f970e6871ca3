use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use codelore_graph::{GraphNode, InMemoryGraphStore};
use codelore_index::retriever::NO_REFERENCES;
use codelore_index::{CodeRetriever, IngestConfig, IngestPipeline, RetrievalConfig};
use codelore_llm::Role;
use codelore_llm::mock::MockProvider;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; 8];
    v[axis] = 1.0;
    v
}

fn embedder() -> Arc<MockProvider> {
    let table = HashMap::from([
        ("helper".to_owned(), unit(0)),
        ("caller".to_owned(), unit(1)),
    ]);
    Arc::new(MockProvider::default().with_embeddings(table))
}

fn write_codebase(root: &std::path::Path) {
    std::fs::write(root.join("a.ts"), "export function helper() { return 1; }").unwrap();
    std::fs::write(
        root.join("b.ts"),
        "import { helper } from './a';\nexport function caller() { return helper(); }",
    )
    .unwrap();
}

async fn ingest(store: &Arc<InMemoryGraphStore>, embedder: &Arc<MockProvider>) {
    let dir = tempfile::tempdir().unwrap();
    write_codebase(dir.path());
    let pipeline = IngestPipeline::new(
        store.clone(),
        Arc::clone(embedder),
        IngestConfig {
            batch_delay: Duration::ZERO,
            relation_cooldown: Duration::ZERO,
            ..IngestConfig::default()
        },
    );
    let report = pipeline.ingest_codebase(dir.path()).await.unwrap();
    assert_eq!(report.files_scanned, 2);
    assert!(report.failed_batches.is_empty());
    assert_eq!(report.relations_failed, 0);
}

#[tokio::test]
async fn ingested_symbol_is_answered_with_its_dependencies() {
    let store = Arc::new(InMemoryGraphStore::new());
    let embedder = embedder();
    ingest(&store, &embedder).await;

    let llm = Arc::new(MockProvider::with_responses(vec![
        "<ANSWER>[caller]</ANSWER>".into(),
        "caller returns whatever helper returns".into(),
    ]));
    let retriever = CodeRetriever::new(
        store.clone(),
        Arc::clone(&llm),
        embedder,
        RetrievalConfig::default(),
    );

    let answer = retriever.ask("what does caller do?").await.unwrap();
    assert_eq!(answer, "caller returns whatever helper returns");

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    let context = &prompts[1].last().unwrap();
    assert_eq!(context.role, Role::User);
    assert!(context.content.contains("b.ts:caller"));
    assert!(context.content.contains("a.ts:helper"));
}

#[tokio::test]
async fn unknown_symbol_gets_the_fixed_reply() {
    let store = Arc::new(InMemoryGraphStore::new());
    let embedder = embedder();
    ingest(&store, &embedder).await;

    let llm = Arc::new(MockProvider::with_responses(vec![
        "<ANSWER>[CRC_TABLE]</ANSWER>".into(),
    ]));
    let retriever = CodeRetriever::new(
        store.clone(),
        Arc::clone(&llm),
        embedder,
        RetrievalConfig::default(),
    );

    let answer = retriever.ask("where is CRC_TABLE?").await.unwrap();
    assert_eq!(answer, NO_REFERENCES);
    assert_eq!(llm.prompts().len(), 1);
}

#[tokio::test]
async fn reingesting_rebuilds_the_same_graph() {
    let store = Arc::new(InMemoryGraphStore::new());
    let embedder = embedder();
    ingest(&store, &embedder).await;
    let first = store.node_count();
    let edges = store.edges().len();

    ingest(&store, &embedder).await;
    assert_eq!(store.node_count(), first);
    assert_eq!(store.edges().len(), edges);
    assert!(matches!(
        store.node("a.ts:helper"),
        Some(GraphNode::Code(n)) if n.name_embeddings == unit(0)
    ));
}
