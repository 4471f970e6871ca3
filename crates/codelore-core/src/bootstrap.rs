//! Service construction from a loaded [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use codelore_graph::{GraphStore, Neo4jConfig, Neo4jStore};
use codelore_index::{CodeRetriever, IngestConfig, IngestPipeline, RetrievalConfig};
use codelore_llm::any::AnyProvider;
use codelore_llm::ollama::OllamaProvider;
use codelore_llm::openai::OpenAiProvider;
use codelore_llm::text_embed::TextEmbedProvider;

use crate::config::{ChatProviderKind, Config, EmbeddingProviderKind};

const DEFAULT_CONFIG_PATH: &str = "config/codelore.toml";

/// Priority: explicit path > `CODELORE_CONFIG` env > `config/codelore.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODELORE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[must_use]
pub fn create_chat_provider(config: &Config) -> AnyProvider {
    let llm = &config.llm;
    match llm.provider {
        ChatProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &llm.base_url,
            llm.model.clone(),
            config.embedding.model.clone(),
        )),
        ChatProviderKind::OpenAi => AnyProvider::OpenAi(OpenAiProvider::new(
            llm.api_key.as_ref().map(|k| k.expose().to_owned()),
            llm.base_url.clone(),
            llm.model.clone(),
            llm.max_tokens,
            None,
        )),
    }
}

#[must_use]
pub fn create_embedding_provider(config: &Config) -> AnyProvider {
    let emb = &config.embedding;
    match emb.provider {
        EmbeddingProviderKind::TextEmbed => {
            AnyProvider::TextEmbed(TextEmbedProvider::new(emb.base_url.clone()))
        }
        EmbeddingProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &emb.base_url,
            config.llm.model.clone(),
            emb.model.clone(),
        )),
        EmbeddingProviderKind::OpenAi => AnyProvider::OpenAi(OpenAiProvider::new(
            config.llm.api_key.as_ref().map(|k| k.expose().to_owned()),
            emb.base_url.clone(),
            config.llm.model.clone(),
            config.llm.max_tokens,
            Some(emb.model.clone()),
        )),
    }
}

#[must_use]
pub fn neo4j_config(config: &Config) -> Neo4jConfig {
    Neo4jConfig {
        url: config.graph.url.clone(),
        database: config.graph.database.clone(),
        username: config.graph.username.clone(),
        password: config
            .graph
            .password
            .as_ref()
            .map(|p| p.expose().to_owned())
            .unwrap_or_default(),
        write_attempts: config.graph.write_attempts,
    }
}

#[must_use]
pub fn ingest_config(config: &Config) -> IngestConfig {
    IngestConfig {
        batch_size: config.ingest.batch_size,
        batch_delay: Duration::from_millis(config.ingest.batch_delay_ms),
        relation_group_size: config.ingest.relation_group_size,
        relation_cooldown: Duration::from_millis(config.ingest.relation_cooldown_ms),
        embed_attempts: config.embedding.max_attempts,
        embed_concurrency: config.embedding.concurrency,
        dimensions: config.graph.dimensions,
        extensions: config.ingest.extensions.clone(),
    }
}

#[must_use]
pub fn retrieval_config(config: &Config) -> RetrievalConfig {
    RetrievalConfig {
        top_k: config.retrieval.top_k,
        code_threshold: config.retrieval.code_threshold,
        similar_threshold: config.retrieval.similar_threshold,
        doc_threshold: config.retrieval.doc_threshold,
    }
}

/// Shared handles a command or the gateway runs against.
pub struct Services {
    pub store: Arc<dyn GraphStore>,
    pub pipeline: Arc<IngestPipeline<AnyProvider>>,
    pub retriever: Arc<CodeRetriever<AnyProvider>>,
}

impl Services {
    /// Wire providers and pipelines over an existing store.
    #[must_use]
    pub fn with_store(config: &Config, store: Arc<dyn GraphStore>) -> Self {
        let llm = Arc::new(create_chat_provider(config));
        let embedder = Arc::new(create_embedding_provider(config));
        tracing::info!(
            chat = %config.llm.provider,
            embedding = %config.embedding.provider,
            graph = %config.graph.url,
            "services configured"
        );

        let pipeline = IngestPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            ingest_config(config),
        );
        let retriever = CodeRetriever::new(
            Arc::clone(&store),
            llm,
            embedder,
            retrieval_config(config),
        );
        Self {
            store,
            pipeline: Arc::new(pipeline),
            retriever: Arc::new(retriever),
        }
    }

    /// Wire everything against the configured Neo4j database.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<dyn GraphStore> = Arc::new(Neo4jStore::new(neo4j_config(config)));
        Self::with_store(config, store)
    }
}
