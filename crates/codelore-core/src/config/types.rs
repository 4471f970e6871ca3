use serde::Deserialize;

use crate::secret::Secret;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Chat backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProviderKind {
    Ollama,
    OpenAi,
}

impl ChatProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for ChatProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EmbeddingProviderKind {
    #[serde(rename = "text-embed")]
    TextEmbed,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbeddingProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextEmbed => "text-embed",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_chat_provider() -> ChatProviderKind {
    ChatProviderKind::Ollama
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_llm_model() -> String {
    "llama3".into()
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_chat_provider")]
    pub provider: ChatProviderKind,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Only ever read from `CODELORE_LLM_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<Secret>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::TextEmbed
}

fn default_embedding_base_url() -> String {
    "http://localhost:8020".into()
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

fn default_embed_attempts() -> u32 {
    5
}

fn default_embed_concurrency() -> usize {
    32
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    /// Ignored by the text-embed backend, which serves a single model.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embed_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_embed_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            max_attempts: default_embed_attempts(),
            concurrency: default_embed_concurrency(),
        }
    }
}

fn default_graph_url() -> String {
    "http://localhost:7474".into()
}

fn default_database() -> String {
    "neo4j".into()
}

fn default_username() -> String {
    "neo4j".into()
}

fn default_dimensions() -> usize {
    768
}

fn default_write_attempts() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Only ever read from `CODELORE_GRAPH_PASSWORD`.
    #[serde(skip)]
    pub password: Option<Secret>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            database: default_database(),
            username: default_username(),
            password: None,
            dimensions: default_dimensions(),
            write_attempts: default_write_attempts(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_delay_ms() -> u64 {
    3000
}

fn default_relation_group_size() -> usize {
    1000
}

fn default_relation_cooldown_ms() -> u64 {
    1000
}

fn default_extensions() -> Vec<String> {
    vec!["ts".into(), "js".into()]
}

#[derive(Debug, Deserialize)]
pub struct IngestSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_relation_group_size")]
    pub relation_group_size: usize,
    #[serde(default = "default_relation_cooldown_ms")]
    pub relation_cooldown_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            relation_group_size: default_relation_group_size(),
            relation_cooldown_ms: default_relation_cooldown_ms(),
            extensions: default_extensions(),
        }
    }
}

fn default_top_k() -> usize {
    2
}

fn default_code_threshold() -> f32 {
    0.85
}

fn default_similar_threshold() -> f32 {
    0.5
}

fn default_doc_threshold() -> f32 {
    0.85
}

#[derive(Debug, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_code_threshold")]
    pub code_threshold: f32,
    #[serde(default = "default_similar_threshold")]
    pub similar_threshold: f32,
    #[serde(default = "default_doc_threshold")]
    pub doc_threshold: f32,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            code_threshold: default_code_threshold(),
            similar_threshold: default_similar_threshold(),
            doc_threshold: default_doc_threshold(),
        }
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8090
}

fn default_gateway_rate_limit() -> u32 {
    120
}

fn default_gateway_max_body() -> usize {
    16 * 1_048_576
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_gateway_rate_limit")]
    pub rate_limit: u32,
    /// Ingest batches carry embedded vectors, hence the generous default.
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: None,
            rate_limit: default_gateway_rate_limit(),
            max_body_size: default_gateway_max_body(),
        }
    }
}
