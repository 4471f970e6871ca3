use super::Config;
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_providers();
        self.apply_env_overrides_graph();
        self.apply_env_overrides_pipeline();
        self.apply_env_overrides_gateway();
    }

    fn apply_env_overrides_providers(&mut self) {
        if let Ok(v) = std::env::var("CODELORE_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODELORE_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODELORE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODELORE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODELORE_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("CODELORE_LLM_API_KEY") {
            self.llm.api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("CODELORE_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODELORE_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODELORE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("CODELORE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODELORE_EMBEDDING_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.concurrency = n;
        }
    }

    fn apply_env_overrides_graph(&mut self) {
        if let Ok(v) = std::env::var("CODELORE_GRAPH_URL") {
            self.graph.url = v;
        }
        if let Ok(v) = std::env::var("CODELORE_GRAPH_DATABASE") {
            self.graph.database = v;
        }
        if let Ok(v) = std::env::var("CODELORE_GRAPH_USERNAME") {
            self.graph.username = v;
        }
        if let Ok(v) = std::env::var("CODELORE_GRAPH_PASSWORD") {
            self.graph.password = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("CODELORE_GRAPH_DIMENSIONS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.graph.dimensions = n;
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("CODELORE_INGEST_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.ingest.batch_size = n;
        }
        if let Ok(v) = std::env::var("CODELORE_INGEST_BATCH_DELAY_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.ingest.batch_delay_ms = ms;
        }
        if let Ok(v) = std::env::var("CODELORE_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("CODELORE_RETRIEVAL_CODE_THRESHOLD")
            && let Ok(t) = v.parse::<f32>()
        {
            self.retrieval.code_threshold = t;
        }
    }

    fn apply_env_overrides_gateway(&mut self) {
        if let Ok(v) = std::env::var("CODELORE_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("CODELORE_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("CODELORE_GATEWAY_TOKEN") {
            self.gateway.auth_token = Some(v);
        }
    }
}
