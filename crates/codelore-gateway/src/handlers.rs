use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use codelore_graph::{EstablishRelationsRequest, IngestRequest, ScoredNode, StatusResponse};
use codelore_index::{DocsAnswer, Retrieval};
use codelore_llm::LlmProvider;
use serde::{Deserialize, Serialize};

use super::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryRequest {
    pub query: String,
    /// Treat `query` as a snippet and look for similar code.
    #[serde(default)]
    pub similar: bool,
    /// Search documentation nodes instead of code.
    #[serde(default)]
    pub docs: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AskRequest {
    pub question: String,
    /// Answer from documentation instead of code.
    #[serde(default)]
    pub docs: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportanceRequest {
    pub query: String,
}

#[derive(Serialize)]
struct QueryResponse {
    keywords: Vec<String>,
    nodes: Vec<ScoredNode>,
}

impl From<Retrieval> for QueryResponse {
    fn from(r: Retrieval) -> Self {
        match r {
            Retrieval::NoKeywords => Self {
                keywords: Vec::new(),
                nodes: Vec::new(),
            },
            Retrieval::NoMatches { keywords } => Self {
                keywords,
                nodes: Vec::new(),
            },
            Retrieval::Found { keywords, hits } => Self {
                keywords,
                nodes: hits,
            },
        }
    }
}

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn failed() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(StatusResponse::failed())).into_response()
}

pub(crate) async fn health_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn ingest_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(request): Json<IngestRequest>,
) -> Response {
    tracing::info!(batch_id = %request.batch_id, nodes = request.nodes.len(), "ingest request");
    let response = state.pipeline.ingest_request(request).await;
    (status_code(response.is_ok()), Json(response)).into_response()
}

pub(crate) async fn establish_relations_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(request): Json<EstablishRelationsRequest>,
) -> Response {
    let status = state.pipeline.establish_request(&request.relations).await;
    (status_code(status.is_ok()), Json(status)).into_response()
}

pub(crate) async fn purge_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
) -> Response {
    match state.pipeline.purge().await {
        Ok(()) => Json(StatusResponse::ok()).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "purge failed");
            failed()
        }
    }
}

pub(crate) async fn query_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    let result = if request.similar {
        state.retriever.find_similar(&request.query).await
    } else if request.docs {
        state.retriever.find_docs(&request.query).await
    } else {
        state.retriever.find_code(&request.query).await
    };
    match result {
        Ok(retrieval) => Json(QueryResponse::from(retrieval)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            failed()
        }
    }
}

pub(crate) async fn ask_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(request): Json<AskRequest>,
) -> Response {
    let result = if request.docs {
        state.retriever.ask_docs(&request.question).await
    } else {
        state
            .retriever
            .ask(&request.question)
            .await
            .map(|answer| DocsAnswer {
                answer,
                sources: Vec::new(),
            })
    };
    match result {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => {
            tracing::error!(error = %e, docs = request.docs, "ask failed");
            failed()
        }
    }
}

pub(crate) async fn importance_handler<P: LlmProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(request): Json<ImportanceRequest>,
) -> Response {
    match state.retriever.importance(&request.query).await {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "importance failed");
            failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn query_request_defaults_to_code_lookup() {
        let req: QueryRequest = serde_json::from_str(r#"{"query":"where is main"}"#).unwrap();
        assert_eq!(req.query, "where is main");
        assert!(!req.similar);
        assert!(!req.docs);
    }

    #[test]
    fn ask_request_defaults_to_code() {
        let req: AskRequest = serde_json::from_str(r#"{"question":"why?"}"#).unwrap();
        assert!(!req.docs);
        let req: AskRequest = serde_json::from_str(r#"{"question":"why?","docs":true}"#).unwrap();
        assert!(req.docs);
    }

    #[test]
    fn no_keywords_is_an_empty_response() {
        let json = serde_json::to_value(QueryResponse::from(Retrieval::NoKeywords)).unwrap();
        assert_eq!(json, serde_json::json!({"keywords": [], "nodes": []}));
    }
}
