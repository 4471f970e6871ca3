//! Graph store backed by the Neo4j HTTP transactional API.
//!
//! Every call is a JSON request of the form `{"statements": [...]}`. The
//! response carries per-statement `results` and a global `errors` array; a
//! non-empty `errors` array fails the request even on HTTP 200.

use std::fmt;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GraphStoreError, Result};
use crate::node::{GraphNode, RelationTriple, Statement, VectorIndex};
use crate::store::{BoxFuture, GraphStore, NodeDegree, ScoredNode, Transaction, VectorQuery};

const QUERY_NODES: &str = "CALL db.index.vector.queryNodes($index, $k, $vector) \
     YIELD node, score WHERE score >= $threshold \
     OPTIONAL MATCH (node)-[r]->(relatedNode) \
     RETURN node, COLLECT(relatedNode) AS relatedNodes, score ORDER BY score DESC";

const NODE_DEGREE: &str = "MATCH (n {id: $id}) \
     WITH COUNT { (n)<--() } AS incoming, COUNT { (n)-->() } AS outgoing \
     MATCH (m) \
     RETURN incoming, outgoing, \
     max(COUNT { (m)<--() }) AS maxIncoming, max(COUNT { (m)-->() }) AS maxOutgoing";

#[derive(Clone)]
pub struct Neo4jConfig {
    /// Base HTTP URL, e.g. `http://localhost:7474`.
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Attempts per write when the transport fails.
    pub write_attempts: u32,
}

impl fmt::Debug for Neo4jConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("write_attempts", &self.write_attempts)
            .finish()
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".into(),
            database: "neo4j".into(),
            username: "neo4j".into(),
            password: String::new(),
            write_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neo4jStore {
    client: reqwest::Client,
    config: Neo4jConfig,
}

#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
    #[serde(default)]
    commit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

impl TxResponse {
    fn into_rows(self) -> Vec<Vec<Value>> {
        self.results
            .into_iter()
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default()
    }
}

impl Neo4jStore {
    #[must_use]
    pub fn new(mut config: Neo4jConfig) -> Self {
        while config.url.ends_with('/') {
            config.url.pop();
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("codelore/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn tx_endpoint(&self, suffix: &str) -> String {
        format!(
            "{}/db/{}/tx{suffix}",
            self.config.url, self.config.database
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        statements: &[Statement],
    ) -> Result<(TxResponse, Option<String>)> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.config.username, Some(&self.config.password));
        if method != Method::DELETE {
            request = request.json(&json!({ "statements": statements }));
        }

        let response = request.send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GraphStoreError::Transaction(format!(
                "unknown transaction at {url}"
            )));
        }
        if !status.is_success() {
            return Err(GraphStoreError::Connection(format!(
                "neo4j answered HTTP {status}"
            )));
        }

        let text = response.text().await?;
        let body: TxResponse = if text.trim().is_empty() {
            TxResponse::default()
        } else {
            serde_json::from_str(&text)?
        };

        if let Some(err) = body.errors.first() {
            return Err(GraphStoreError::Statement {
                code: err.code.clone(),
                message: err.message.clone(),
            });
        }
        Ok((body, location))
    }

    /// Send a write, retrying immediately on transport failures.
    async fn send_write(
        &self,
        method: Method,
        url: &str,
        statements: &[Statement],
    ) -> Result<TxResponse> {
        let attempts = self.config.write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send(method.clone(), url, statements).await {
                Ok((body, _)) => return Ok(body),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "neo4j write failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one statement in its own autocommit transaction and return its rows.
    ///
    /// # Errors
    ///
    /// Returns a statement error if Neo4j rejects it, or a connection error.
    pub async fn run(&self, statement: Statement) -> Result<Vec<Vec<Value>>> {
        let url = self.tx_endpoint("/commit");
        let body = self.send_write(Method::POST, &url, &[statement]).await?;
        Ok(body.into_rows())
    }

    async fn begin_inner(&self) -> Result<Transaction> {
        let (body, location) = self.send(Method::POST, &self.tx_endpoint(""), &[]).await?;
        let handle = body
            .commit
            .as_deref()
            .and_then(|c| c.strip_suffix("/commit"))
            .map(str::to_owned)
            .or(location)
            .ok_or_else(|| {
                GraphStoreError::Transaction("begin response carried no transaction url".into())
            })?;
        tracing::debug!(handle, "transaction opened");
        Ok(Transaction::new(handle))
    }

    async fn purge_inner(&self, dimensions: usize) -> Result<()> {
        self.run(Statement::new("MATCH (n) DETACH DELETE n")).await?;
        for index in VectorIndex::ALL {
            self.run(Statement::new(format!(
                "DROP INDEX `{}` IF EXISTS",
                index.as_str()
            )))
            .await?;
        }
        for index in VectorIndex::ALL {
            self.run(Statement::new(create_index_statement(index, dimensions)))
                .await?;
        }
        tracing::info!(dimensions, "graph purged and vector indexes recreated");
        Ok(())
    }

    async fn query_inner(&self, query: VectorQuery<'_>) -> Result<Vec<ScoredNode>> {
        let statement = Statement::new(QUERY_NODES)
            .param("index", query.index.as_str())
            .param("k", query.top_k)
            .param("vector", json!(query.vector))
            .param("threshold", f64::from(query.min_score));
        let url = self.tx_endpoint("/commit");
        let (body, _) = self.send(Method::POST, &url, &[statement]).await?;

        let mut hits = Vec::new();
        for row in body.into_rows() {
            match parse_scored_row(row) {
                Some(hit) => hits.push(hit),
                None => tracing::warn!(index = query.index.as_str(), "skipping unparsable row"),
            }
        }
        Ok(hits)
    }

    async fn degree_inner(&self, id: &str) -> Result<Option<NodeDegree>> {
        let statement = Statement::new(NODE_DEGREE).param("id", id);
        let url = self.tx_endpoint("/commit");
        let (body, _) = self.send(Method::POST, &url, &[statement]).await?;
        Ok(body.into_rows().into_iter().next().and_then(|row| parse_degree_row(&row)))
    }
}

fn parse_degree_row(row: &[Value]) -> Option<NodeDegree> {
    let count = |i: usize| row.get(i).and_then(Value::as_u64);
    Some(NodeDegree {
        incoming: count(0)?,
        outgoing: count(1)?,
        max_incoming: count(2)?,
        max_outgoing: count(3)?,
    })
}

fn create_index_statement(index: VectorIndex, dimensions: usize) -> String {
    let label = index.label();
    let name = index.as_str();
    format!(
        "CREATE VECTOR INDEX `{name}` IF NOT EXISTS FOR (n:{label}) ON (n.{name}) \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {dimensions}, \
         `vector.similarity_function`: 'cosine'}}}}"
    )
}

#[allow(clippy::cast_possible_truncation)]
fn parse_scored_row(mut row: Vec<Value>) -> Option<ScoredNode> {
    if row.len() < 3 {
        return None;
    }
    let score = row[2].as_f64()? as f32;
    let related = match row[1].take() {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<GraphNode>(v).ok())
            .collect(),
        _ => Vec::new(),
    };
    let node = serde_json::from_value(row[0].take()).ok()?;
    Some(ScoredNode {
        node,
        related,
        score,
    })
}

impl GraphStore for Neo4jStore {
    fn verify_connectivity(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = self.tx_endpoint("/commit");
            self.send(Method::POST, &url, &[]).await?;
            Ok(())
        })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Transaction>> {
        Box::pin(self.begin_inner())
    }

    fn insert_node<'a>(
        &'a self,
        tx: &'a mut Transaction,
        node: &'a GraphNode,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let statement = node.insert_statement();
            self.send_write(Method::POST, tx.handle(), &[statement])
                .await?;
            tx.record_write();
            Ok(())
        })
    }

    fn commit(&self, tx: Transaction) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = format!("{}/commit", tx.handle());
            self.send(Method::POST, &url, &[]).await?;
            tracing::debug!(handle = tx.handle(), writes = tx.writes(), "transaction committed");
            Ok(())
        })
    }

    fn rollback(&self, tx: Transaction) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.send(Method::DELETE, tx.handle(), &[]).await?;
            tracing::debug!(handle = tx.handle(), "transaction rolled back");
            Ok(())
        })
    }

    fn create_relation<'a>(&'a self, triple: &'a RelationTriple) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let rows = self.run(triple.create_statement()).await?;
            let created = rows
                .first()
                .and_then(|r| r.first())
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if created == 0 {
                return Err(GraphStoreError::NotFound(format!(
                    "{} -[{}]-> {}",
                    triple.source, triple.kind, triple.target
                )));
            }
            Ok(())
        })
    }

    fn purge(&self, dimensions: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.purge_inner(dimensions))
    }

    fn query_nodes<'a>(
        &'a self,
        query: VectorQuery<'a>,
    ) -> BoxFuture<'a, Result<Vec<ScoredNode>>> {
        Box::pin(self.query_inner(query))
    }

    fn degree<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<NodeDegree>>> {
        Box::pin(self.degree_inner(id))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::node::{CodeNode, RelationKind};

    fn store(server: &MockServer) -> Neo4jStore {
        Neo4jStore::new(Neo4jConfig {
            url: server.uri(),
            password: "secret".into(),
            write_attempts: 2,
            ..Neo4jConfig::default()
        })
    }

    fn node(id: &str) -> GraphNode {
        GraphNode::Code(CodeNode {
            id: id.into(),
            name: id.into(),
            kind: "Function".into(),
            code: String::new(),
            file_path: "a.ts".into(),
            relations: vec![],
            name_embeddings: vec![],
            code_embeddings: vec![],
            is_file: false,
        })
    }

    fn ok_body() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"results": [], "errors": []}))
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = Neo4jConfig {
            password: "hunter2".into(),
            ..Neo4jConfig::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn index_statement_targets_label() {
        let s = create_index_statement(VectorIndex::Content, 768);
        assert!(s.contains("FOR (n:DocumentNode) ON (n.contentEmbeddings)"));
        assert!(s.contains("`vector.dimensions`: 768"));
        assert!(s.contains("'cosine'"));
    }

    #[test]
    fn parse_row_skips_bad_related_nodes() {
        let row = vec![
            serde_json::to_value(node("a.ts:x")).unwrap(),
            json!([serde_json::to_value(node("a.ts:y")).unwrap(), {"bogus": true}]),
            json!(0.9),
        ];
        let hit = parse_scored_row(row).unwrap();
        assert_eq!(hit.node.id(), "a.ts:x");
        assert_eq!(hit.related.len(), 1);
        assert!((hit.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn parse_row_rejects_short_rows() {
        assert!(parse_scored_row(vec![json!({})]).is_none());
    }

    #[tokio::test]
    async fn verify_connectivity_posts_empty_statements() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({"statements": []})))
            .respond_with(ok_body())
            .expect(1)
            .mount(&server)
            .await;

        store(&server).verify_connectivity().await.unwrap();
    }

    #[tokio::test]
    async fn verify_connectivity_unreachable_is_connection_error() {
        let s = Neo4jStore::new(Neo4jConfig {
            url: "http://127.0.0.1:1".into(),
            ..Neo4jConfig::default()
        });
        let err = s.verify_connectivity().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn transaction_lifecycle_uses_commit_url() {
        let server = MockServer::start().await;
        let commit_url = format!("{}/db/neo4j/tx/7/commit", server.uri());
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"results": [], "errors": [], "commit": commit_url})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/7"))
            .respond_with(ok_body())
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/7/commit"))
            .respond_with(ok_body())
            .expect(1)
            .mount(&server)
            .await;

        let s = store(&server);
        let mut tx = s.begin().await.unwrap();
        assert_eq!(tx.handle(), format!("{}/db/neo4j/tx/7", server.uri()));
        s.insert_node(&mut tx, &node("a.ts:x")).await.unwrap();
        s.insert_node(&mut tx, &node("a.ts:y")).await.unwrap();
        assert_eq!(tx.writes(), 2);
        s.commit(tx).await.unwrap();
    }

    #[tokio::test]
    async fn statement_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{"code": "Neo.ClientError.Schema.ConstraintValidationFailed", "message": "dup"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let s = store(&server);
        let mut tx = Transaction::new(format!("{}/db/neo4j/tx/3", server.uri()));
        let err = s.insert_node(&mut tx, &node("a.ts:x")).await.unwrap_err();
        assert!(matches!(err, GraphStoreError::Statement { .. }));
        assert_eq!(tx.writes(), 0);
    }

    #[tokio::test]
    async fn server_failure_is_retried_up_to_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/4"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let s = store(&server);
        let mut tx = Transaction::new(format!("{}/db/neo4j/tx/4", server.uri()));
        let err = s.insert_node(&mut tx, &node("a.ts:x")).await.unwrap_err();
        assert!(matches!(err, GraphStoreError::Connection(_)));
    }

    #[tokio::test]
    async fn rollback_sends_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/db/neo4j/tx/9"))
            .respond_with(ok_body())
            .expect(1)
            .mount(&server)
            .await;

        let s = store(&server);
        s.rollback(Transaction::new(format!("{}/db/neo4j/tx/9", server.uri())))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_transaction_is_transaction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/5/commit"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let s = store(&server);
        let err = s
            .commit(Transaction::new(format!("{}/db/neo4j/tx/5", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphStoreError::Transaction(_)));
    }

    #[tokio::test]
    async fn relation_with_missing_endpoint_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["created"], "data": [{"row": [0]}]}],
                "errors": []
            })))
            .mount(&server)
            .await;

        let triple = RelationTriple {
            source: "a.ts:x".into(),
            target: "missing".into(),
            kind: RelationKind::Uses,
        };
        let err = store(&server).create_relation(&triple).await.unwrap_err();
        assert!(matches!(err, GraphStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn relation_created_when_count_positive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_partial_json(json!({
                "statements": [{"parameters": {"sourceID": "a", "targetID": "b"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["created"], "data": [{"row": [1]}]}],
                "errors": []
            })))
            .mount(&server)
            .await;

        let triple = RelationTriple {
            source: "a".into(),
            target: "b".into(),
            kind: RelationKind::Contains,
        };
        store(&server).create_relation(&triple).await.unwrap();
    }

    #[tokio::test]
    async fn query_nodes_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_partial_json(json!({
                "statements": [{"parameters": {"index": "nameEmbeddings", "k": 2}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["node", "relatedNodes", "score"],
                    "data": [{"row": [
                        serde_json::to_value(node("a.ts:x")).unwrap(),
                        [serde_json::to_value(node("a.ts:y")).unwrap()],
                        0.93
                    ]}]
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let vector = [0.1_f32, 0.2];
        let hits = store(&server)
            .query_nodes(VectorQuery {
                index: VectorIndex::Name,
                top_k: 2,
                vector: &vector,
                min_score: 0.85,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].related[0].id(), "a.ts:y");
    }

    #[tokio::test]
    async fn degree_reads_counts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_partial_json(json!({
                "statements": [{"parameters": {"id": "a.ts:hub"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["incoming", "outgoing", "maxIncoming", "maxOutgoing"],
                    "data": [{"row": [3, 1, 4, 2]}]
                }],
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let degree = store(&server).degree("a.ts:hub").await.unwrap().unwrap();
        assert_eq!(
            degree,
            NodeDegree {
                incoming: 3,
                outgoing: 1,
                max_incoming: 4,
                max_outgoing: 2,
            }
        );
    }

    #[tokio::test]
    async fn degree_of_missing_node_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["incoming"], "data": []}],
                "errors": []
            })))
            .mount(&server)
            .await;

        assert!(store(&server).degree("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_runs_delete_drop_and_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ok_body())
            .expect(7)
            .mount(&server)
            .await;

        store(&server).purge(768).await.unwrap();
    }
}
