//! Query → keywords → vector lookup → one-hop expansion.

use std::sync::Arc;

use codelore_graph::{GraphNode, GraphStore, NodeDegree, ScoredNode, VectorIndex, VectorQuery};
use codelore_llm::provider::{LlmProvider, Message};
use serde::Serialize;

use crate::error::Result;

/// Reply given by [`CodeRetriever::ask`] when nothing was retrieved.
pub const NO_REFERENCES: &str = "No references found for this query.";

const KEYWORD_SYSTEM_PROMPT: &str = "\
You extract search keywords from a user's question about a codebase.
RULES:
1. Extract every entity name (function, class, variable, type) or file path the query mentions.
2. Keep each keyword whole; never split a name or a path into words.
3. If there is nothing to extract, answer with an empty list.
4. Answer with nothing except the list.
EXAMPLES:
INPUT: Find the codebase for the user query CRC_TABLE in the main.ts
OUTPUT: <ANSWER>CRC_TABLE, main.ts</ANSWER>
INPUT: What is the purpose of the function getDBKeywordsFromQuery in the main.ts?
OUTPUT: <ANSWER>getDBKeywordsFromQuery, main.ts</ANSWER>
OUTPUT FORMAT: <ANSWER>keyword1, keyword2, path/to/file</ANSWER>";

const ANSWER_SYSTEM_PROMPT: &str = "\
You answer questions about a codebase using only the code given between <code_context> tags.
Answer in GitHub Markdown. If the code does not answer the question, say that you cannot answer it.";

const ASK_DOCS_SYSTEM_PROMPT: &str = "\
You answer questions about a project using only the documentation given between <docs_context> tags.
Answer in GitHub Markdown and end with a \"Sources\" list holding every source URL you were given.
If the documentation does not answer the question, say that you cannot answer it.";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index per keyword.
    pub top_k: usize,
    /// Minimum similarity for keyword lookups of code nodes.
    pub code_threshold: f32,
    /// Minimum similarity for "find similar snippet" lookups.
    pub similar_threshold: f32,
    pub doc_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            code_threshold: 0.85,
            similar_threshold: 0.5,
            doc_threshold: 0.85,
        }
    }
}

/// Outcome of a lookup. An empty result is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The language model produced no usable keyword.
    NoKeywords,
    /// Keywords were found but nothing passed the threshold.
    NoMatches { keywords: Vec<String> },
    Found {
        keywords: Vec<String>,
        hits: Vec<ScoredNode>,
    },
}

impl Retrieval {
    #[must_use]
    pub fn hits(&self) -> &[ScoredNode] {
        match self {
            Self::Found { hits, .. } => hits,
            Self::NoKeywords | Self::NoMatches { .. } => &[],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits().is_empty()
    }

    fn from_hits(keywords: Vec<String>, hits: Vec<ScoredNode>) -> Self {
        if keywords.is_empty() {
            Self::NoKeywords
        } else if hits.is_empty() {
            Self::NoMatches { keywords }
        } else {
            Self::Found { keywords, hits }
        }
    }
}

/// Answer generated from documentation, with the pages it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocsAnswer {
    pub answer: String,
    /// Distinct page URLs, in retrieval order.
    pub sources: Vec<String>,
}

/// Degree-based weight of a symbol in the graph.
///
/// `centrality` is the share of the graph's largest fan-in the symbol
/// receives, `criticality` the share of the largest fan-out it has.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Importance {
    pub node_id: String,
    pub loc: usize,
    pub centrality: f64,
    pub criticality: f64,
    pub importance: f64,
}

impl Importance {
    fn new(node: &GraphNode, degree: NodeDegree) -> Self {
        let centrality = ratio(degree.incoming, degree.max_incoming);
        let criticality = ratio(degree.outgoing, degree.max_outgoing);
        Self {
            node_id: node.id().to_owned(),
            loc: node.body().split('\n').count(),
            centrality,
            criticality,
            importance: f64::midpoint(centrality, criticality),
        }
    }

    /// Whole-number percentage, as shown to users.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn percent(value: f64) -> i64 {
        (value * 100.0).round() as i64
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(count: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        count as f64 / max as f64
    }
}

/// Read-only retrieval over the graph store.
pub struct CodeRetriever<P: LlmProvider, E: LlmProvider = P> {
    store: Arc<dyn GraphStore>,
    llm: Arc<P>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<P: LlmProvider, E: LlmProvider> CodeRetriever<P, E> {
    #[must_use]
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<P>,
        embedder: Arc<E>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            config,
        }
    }

    /// Ask the language model for the entity names and paths in `query`.
    ///
    /// A failed call or a malformed reply yields an empty list.
    pub async fn extract_keywords(&self, query: &str) -> Vec<String> {
        let messages = [
            Message::system(KEYWORD_SYSTEM_PROMPT),
            Message::user(format!(
                "Extract the possible keywords from this query. \
                 Answer in <ANSWER>keyword1, keyword2</ANSWER> format only.\n\n{query}"
            )),
        ];
        match self.llm.chat(&messages).await {
            Ok(reply) => {
                let keywords = parse_keywords(&reply);
                tracing::debug!(?keywords, "keywords extracted");
                keywords
            }
            Err(e) => {
                tracing::warn!(error = %e, "keyword extraction failed");
                Vec::new()
            }
        }
    }

    /// Keywords from `query`, each looked up against symbol names.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub async fn find_code(&self, query: &str) -> Result<Retrieval> {
        let keywords = self.extract_keywords(query).await;
        let hits = self
            .lookup(&keywords, VectorIndex::Name, self.config.code_threshold)
            .await?;
        Ok(Retrieval::from_hits(keywords, hits))
    }

    /// Keywords from `query`, each looked up against documentation content.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub async fn find_docs(&self, query: &str) -> Result<Retrieval> {
        let keywords = self.extract_keywords(query).await;
        let hits = self
            .lookup(&keywords, VectorIndex::Content, self.config.doc_threshold)
            .await?;
        Ok(Retrieval::from_hits(keywords, hits))
    }

    /// Nodes whose code body resembles the whole snippet, at the looser threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub async fn find_similar(&self, snippet: &str) -> Result<Retrieval> {
        let keywords = whole_query(snippet);
        let hits = self
            .lookup(&keywords, VectorIndex::Code, self.config.similar_threshold)
            .await?;
        Ok(Retrieval::from_hits(keywords, hits))
    }

    /// Embed each keyword and query `index`. Results are concatenated in
    /// keyword order, each keyword's hits in descending score order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub async fn lookup(
        &self,
        keywords: &[String],
        index: VectorIndex,
        threshold: f32,
    ) -> Result<Vec<ScoredNode>> {
        let mut results = Vec::new();
        for keyword in keywords {
            let vector = match self.embedder.embed(keyword).await {
                Ok(v) if !v.is_empty() => v,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(keyword, error = %e, "keyword embedding failed, skipping");
                    continue;
                }
            };
            let hits = self
                .store
                .query_nodes(VectorQuery {
                    index,
                    top_k: self.config.top_k,
                    vector: &vector,
                    min_score: threshold,
                })
                .await?;
            tracing::debug!(keyword, index = index.as_str(), hits = hits.len(), "lookup");
            results.extend(hits);
        }
        Ok(results)
    }

    /// Retrieve code for `query` and have the language model answer from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query or the answering call fails.
    pub async fn ask(&self, query: &str) -> Result<String> {
        let retrieval = self.find_code(query).await?;
        if retrieval.is_empty() {
            return Ok(NO_REFERENCES.to_owned());
        }
        let messages = [
            Message::system(ANSWER_SYSTEM_PROMPT),
            Message::user(format!("{query}\n\n{}", format_as_context(retrieval.hits()))),
        ];
        Ok(self.llm.chat(&messages).await?)
    }

    /// Answer `query` from the documentation whose content resembles it.
    ///
    /// Without matching documentation the answer is [`NO_REFERENCES`] and
    /// the language model is not called.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query or the answering call fails.
    pub async fn ask_docs(&self, query: &str) -> Result<DocsAnswer> {
        let hits = self
            .lookup(&whole_query(query), VectorIndex::Content, self.config.doc_threshold)
            .await?;
        if hits.is_empty() {
            return Ok(DocsAnswer {
                answer: NO_REFERENCES.to_owned(),
                sources: Vec::new(),
            });
        }

        let mut sources: Vec<String> = Vec::new();
        let mut contents = Vec::with_capacity(hits.len());
        for hit in &hits {
            if let GraphNode::Document(doc) = &hit.node {
                if !sources.contains(&doc.url) {
                    sources.push(doc.url.clone());
                }
                contents.push(doc.content.as_str());
            }
        }
        let messages = [
            Message::system(ASK_DOCS_SYSTEM_PROMPT),
            Message::user(format!(
                "{query}\n\n<docs_context>\n{}\n</docs_context>\nSources:\n{}",
                contents.join("\n\n"),
                sources.join("\n")
            )),
        ];
        let answer = self.llm.chat(&messages).await?;
        Ok(DocsAnswer { answer, sources })
    }

    /// Degree metrics of the symbol whose name best matches `query`.
    ///
    /// `None` when no symbol passes the code threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if a graph store query fails.
    pub async fn importance(&self, query: &str) -> Result<Option<Importance>> {
        let hits = self
            .lookup(&whole_query(query), VectorIndex::Name, self.config.code_threshold)
            .await?;
        let Some(top) = hits.into_iter().next() else {
            return Ok(None);
        };
        let Some(degree) = self.store.degree(top.node.id()).await? else {
            return Ok(None);
        };
        tracing::debug!(id = top.node.id(), ?degree, "importance");
        Ok(Some(Importance::new(&top.node, degree)))
    }
}

fn whole_query(query: &str) -> Vec<String> {
    if query.trim().is_empty() {
        Vec::new()
    } else {
        vec![query.to_owned()]
    }
}

/// Keywords between `<ANSWER>` and `</ANSWER>`, comma separated.
///
/// Surrounding brackets and quotes are stripped, blanks dropped. A reply
/// without the tags has no keywords.
#[must_use]
pub fn parse_keywords(reply: &str) -> Vec<String> {
    let Some((_, rest)) = reply.split_once("<ANSWER>") else {
        return Vec::new();
    };
    let inner = rest.split_once("</ANSWER>").map_or(rest, |(inner, _)| inner);
    let inner = inner.trim().trim_start_matches('[').trim_end_matches(']');

    inner
        .split(',')
        .map(|k| k.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Render hits and their neighbours as a `<code_context>` block.
#[must_use]
pub fn format_as_context(hits: &[ScoredNode]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for hit in hits {
        write_node(&mut out, &hit.node, Some(hit.score));
        for related in &hit.related {
            write_node(&mut out, related, None);
        }
    }
    out.push_str("</code_context>");
    out
}

fn write_node(out: &mut String, node: &GraphNode, score: Option<f32>) {
    let (tag, origin) = match node {
        GraphNode::Code(n) => ("chunk", n.file_path.as_str()),
        GraphNode::Document(n) => ("doc", n.url.as_str()),
    };
    let marker = match score {
        Some(score) => format!("score=\"{score:.2}\""),
        None => "related=\"true\"".to_owned(),
    };
    out.push_str(&format!(
        "  <{tag} id=\"{}\" source=\"{origin}\" {marker}>\n",
        node.id()
    ));
    out.push_str(node.body());
    out.push_str(&format!("\n  </{tag}>\n"));
}
