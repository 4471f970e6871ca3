//! Persisted graph node model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Label carried by every code node in the store.
pub const CODE_LABEL: &str = "Node";
/// Label carried by every documentation node in the store.
pub const DOCUMENT_LABEL: &str = "DocumentNode";

/// Directed edge type between two node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationKind {
    /// Structural nesting: file to symbol, heading to sub-section.
    Contains,
    /// Dependency discovered during analysis.
    Uses,
}

impl RelationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Uses => "USES",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing relation stored on a node before it is established in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub target: String,
    #[serde(rename = "relation", alias = "kind")]
    pub kind: RelationKind,
}

impl Relation {
    #[must_use]
    pub fn contains(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RelationKind::Contains,
        }
    }

    #[must_use]
    pub fn uses(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RelationKind::Uses,
        }
    }
}

/// A relation lifted out of its source node, ready for the second write phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationTriple {
    pub source: String,
    pub target: String,
    #[serde(rename = "relation", alias = "kind")]
    pub kind: RelationKind,
}

/// Vector indexes maintained by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorIndex {
    #[serde(rename = "nameEmbeddings")]
    Name,
    #[serde(rename = "codeEmbeddings")]
    Code,
    #[serde(rename = "contentEmbeddings")]
    Content,
}

impl VectorIndex {
    pub const ALL: [Self; 3] = [Self::Name, Self::Code, Self::Content];

    /// Index name, which is also the indexed property name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "nameEmbeddings",
            Self::Code => "codeEmbeddings",
            Self::Content => "contentEmbeddings",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Name | Self::Code => CODE_LABEL,
            Self::Content => DOCUMENT_LABEL,
        }
    }
}

/// Which embedding of a node a vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSlot {
    /// Name of a code node.
    Name,
    /// Code of a code node, or content of a document node.
    Body,
}

/// A parameterised statement as accepted by the Neo4j HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    #[serde(rename = "statement")]
    pub text: String,
    pub parameters: Map<String, Value>,
}

impl Statement {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Map::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_owned(), value.into());
        self
    }
}

/// A code symbol or a whole source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub file_path: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub name_embeddings: Vec<f32>,
    #[serde(default)]
    pub code_embeddings: Vec<f32>,
    #[serde(default)]
    pub is_file: bool,
}

/// A fragment of a documentation page (heading, paragraph, code block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub id: String,
    pub url: String,
    pub element: String,
    pub content: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub content_embeddings: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphNode {
    Code(CodeNode),
    Document(DocumentNode),
}

impl From<CodeNode> for GraphNode {
    fn from(node: CodeNode) -> Self {
        Self::Code(node)
    }
}

impl From<DocumentNode> for GraphNode {
    fn from(node: DocumentNode) -> Self {
        Self::Document(node)
    }
}

impl GraphNode {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Code(n) => &n.id,
            Self::Document(n) => &n.id,
        }
    }

    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        match self {
            Self::Code(n) => &n.relations,
            Self::Document(n) => &n.relations,
        }
    }

    /// Text payload: code for code nodes, content for document nodes.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Code(n) => &n.code,
            Self::Document(n) => &n.content,
        }
    }

    /// Texts to embed, paired with the slot each vector fills.
    #[must_use]
    pub fn embedding_inputs(&self) -> Vec<(EmbeddingSlot, &str)> {
        match self {
            Self::Code(n) => vec![
                (EmbeddingSlot::Name, n.name.as_str()),
                (EmbeddingSlot::Body, n.code.as_str()),
            ],
            Self::Document(n) => vec![(EmbeddingSlot::Body, n.content.as_str())],
        }
    }

    pub fn set_embedding(&mut self, slot: EmbeddingSlot, vector: Vec<f32>) {
        match (self, slot) {
            (Self::Code(n), EmbeddingSlot::Name) => n.name_embeddings = vector,
            (Self::Code(n), EmbeddingSlot::Body) => n.code_embeddings = vector,
            (Self::Document(n), EmbeddingSlot::Body) => n.content_embeddings = vector,
            (Self::Document(_), EmbeddingSlot::Name) => {}
        }
    }

    /// Vector stored for `index`, if this node participates in it.
    #[must_use]
    pub fn embedding(&self, index: VectorIndex) -> Option<&[f32]> {
        match (self, index) {
            (Self::Code(n), VectorIndex::Name) => Some(&n.name_embeddings),
            (Self::Code(n), VectorIndex::Code) => Some(&n.code_embeddings),
            (Self::Document(n), VectorIndex::Content) => Some(&n.content_embeddings),
            _ => None,
        }
    }

    /// Every outgoing relation of this node as an independent triple.
    pub fn triples(&self) -> impl Iterator<Item = RelationTriple> + '_ {
        let source = self.id();
        self.relations().iter().map(move |r| RelationTriple {
            source: source.to_owned(),
            target: r.target.clone(),
            kind: r.kind,
        })
    }

    /// The `CREATE` statement persisting this node (relations excluded).
    #[must_use]
    pub fn insert_statement(&self) -> Statement {
        match self {
            Self::Code(n) => Statement::new(format!(
                "CREATE (n:{CODE_LABEL} {{id: $id, name: $name, type: $type, code: $code, \
                 filePath: $filePath, isFile: $isFile, \
                 nameEmbeddings: $nameEmbeddings, codeEmbeddings: $codeEmbeddings}})"
            ))
            .param("id", n.id.as_str())
            .param("name", n.name.as_str())
            .param("type", n.kind.as_str())
            .param("code", n.code.as_str())
            .param("filePath", n.file_path.as_str())
            .param("isFile", n.is_file)
            .param("nameEmbeddings", json!(n.name_embeddings))
            .param("codeEmbeddings", json!(n.code_embeddings)),
            Self::Document(n) => Statement::new(format!(
                "CREATE (n:{DOCUMENT_LABEL} {{id: $id, url: $url, element: $element, \
                 content: $content, contentEmbeddings: $contentEmbeddings}})"
            ))
            .param("id", n.id.as_str())
            .param("url", n.url.as_str())
            .param("element", n.element.as_str())
            .param("content", n.content.as_str())
            .param("contentEmbeddings", json!(n.content_embeddings)),
        }
    }
}

impl RelationTriple {
    /// The `MATCH ... CREATE` statement establishing this edge.
    ///
    /// Returns the number of created edges so a dangling endpoint is observable.
    #[must_use]
    pub fn create_statement(&self) -> Statement {
        Statement::new(format!(
            "MATCH (n {{id: $sourceID}}) MATCH (m {{id: $targetID}}) \
             CREATE (n)-[r:{}]->(m) RETURN count(r) AS created",
            self.kind.as_str()
        ))
        .param("sourceID", self.source.as_str())
        .param("targetID", self.target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_node() -> CodeNode {
        CodeNode {
            id: "src/a.ts:helper".into(),
            name: "helper".into(),
            kind: "Function".into(),
            code: "function helper() {}".into(),
            file_path: "src/a.ts".into(),
            relations: vec![Relation::uses("src/b.ts:other")],
            name_embeddings: vec![],
            code_embeddings: vec![],
            is_file: false,
        }
    }

    #[test]
    fn code_node_serializes_camel_case() {
        let json = serde_json::to_value(GraphNode::Code(code_node())).unwrap();
        assert_eq!(json["filePath"], "src/a.ts");
        assert_eq!(json["type"], "Function");
        assert_eq!(json["isFile"], false);
        assert_eq!(json["relations"][0]["relation"], "USES");
    }

    #[test]
    fn untagged_deserialize_picks_variant() {
        let doc = serde_json::json!({
            "id": "abc",
            "url": "docs/intro.md",
            "element": "h1",
            "content": "Intro"
        });
        let node: GraphNode = serde_json::from_value(doc).unwrap();
        assert!(matches!(node, GraphNode::Document(_)));

        let code = serde_json::json!({
            "id": "a.ts:x",
            "name": "x",
            "type": "variable",
            "code": "const x = 1",
            "filePath": "a.ts"
        });
        let node: GraphNode = serde_json::from_value(code).unwrap();
        assert!(matches!(node, GraphNode::Code(_)));
    }

    #[test]
    fn embedding_slots_fill_matching_fields() {
        let mut node = GraphNode::Code(code_node());
        node.set_embedding(EmbeddingSlot::Name, vec![1.0]);
        node.set_embedding(EmbeddingSlot::Body, vec![2.0]);
        assert_eq!(node.embedding(VectorIndex::Name), Some(&[1.0][..]));
        assert_eq!(node.embedding(VectorIndex::Code), Some(&[2.0][..]));
        assert_eq!(node.embedding(VectorIndex::Content), None);
    }

    #[test]
    fn document_has_single_embedding_input() {
        let node = GraphNode::Document(DocumentNode {
            id: "d".into(),
            url: "u".into(),
            element: "p".into(),
            content: "text".into(),
            relations: vec![],
            content_embeddings: vec![],
        });
        let inputs = node.embedding_inputs();
        assert_eq!(inputs, vec![(EmbeddingSlot::Body, "text")]);
    }

    #[test]
    fn triples_carry_source_id() {
        let node = GraphNode::Code(code_node());
        let triples: Vec<_> = node.triples().collect();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].source, "src/a.ts:helper");
        assert_eq!(triples[0].target, "src/b.ts:other");
        assert_eq!(triples[0].kind, RelationKind::Uses);
    }

    #[test]
    fn insert_statement_binds_parameters() {
        let stmt = GraphNode::Code(code_node()).insert_statement();
        assert!(stmt.text.starts_with("CREATE (n:Node"));
        assert_eq!(stmt.parameters["id"], "src/a.ts:helper");
        assert_eq!(stmt.parameters["isFile"], false);
        assert!(stmt.parameters["nameEmbeddings"].is_array());
    }

    #[test]
    fn relation_statement_uses_kind_label() {
        let triple = RelationTriple {
            source: "a".into(),
            target: "b".into(),
            kind: RelationKind::Contains,
        };
        let stmt = triple.create_statement();
        assert!(stmt.text.contains("[r:CONTAINS]"));
        assert_eq!(stmt.parameters["sourceID"], "a");
        assert_eq!(stmt.parameters["targetID"], "b");
    }

    #[test]
    fn statement_serializes_for_http_api() {
        let json = serde_json::to_value(Statement::new("RETURN 1").param("x", 2)).unwrap();
        assert_eq!(json["statement"], "RETURN 1");
        assert_eq!(json["parameters"]["x"], 2);
    }

    #[test]
    fn vector_index_labels() {
        assert_eq!(VectorIndex::Name.label(), "Node");
        assert_eq!(VectorIndex::Content.label(), "DocumentNode");
        assert_eq!(VectorIndex::Code.as_str(), "codeEmbeddings");
    }
}
