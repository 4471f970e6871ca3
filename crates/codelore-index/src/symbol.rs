//! In-memory symbol records produced by the extractor, before persistence.

use codelore_graph::{CodeNode, Relation};
use serde::{Deserialize, Serialize};

/// Name given to declarations without an identifier (`export default class {}`).
pub const ANONYMOUS: &str = "Anonymous";

/// Closed set of top-level declaration kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Function,
    Class,
    Interface,
    Enum,
    Namespace,
    TypeAlias,
    Variable,
}

impl DeclKind {
    /// Value stored in the `type` property of the persisted node.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "Function",
            Self::Class => "Class",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::Namespace => "Namespace",
            Self::TypeAlias => "TypeAlias",
            Self::Variable => "variable",
        }
    }
}

/// How a referenced name is used by the declaring symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseKind {
    Function,
    Variable,
    Class,
    Interface,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Use {
    pub name: String,
    pub kind: UseKind,
}

impl Use {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: UseKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One-based line, zero-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

impl SourceLocation {
    #[must_use]
    pub fn of(node: &tree_sitter::Node<'_>) -> Self {
        let (s, e) = (node.start_position(), node.end_position());
        Self {
            start: Position {
                line: s.row + 1,
                column: s.column,
            },
            end: Position {
                line: e.row + 1,
                column: e.column,
            },
        }
    }
}

/// A declaration extracted from one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolNode {
    pub name: String,
    pub kind: DeclKind,
    pub body: String,
    pub file_path: String,
    pub location: SourceLocation,
    uses: Vec<Use>,
}

impl SymbolNode {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: DeclKind,
        body: impl Into<String>,
        file_path: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                ANONYMOUS.to_owned()
            } else {
                name
            },
            kind,
            body: body.into(),
            file_path: file_path.into(),
            location,
            uses: Vec::new(),
        }
    }

    /// Deterministic identity: `file_path:name`.
    #[must_use]
    pub fn id(&self) -> String {
        symbol_id(&self.file_path, &self.name)
    }

    #[must_use]
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn uses_mut(&mut self) -> &mut [Use] {
        &mut self.uses
    }

    /// Record a use unless one with the same name is already present.
    pub fn push_use(&mut self, u: Use) {
        if !self.uses.iter().any(|existing| existing.name == u.name) {
            self.uses.push(u);
        }
    }

    pub fn extend_uses(&mut self, uses: impl IntoIterator<Item = Use>) {
        for u in uses {
            self.push_use(u);
        }
    }

    /// Drop uses naming a local type parameter, and uses with an empty name.
    pub fn drop_local_names(&mut self, locals: &[String]) {
        self.uses
            .retain(|u| !u.name.is_empty() && !locals.iter().any(|l| *l == u.name));
    }

    /// Convert into the persisted form; every use becomes a `USES` relation.
    #[must_use]
    pub fn into_code_node(self) -> CodeNode {
        CodeNode {
            id: self.id(),
            relations: self.uses.into_iter().map(|u| Relation::uses(u.name)).collect(),
            name: self.name,
            kind: self.kind.as_str().to_owned(),
            code: self.body,
            file_path: self.file_path,
            name_embeddings: Vec::new(),
            code_embeddings: Vec::new(),
            is_file: false,
        }
    }
}

#[must_use]
pub fn symbol_id(file_path: &str, name: &str) -> String {
    format!("{file_path}:{name}")
}

/// Synthetic node for a whole file, containing every symbol declared in it.
#[must_use]
pub fn file_node(file_path: &str, source: &str, symbols: &[SymbolNode]) -> CodeNode {
    CodeNode {
        id: file_path.to_owned(),
        name: file_path.to_owned(),
        kind: "File".to_owned(),
        code: source.to_owned(),
        file_path: file_path.to_owned(),
        relations: symbols.iter().map(|s| Relation::contains(s.id())).collect(),
        name_embeddings: Vec::new(),
        code_embeddings: Vec::new(),
        is_file: true,
    }
}
