//! Symbol extraction from TypeScript/JavaScript syntax trees.
//!
//! A file is parsed once with tree-sitter; every top-level statement is
//! classified into a [`declarations::Declaration`] and handed to the handler
//! for its kind. Import statements are collected alongside for the resolver.

mod declarations;
mod uses;

use codelore_graph::GraphNode;
use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};
use crate::languages::Lang;
use crate::resolver::resolve_file;
use crate::symbol::{SymbolNode, file_node};
use declarations::{Declaration, FileCtx, handle};
use uses::{named_children, text};

/// One imported binding: `import { imported as local } from "specifier"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub local: String,
    /// Exported name in the source module; `None` for default and namespace imports.
    pub imported: Option<String>,
    pub specifier: String,
}

#[derive(Debug, Default)]
pub struct FileExtraction {
    pub symbols: Vec<SymbolNode>,
    pub imports: Vec<Import>,
}

/// Parse `source` and extract its declarations and imports.
///
/// # Errors
///
/// Returns [`IndexError::Parse`] if no grammar is available or the file
/// contains syntax errors.
pub fn extract_symbols(source: &str, file_path: &str, lang: Lang) -> Result<FileExtraction> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| IndexError::Parse(format!("no grammar for {}", lang.id())))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("parse failed for {file_path}")))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(IndexError::Parse(format!("syntax error in {file_path}")));
    }

    let ctx = FileCtx { source, file_path };
    let mut extraction = FileExtraction::default();

    for stmt in named_children(&root) {
        if stmt.kind() == "import_statement" {
            extraction.imports.extend(parse_import(&stmt, source));
            continue;
        }
        let Some(decl) = Declaration::classify(stmt) else {
            continue;
        };
        tracing::trace!(file = file_path, kind = ?decl.kind(), "declaration");
        for symbol in handle(decl, &stmt, &ctx) {
            merge_symbol(&mut extraction.symbols, symbol);
        }
    }

    Ok(extraction)
}

/// Keep one symbol per id; a redeclaration (overload, merged interface)
/// contributes its uses to the first one.
fn merge_symbol(symbols: &mut Vec<SymbolNode>, symbol: SymbolNode) {
    let id = symbol.id();
    match symbols.iter_mut().find(|s| s.id() == id) {
        Some(existing) => existing.extend_uses(symbol.uses().iter().cloned()),
        None => symbols.push(symbol),
    }
}

fn parse_import(stmt: &Node<'_>, source: &str) -> Vec<Import> {
    let Some(specifier) = stmt.child_by_field_name("source") else {
        return Vec::new();
    };
    let specifier = text(&specifier, source)
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_owned();

    let mut imports = Vec::new();
    let Some(clause) = named_children(stmt)
        .into_iter()
        .find(|c| c.kind() == "import_clause")
    else {
        return imports;
    };

    for part in named_children(&clause) {
        match part.kind() {
            "identifier" => imports.push(Import {
                local: text(&part, source).to_owned(),
                imported: None,
                specifier: specifier.clone(),
            }),
            "namespace_import" => {
                if let Some(ident) = part.named_child(0) {
                    imports.push(Import {
                        local: text(&ident, source).to_owned(),
                        imported: None,
                        specifier: specifier.clone(),
                    });
                }
            }
            "named_imports" => {
                for spec in named_children(&part) {
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let name = text(&name, source).to_owned();
                    let local = spec
                        .child_by_field_name("alias")
                        .map_or_else(|| name.clone(), |a| text(&a, source).to_owned());
                    imports.push(Import {
                        local,
                        imported: Some(name),
                        specifier: specifier.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    imports
}

/// Extract, resolve and convert one file into graph nodes: one node per
/// symbol followed by the file node.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed.
pub fn analyze_file(source: &str, file_path: &str, lang: Lang) -> Result<Vec<GraphNode>> {
    let FileExtraction {
        mut symbols,
        imports,
    } = extract_symbols(source, file_path, lang)?;
    resolve_file(&mut symbols, &imports, file_path);

    let file = file_node(file_path, source, &symbols);
    let mut nodes: Vec<GraphNode> = symbols
        .into_iter()
        .map(|s| GraphNode::Code(s.into_code_node()))
        .collect();
    nodes.push(GraphNode::Code(file));
    Ok(nodes)
}
