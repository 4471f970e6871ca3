//! One handler per declaration kind, each producing [`SymbolNode`]s.

use tree_sitter::Node;

use super::uses::{
    analyze_function, flatten_annotation, flatten_initializer, flatten_type, named_children,
    parameter_types, text,
};
use crate::symbol::{DeclKind, SourceLocation, SymbolNode, Use, UseKind};

/// A top-level (or namespace-level) declaration, tagged by kind.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Declaration<'t> {
    Function(Node<'t>),
    Class(Node<'t>),
    Interface(Node<'t>),
    Enum(Node<'t>),
    Namespace(Node<'t>),
    TypeAlias(Node<'t>),
    Variable(Node<'t>),
}

impl<'t> Declaration<'t> {
    /// Classify a statement, looking through `export`, `declare` and
    /// expression-statement wrappers.
    pub(crate) fn classify(stmt: Node<'t>) -> Option<Self> {
        let node = unwrap_statement(stmt)?;
        let decl = match node.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "function_signature"
            | "function_expression"
            | "function"
            | "generator_function"
            | "arrow_function" => Self::Function(node),
            "class_declaration" | "abstract_class_declaration" | "class" => Self::Class(node),
            "interface_declaration" => Self::Interface(node),
            "enum_declaration" => Self::Enum(node),
            "internal_module" | "module" => Self::Namespace(node),
            "type_alias_declaration" => Self::TypeAlias(node),
            "lexical_declaration" | "variable_declaration" => Self::Variable(node),
            _ => return None,
        };
        Some(decl)
    }

    pub(crate) fn kind(self) -> DeclKind {
        match self {
            Self::Function(_) => DeclKind::Function,
            Self::Class(_) => DeclKind::Class,
            Self::Interface(_) => DeclKind::Interface,
            Self::Enum(_) => DeclKind::Enum,
            Self::Namespace(_) => DeclKind::Namespace,
            Self::TypeAlias(_) => DeclKind::TypeAlias,
            Self::Variable(_) => DeclKind::Variable,
        }
    }
}

fn unwrap_statement(mut node: Node<'_>) -> Option<Node<'_>> {
    loop {
        match node.kind() {
            "export_statement" => {
                node = node
                    .child_by_field_name("declaration")
                    .or_else(|| node.child_by_field_name("value"))?;
            }
            "ambient_declaration" | "expression_statement" => node = node.named_child(0)?,
            _ => return Some(node),
        }
    }
}

pub(crate) struct FileCtx<'a> {
    pub source: &'a str,
    pub file_path: &'a str,
}

impl FileCtx<'_> {
    fn symbol(&self, name: &str, kind: DeclKind, outer: &Node<'_>) -> SymbolNode {
        SymbolNode::new(
            name,
            kind,
            text(outer, self.source),
            self.file_path,
            SourceLocation::of(outer),
        )
    }

    fn name_of(&self, node: &Node<'_>) -> String {
        node.child_by_field_name("name")
            .map(|n| {
                text(&n, self.source)
                    .trim_matches(|c| c == '"' || c == '\'')
                    .to_owned()
            })
            .unwrap_or_default()
    }
}

/// Dispatch to the handler for `decl`; `outer` is the enclosing statement
/// whose text becomes the symbol body.
pub(crate) fn handle(decl: Declaration<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> Vec<SymbolNode> {
    match decl {
        Declaration::Function(n) => vec![function(&n, outer, ctx)],
        Declaration::Class(n) => vec![class(&n, outer, ctx)],
        Declaration::Interface(n) => vec![interface(&n, outer, ctx)],
        Declaration::Enum(n) => vec![enumeration(&n, outer, ctx)],
        Declaration::Namespace(n) => vec![namespace(&n, outer, ctx)],
        Declaration::TypeAlias(n) => vec![type_alias(&n, outer, ctx)],
        Declaration::Variable(n) => variables(&n, outer, ctx),
    }
}

/// Names of type parameters (and mapped-type keys) introduced anywhere inside `node`.
fn local_type_names(node: &Node<'_>, source: &str, out: &mut Vec<String>) {
    if matches!(node.kind(), "type_parameter" | "mapped_type_clause")
        && let Some(name) = node.child_by_field_name("name")
    {
        out.push(text(&name, source).to_owned());
    }
    for child in named_children(node) {
        local_type_names(&child, source, out);
    }
}

fn finish(mut symbol: SymbolNode, uses: Vec<Use>, node: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    symbol.extend_uses(uses);
    let mut locals = Vec::new();
    local_type_names(node, ctx.source, &mut locals);
    symbol.drop_local_names(&locals);
    symbol
}

fn function(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let symbol = ctx.symbol(&ctx.name_of(node), DeclKind::Function, outer);
    let mut uses = Vec::new();
    analyze_function(node, ctx.source, &mut uses);
    finish(symbol, uses, node, ctx)
}

fn class(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let symbol = ctx.symbol(&ctx.name_of(node), DeclKind::Class, outer);
    let mut uses = Vec::new();

    if let Some(heritage) = named_children(node)
        .into_iter()
        .find(|c| c.kind() == "class_heritage")
    {
        for clause in named_children(&heritage) {
            match clause.kind() {
                "extends_clause" => {
                    if let Some(value) = clause.child_by_field_name("value")
                        && value.kind() == "identifier"
                    {
                        uses.push(Use::new(text(&value, ctx.source), UseKind::Class));
                    }
                    if let Some(args) = clause.child_by_field_name("type_arguments") {
                        flatten_type(&args, ctx.source, &mut uses);
                    }
                }
                "implements_clause" => {
                    for ty in named_children(&clause) {
                        implemented_interface(&ty, ctx.source, &mut uses);
                    }
                }
                // plain JavaScript: `extends Base` without a clause node
                "identifier" => uses.push(Use::new(text(&clause, ctx.source), UseKind::Class)),
                _ => {}
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(&body) {
            match member.kind() {
                "method_definition" => analyze_function(&member, ctx.source, &mut uses),
                "method_signature" | "abstract_method_signature" => {
                    flatten_annotation(member.child_by_field_name("return_type"), ctx.source, &mut uses);
                    parameter_types(member.child_by_field_name("parameters"), ctx.source, &mut uses);
                }
                "public_field_definition" | "field_definition" => {
                    flatten_annotation(member.child_by_field_name("type"), ctx.source, &mut uses);
                    if let Some(value) = member.child_by_field_name("value") {
                        flatten_initializer(value, ctx.source, &mut uses);
                    }
                }
                _ => {}
            }
        }
    }

    finish(symbol, uses, node, ctx)
}

fn implemented_interface(ty: &Node<'_>, source: &str, uses: &mut Vec<Use>) {
    match ty.kind() {
        "type_identifier" | "nested_type_identifier" => {
            uses.push(Use::new(text(ty, source), UseKind::Interface));
        }
        "generic_type" => {
            if let Some(name) = ty.child_by_field_name("name") {
                uses.push(Use::new(text(&name, source), UseKind::Interface));
            }
            if let Some(args) = ty.child_by_field_name("type_arguments") {
                flatten_type(&args, source, uses);
            }
        }
        _ => {}
    }
}

fn interface(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let symbol = ctx.symbol(&ctx.name_of(node), DeclKind::Interface, outer);
    let mut uses = Vec::new();

    for child in named_children(node) {
        if child.kind() == "extends_type_clause" {
            for ty in named_children(&child) {
                flatten_type(&ty, ctx.source, &mut uses);
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        object_members(&body, ctx.source, &mut uses);
    }

    finish(symbol, uses, node, ctx)
}

/// Type references in the members of an interface body or object type.
fn object_members(body: &Node<'_>, source: &str, uses: &mut Vec<Use>) {
    for member in named_children(body) {
        match member.kind() {
            "property_signature" => flatten_annotation(member.child_by_field_name("type"), source, uses),
            "method_signature" | "call_signature" => {
                parameter_types(member.child_by_field_name("parameters"), source, uses);
                flatten_annotation(member.child_by_field_name("return_type"), source, uses);
            }
            "construct_signature" => {
                parameter_types(member.child_by_field_name("parameters"), source, uses);
                flatten_annotation(member.child_by_field_name("type"), source, uses);
            }
            "index_signature" => flatten_type(&member, source, uses),
            _ => {}
        }
    }
}

fn enumeration(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let symbol = ctx.symbol(&ctx.name_of(node), DeclKind::Enum, outer);
    let mut uses = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(&body) {
            if member.kind() == "enum_assignment"
                && let Some(value) = member.child_by_field_name("value")
            {
                flatten_initializer(value, ctx.source, &mut uses);
            }
        }
    }
    finish(symbol, uses, node, ctx)
}

/// A namespace records the union of the uses of every declaration inside it.
fn namespace(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let mut symbol = ctx.symbol(&ctx.name_of(node), DeclKind::Namespace, outer);
    let mut inner_names = Vec::new();

    if let Some(body) = node.child_by_field_name("body") {
        for stmt in named_children(&body) {
            let Some(decl) = Declaration::classify(stmt) else {
                continue;
            };
            for inner in handle(decl, &stmt, ctx) {
                inner_names.push(inner.name.clone());
                symbol.extend_uses(inner.uses().iter().cloned());
            }
        }
    }

    let mut locals = inner_names;
    local_type_names(node, ctx.source, &mut locals);
    symbol.drop_local_names(&locals);
    symbol
}

fn type_alias(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> SymbolNode {
    let symbol = ctx.symbol(&ctx.name_of(node), DeclKind::TypeAlias, outer);
    let mut uses = Vec::new();
    if let Some(value) = node.child_by_field_name("value") {
        flatten_type(&value, ctx.source, &mut uses);
    }
    finish(symbol, uses, node, ctx)
}

/// One symbol per declarator.
fn variables(node: &Node<'_>, outer: &Node<'_>, ctx: &FileCtx<'_>) -> Vec<SymbolNode> {
    named_children(node)
        .into_iter()
        .filter(|d| d.kind() == "variable_declarator")
        .map(|declarator| {
            let name = declarator
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier")
                .map(|n| text(&n, ctx.source).to_owned())
                .unwrap_or_default();
            let symbol = ctx.symbol(&name, DeclKind::Variable, outer);
            let mut uses = Vec::new();
            flatten_annotation(declarator.child_by_field_name("type"), ctx.source, &mut uses);
            if let Some(value) = declarator.child_by_field_name("value") {
                flatten_initializer(value, ctx.source, &mut uses);
            }
            finish(symbol, uses, &declarator, ctx)
        })
        .collect()
}
