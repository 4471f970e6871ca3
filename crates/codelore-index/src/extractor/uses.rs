//! Flattening of expressions and type annotations into `{name, kind}` uses.

use tree_sitter::Node;

use crate::symbol::{Use, UseKind};

pub(crate) fn text<'s>(node: &Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

pub(crate) fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Peel `await`, parentheses and non-null / `as` wrappers off an expression.
fn unwrap_expression<'t>(mut node: Node<'t>) -> Node<'t> {
    loop {
        match node.kind() {
            "await_expression"
            | "parenthesized_expression"
            | "non_null_expression"
            | "as_expression"
            | "satisfies_expression" => match node.named_child(0) {
                Some(inner) => node = inner,
                None => return node,
            },
            _ => return node,
        }
    }
}

/// Names referenced by a type, each classified as `type`.
pub(crate) fn flatten_type(node: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    match node.kind() {
        "type_identifier" | "nested_type_identifier" => {
            out.push(Use::new(text(node, source), UseKind::Type));
        }
        // `typeof x`, `infer U`, literal types and type parameters name no dependency.
        "type_query" | "infer_type" | "predefined_type" | "literal_type" | "this_type"
        | "template_literal_type" | "type_parameters" | "type_parameter" => {}
        _ => {
            for child in named_children(node) {
                flatten_type(&child, source, out);
            }
        }
    }
}

/// Flatten a `type_annotation` (`: T`) if present.
pub(crate) fn flatten_annotation(annotation: Option<Node<'_>>, source: &str, out: &mut Vec<Use>) {
    if let Some(a) = annotation {
        flatten_type(&a, source, out);
    }
}

/// Type references in a parameter list.
pub(crate) fn parameter_types(params: Option<Node<'_>>, source: &str, out: &mut Vec<Use>) {
    let Some(params) = params else { return };
    for p in named_children(&params) {
        flatten_annotation(p.child_by_field_name("type"), source, out);
    }
}

fn type_arguments(node: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    if let Some(args) = node.child_by_field_name("type_arguments") {
        flatten_type(&args, source, out);
    }
}

fn arguments(node: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    let Some(args) = node.child_by_field_name("arguments") else {
        return;
    };
    for arg in named_children(&args) {
        let arg = unwrap_expression(arg);
        match arg.kind() {
            "identifier" => out.push(Use::new(text(&arg, source), UseKind::Variable)),
            "call_expression" => flatten_call(&arg, source, out),
            "new_expression" => flatten_new(&arg, source, out),
            _ => {}
        }
    }
}

/// Callee, receiver, arguments and type arguments of a call.
pub(crate) fn flatten_call(call: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    if let Some(callee) = call.child_by_field_name("function") {
        let callee = unwrap_expression(callee);
        match callee.kind() {
            "identifier" => out.push(Use::new(text(&callee, source), UseKind::Function)),
            "member_expression" => {
                let object = callee.child_by_field_name("object").map(unwrap_expression);
                match object {
                    Some(obj) if obj.kind() == "identifier" => {
                        out.push(Use::new(text(&obj, source), UseKind::Variable));
                        if let Some(prop) = callee.child_by_field_name("property") {
                            out.push(Use::new(text(&prop, source), UseKind::Function));
                        }
                    }
                    Some(obj) if obj.kind() == "call_expression" => {
                        flatten_call(&obj, source, out);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    arguments(call, source, out);
    type_arguments(call, source, out);
}

/// Constructed class, arguments and type arguments of a `new` expression.
pub(crate) fn flatten_new(new: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    if let Some(ctor) = new.child_by_field_name("constructor")
        && ctor.kind() == "identifier"
    {
        out.push(Use::new(text(&ctor, source), UseKind::Class));
    }
    arguments(new, source, out);
    type_arguments(new, source, out);
}

/// Uses contributed by a variable initializer.
pub(crate) fn flatten_initializer(value: Node<'_>, source: &str, out: &mut Vec<Use>) {
    let value = unwrap_expression(value);
    match value.kind() {
        "identifier" => out.push(Use::new(text(&value, source), UseKind::Variable)),
        "call_expression" => flatten_call(&value, source, out),
        "new_expression" => flatten_new(&value, source, out),
        "arrow_function" | "function_expression" | "function" => {
            analyze_function(&value, source, out);
        }
        _ => {}
    }
}

/// Function analysis shared by functions, methods and function-valued variables.
///
/// Records return and parameter types, then walks the body statements.
pub(crate) fn analyze_function(func: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    flatten_annotation(func.child_by_field_name("return_type"), source, out);
    parameter_types(func.child_by_field_name("parameters"), source, out);
    if let Some(body) = func.child_by_field_name("body") {
        if body.kind() == "statement_block" {
            statements(&body, source, out);
        } else {
            // expression-bodied arrow function
            expression(body, source, out);
        }
    }
}

fn statements(block: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    for stmt in named_children(block) {
        statement(&stmt, source, out);
    }
}

fn statement(stmt: &Node<'_>, source: &str, out: &mut Vec<Use>) {
    match stmt.kind() {
        "expression_statement" | "return_statement" | "throw_statement" => {
            if let Some(expr) = stmt.named_child(0) {
                expression(expr, source, out);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            for decl in named_children(stmt) {
                if decl.kind() == "variable_declarator"
                    && let Some(value) = decl.child_by_field_name("value")
                {
                    flatten_initializer(value, source, out);
                }
            }
        }
        "statement_block" => statements(stmt, source, out),
        "function_declaration" | "class_declaration" | "comment" => {}
        _ => {
            for child in named_children(stmt) {
                if is_statement_like(child.kind()) {
                    statement(&child, source, out);
                }
            }
        }
    }
}

fn is_statement_like(kind: &str) -> bool {
    kind.ends_with("_statement")
        || matches!(
            kind,
            "statement_block"
                | "else_clause"
                | "lexical_declaration"
                | "variable_declaration"
                | "switch_body"
                | "switch_case"
                | "switch_default"
                | "catch_clause"
                | "finally_clause"
        )
}

fn expression(expr: Node<'_>, source: &str, out: &mut Vec<Use>) {
    let expr = unwrap_expression(expr);
    match expr.kind() {
        "call_expression" => flatten_call(&expr, source, out),
        "new_expression" => flatten_new(&expr, source, out),
        "assignment_expression" => {
            if let Some(right) = expr.child_by_field_name("right") {
                flatten_initializer(right, source, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use tree_sitter::Parser;

    use super::*;
    use crate::languages::Lang;

    fn parse(source: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&Lang::TypeScript.grammar().unwrap())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    fn names(uses: &[Use]) -> Vec<(&str, UseKind)> {
        uses.iter().map(|u| (u.name.as_str(), u.kind)).collect()
    }

    fn first_decl_uses(source: &str) -> Vec<Use> {
        let tree = parse(source);
        let func = tree.root_node().named_child(0).unwrap();
        let mut out = Vec::new();
        analyze_function(&func, source, &mut out);
        out
    }

    #[test]
    fn direct_call_is_function() {
        let uses = first_decl_uses("function foo() { bar(); }");
        assert_eq!(names(&uses), [("bar", UseKind::Function)]);
    }

    #[test]
    fn member_call_splits_receiver_and_method() {
        let uses = first_decl_uses("function foo() { logger.info(msg); }");
        assert_eq!(
            names(&uses),
            [
                ("logger", UseKind::Variable),
                ("info", UseKind::Function),
                ("msg", UseKind::Variable)
            ]
        );
    }

    #[test]
    fn awaited_call_is_unwrapped() {
        let uses = first_decl_uses("async function foo() { await fetchAll(); }");
        assert_eq!(names(&uses), [("fetchAll", UseKind::Function)]);
    }

    #[test]
    fn new_expression_flattens_arguments_and_type_args() {
        let uses = first_decl_uses("function foo() { const x = new Repo<User>(db, open()); }");
        assert_eq!(
            names(&uses),
            [
                ("Repo", UseKind::Class),
                ("db", UseKind::Variable),
                ("open", UseKind::Function),
                ("User", UseKind::Type)
            ]
        );
    }

    #[test]
    fn signature_types_are_recorded() {
        let uses = first_decl_uses("function foo(a: Input, b: number): Promise<Output> {}");
        assert_eq!(
            names(&uses),
            [
                ("Promise", UseKind::Type),
                ("Output", UseKind::Type),
                ("Input", UseKind::Type)
            ]
        );
    }

    #[test]
    fn declarator_identifier_is_variable() {
        let uses = first_decl_uses("function foo() { let y = CONFIG; }");
        assert_eq!(names(&uses), [("CONFIG", UseKind::Variable)]);
    }

    #[test]
    fn union_and_function_types_flatten() {
        let src = "type X = A | ((b: B) => C) | [D, E['k']];";
        let tree = parse(src);
        let alias = tree.root_node().named_child(0).unwrap();
        let mut out = Vec::new();
        flatten_type(&alias.child_by_field_name("value").unwrap(), src, &mut out);
        let got: Vec<_> = out.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(got, ["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn predefined_types_are_ignored() {
        let src = "type X = string | number | 'lit';";
        let tree = parse(src);
        let alias = tree.root_node().named_child(0).unwrap();
        let mut out = Vec::new();
        flatten_type(&alias.child_by_field_name("value").unwrap(), src, &mut out);
        assert!(out.is_empty());
    }
}
