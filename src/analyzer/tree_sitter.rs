//! Tree-sitter based function extraction for C and C++.
//!
//! Walks `function_definition` nodes and extracts name, return type,
//! parameter declarations and storage class. The C and C++ grammars share
//! the node kinds we care about, so a single walker handles both.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tree_sitter::{Node, Parser, TreeCursor};

use super::{FunctionInfo, ParameterInfo, SourceAnalyzer, SourceLanguage};

/// Production analyzer backed by tree-sitter grammars.
///
/// A parser is constructed per call: `tree_sitter::Parser` is not `Sync`,
/// and construction is cheap relative to parsing itself.
pub struct TreeSitterAnalyzer;

impl TreeSitterAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn language_for(language: SourceLanguage) -> tree_sitter::Language {
        match language {
            SourceLanguage::C => tree_sitter_c::LANGUAGE.into(),
            SourceLanguage::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }
}

impl Default for TreeSitterAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAnalyzer for TreeSitterAnalyzer {
    fn analyze(&self, file_path: &Path, _compile_args: &[String]) -> Result<Vec<FunctionInfo>> {
        let language = SourceLanguage::from_path(file_path)
            .ok_or_else(|| anyhow!("Unsupported file type: {}", file_path.display()))?;

        let source = fs::read(file_path)
            .with_context(|| format!("Failed to read source file {}", file_path.display()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&Self::language_for(language))
            .context("Failed to configure tree-sitter parser")?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| anyhow!("Failed to parse {}", file_path.display()))?;

        let mut functions = Vec::new();
        let mut cursor = tree.walk();
        collect_functions(&mut cursor, &source, file_path, language, &mut functions);

        Ok(functions)
    }
}

/// Recursively visit the AST collecting function definitions.
fn collect_functions(
    cursor: &mut TreeCursor,
    source: &[u8],
    file_path: &Path,
    language: SourceLanguage,
    functions: &mut Vec<FunctionInfo>,
) {
    let node = cursor.node();

    if node.kind() == "function_definition" {
        if let Some(func) = extract_function(&node, source, file_path, language) {
            functions.push(func);
        }
    }

    if cursor.goto_first_child() {
        loop {
            collect_functions(cursor, source, file_path, language, functions);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
}

fn extract_function(
    node: &Node,
    source: &[u8],
    file_path: &Path,
    language: SourceLanguage,
) -> Option<FunctionInfo> {
    let declarator = find_function_declarator(node)?;
    let name = find_identifier(&declarator, source)?;

    let mut return_type = node
        .child_by_field_name("type")
        .map(|n| node_text(&n, source).to_string())
        .unwrap_or_else(|| "void".to_string());

    // Pointer levels live on the declarator, not the type node:
    // `char *dup(...)` has type `char` wrapped in a pointer_declarator.
    for _ in 0..pointer_depth(node) {
        return_type.push('*');
    }

    let parameters = extract_parameters(&declarator, source);
    let is_static = has_storage_class(node, source, "static");

    let body = node
        .child_by_field_name("body")
        .map(|n| node_text(&n, source).to_string())
        .unwrap_or_default();

    Some(FunctionInfo {
        name,
        return_type,
        parameters,
        is_static,
        language,
        file: file_path.to_path_buf(),
        line: node.start_position().row + 1,
        body,
    })
}

/// Descend through pointer declarators to the `function_declarator` node.
fn find_function_declarator<'a>(node: &Node<'a>) -> Option<Node<'a>> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            "pointer_declarator" => {
                current = current.child_by_field_name("declarator")?;
            }
            _ => return None,
        }
    }
}

/// Count pointer levels between the definition and its function declarator.
fn pointer_depth(node: &Node) -> usize {
    let mut depth = 0;
    let mut current = match node.child_by_field_name("declarator") {
        Some(n) => n,
        None => return 0,
    };
    while current.kind() == "pointer_declarator" {
        depth += 1;
        current = match current.child_by_field_name("declarator") {
            Some(n) => n,
            None => break,
        };
    }
    depth
}

/// Find the identifier inside a function declarator.
fn find_identifier(declarator: &Node, source: &[u8]) -> Option<String> {
    let inner = declarator.child_by_field_name("declarator")?;
    match inner.kind() {
        "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
        | "operator_name" => Some(node_text(&inner, source).to_string()),
        _ => {
            // e.g. parenthesized declarators; fall back to the first
            // identifier-like descendant.
            let mut cursor = inner.walk();
            for child in inner.children(&mut cursor) {
                if child.kind() == "identifier" {
                    return Some(node_text(&child, source).to_string());
                }
            }
            None
        }
    }
}

fn extract_parameters(declarator: &Node, source: &[u8]) -> Vec<ParameterInfo> {
    let mut parameters = Vec::new();

    let params_node = match declarator.child_by_field_name("parameters") {
        Some(n) => n,
        None => return parameters,
    };

    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        if child.kind() != "parameter_declaration" {
            continue;
        }

        let type_name = child
            .child_by_field_name("type")
            .map(|n| node_text(&n, source).to_string())
            .unwrap_or_else(|| "int".to_string());

        // `void` parameter lists carry no declarator
        let name = match child.child_by_field_name("declarator") {
            Some(decl) => parameter_name(&decl, source),
            None => {
                if type_name == "void" {
                    continue;
                }
                None
            }
        };

        let type_name = match &name {
            Some(_) => {
                let decl_text = child
                    .child_by_field_name("declarator")
                    .map(|n| node_text(&n, source))
                    .unwrap_or("");
                let stars = decl_text.chars().take_while(|c| *c == '*').count();
                format!("{}{}", type_name, "*".repeat(stars))
            }
            None => type_name,
        };

        let position = parameters.len();
        parameters.push(ParameterInfo {
            name: name.unwrap_or_else(|| format!("arg{}", position)),
            type_name,
            position,
        });
    }

    parameters
}

/// Pull the identifier out of a parameter declarator, skipping pointer
/// and array wrappers.
fn parameter_name(declarator: &Node, source: &[u8]) -> Option<String> {
    if declarator.kind() == "identifier" {
        return Some(node_text(declarator, source).to_string());
    }

    let mut cursor = declarator.walk();
    for child in declarator.children(&mut cursor) {
        if let Some(name) = parameter_name(&child, source) {
            return Some(name);
        }
    }
    None
}

fn has_storage_class(node: &Node, source: &[u8], keyword: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "storage_class_specifier" && node_text(&child, source) == keyword {
            return true;
        }
    }
    false
}

fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}
