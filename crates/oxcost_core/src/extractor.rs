use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::SourceType;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use crate::script_block::script_blocks;
use crate::types::{ImportDeclaration, Language};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },
}

/// Binding shape of one import, reduced to what a production bundler can
/// actually distinguish. `require("x")` and `import x from "x"` land on the
/// same shape; binding order never matters.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    SideEffect,
    Dynamic,
    Static {
        default: bool,
        namespace: bool,
        named: BTreeSet<String>,
    },
}

#[derive(Debug)]
struct RawImport {
    specifier: String,
    offset: u32,
    shape: Shape,
}

/// Extract all external import declarations from a source buffer.
///
/// Pure: reads nothing from disk. `Language::Unknown` yields an empty list.
/// Component dialects have their `<script>` blocks isolated first; the
/// `lang` attribute picks JS vs TS per block. Relative and absolute
/// specifiers are filtered out, and specifiers built from interpolation are
/// skipped. Syntax errors are fatal for the whole buffer.
pub fn extract(
    file_name: &Path,
    source: &str,
    language: Language,
) -> Result<Vec<ImportDeclaration>, ExtractError> {
    let declarations = match language {
        Language::Unknown => Vec::new(),
        Language::Javascript => parse_program(file_name, source, false)?,
        Language::Typescript => parse_program(file_name, source, true)?,
        Language::Vue | Language::Svelte => {
            let mut all = Vec::new();
            for block in script_blocks(source) {
                all.extend(parse_program(file_name, &block.source, block.typescript)?);
            }
            all
        }
    };
    debug!(
        "Extracted {} external imports from {}",
        declarations.len(),
        file_name.display()
    );
    Ok(declarations)
}

fn parse_program(
    file_name: &Path,
    source: &str,
    typescript: bool,
) -> Result<Vec<ImportDeclaration>, ExtractError> {
    let source_type = if typescript {
        SourceType::default().with_typescript(true).with_module(true)
    } else {
        SourceType::default().with_jsx(true).with_module(true)
    };
    let allocator = Allocator::default();
    let ParserReturn { program, errors, panicked, .. } =
        OxcParser::new(&allocator, source, source_type).parse();

    if panicked || !errors.is_empty() {
        let message = errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "syntax error".to_string());
        return Err(ExtractError::Parse { file: file_name.display().to_string(), message });
    }

    let mut raw: Vec<RawImport> = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => collect_static_import(decl, &mut raw),
            Statement::ExpressionStatement(es) => collect_from_expression(&es.expression, &mut raw),
            Statement::VariableDeclaration(vd) => {
                for d in &vd.declarations {
                    if let Some(init) = &d.init {
                        collect_from_expression(init, &mut raw);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(raw
        .into_iter()
        .filter(|r| !is_path_specifier(&r.specifier))
        .map(|r| ImportDeclaration {
            name: r.specifier.clone(),
            line: line_at(source, r.offset),
            string: canonical_string(&r.specifier, &r.shape),
            file_name: file_name.to_path_buf(),
        })
        .collect())
}

// `crate::types::ImportDeclaration` shadows the glob-imported AST node of
// the same name, so the AST type is spelled out here.
fn collect_static_import(decl: &oxc_ast::ast::ImportDeclaration<'_>, raw: &mut Vec<RawImport>) {
    // Skip type-only imports (import type { Foo } from 'bar')
    if decl.import_kind.is_type() {
        trace!("Skipping type-only import of '{}'", decl.source.value);
        return;
    }

    let mut default = false;
    let mut namespace = false;
    let mut named: BTreeSet<String> = BTreeSet::new();

    if let Some(specifiers) = &decl.specifiers {
        for spec in specifiers {
            match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    let imported = match &s.imported {
                        ModuleExportName::IdentifierName(id) => id.name.to_string(),
                        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                        ModuleExportName::StringLiteral(sl) => sl.value.to_string(),
                    };
                    // `import { default as x }` is a default import in disguise
                    if imported == "default" {
                        default = true;
                    } else {
                        named.insert(imported);
                    }
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(_) => default = true,
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => namespace = true,
            }
        }
        // All specifiers were type-only: nothing reaches the bundle
        if !default && !namespace && named.is_empty() {
            trace!("Skipping import of '{}' with only type bindings", decl.source.value);
            return;
        }
    }

    let shape = if decl.specifiers.is_none() {
        Shape::SideEffect
    } else {
        Shape::Static { default, namespace, named }
    };
    trace!("Found static import: '{}'", decl.source.value);
    raw.push(RawImport {
        specifier: decl.source.value.to_string(),
        offset: decl.span.start,
        shape,
    });
}

fn collect_from_expression(expr: &Expression, raw: &mut Vec<RawImport>) {
    match expr {
        Expression::CallExpression(ce) => {
            if let Expression::Identifier(callee_ident) = &ce.callee
                && callee_ident.name.as_str() == "require"
                && !ce.arguments.is_empty()
                && let Some(specifier) =
                    ce.arguments[0].as_expression().and_then(literal_specifier)
            {
                trace!("Found require() call: '{}'", specifier);
                raw.push(RawImport {
                    specifier,
                    offset: ce.span.start,
                    // A bundler cannot tell require() apart from a default import
                    shape: Shape::Static {
                        default: true,
                        namespace: false,
                        named: BTreeSet::new(),
                    },
                });
            }
            for arg in &ce.arguments {
                if let Some(arg_expr) = arg.as_expression() {
                    collect_from_expression(arg_expr, raw);
                }
            }
            collect_from_expression(&ce.callee, raw);
        }
        Expression::ImportExpression(ie) => {
            if let Some(specifier) = literal_specifier(&ie.source) {
                trace!("Found dynamic import(): '{}'", specifier);
                raw.push(RawImport { specifier, offset: ie.span.start, shape: Shape::Dynamic });
            }
        }
        Expression::ArrayExpression(ae) => {
            for elem in &ae.elements {
                if let Some(e) = elem.as_expression() {
                    collect_from_expression(e, raw);
                }
            }
        }
        Expression::ObjectExpression(oe) => {
            for prop in &oe.properties {
                if let ObjectPropertyKind::ObjectProperty(p) = prop {
                    collect_from_expression(&p.value, raw);
                }
            }
        }
        Expression::ConditionalExpression(ce) => {
            collect_from_expression(&ce.test, raw);
            collect_from_expression(&ce.consequent, raw);
            collect_from_expression(&ce.alternate, raw);
        }
        Expression::AssignmentExpression(ae) => {
            collect_from_expression(&ae.right, raw);
        }
        Expression::ParenthesizedExpression(pe) => {
            collect_from_expression(&pe.expression, raw);
        }
        Expression::AwaitExpression(ae) => {
            collect_from_expression(&ae.argument, raw);
        }
        _ => {}
    }
}

/// String literal or substitution-free template literal; anything
/// interpolated returns `None` and the import is skipped.
fn literal_specifier(expr: &Expression) -> Option<String> {
    match expr {
        Expression::StringLiteral(sl) => Some(sl.value.to_string()),
        Expression::TemplateLiteral(tl) if tl.expressions.is_empty() => {
            tl.quasis.first().map(|q| {
                q.value
                    .cooked
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| q.value.raw.to_string())
            })
        }
        _ => None,
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

fn line_at(source: &str, offset: u32) -> usize {
    let end = (offset as usize).min(source.len());
    source[..end].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Render the canonical import statement used as the sizing entry body.
///
/// The trailing `console.log` references every binding so minification
/// cannot tree-shake the import away. Binding names are normalized and
/// sorted, which makes the string invariant under reordering and under
/// require/default syntax differences.
fn canonical_string(name: &str, shape: &Shape) -> String {
    match shape {
        Shape::SideEffect => format!("import \"{name}\";"),
        Shape::Dynamic => format!("import(\"{name}\");"),
        Shape::Static { default, namespace, named } => {
            if !default && !namespace && named.is_empty() {
                // `import {} from "x"` degenerates to a side-effect import
                return format!("import \"{name}\";");
            }
            let mut clauses: Vec<String> = Vec::new();
            let mut locals: Vec<String> = Vec::new();
            if *default {
                clauses.push("_default".to_string());
                locals.push("_default".to_string());
            }
            if *namespace {
                clauses.push("* as _ns".to_string());
                locals.push("_ns".to_string());
            }
            if !named.is_empty() {
                let mut rendered = Vec::with_capacity(named.len());
                for (i, n) in named.iter().enumerate() {
                    if is_identifier(n) {
                        rendered.push(n.clone());
                        locals.push(n.clone());
                    } else {
                        let alias = format!("_n{i}");
                        rendered.push(format!("\"{n}\" as {alias}"));
                        locals.push(alias);
                    }
                }
                clauses.push(format!("{{ {} }}", rendered.join(", ")));
            }
            format!(
                "import {} from \"{name}\"; console.log({});",
                clauses.join(", "),
                locals.join(", ")
            )
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn extract_js(source: &str) -> Vec<ImportDeclaration> {
        extract(&PathBuf::from("/project/src/index.js"), source, Language::Javascript).unwrap()
    }

    fn extract_ts(source: &str) -> Vec<ImportDeclaration> {
        extract(&PathBuf::from("/project/src/index.ts"), source, Language::Typescript).unwrap()
    }

    #[test]
    fn test_default_import() {
        let decls = extract_js("import chalk from 'chalk';");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "chalk");
        assert_eq!(decls[0].line, 1);
        assert_eq!(decls[0].string, "import _default from \"chalk\"; console.log(_default);");
    }

    #[test]
    fn test_named_imports_sorted() {
        let a = extract_js("import { expect, assert } from 'chai';");
        let b = extract_js("import { assert, expect } from 'chai';");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].string, "import { assert, expect } from \"chai\"; console.log(assert, expect);");
        assert_eq!(a[0].string, b[0].string);
    }

    #[test]
    fn test_named_alias_uses_imported_name() {
        let a = extract_js("import { expect as e } from 'chai';");
        let b = extract_js("import { expect } from 'chai';");
        assert_eq!(a[0].string, b[0].string);
    }

    #[test]
    fn test_default_and_named() {
        let decls = extract_js("import React, { useState } from 'react';");
        assert_eq!(
            decls[0].string,
            "import _default, { useState } from \"react\"; console.log(_default, useState);"
        );
    }

    #[test]
    fn test_namespace_import() {
        let decls = extract_js("import * as fs from 'graceful-fs';");
        assert_eq!(decls[0].string, "import * as _ns from \"graceful-fs\"; console.log(_ns);");
    }

    #[test]
    fn test_side_effect_import() {
        let decls = extract_js("import 'core-js';");
        assert_eq!(decls[0].string, "import \"core-js\";");
    }

    #[test]
    fn test_require_matches_default_import() {
        let a = extract_js("const chalk = require('chalk');");
        let b = extract_js("import chalk from 'chalk';");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].string, b[0].string);
    }

    #[test]
    fn test_require_template_literal() {
        let decls = extract_js("const chalk = require(`chalk`);");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "chalk");
    }

    #[test]
    fn test_require_interpolated_skipped() {
        let decls = extract_js("const mod = require(`chalk/${flavor}`);");
        assert!(decls.is_empty());
    }

    #[test]
    fn test_require_non_literal_skipped() {
        let decls = extract_js("const mod = require(name);");
        assert!(decls.is_empty());
    }

    #[test]
    fn test_dynamic_import() {
        let decls = extract_js("import('lodash');");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].string, "import(\"lodash\");");
    }

    #[test]
    fn test_relative_imports_filtered() {
        let decls = extract_js(
            "import a from './a';\nimport b from '../b';\nimport c from '/abs/c';\nimport chalk from 'chalk';",
        );
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "chalk");
    }

    #[test]
    fn test_scoped_package() {
        let decls = extract_js("import { render } from '@testing-library/react';");
        assert_eq!(decls[0].name, "@testing-library/react");
        assert_eq!(decls[0].package_name(), "@testing-library/react");
    }

    #[test]
    fn test_subpath_import() {
        let decls = extract_js("import get from 'lodash/get';");
        assert_eq!(decls[0].name, "lodash/get");
        assert_eq!(decls[0].package_name(), "lodash");
    }

    #[test]
    fn test_line_numbers() {
        let decls = extract_js("const x = 1;\n\nimport chalk from 'chalk';\nimport ora from 'ora';");
        assert_eq!(decls[0].line, 3);
        assert_eq!(decls[1].line, 4);
    }

    #[test]
    fn test_type_only_import_skipped() {
        let decls = extract_ts("import type { Foo } from 'some-types';");
        assert!(decls.is_empty());
    }

    #[test]
    fn test_mixed_type_and_runtime_bindings() {
        let decls = extract_ts("import { type Foo, bar } from 'some-pkg';");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].string, "import { bar } from \"some-pkg\"; console.log(bar);");
    }

    #[test]
    fn test_named_default_binding_is_default() {
        let a = extract_js("import { default as chalk } from 'chalk';");
        let b = extract_js("import chalk from 'chalk';");
        assert_eq!(a[0].string, b[0].string);
    }

    #[test]
    fn test_require_in_nested_expressions() {
        let decls = extract_js(
            "const mods = [require('chalk'), cond ? require('ora') : require('execa')];",
        );
        let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["chalk", "ora", "execa"]);
    }

    #[test]
    fn test_parse_error() {
        let err = extract(
            &PathBuf::from("/project/src/broken.js"),
            "import chalk from",
            Language::Javascript,
        )
        .unwrap_err();
        let ExtractError::Parse { file, .. } = err;
        assert!(file.contains("broken.js"));
    }

    #[test]
    fn test_unknown_language_empty() {
        let decls =
            extract(&PathBuf::from("/project/a.txt"), "import x from 'y';", Language::Unknown)
                .unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn test_vue_script_block() {
        let source = "<template>\n  <div>{{ msg }}</div>\n</template>\n<script>\nimport dayjs from 'dayjs';\nexport default { data: () => ({ msg: dayjs().format() }) };\n</script>\n";
        let decls =
            extract(&PathBuf::from("/project/App.vue"), source, Language::Vue).unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "dayjs");
        assert_eq!(decls[0].line, 5);
    }

    #[test]
    fn test_vue_typescript_script_block() {
        let source = "<script lang=\"ts\">\nimport type { Ref } from 'vue-types';\nimport dayjs from 'dayjs';\n</script>";
        let decls =
            extract(&PathBuf::from("/project/App.vue"), source, Language::Vue).unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "dayjs");
    }

    #[test]
    fn test_svelte_module_and_instance_scripts() {
        let source = "<script context=\"module\">\nimport dayjs from 'dayjs';\n</script>\n<script>\nimport chalk from 'chalk';\n</script>\n<h1>hi</h1>";
        let decls =
            extract(&PathBuf::from("/project/App.svelte"), source, Language::Svelte).unwrap();
        let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dayjs", "chalk"]);
        assert_eq!(decls[1].line, 5);
    }

    #[test]
    fn test_vue_without_script_block() {
        let decls = extract(
            &PathBuf::from("/project/App.vue"),
            "<template><div/></template>",
            Language::Vue,
        )
        .unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn test_component_parse_error_is_fatal() {
        let source = "<script>\nimport chalk from\n</script>";
        let result = extract(&PathBuf::from("/project/App.vue"), source, Language::Vue);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_imports_both_reported() {
        let decls = extract_js("import chalk from 'chalk';\nimport chalk2 from 'chalk';");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].string, decls[1].string);
    }

    #[test]
    fn test_await_dynamic_import() {
        let decls = extract_js("const mod = await import('lodash');");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "lodash");
    }
}
