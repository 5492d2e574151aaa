//! AST→Data Converter (C2, spec §4.2). Lowers [`crate::ast::FileAst`] into a
//! plain [`Map`], leaving source/import statements for callers to extract
//! via sibling helpers rather than emitting them as data entries.

use std::path::PathBuf;

use crate::ast::{Expr, ExprVisitor, FileAst, SectionBody};
use crate::value::{Map, Placeholder, Value};

/// Converts a single [`FileAst`] into its data-map representation. Source and
/// import statements are intentionally not present in the result.
pub fn convert(ast: &FileAst, file: impl Into<PathBuf>) -> Map {
    let file = file.into();
    let mut visitor = ToValue { file };
    let mut out = Map::new();
    for section in &ast.sections {
        let value = match &section.body {
            // A section with an inline scalar value yields `{ name: scalar }`;
            // no empty-string key is created for the section itself.
            SectionBody::Scalar(expr) => visitor.visit(expr),
            // Routed through `visit_map` (not a bare `collect`) so a
            // duplicate key here — a reference followed by sibling
            // overrides, spec §4.11 step 8 — gets the same override-merge
            // treatment as a duplicate key in a nested map literal.
            SectionBody::Map(entries) => visitor.visit_map(entries, &section.span),
            SectionBody::List(items) => Value::List(items.iter().map(|e| visitor.visit(e)).collect()),
        };
        out.insert(section.name.clone(), value);
    }
    out
}

/// Lowers a single [`Expr`] into a [`Value`], recursively. Implemented as an
/// [`ExprVisitor`] so the conversion rules live in one place regardless of
/// where in the tree an expression appears (section body, map entry, list
/// element, or nested `source.config`).
pub struct ToValue {
    pub file: PathBuf,
}

impl ExprVisitor<Value> for ToValue {
    fn visit_null(&mut self, _span: &crate::span::SourceSpan) -> Value {
        Value::Null
    }

    fn visit_bool(&mut self, b: bool, _span: &crate::span::SourceSpan) -> Value {
        Value::Bool(b)
    }

    fn visit_number(&mut self, n: crate::value::Number, _span: &crate::span::SourceSpan) -> Value {
        Value::Number(n)
    }

    fn visit_string(&mut self, s: &str, _span: &crate::span::SourceSpan) -> Value {
        Value::String(s.to_string())
    }

    fn visit_reference(&mut self, r: &crate::ast::ReferenceExpr) -> Value {
        Value::Placeholder(Placeholder {
            alias: r.alias.clone(),
            path: r.path.clone(),
            span: r.span.clone(),
            overrides: None,
        })
    }

    fn visit_map(&mut self, entries: &[(String, Expr)], _span: &crate::span::SourceSpan) -> Value {
        // If a key appears twice and one occurrence is a bare reference, the
        // second is treated as sibling overrides on the reference (spec
        // §4.11 step 8) rather than last-wins clobbering the placeholder.
        let mut map = Map::new();
        for (k, v) in entries {
            let value = self.visit(v);
            if let Some(Value::Placeholder(existing)) = map.get(k) {
                let mut p = existing.clone();
                if let Value::Map(override_map) = value {
                    let mut merged = p.overrides.take().unwrap_or_default();
                    merged.extend(override_map);
                    p.overrides = Some(merged);
                }
                map.insert(k.clone(), Value::Placeholder(p));
                continue;
            }
            map.insert(k.clone(), value);
        }
        Value::Map(map)
    }

    fn visit_list(&mut self, items: &[Expr], _span: &crate::span::SourceSpan) -> Value {
        Value::List(items.iter().map(|e| self.visit(e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ReferenceExpr, SectionNode};
    use crate::span::SourceSpan;
    use crate::value::Number;

    fn span() -> SourceSpan {
        SourceSpan::new("test.csl", 1, 1, 1, 0, 0)
    }

    #[test]
    fn scalar_section_has_no_empty_key() {
        let ast = FileAst {
            sections: vec![SectionNode {
                name: "k".into(),
                span: span(),
                body: SectionBody::Scalar(Expr::String("v".into(), span())),
            }],
            ..Default::default()
        };
        let data = convert(&ast, "test.csl");
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("k"), Some(&Value::String("v".into())));
    }

    #[test]
    fn reference_with_sibling_override_merges_into_overrides() {
        let ast = FileAst {
            sections: vec![SectionNode {
                name: "app".into(),
                span: span(),
                body: SectionBody::Map(vec![(
                    "pool".into(),
                    Expr::Reference(ReferenceExpr { alias: "cfg".into(), path: vec!["pool".into()], span: span() }),
                ), (
                    "pool".into(),
                    Expr::Map(vec![("max".into(), Expr::Number(Number::Int(100), span()))], span()),
                )]),
            }],
            ..Default::default()
        };
        let data = convert(&ast, "test.csl");
        let app = data.get("app").unwrap().as_map().unwrap();
        match app.get("pool").unwrap() {
            Value::Placeholder(p) => {
                let overrides = p.overrides.as_ref().unwrap();
                assert_eq!(overrides.get("max"), Some(&Value::Number(Number::Int(100))));
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
    }
}
