//! The AST contract consumed from the surface parser (spec §6). The real
//! tokenizer/parser is an external collaborator out of scope for this crate;
//! this module only pins the node shapes the converter ([`crate::convert`])
//! depends on, modeled as a tagged union per the "interface abstraction for
//! AST" design note. [`crate::parser`] provides a small internal
//! implementation that produces this shape from `.csl` text so the pipeline
//! is exercisable end to end.

use semver::Version;

use crate::span::SourceSpan;
use crate::value::{Map, Number};

/// Everything lexed out of one `.csl` file.
#[derive(Clone, Debug, Default)]
pub struct FileAst {
    pub sources: Vec<SourceDecl>,
    pub imports: Vec<ImportDecl>,
    pub sections: Vec<SectionNode>,
}

#[derive(Clone, Debug)]
pub struct SourceDecl {
    pub alias: String,
    pub type_name: String,
    pub version: Version,
    pub config: Vec<(String, Expr)>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct ImportDecl {
    pub alias: String,
    pub path: Vec<String>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct SectionNode {
    pub name: String,
    pub span: SourceSpan,
    pub body: SectionBody,
}

#[derive(Clone, Debug)]
pub enum SectionBody {
    Scalar(Expr),
    Map(Vec<(String, Expr)>),
    List(Vec<Expr>),
}

/// A reference expression `@alias:seg1.seg2...`.
#[derive(Clone, Debug)]
pub struct ReferenceExpr {
    pub alias: String,
    pub path: Vec<String>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Null(SourceSpan),
    Bool(bool, SourceSpan),
    Number(Number, SourceSpan),
    String(String, SourceSpan),
    Reference(ReferenceExpr),
    Map(Vec<(String, Expr)>, SourceSpan),
    List(Vec<Expr>, SourceSpan),
}

impl Expr {
    pub fn span(&self) -> &SourceSpan {
        match self {
            Self::Null(s)
            | Self::Bool(_, s)
            | Self::Number(_, s)
            | Self::String(_, s)
            | Self::Map(_, s)
            | Self::List(_, s) => s,
            Self::Reference(r) => &r.span,
        }
    }
}

/// A minimal visitor over [`Expr`] variants, per the "tagged union and a
/// visitor" design note — the converter implements this rather than matching
/// on concrete parser types directly.
pub trait ExprVisitor<T> {
    fn visit_null(&mut self, span: &SourceSpan) -> T;
    fn visit_bool(&mut self, b: bool, span: &SourceSpan) -> T;
    fn visit_number(&mut self, n: Number, span: &SourceSpan) -> T;
    fn visit_string(&mut self, s: &str, span: &SourceSpan) -> T;
    fn visit_reference(&mut self, r: &ReferenceExpr) -> T;
    fn visit_map(&mut self, entries: &[(String, Expr)], span: &SourceSpan) -> T;
    fn visit_list(&mut self, items: &[Expr], span: &SourceSpan) -> T;

    fn visit(&mut self, expr: &Expr) -> T {
        match expr {
            Expr::Null(s) => self.visit_null(s),
            Expr::Bool(b, s) => self.visit_bool(*b, s),
            Expr::Number(n, s) => self.visit_number(*n, s),
            Expr::String(s_val, s) => self.visit_string(s_val, s),
            Expr::Reference(r) => self.visit_reference(r),
            Expr::Map(entries, s) => self.visit_map(entries, s),
            Expr::List(items, s) => self.visit_list(items, s),
        }
    }
}

/// Helper used by [`crate::import`] to pull a `source` declaration's
/// `config` entries into a plain [`Map`] for provider `init`.
pub fn config_to_map(config: &[(String, Expr)], file: &std::path::Path) -> Map {
    let mut visitor = crate::convert::ToValue { file: file.to_path_buf() };
    config.iter().map(|(k, v)| (k.clone(), visitor.visit(v))).collect()
}
