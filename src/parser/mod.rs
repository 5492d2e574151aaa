//! A small internal `.csl` parser. The real surface syntax (tokenization,
//! grammar) is an external collaborator out of scope for this crate — this
//! module exists only so the pipeline is exercisable end to end without a
//! separate parser dependency, and intentionally stays minimal rather than
//! gold-plating a syntax nobody outside this crate consumes.
//!
//! Grammar (informal):
//!
//! ```text
//! file       := { source_decl | import_decl | section }
//! source_decl:= "source" IDENT ":" IDENT STRING "{" { IDENT ":" expr } "}"
//! import_decl:= "import" IDENT ":" path
//! section    := IDENT ":" expr
//! expr       := "null" | BOOL | NUMBER | STRING | reference | map | list
//! reference  := "@" IDENT ":" path
//! map        := "{" { IDENT ":" expr [","] } "}"
//! list       := "[" { expr [","] } "]"
//! path       := IDENT { "." IDENT }
//! ```

mod lexer;

use std::path::{Path, PathBuf};

use semver::Version;

use crate::ast::{Expr, FileAst, ImportDecl, ReferenceExpr, SectionBody, SectionNode, SourceDecl};
use crate::error::ParseError;
use crate::span::SourceSpan;

use lexer::{Lexer, Token, TokenKind};

pub fn parse(source: &str, file: impl AsRef<Path>) -> Result<FileAst, ParseError> {
    let file = file.as_ref().to_path_buf();
    let tokens = Lexer::new(source, &file).tokenize().map_err(|e| ParseError::Syntax {
        file: file.clone(),
        line: e.line,
        col: e.col,
        message: e.message,
    })?;
    Parser { tokens, pos: 0, file }.parse_file()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn span_of(&self, tok: &Token) -> SourceSpan {
        SourceSpan::new(self.file.clone(), tok.line, tok.start_col, tok.end_col, tok.start_byte, tok.end_byte)
    }

    fn err(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError::Syntax { file: self.file.clone(), line: tok.line, col: tok.start_col, message: message.into() }
    }

    fn expect_colon(&mut self) -> Result<(), ParseError> {
        let tok = self.bump();
        if tok.kind != TokenKind::Colon {
            return Err(self.err(&tok, "expected `:`"));
        }
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<(String, Token), ParseError> {
        let tok = self.bump();
        match tok.kind.clone() {
            TokenKind::Ident(name) => Ok((name, tok)),
            _ => Err(self.err(&tok, "expected an identifier")),
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        let tok = self.bump();
        match tok.kind.clone() {
            TokenKind::String(s) => Ok(s),
            _ => Err(self.err(&tok, "expected a string literal")),
        }
    }

    fn parse_file(&mut self) -> Result<FileAst, ParseError> {
        let mut ast = FileAst::default();
        loop {
            if matches!(self.peek().kind, TokenKind::Eof) {
                break;
            }
            match &self.peek().kind {
                TokenKind::Ident(name) if name == "source" => {
                    self.bump();
                    ast.sources.push(self.parse_source_decl()?);
                }
                TokenKind::Ident(name) if name == "import" => {
                    self.bump();
                    ast.imports.push(self.parse_import_decl()?);
                }
                TokenKind::Ident(_) => {
                    ast.sections.push(self.parse_section()?);
                }
                _ => {
                    let tok = self.bump();
                    return Err(self.err(&tok, "expected `source`, `import`, or a section name"));
                }
            }
        }
        Ok(ast)
    }

    fn parse_source_decl(&mut self) -> Result<SourceDecl, ParseError> {
        let (alias, alias_tok) = self.expect_ident()?;
        self.expect_colon()?;
        let (type_name, _) = self.expect_ident()?;
        let version_text = self.expect_string()?;
        let version = Version::parse(&version_text)
            .map_err(|e| self.err(&alias_tok, format!("invalid version `{version_text}`: {e}")))?;

        let open = self.bump();
        if open.kind != TokenKind::LBrace {
            return Err(self.err(&open, "expected `{` to open source config block"));
        }
        let mut config = Vec::new();
        loop {
            if matches!(self.peek().kind, TokenKind::RBrace) {
                self.bump();
                break;
            }
            let (key, _) = self.expect_ident()?;
            self.expect_colon()?;
            let value = self.parse_expr()?;
            config.push((key, value));
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.bump();
            }
        }

        Ok(SourceDecl { alias, type_name, version, config, span: self.span_of(&alias_tok) })
    }

    fn parse_import_decl(&mut self) -> Result<ImportDecl, ParseError> {
        let (alias, alias_tok) = self.expect_ident()?;
        self.expect_colon()?;
        let path = self.parse_path()?;
        Ok(ImportDecl { alias, path, span: self.span_of(&alias_tok) })
    }

    fn parse_section(&mut self) -> Result<SectionNode, ParseError> {
        let (name, name_tok) = self.expect_ident()?;
        self.expect_colon()?;
        let expr = self.parse_expr()?;
        let body = match expr {
            Expr::Map(entries, _) => SectionBody::Map(entries),
            Expr::List(items, _) => SectionBody::List(items),
            other => SectionBody::Scalar(other),
        };
        Ok(SectionNode { name, span: self.span_of(&name_tok), body })
    }

    fn parse_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut segments = Vec::new();
        let (first, _) = self.expect_ident()?;
        segments.push(first);
        while matches!(self.peek().kind, TokenKind::Dot) {
            self.bump();
            let (seg, _) = self.expect_ident()?;
            segments.push(seg);
        }
        Ok(segments)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.bump();
        match tok.kind.clone() {
            TokenKind::Null => Ok(Expr::Null(self.span_of(&tok))),
            TokenKind::Bool(b) => Ok(Expr::Bool(b, self.span_of(&tok))),
            TokenKind::Number(n) => Ok(Expr::Number(n, self.span_of(&tok))),
            TokenKind::String(s) => Ok(Expr::String(s, self.span_of(&tok))),
            TokenKind::At => {
                let (alias, _) = self.expect_ident()?;
                self.expect_colon()?;
                let path = self.parse_path()?;
                Ok(Expr::Reference(ReferenceExpr { alias, path, span: self.span_of(&tok) }))
            }
            TokenKind::LBrace => self.parse_map(tok),
            TokenKind::LBracket => self.parse_list(tok),
            _ => Err(self.err(&tok, "expected a value")),
        }
    }

    fn parse_map(&mut self, open: Token) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        loop {
            if matches!(self.peek().kind, TokenKind::RBrace) {
                self.bump();
                break;
            }
            let (key, _) = self.expect_ident()?;
            self.expect_colon()?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.bump();
            }
        }
        Ok(Expr::Map(entries, self.span_of(&open)))
    }

    fn parse_list(&mut self, open: Token) -> Result<Expr, ParseError> {
        let mut items = Vec::new();
        loop {
            if matches!(self.peek().kind, TokenKind::RBracket) {
                self.bump();
                break;
            }
            items.push(self.parse_expr()?);
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.bump();
            }
        }
        Ok(Expr::List(items, self.span_of(&open)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_import_and_sections() {
        let src = r#"
source cfg: http "1.2.0" {
  url: "https://example.com"
}

import cfg: base.settings

db: {
  host: "h1"
  port: 5432
  pool: @cfg:pool
}

tags: ["a", "b"]

name: "app"
"#;
        let ast = parse(src, "test.csl").unwrap();
        assert_eq!(ast.sources.len(), 1);
        assert_eq!(ast.sources[0].alias, "cfg");
        assert_eq!(ast.sources[0].type_name, "http");
        assert_eq!(ast.imports.len(), 1);
        assert_eq!(ast.imports[0].path, vec!["base".to_string(), "settings".to_string()]);
        assert_eq!(ast.sections.len(), 3);
    }

    #[test]
    fn reports_syntax_error_with_location() {
        let err = parse("db: {", "bad.csl").unwrap_err();
        match err {
            ParseError::Syntax { file, .. } => assert_eq!(file, PathBuf::from("bad.csl")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
