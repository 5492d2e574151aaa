//! Source span contract consumed from the surface parser (see [`crate::ast`]).
//!
//! Positions are 1-indexed; columns are **byte offsets**, not rune/char counts,
//! and `end_col` is inclusive. This matches the AST contract in the spec: the
//! diagnostic formatter must align carets on byte boundaries so multi-byte
//! UTF-8 tokens still land correctly.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl SourceSpan {
    pub fn new(
        file: impl Into<PathBuf>,
        line: u32,
        start_col: u32,
        end_col: u32,
        start_byte: usize,
        end_byte: usize,
    ) -> Self {
        Self { file: file.into(), line, start_col, end_col, start_byte, end_byte }
    }

    /// A synthetic span for values that have no source location (e.g. values
    /// produced by a provider fetch, not lexed from a `.csl` file).
    pub fn synthetic(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into(), line: 0, start_col: 0, end_col: 0, start_byte: 0, end_byte: 0 }
    }

    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.start_col)
    }
}
