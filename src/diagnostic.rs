//! Diagnostic Formatter (C13, spec §4.13). Renders collected errors and
//! warnings as human-readable, optionally caret-annotated text, with
//! severity coloring. Column offsets in [`SourceSpan`] are byte offsets, so
//! the caret position is computed in terms of *byte* count, not character
//! count, or a multi-byte token would render misaligned.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use yansi::Paint;

use crate::span::SourceSpan;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    fn label(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "{}", Paint::yellow(self.label())),
            Self::Error => write!(f, "{}", Paint::red(self.label())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into(), span: None }
    }

    pub fn error_at(message: impl Into<String>, span: SourceSpan) -> Self {
        Self { severity: Severity::Error, message: message.into(), span: Some(span) }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into(), span: None }
    }

    pub fn warning_at(message: impl Into<String>, span: SourceSpan) -> Self {
        Self { severity: Severity::Warning, message: message.into(), span: Some(span) }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Renders a batch of diagnostics. `sources` supplies file contents for
/// spanned diagnostics so the affected line can be quoted with a caret
/// underline; a diagnostic whose file isn't present, or with no span at all,
/// renders as a single line (spec: "non-spanned errors render as a single
/// line").
pub fn format_diagnostics(diagnostics: &[Diagnostic], sources: &HashMap<PathBuf, String>) -> String {
    diagnostics.iter().map(|d| format_one(d, sources)).collect::<Vec<_>>().join("\n\n")
}

fn format_one(d: &Diagnostic, sources: &HashMap<PathBuf, String>) -> String {
    let Some(span) = &d.span else {
        return format!("{}: {}", d.severity, d.message);
    };
    if span.is_synthetic() {
        return format!("{}: {} ({})", d.severity, d.message, span.file().display());
    }
    let Some(source) = sources.get(span.file()) else {
        return format!("{}: {}\n  --> {}", d.severity, d.message, span);
    };
    let lines: Vec<&str> = source.lines().collect();
    let line_idx = span.line.saturating_sub(1) as usize;
    let Some(line_text) = lines.get(line_idx) else {
        return format!("{}: {}\n  --> {}", d.severity, d.message, span);
    };

    // Columns are byte offsets per the AST contract (spec §4.13, §6); the
    // caret is padded by byte count, not char count, so it lands over the
    // first *byte* of the token rather than drifting on multi-byte UTF-8.
    let start_byte = (span.start_col.saturating_sub(1)) as usize;
    let end_byte = (span.end_col as usize).max(start_byte + 1);
    let caret_width = end_byte - start_byte;

    let gutter_width = format!("{}", span.line + 1).len();
    let pad = " ".repeat(gutter_width);

    let mut body = String::new();
    if line_idx > 0 {
        if let Some(before) = lines.get(line_idx - 1) {
            body.push_str(&format!("{:>width$} | {}\n", line_idx, before, width = gutter_width));
        }
    }
    body.push_str(&format!("{pad} |\n"));
    body.push_str(&format!("{:>width$} | {}\n", span.line, line_text, width = gutter_width));
    body.push_str(&format!("{pad} | {}{}", " ".repeat(start_byte), Paint::red("^".repeat(caret_width))));
    if let Some(after) = lines.get(line_idx + 1) {
        body.push_str(&format!("\n{:>width$} | {}", span.line + 1, after, width = gutter_width));
    }

    format!("{}: {}\n{}--> {}\n{}", d.severity, d.message, pad, span, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_spanned_diagnostic_is_one_line() {
        let d = Diagnostic::error("boom");
        let out = format_diagnostics(&[d], &HashMap::new());
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("boom"));
    }

    #[test]
    fn spanned_diagnostic_quotes_source_line() {
        let mut sources = HashMap::new();
        sources.insert(PathBuf::from("a.csl"), "db:\n  host: öö\n".to_string());
        let span = SourceSpan::new("a.csl", 2, 9, 11, 0, 0);
        let d = Diagnostic::error_at("unresolved alias", span);
        let out = format_diagnostics(&[d], &sources);
        assert!(out.contains("unresolved alias"));
        assert!(out.contains("host: öö"));
    }

    #[test]
    fn shows_context_lines_around_the_error_line() {
        let mut sources = HashMap::new();
        sources.insert(PathBuf::from("a.csl"), "source cfg: http \"1.0\" {\ndb: @cfg:db\nname: \"x\"\n".to_string());
        let span = SourceSpan::new("a.csl", 2, 5, 12, 0, 0);
        let d = Diagnostic::error_at("unresolved reference", span);
        let out = format_diagnostics(&[d], &sources);
        assert!(out.contains("source cfg"));
        assert!(out.contains("db: @cfg:db"));
        assert!(out.contains("name: \"x\""));
    }
}
