use std::fmt;

use thiserror::Error;

/// Which phase of the front end recorded a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lexer => write!(f, "lexer"),
            Phase::Parser => write!(f, "parser"),
        }
    }
}

/// Every fault the front end can record. None of these abort scanning or
/// parsing; they are appended to the shared [`Diagnostics`] sink and both
/// phases continue on a best-effort basis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiagnosticKind {
    #[error("Illegal character '{0}'")]
    IllegalCharacter(char),
    #[error("Unexpected indent")]
    UnexpectedIndent,
    #[error("Unindent does not match any outer indentation level")]
    MismatchedDedent,
    #[error("Tabs are not supported for indentation")]
    TabIndent,
    #[error("Invalid escape sequence '\\{0}' in string literal")]
    InvalidEscape(char),
    #[error("Trailing backslash before closing quote in string literal")]
    TrailingBackslash,
    #[error("Integer literal '{0}' is out of range")]
    IntegerOutOfRange(String),
    #[error("Syntax error on '{found}': expected {expected}")]
    SyntaxError { found: String, expected: String },
    #[error("Unexpected end of input: expected {expected}")]
    UnexpectedEof { expected: String },
}

impl DiagnosticKind {
    pub fn phase(&self) -> Phase {
        match self {
            DiagnosticKind::IllegalCharacter(_)
            | DiagnosticKind::UnexpectedIndent
            | DiagnosticKind::MismatchedDedent
            | DiagnosticKind::TabIndent
            | DiagnosticKind::InvalidEscape(_)
            | DiagnosticKind::TrailingBackslash
            | DiagnosticKind::IntegerOutOfRange(_) => Phase::Lexer,
            DiagnosticKind::SyntaxError { .. } | DiagnosticKind::UnexpectedEof { .. } => {
                Phase::Parser
            }
        }
    }
}

/// One recorded fault: what went wrong and where. `offset` is a byte offset
/// into the source, `line` is 1-based. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: usize,
    pub offset: usize,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, line: usize, offset: usize) -> Self {
        Self { kind, line, offset }
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// Append-only, order-preserving collection of diagnostics shared by the
/// lexer and the parser for the duration of one parse.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, line: usize, offset: usize) {
        self.items.push(Diagnostic::new(kind, line, offset));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Format a diagnostic against the source it was recorded for, with the
/// offending line and a caret under the fault position.
pub fn render(diag: &Diagnostic, source: &str) -> String {
    let line_start = source[..diag.offset.min(source.len())]
        .rfind('\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let column = diag.offset.saturating_sub(line_start);
    let line_text = source[line_start..]
        .lines()
        .next()
        .unwrap_or("");
    format!(
        "{}:{}:{}: {}\n  {}\n  {}^",
        diag.phase(),
        diag.line,
        column,
        diag.message(),
        line_text,
        " ".repeat(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_follow_kind() {
        assert_eq!(DiagnosticKind::IllegalCharacter('@').phase(), Phase::Lexer);
        assert_eq!(
            DiagnosticKind::UnexpectedEof {
                expected: "expression".to_string()
            }
            .phase(),
            Phase::Parser
        );
    }

    #[test]
    fn sink_preserves_order() {
        let mut sink = Diagnostics::new();
        sink.push(DiagnosticKind::IllegalCharacter('@'), 1, 2);
        sink.push(
            DiagnosticKind::SyntaxError {
                found: "@".to_string(),
                expected: "expression".to_string(),
            },
            1,
            2,
        );
        let phases: Vec<_> = sink.iter().map(Diagnostic::phase).collect();
        assert_eq!(phases, vec![Phase::Lexer, Phase::Parser]);
    }

    #[test]
    fn renders_excerpt_with_caret() {
        let source = "x = 1\ny = 1 @ 2\n";
        let diag = Diagnostic::new(DiagnosticKind::IllegalCharacter('@'), 2, 12);
        let rendered = render(&diag, source);
        assert_eq!(
            rendered,
            "lexer:2:6: Illegal character '@'\n  y = 1 @ 2\n        ^"
        );
    }
}
