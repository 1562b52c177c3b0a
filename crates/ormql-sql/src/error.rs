//! Error types for template parsing and rendering.

use crate::span::{offset_to_line_col, Span};
use thiserror::Error;

/// Error while parsing template syntax.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseError {
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with the offending source line and a caret.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&format!("  --> line {}:{}\n", line, col));

        if let Some(source_line) = source.lines().nth(line - 1) {
            result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));

            for _ in 0..col {
                result.push(' ');
            }
            result.push('^');

            let span_len = self.span.end.saturating_sub(self.span.start);
            let remaining = source_line.chars().count().saturating_sub(col) + 1;
            for _ in 1..span_len.min(remaining) {
                result.push('~');
            }
            result.push('\n');
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

/// Error while rendering a compiled template against a configuration.
///
/// These are configuration defects: the same template and configuration
/// always fail the same way, so callers should not retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no value configured for placeholder '{0}'")]
    MissingPlaceholder(String),

    #[error("no values configured for cycle '{0}'")]
    MissingCycleValues(String),

    #[error("schema-qualified placeholder '{name}' requires both database and schema mappings")]
    MissingMappings { name: String },

    #[error("cycle item {index} is out of range for a row of width {width}")]
    CycleItemOutOfRange { index: usize, width: usize },

    #[error("cycle item {0} rendered outside of a cycle")]
    CycleItemOutsideCycle(usize),
}
