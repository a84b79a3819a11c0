//! Diagnostic records produced by a reindex pass.
//!
//! These are transport-neutral; the `lsp` crate converts them to protocol
//! diagnostics.

use crate::index::LineSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Where a diagnostic came from, surfaced as the LSP `source` field.
pub const SOURCE_COMPILE: &str = "Compile Error";
pub const SOURCE_SEMANTICS: &str = "Semantics Check";
pub const SOURCE_TYPE_CHECK: &str = "Type Check";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: LineSpan,
    pub message: String,
    pub severity: Severity,
    pub source: &'static str,
}

impl Diagnostic {
    pub fn error(span: LineSpan, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            source: SOURCE_COMPILE,
        }
    }

    pub fn warning(span: LineSpan, message: impl Into<String>, source: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
            source,
        }
    }
}

/// English ordinal for argument positions: 1st, 2nd, 3rd, 4th, ... 11th-13th.
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::ordinal;

    #[test]
    fn ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
    }
}
