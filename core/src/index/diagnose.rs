//! Free-form diagnostic line translation and the end-of-pass unused scan.
//!
//! Split off from the event half of [`IndexBuilder`]; shares its dedup map
//! so an occurrence anchored here is never re-anchored by an event and vice
//! versa.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostics::{Diagnostic, SOURCE_SEMANTICS};
use crate::report::DiagnosticLine;

use super::builder::{IndexBuilder, IndexOutput};
use super::LineSpan;

/// Iteration-variable shape inside a message, e.g. `... for (i) ...`.
static FOR_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfor\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)").unwrap());

impl IndexBuilder {
    pub(super) fn translate(&mut self, diag: DiagnosticLine) {
        if diag.file == self.file_name {
            if let Some(symbol) = &diag.symbol {
                self.symbol_diagnostic(symbol, diag.line, &diag.message);
            } else if let Some(var) = for_variable(&diag.message) {
                self.for_variable_diagnostic(&var, diag.line, &diag.message);
            } else {
                self.line_diagnostic(diag.line, &diag.message);
            }
        } else {
            self.using_diagnostic(&diag.file, &diag.message);
        }
    }

    /// Anchors the message at every unconsumed occurrence of the subject
    /// symbol on the reported line, once each.
    fn symbol_diagnostic(&mut self, symbol: &str, line: u32, message: &str) {
        while let Some((start, end)) = self.src.find_word(symbol, line, true, &mut self.seen) {
            self.diagnostics
                .push(Diagnostic::error(LineSpan::new(line, start, end), message));
        }
    }

    fn for_variable_diagnostic(&mut self, var: &str, line: u32, message: &str) {
        match self.src.find_word(var, line, true, &mut self.seen) {
            Some((start, end)) => self
                .diagnostics
                .push(Diagnostic::error(LineSpan::new(line, start, end), message)),
            None => self.line_diagnostic(line, message),
        }
    }

    /// Anchors the message over the whole offending line, leading blanks and
    /// trailing whitespace excluded.
    fn line_diagnostic(&mut self, line: u32, message: &str) {
        if let Some((start, end)) = self.src.line_extent(line) {
            self.diagnostics
                .push(Diagnostic::error(LineSpan::new(line, start, end), message));
        }
    }

    /// An error in another file is pinned to the `using <module>;` statement
    /// that pulls that file in. First match wins, one diagnostic per module.
    fn using_diagnostic(&mut self, file: &str, message: &str) {
        let module = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file)
            .to_string();
        let Ok(re) = Regex::new(&format!(r"using\s+{}\s*;", regex::escape(&module))) else {
            return;
        };
        for line in 0..self.src.line_count() as u32 {
            let Some(text) = self.src.line(line) else {
                continue;
            };
            if let Some(m) = re.find(text) {
                if self.seen.consume_using(&module) {
                    let start = text[..m.start()].chars().count() as u32;
                    let end = start + m.as_str().chars().count() as u32;
                    self.diagnostics
                        .push(Diagnostic::error(LineSpan::new(line, start, end), message));
                }
                return;
            }
        }
    }

    /// Every definition whose counter never moved gets one warning at its
    /// own location; reference spans feed the "used" highlight list.
    pub(super) fn finish(mut self) -> IndexOutput {
        let mut unused = Vec::new();
        for counter in self.index.usage.values() {
            if counter.count == 0 {
                self.diagnostics.push(Diagnostic::warning(
                    counter.location.span,
                    format!("The variable({}) is defined but not used.", counter.name),
                    SOURCE_SEMANTICS,
                ));
                unused.push(counter.location.span);
            }
        }
        let used = self.index.references.iter().map(|r| r.location.span).collect();
        IndexOutput {
            index: self.index,
            diagnostics: self.diagnostics,
            unused,
            used,
        }
    }
}

fn for_variable(message: &str) -> Option<String> {
    FOR_VAR_RE
        .captures(message)
        .map(|caps| caps[1].to_string())
}
