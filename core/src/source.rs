//! Line buffer and position resolution for a single document.
//!
//! The compiler report only carries symbol names and line numbers, so every
//! range the editor sees is reconstructed here by searching the source line
//! for the next whole-word occurrence of the name. String literals are
//! masked out first so a symbol never matches inside a string, while
//! `%{...}` format placeholders stay visible and column arithmetic is
//! unchanged.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Escape-aware string literals, double or single quoted.
static LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#).unwrap());

/// Embedded format placeholder inside a literal, e.g. `"%{name}"`.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%\{[^}]*\}").unwrap());

/// Per-reindex dedup state.
///
/// One textual occurrence may show up both as an error subject and as a
/// location anchor; consuming it here keeps diagnostics and references from
/// doubling up. Keys are structured tuples rather than joined strings so a
/// separator character in a name cannot collide.
#[derive(Debug, Default)]
pub struct SeenMap {
    symbols: HashSet<(String, u32, u32)>,
    usings: HashSet<String>,
}

impl SeenMap {
    /// Marks the occurrence consumed. Returns `false` if it already was.
    pub fn consume_symbol(&mut self, name: &str, line: u32, col: u32) -> bool {
        self.symbols.insert((name.to_string(), line, col))
    }

    /// Marks a `using <module>;` statement diagnosed. One per module.
    pub fn consume_using(&mut self, module: &str) -> bool {
        self.usings.insert(module.to_string())
    }
}

/// A document split into lines, with string literals pre-masked.
#[derive(Debug)]
pub struct SourceBuffer {
    lines: Vec<String>,
    masked: Vec<String>,
}

impl SourceBuffer {
    pub fn new(text: &str) -> Self {
        let lines: Vec<String> = text.split("\r\n").flat_map(|s| s.split('\n')).map(String::from).collect();
        let masked = lines.iter().map(|l| mask_literals(l)).collect();
        Self { lines, masked }
    }

    pub fn line(&self, line: u32) -> Option<&str> {
        self.lines.get(line as usize).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Next unconsumed whole-word occurrence of `name` on `line`, as
    /// `[start, end)` character columns.
    ///
    /// With `check_dup` each hit is consumed through `seen`, so successive
    /// calls walk successive occurrences. Without it the first occurrence is
    /// returned untouched — used for the definition side of a reference,
    /// which must stay available to its own search.
    pub fn find_word(
        &self,
        name: &str,
        line: u32,
        check_dup: bool,
        seen: &mut SeenMap,
    ) -> Option<(u32, u32)> {
        let masked = self.masked.get(line as usize)?;
        let re = word_regex(name)?;
        for m in re.find_iter(masked) {
            let start = masked[..m.start()].chars().count() as u32;
            let end = start + name.chars().count() as u32;
            if !check_dup {
                return Some((start, end));
            }
            if seen.consume_symbol(name, line, start) {
                return Some((start, end));
            }
        }
        None
    }

    /// Span from the first non-blank character to the trimmed end of a line.
    pub fn line_extent(&self, line: u32) -> Option<(u32, u32)> {
        let raw = self.lines.get(line as usize)?;
        let trimmed = raw.trim_end();
        if trimmed.is_empty() {
            return None;
        }
        let start = raw.chars().take_while(|c| c.is_whitespace()).count() as u32;
        Some((start, trimmed.chars().count() as u32))
    }
}

fn word_regex(name: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(name))).ok()
}

/// Blanks out string literal contents, keeping `%{...}` placeholders.
///
/// Operates character-wise so the masked line has the same character count
/// (and therefore the same columns) as the original.
fn mask_literals(line: &str) -> String {
    let mut masked_ranges: Vec<(usize, usize)> = Vec::new();
    let mut kept_ranges: Vec<(usize, usize)> = Vec::new();
    for m in LITERAL_RE.find_iter(line) {
        masked_ranges.push((m.start(), m.end()));
        for p in PLACEHOLDER_RE.find_iter(m.as_str()) {
            kept_ranges.push((m.start() + p.start(), m.start() + p.end()));
        }
    }
    if masked_ranges.is_empty() {
        return line.to_string();
    }
    let inside = |ranges: &[(usize, usize)], at: usize| {
        ranges.iter().any(|&(s, e)| s <= at && at < e)
    };
    line.char_indices()
        .map(|(at, c)| {
            if inside(&masked_ranges, at) && !inside(&kept_ranges, at) {
                ' '
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_blanks_literal_content() {
        let masked = mask_literals(r#"var x = "x is unused";"#);
        assert_eq!(masked, format!("var x = {};", " ".repeat(13)));
    }

    #[test]
    fn mask_keeps_placeholders() {
        let masked = mask_literals(r#"print("count %{n} done");"#);
        let col = r#"print("count %{n} done");"#.find("%{n}").unwrap();
        assert_eq!(&masked[col..col + 4], "%{n}");
        assert_eq!(masked.chars().count(), r#"print("count %{n} done");"#.chars().count());
    }

    #[test]
    fn no_match_inside_string_literal() {
        let src = SourceBuffer::new(r#"var x = "x is unused";"#);
        let mut seen = SeenMap::default();
        // first hit is the declaration, not the character inside the string
        assert_eq!(src.find_word("x", 0, true, &mut seen), Some((4, 5)));
        // the only other textual `x` sits inside the literal: no further hit
        assert_eq!(src.find_word("x", 0, true, &mut seen), None);
    }

    #[test]
    fn whole_word_boundaries() {
        let src = SourceBuffer::new("var max = maximum;");
        let mut seen = SeenMap::default();
        assert_eq!(src.find_word("max", 0, true, &mut seen), Some((4, 7)));
        assert_eq!(src.find_word("max", 0, true, &mut seen), None);
    }

    #[test]
    fn check_dup_walks_occurrences() {
        let src = SourceBuffer::new("a = a + a;");
        let mut seen = SeenMap::default();
        assert_eq!(src.find_word("a", 0, true, &mut seen), Some((0, 1)));
        assert_eq!(src.find_word("a", 0, true, &mut seen), Some((4, 5)));
        assert_eq!(src.find_word("a", 0, true, &mut seen), Some((8, 9)));
        assert_eq!(src.find_word("a", 0, true, &mut seen), None);
    }

    #[test]
    fn unchecked_search_does_not_consume() {
        let src = SourceBuffer::new("a = a;");
        let mut seen = SeenMap::default();
        assert_eq!(src.find_word("a", 0, false, &mut seen), Some((0, 1)));
        // still available to a consuming search afterwards
        assert_eq!(src.find_word("a", 0, true, &mut seen), Some((0, 1)));
    }

    #[test]
    fn line_extent_trims() {
        let src = SourceBuffer::new("    var x = 1;   ");
        assert_eq!(src.line_extent(0), Some((4, 14)));
        let blank = SourceBuffer::new("   ");
        assert_eq!(blank.line_extent(0), None);
    }
}
