//! Per-document semantic index reconstructed from the compiler report.

mod builder;
mod diagnose;

pub use builder::{IndexBuilder, IndexOutput};

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// A single-line character range, `[start, end)` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineSpan {
    pub line: u32,
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(line: u32, start: u32, end: u32) -> Self {
        Self { line, start, end }
    }

    /// Containment test used by the query engine; the end column counts as
    /// inside so a cursor sitting right after the word still hits.
    pub fn contains(&self, line: u32, character: u32) -> bool {
        self.line == line && self.start <= character && character <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub span: LineSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Class,
    Function,
    Const,
    Keyname,
}

/// Declared parameter and return types of a function or method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<String>,
    pub ret: Option<String>,
}

impl Signature {
    /// One-line rendering, e.g. `f(Int, Str): Int`.
    pub fn render(&self, name: &str) -> String {
        format!(
            "{}({}): {}",
            name,
            self.params.join(", "),
            self.ret.as_deref().unwrap_or("Any")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionEntry {
    pub kind: SymbolKind,
    pub name: String,
    /// Declared type of a variable, or the supertype slot of a class.
    pub type_name: Option<String>,
    /// Return type; functions only.
    pub return_type: Option<String>,
    pub arg_types: Vec<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub name: String,
    /// Resolved type reported by the compiler, when known.
    pub type_name: Option<String>,
    /// Whether the resolved type is callable (`Function#`/`Native#` mark).
    pub callable: bool,
    pub arg_types: Vec<String>,
    /// Occurrence in the active document.
    pub location: Location,
    /// Definition site, when it could be resolved.
    pub definition: Option<Location>,
}

/// Reference count for one definition, used for unused-declaration warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCounter {
    pub name: String,
    pub count: u32,
    pub location: Location,
}

/// Everything the query engine needs for one document.
///
/// Rebuilt wholesale on every compile pass; ordered maps keep iteration, and
/// therefore output, deterministic for identical input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentIndex {
    pub definitions: Vec<DefinitionEntry>,
    pub references: Vec<ReferenceEntry>,
    /// Keyed by (name, definition line).
    pub usage: BTreeMap<(String, u32), UsageCounter>,
    /// Actual argument types observed at call sites, per callee.
    pub call_args: BTreeMap<String, Vec<String>>,
    /// Free-function signatures.
    pub functions: BTreeMap<String, Signature>,
    /// Method tables: class name -> method name -> signature.
    pub methods: BTreeMap<String, BTreeMap<String, Signature>>,
    /// Declared supertypes, in declaration order.
    pub supers: BTreeMap<String, Vec<String>>,
    /// Constructor types observed via `#vartype`, per variable.
    pub var_types: BTreeMap<String, Vec<String>>,
    /// Flat name -> kind map feeding completion.
    pub symbols: BTreeMap<String, SymbolKind>,
}

impl DocumentIndex {
    /// Inheritance-aware method lookup: the class's own table first, then
    /// each declared supertype depth-first. The visited set makes a cyclic
    /// graph terminate instead of recursing forever.
    pub fn find_method(&self, class: &str, method: &str) -> Option<&Signature> {
        let mut visited = HashSet::new();
        self.find_method_in(class, method, &mut visited)
    }

    fn find_method_in<'a>(
        &'a self,
        class: &str,
        method: &str,
        visited: &mut HashSet<String>,
    ) -> Option<&'a Signature> {
        if !visited.insert(class.to_string()) {
            return None;
        }
        if let Some(sig) = self.methods.get(class).and_then(|t| t.get(method)) {
            return Some(sig);
        }
        for sup in self.supers.get(class).into_iter().flatten() {
            if let Some(sig) = self.find_method_in(sup, method, visited) {
                return Some(sig);
            }
        }
        None
    }

    /// All methods reachable from `class` through the inheritance graph.
    /// A subclass override shadows the supertype's entry.
    pub fn methods_of(&self, class: &str) -> Vec<(String, Signature)> {
        let mut visited = HashSet::new();
        let mut out: BTreeMap<String, Signature> = BTreeMap::new();
        self.collect_methods(class, &mut visited, &mut out);
        out.into_iter().collect()
    }

    fn collect_methods(
        &self,
        class: &str,
        visited: &mut HashSet<String>,
        out: &mut BTreeMap<String, Signature>,
    ) {
        if !visited.insert(class.to_string()) {
            return;
        }
        if let Some(table) = self.methods.get(class) {
            for (name, sig) in table {
                out.entry(name.clone()).or_insert_with(|| sig.clone());
            }
        }
        for sup in self.supers.get(class).cloned().unwrap_or_default() {
            self.collect_methods(&sup, visited, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[&str], ret: &str) -> Signature {
        Signature {
            params: params.iter().map(|s| s.to_string()).collect(),
            ret: Some(ret.to_string()),
        }
    }

    fn index_with_hierarchy() -> DocumentIndex {
        let mut index = DocumentIndex::default();
        index
            .methods
            .entry("A".into())
            .or_default()
            .insert("m".into(), sig(&["Int"], "Str"));
        index
            .methods
            .entry("B".into())
            .or_default()
            .insert("own".into(), sig(&[], "Int"));
        index.supers.insert("B".into(), vec!["A".into()]);
        index
    }

    #[test]
    fn method_lookup_walks_supertypes() {
        let index = index_with_hierarchy();
        assert_eq!(index.find_method("B", "m"), Some(&sig(&["Int"], "Str")));
        assert_eq!(index.find_method("B", "own"), Some(&sig(&[], "Int")));
        assert_eq!(index.find_method("B", "missing"), None);
        assert_eq!(index.find_method("A", "own"), None);
    }

    #[test]
    fn subclass_override_shadows_supertype() {
        let mut index = index_with_hierarchy();
        index
            .methods
            .entry("B".into())
            .or_default()
            .insert("m".into(), sig(&["Str"], "Str"));
        assert_eq!(index.find_method("B", "m"), Some(&sig(&["Str"], "Str")));
        let all = index.methods_of("B");
        let m = all.iter().find(|(n, _)| n == "m").unwrap();
        assert_eq!(m.1.params, vec!["Str".to_string()]);
    }

    #[test]
    fn cyclic_inheritance_terminates() {
        let mut index = DocumentIndex::default();
        index.supers.insert("A".into(), vec!["B".into()]);
        index.supers.insert("B".into(), vec!["A".into()]);
        assert_eq!(index.find_method("A", "m"), None);
        assert!(index.methods_of("A").is_empty());
    }

    #[test]
    fn signature_rendering() {
        assert_eq!(sig(&["Int", "Str"], "Int").render("f"), "f(Int, Str): Int");
        let open = Signature {
            params: vec![],
            ret: None,
        };
        assert_eq!(open.render("g"), "g(): Any");
    }
}
