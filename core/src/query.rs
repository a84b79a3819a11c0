//! Query engine: definition lookup, hover, and completion against a built
//! [`DocumentIndex`].

use std::collections::BTreeMap;

use crate::builtins;
use crate::index::{DocumentIndex, LineSpan, Location, SymbolKind};

/// Definition site for the reference under the cursor, if any.
pub fn definition_at(index: &DocumentIndex, line: u32, character: u32) -> Option<Location> {
    index
        .references
        .iter()
        .find(|r| r.location.span.contains(line, character))
        .and_then(|r| r.definition.clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    /// Single-line signature, e.g. `function f(Int, Str): Int`.
    pub signature: String,
    /// Span of the hovered occurrence.
    pub span: LineSpan,
}

pub fn hover_at(index: &DocumentIndex, line: u32, character: u32) -> Option<HoverInfo> {
    let reference = index
        .references
        .iter()
        .find(|r| r.location.span.contains(line, character))?;
    let signature = if reference.callable {
        let mut params = reference.arg_types.clone();
        let mut ret = reference.type_name.clone();
        // a bare callable reference may know less than the definition does
        if let Some(def) = index
            .definitions
            .iter()
            .find(|d| d.name == reference.name && d.arg_types.len() > params.len())
        {
            params = def.arg_types.clone();
            if ret.is_none() {
                ret = def.return_type.clone();
            }
        }
        format!(
            "function {}({}): {}",
            reference.name,
            params.join(", "),
            ret.as_deref().unwrap_or("Any")
        )
    } else {
        format!(
            "var {}: {}",
            reference.name,
            reference.type_name.as_deref().unwrap_or("Any")
        )
    };
    Some(HoverInfo {
        signature,
        span: reference.location.span,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    TypeName,
    Keyword,
    Method,
    Variable,
    Class,
    Function,
    Const,
    Keyname,
}

impl From<SymbolKind> for CandidateKind {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Variable => CandidateKind::Variable,
            SymbolKind::Class => CandidateKind::Class,
            SymbolKind::Function => CandidateKind::Function,
            SymbolKind::Const => CandidateKind::Const,
            SymbolKind::Keyname => CandidateKind::Keyname,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub kind: CandidateKind,
    pub detail: Option<String>,
}

/// Completion candidates at a cursor position.
///
/// Branches on the character right before the cursor: `:` offers the
/// built-in type names, `.` offers members of the receiver, anything else
/// falls back to keywords plus all indexed top-level symbols (minus the
/// token currently being typed). Output is sorted and deduplicated.
pub fn completion_at(
    index: &DocumentIndex,
    line: u32,
    line_text: &str,
    character: u32,
) -> Vec<Candidate> {
    let prefix: String = line_text.chars().take(character as usize).collect();
    match prefix.chars().last() {
        Some(':') => builtins::TYPE_NAMES
            .iter()
            .map(|name| Candidate {
                label: (*name).to_string(),
                kind: CandidateKind::TypeName,
                detail: None,
            })
            .collect(),
        Some('.') => {
            let receiver: String = trailing_word(&prefix[..prefix.len() - 1]);
            member_completion(index, &receiver, line)
        }
        _ => {
            let current = trailing_word(&prefix);
            symbol_completion(index, &current)
        }
    }
}

fn trailing_word(text: &str) -> String {
    let word: String = text
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    word.chars().rev().collect()
}

/// Resolves the receiver to one or more type names, in priority order:
/// a bare built-in type, a user-defined class, the declared type of the
/// nearest definition at or above the cursor line, then constructor types
/// observed via `#vartype`. Each type is expanded through the inheritance
/// graph and merged with the predefined members.
fn member_completion(index: &DocumentIndex, receiver: &str, line: u32) -> Vec<Candidate> {
    let mut types: Vec<String> = Vec::new();
    if !builtins::members_of(receiver).is_empty() {
        types.push(receiver.to_string());
    } else if index.methods.contains_key(receiver) {
        types.push(receiver.to_string());
    } else if let Some(def) = index
        .definitions
        .iter()
        .filter(|d| {
            d.name == receiver && d.type_name.is_some() && d.location.span.line <= line
        })
        .max_by_key(|d| d.location.span.line)
    {
        types.extend(def.type_name.clone());
    } else if let Some(observed) = index.var_types.get(receiver) {
        types.extend(observed.iter().cloned());
    }

    let mut merged: BTreeMap<String, Candidate> = BTreeMap::new();
    for ty in &types {
        for (name, sig) in index.methods_of(ty) {
            let detail = sig.render(&name);
            merged.entry(name.clone()).or_insert(Candidate {
                label: name,
                kind: CandidateKind::Method,
                detail: Some(detail),
            });
        }
        for (name, detail) in builtins::members_of(ty) {
            merged.entry((*name).to_string()).or_insert(Candidate {
                label: (*name).to_string(),
                kind: CandidateKind::Method,
                detail: Some((*detail).to_string()),
            });
        }
    }
    merged.into_values().collect()
}

fn symbol_completion(index: &DocumentIndex, current: &str) -> Vec<Candidate> {
    let mut merged: BTreeMap<String, Candidate> = BTreeMap::new();
    for (name, kind) in &index.symbols {
        if name == current {
            continue;
        }
        let detail = index
            .functions
            .get(name)
            .map(|sig| sig.render(name));
        merged.insert(
            name.clone(),
            Candidate {
                label: name.clone(),
                kind: (*kind).into(),
                detail,
            },
        );
    }
    for keyword in builtins::KEYWORDS {
        merged.entry((*keyword).to_string()).or_insert(Candidate {
            label: (*keyword).to_string(),
            kind: CandidateKind::Keyword,
            detail: None,
        });
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::index::{DefinitionEntry, ReferenceEntry, Signature};

    fn loc(line: u32, start: u32, end: u32) -> Location {
        Location {
            path: PathBuf::from("/proj/main.k"),
            span: LineSpan::new(line, start, end),
        }
    }

    fn sample_index() -> DocumentIndex {
        let mut index = DocumentIndex::default();
        index.references.push(ReferenceEntry {
            name: "x".into(),
            type_name: Some("Int".into()),
            callable: false,
            arg_types: vec![],
            location: loc(2, 4, 5),
            definition: Some(loc(0, 4, 5)),
        });
        index.references.push(ReferenceEntry {
            name: "f".into(),
            type_name: None,
            callable: true,
            arg_types: vec![],
            location: loc(3, 0, 1),
            definition: Some(loc(1, 9, 10)),
        });
        index.definitions.push(DefinitionEntry {
            kind: SymbolKind::Function,
            name: "f".into(),
            type_name: None,
            return_type: Some("Int".into()),
            arg_types: vec!["Int".into(), "Str".into()],
            location: loc(1, 9, 10),
        });
        index.symbols.insert("f".into(), SymbolKind::Function);
        index.symbols.insert("x".into(), SymbolKind::Variable);
        index.functions.insert(
            "f".into(),
            Signature {
                params: vec!["Int".into(), "Str".into()],
                ret: Some("Int".into()),
            },
        );
        index
    }

    #[test]
    fn definition_containment_scan() {
        let index = sample_index();
        assert_eq!(definition_at(&index, 2, 4), Some(loc(0, 4, 5)));
        // end column counts as inside
        assert_eq!(definition_at(&index, 2, 5), Some(loc(0, 4, 5)));
        assert_eq!(definition_at(&index, 2, 9), None);
        assert_eq!(definition_at(&index, 7, 4), None);
    }

    #[test]
    fn hover_variable() {
        let index = sample_index();
        let hover = hover_at(&index, 2, 4).unwrap();
        assert_eq!(hover.signature, "var x: Int");
        assert_eq!(hover.span, LineSpan::new(2, 4, 5));
    }

    #[test]
    fn hover_borrows_richer_definition_signature() {
        let index = sample_index();
        let hover = hover_at(&index, 3, 0).unwrap();
        assert_eq!(hover.signature, "function f(Int, Str): Int");
    }

    #[test]
    fn colon_offers_type_names() {
        let index = sample_index();
        let got = completion_at(&index, 0, "var a:", 6);
        assert!(got.iter().all(|c| c.kind == CandidateKind::TypeName));
        assert!(got.iter().any(|c| c.label == "Int"));
        assert!(got.iter().any(|c| c.label == "String"));
    }

    #[test]
    fn dot_on_inferred_type_includes_inherited_methods() {
        let mut index = DocumentIndex::default();
        index
            .methods
            .entry("A".into())
            .or_default()
            .insert("m".into(), Signature::default());
        index.supers.insert("B".into(), vec!["A".into()]);
        index.methods.entry("B".into()).or_default();
        index.var_types.insert("b".into(), vec!["B".into()]);
        let got = completion_at(&index, 0, "b.", 2);
        assert!(got.iter().any(|c| c.label == "m" && c.kind == CandidateKind::Method));
    }

    #[test]
    fn dot_on_declared_type_merges_predefined_members() {
        let mut index = DocumentIndex::default();
        index.definitions.push(DefinitionEntry {
            kind: SymbolKind::Variable,
            name: "s".into(),
            type_name: Some("Str".into()),
            return_type: None,
            arg_types: vec![],
            location: loc(0, 4, 5),
        });
        let got = completion_at(&index, 2, "s.", 2);
        assert!(got.iter().any(|c| c.label == "subString"));
        assert!(got.iter().any(|c| c.label == "trim"));
    }

    #[test]
    fn dot_resolves_nearest_prior_definition_of_shadowed_name() {
        let mut index = DocumentIndex::default();
        index.definitions.push(DefinitionEntry {
            kind: SymbolKind::Variable,
            name: "x".into(),
            type_name: Some("Str".into()),
            return_type: None,
            arg_types: vec![],
            location: loc(0, 4, 5),
        });
        index.definitions.push(DefinitionEntry {
            kind: SymbolKind::Variable,
            name: "x".into(),
            type_name: Some("Int".into()),
            return_type: None,
            arg_types: vec![],
            location: loc(10, 4, 5),
        });
        // between the two definitions only the Str one is in scope
        let mid = completion_at(&index, 5, "x.", 2);
        assert!(mid.iter().any(|c| c.label == "subString"));
        assert!(!mid.iter().any(|c| c.label == "downto"));
        // past the shadowing definition the Int members win
        let after = completion_at(&index, 12, "x.", 2);
        assert!(after.iter().any(|c| c.label == "downto"));
        assert!(!after.iter().any(|c| c.label == "subString"));
    }

    #[test]
    fn dot_on_bare_builtin_type_name() {
        let index = DocumentIndex::default();
        let got = completion_at(&index, 0, "String.", 7);
        assert!(got.iter().any(|c| c.label == "toUpper"));
    }

    #[test]
    fn dot_on_unknown_receiver_is_empty() {
        let index = DocumentIndex::default();
        assert!(completion_at(&index, 0, "mystery.", 8).is_empty());
    }

    #[test]
    fn fallback_merges_keywords_and_symbols_minus_current_token() {
        let index = sample_index();
        let got = completion_at(&index, 4, "var y = f", 9);
        // `f` is exactly the token being typed: excluded
        assert!(!got.iter().any(|c| c.label == "f"));
        assert!(got.iter().any(|c| c.label == "x"));
        assert!(got.iter().any(|c| c.label == "function" && c.kind == CandidateKind::Keyword));
        // sorted output
        let labels: Vec<_> = got.iter().map(|c| c.label.clone()).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }
}
