use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostic, SOURCE_TYPE_CHECK, ordinal};
use crate::error::IndexError;
use crate::report::{DefineKind, Event, ReportLine, ScopeKind, TypeNote, decode_line};
use crate::source::{SeenMap, SourceBuffer};

use super::{
    DefinitionEntry, DocumentIndex, LineSpan, Location, ReferenceEntry, Signature, SymbolKind,
    UsageCounter,
};

/// Result of one full reindex pass over a compiler report.
#[derive(Debug, Clone)]
pub struct IndexOutput {
    pub index: DocumentIndex,
    pub diagnostics: Vec<Diagnostic>,
    /// Definition spans with no resolved reference, for highlighting.
    pub unused: Vec<LineSpan>,
    /// Reference occurrence spans, for highlighting.
    pub used: Vec<LineSpan>,
}

struct ScopeFrame {
    kind: ScopeKind,
    name: Option<String>,
}

/// Transient state of one `#call` ... `#callend` pair. Kept on a stack so
/// nested call events pair up correctly.
struct CallFrame {
    callee: String,
    declared: Vec<String>,
    actual: Vec<Option<String>>,
    /// Anchor for argument-type diagnostics; `None` when the call site is
    /// outside the active document.
    site: Option<LineSpan>,
}

/// Consumes the decoded event stream in report order, threading scope-stack
/// and pending-call state, and produces the document's index, diagnostics,
/// and highlight spans.
pub struct IndexBuilder {
    pub(super) src: SourceBuffer,
    pub(super) file_name: String,
    pub(super) dir: PathBuf,
    /// Path of the active document itself, `dir`/`file_name`.
    pub(super) doc_path: PathBuf,
    pub(super) seen: SeenMap,
    pub(super) index: DocumentIndex,
    pub(super) diagnostics: Vec<Diagnostic>,
    scopes: Vec<ScopeFrame>,
    /// Parameter lists under construction, keyed by scope path: `#arg`
    /// events between a scope start and the matching `#define` land here.
    pending_args: HashMap<String, Vec<String>>,
    calls: Vec<CallFrame>,
}

impl IndexBuilder {
    pub fn new(text: &str, file_name: &str, dir: &Path) -> Self {
        Self {
            src: SourceBuffer::new(text),
            file_name: file_name.to_string(),
            dir: dir.to_path_buf(),
            doc_path: dir.join(file_name),
            seen: SeenMap::default(),
            index: DocumentIndex::default(),
            diagnostics: Vec::new(),
            scopes: Vec::new(),
            pending_args: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Runs the whole pass: decode each report line, apply events in order,
    /// translate diagnostic lines, then derive unused-declaration warnings.
    pub fn run(mut self, report: &str) -> Result<IndexOutput, IndexError> {
        for line in report.lines() {
            match decode_line(line) {
                Some(ReportLine::Event(event)) => self.apply(event)?,
                Some(ReportLine::Diagnostic(diag)) => self.translate(diag),
                None => {}
            }
        }
        Ok(self.finish())
    }

    fn apply(&mut self, event: Event) -> Result<(), IndexError> {
        match event {
            Event::ScopeStart { kind, name } => {
                self.scopes.push(ScopeFrame { kind, name });
                self.pending_args.insert(self.scope_path(), Vec::new());
            }
            Event::ScopeEnd { .. } => {
                self.pending_args.remove(&self.scope_path());
                self.scopes.pop();
            }
            Event::Arg { index, ty } => {
                let path = self.scope_path();
                let slot = self.pending_args.entry(path).or_default();
                while slot.len() <= index {
                    slot.push("Any".to_string());
                }
                if !ty.is_empty() {
                    slot[index] = ty;
                }
            }
            Event::Define {
                kind,
                name,
                file,
                line,
                note,
            } => self.on_define(kind, name, file, line, note),
            Event::Ref {
                name,
                file,
                line,
                def,
                note,
                ..
            } => self.on_ref(name, file, line, def, note)?,
            Event::Call {
                scope,
                name,
                file,
                line,
                def_file,
                def_line,
            } => self.on_call(scope, name, file, line, def_file, def_line)?,
            Event::CallArg { index, ty } => {
                if let Some(frame) = self.calls.last_mut() {
                    while frame.actual.len() <= index {
                        frame.actual.push(None);
                    }
                    frame.actual[index] = Some(if ty.is_empty() { "Any".to_string() } else { ty });
                }
            }
            Event::CallEnd => self.on_call_end(),
            Event::VarType { name, ty } => {
                let observed = self.index.var_types.entry(name).or_default();
                if !observed.contains(&ty) {
                    observed.push(ty);
                }
            }
            Event::Method {
                class,
                method,
                file,
                line,
                start,
                end,
            } => self.on_method(class, method, file, line, start, end),
        }
        Ok(())
    }

    fn scope_path(&self) -> String {
        self.scopes
            .iter()
            .map(|f| f.name.as_deref().unwrap_or("_"))
            .collect::<Vec<_>>()
            .join("#")
    }

    fn innermost_class(&self) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find(|f| f.kind == ScopeKind::Class)
            .and_then(|f| f.name.clone())
    }

    fn on_define(
        &mut self,
        kind: DefineKind,
        name: String,
        file: String,
        line: u32,
        note: Option<TypeNote>,
    ) {
        let sym_kind = match kind {
            DefineKind::Var => SymbolKind::Variable,
            DefineKind::Const => SymbolKind::Const,
            DefineKind::Class | DefineKind::Module => SymbolKind::Class,
            _ => SymbolKind::Function,
        };
        let is_method_kind = matches!(kind, DefineKind::Public | DefineKind::Private);
        let takes_args = !matches!(kind, DefineKind::Var | DefineKind::Const);
        let args = if takes_args {
            self.pending_args
                .remove(&self.scope_path())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let (type_name, return_type) = match (&note, sym_kind) {
            (Some(n), SymbolKind::Function) => (None, Some(n.name.clone())),
            (Some(n), _) => (Some(n.name.clone()), None),
            (None, _) => (None, None),
        };

        // class with a declared supertype adds an inheritance edge
        if sym_kind == SymbolKind::Class {
            if let Some(n) = &note {
                if !n.name.is_empty() {
                    let sups = self.index.supers.entry(name.clone()).or_default();
                    if !sups.contains(&n.name) {
                        sups.push(n.name.clone());
                    }
                }
            }
        }

        let enclosing_class = self.innermost_class();
        if is_method_kind {
            if let Some(class) = &enclosing_class {
                self.index.methods.entry(class.clone()).or_default().insert(
                    name.clone(),
                    Signature {
                        params: args.clone(),
                        ret: return_type.clone(),
                    },
                );
            }
        }
        if enclosing_class.is_none() {
            self.index.symbols.insert(name.clone(), sym_kind);
            if sym_kind == SymbolKind::Function {
                self.index.functions.insert(
                    name.clone(),
                    Signature {
                        params: args.clone(),
                        ret: return_type.clone(),
                    },
                );
            }
        }

        // ranges and usage counters exist only for the document's own file
        if file != self.file_name {
            return;
        }

        // Protocol quirk: a public method declaration may emit a throwaway
        // variable definition first; the method entry replaces it, reusing
        // its span (the variable's search already consumed the occurrence).
        let mut replaced_span = None;
        if is_method_kind
            && self
                .index
                .definitions
                .last()
                .is_some_and(|d| d.name == name && d.kind == SymbolKind::Variable)
        {
            if let Some(removed) = self.index.definitions.pop() {
                self.index
                    .usage
                    .remove(&(name.clone(), removed.location.span.line));
                replaced_span = Some(removed.location.span);
            }
        }

        let resolved = match replaced_span {
            Some(span) if span.line == line => Some((span.start, span.end)),
            _ => self.src.find_word(&name, line, true, &mut self.seen),
        };
        let Some((start, end)) = resolved else {
            return;
        };
        let location = Location {
            path: self.doc_path.clone(),
            span: LineSpan::new(line, start, end),
        };
        let entry = DefinitionEntry {
            kind: sym_kind,
            name: name.clone(),
            type_name,
            return_type,
            arg_types: args,
            location: location.clone(),
        };
        if let Some(pos) = self
            .index
            .definitions
            .iter()
            .position(|d| d.name == name && d.location.span.line == line)
        {
            self.index.definitions[pos] = entry;
        } else {
            self.index.definitions.push(entry);
        }
        // variables start unused; a function declaration counts as its own
        // use; classes and consts are never flagged
        let seed = match sym_kind {
            SymbolKind::Variable => Some(0),
            SymbolKind::Function => Some(1),
            _ => None,
        };
        if let Some(count) = seed {
            self.index.usage.insert(
                (name.clone(), line),
                UsageCounter {
                    name,
                    count,
                    location,
                },
            );
        }
    }

    fn on_ref(
        &mut self,
        name: String,
        file: String,
        line: u32,
        def: Option<(String, u32)>,
        note: Option<TypeNote>,
    ) -> Result<(), IndexError> {
        if file != self.file_name {
            return Ok(());
        }
        let Some((start, end)) = self.src.find_word(&name, line, true, &mut self.seen) else {
            return Ok(());
        };
        let definition = match def {
            Some((def_file, def_line)) => {
                let resolved = self.resolve_definition_site(&name, &def_file, def_line, true)?;
                if resolved.is_none() {
                    // both sides must resolve for a usable reference
                    return Ok(());
                }
                resolved
            }
            None => None,
        };
        self.index.references.push(ReferenceEntry {
            name,
            type_name: note.as_ref().map(|n| n.name.clone()),
            callable: note.as_ref().is_some_and(|n| n.callable()),
            arg_types: Vec::new(),
            location: Location {
                path: self.doc_path.clone(),
                span: LineSpan::new(line, start, end),
            },
            definition,
        });
        Ok(())
    }

    /// Resolves the definition side of a reference: in the active document
    /// without consuming the occurrence, or by reading the referenced file
    /// from disk. A failed read fails the whole pass.
    fn resolve_definition_site(
        &mut self,
        name: &str,
        def_file: &str,
        def_line: u32,
        bump_usage: bool,
    ) -> Result<Option<Location>, IndexError> {
        if def_file == self.file_name {
            let Some((start, end)) = self.src.find_word(name, def_line, false, &mut self.seen)
            else {
                return Ok(None);
            };
            if bump_usage {
                if let Some(counter) = self.index.usage.get_mut(&(name.to_string(), def_line)) {
                    counter.count += 1;
                }
            }
            return Ok(Some(Location {
                path: self.doc_path.clone(),
                span: LineSpan::new(def_line, start, end),
            }));
        }
        let path = self.locate_file(def_file);
        let text = fs::read_to_string(&path).map_err(|source| IndexError::ReadSource {
            path: path.clone(),
            source,
        })?;
        let buffer = SourceBuffer::new(&text);
        let mut scratch = SeenMap::default();
        Ok(buffer
            .find_word(name, def_line, false, &mut scratch)
            .map(|(start, end)| Location {
                path,
                span: LineSpan::new(def_line, start, end),
            }))
    }

    /// Candidate path under the working directory, or the raw string when
    /// nothing exists there.
    fn locate_file(&self, candidate: &str) -> PathBuf {
        let derived = self.dir.join(candidate);
        if derived.exists() {
            derived
        } else {
            PathBuf::from(candidate)
        }
    }

    fn on_call(
        &mut self,
        scope: Option<String>,
        name: String,
        file: String,
        line: u32,
        def_file: String,
        def_line: u32,
    ) -> Result<(), IndexError> {
        let signature = match &scope {
            Some(scope) => {
                let class = scope.rsplit('#').next().unwrap_or(scope);
                self.index.find_method(class, &name).cloned()
            }
            None => self.index.functions.get(&name).cloned(),
        };
        let declared = signature
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();
        let return_type = signature.and_then(|s| s.ret);

        let mut site = None;
        if file == self.file_name {
            if let Some((start, end)) = self.src.find_word(&name, line, true, &mut self.seen) {
                let span = LineSpan::new(line, start, end);
                site = Some(span);
                let definition =
                    self.resolve_definition_site(&name, &def_file, def_line, false)?;
                self.index.references.push(ReferenceEntry {
                    name: name.clone(),
                    type_name: return_type,
                    callable: true,
                    arg_types: declared.clone(),
                    location: Location {
                        path: self.doc_path.clone(),
                        span,
                    },
                    definition,
                });
            } else {
                // anchor on the statement when the callee text is not
                // searchable (already consumed, or synthesized)
                site = self
                    .src
                    .line_extent(line)
                    .map(|(start, end)| LineSpan::new(line, start, end));
            }
        }
        self.calls.push(CallFrame {
            callee: name,
            declared,
            actual: Vec::new(),
            site,
        });
        Ok(())
    }

    fn on_call_end(&mut self) {
        let Some(frame) = self.calls.pop() else {
            return;
        };
        let observed: Vec<String> = frame.actual.iter().flatten().cloned().collect();
        if !observed.is_empty() {
            self.index
                .call_args
                .entry(frame.callee.clone())
                .or_default()
                .extend(observed);
        }
        let Some(site) = frame.site else {
            return;
        };
        for (i, actual) in frame.actual.iter().enumerate() {
            let (Some(actual), Some(declared)) = (actual.as_ref(), frame.declared.get(i)) else {
                continue;
            };
            if declared == actual || is_wildcard(declared) || is_wildcard(actual) {
                continue;
            }
            self.diagnostics.push(Diagnostic::warning(
                site,
                format!(
                    "The {} argument type is mismatched: {} is expected but {} is given.",
                    ordinal(i + 1),
                    declared,
                    actual
                ),
                SOURCE_TYPE_CHECK,
            ));
        }
    }

    fn on_method(
        &mut self,
        class: String,
        method: String,
        file: String,
        line: u32,
        start: u32,
        end: u32,
    ) {
        if file != self.file_name {
            return;
        }
        let signature = self.index.find_method(&class, &method).cloned();
        self.index.references.push(ReferenceEntry {
            name: method,
            type_name: signature.as_ref().and_then(|s| s.ret.clone()),
            callable: true,
            arg_types: signature.map(|s| s.params).unwrap_or_default(),
            location: Location {
                path: self.doc_path.clone(),
                span: LineSpan::new(line, start, end),
            },
            definition: None,
        });
    }
}

fn is_wildcard(ty: &str) -> bool {
    ty == "Any" || ty == "-"
}
