/// Symbol kind carried by a `#define` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineKind {
    Var,
    Const,
    Class,
    Module,
    Function,
    Public,
    Private,
    Native,
}

impl DefineKind {
    pub(super) fn parse(field: &str) -> Option<Self> {
        Some(match field {
            "var" => DefineKind::Var,
            "const" => DefineKind::Const,
            "class" => DefineKind::Class,
            "module" => DefineKind::Module,
            "function" => DefineKind::Function,
            "public" => DefineKind::Public,
            "private" => DefineKind::Private,
            "native" => DefineKind::Native,
            _ => return None,
        })
    }
}

/// Reference flavor carried by a `#ref` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Var,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Class,
}

/// Callable marker on a type annotation, e.g. `Function#Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMark {
    Function,
    FunctionRef,
    Native,
}

/// Decoded type annotation field: optional callable mark plus a type name.
///
/// A bare field like `B` (the supertype slot of a class definition) decodes
/// with no mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNote {
    pub mark: Option<CallMark>,
    pub name: String,
}

impl TypeNote {
    pub fn parse(field: &str) -> Self {
        if let Some((head, rest)) = field.split_once('#') {
            let mark = match head {
                "Function" => Some(CallMark::Function),
                "FunctionRef" => Some(CallMark::FunctionRef),
                "Native" => Some(CallMark::Native),
                _ => None,
            };
            if mark.is_some() {
                return Self {
                    mark,
                    name: rest.to_string(),
                };
            }
        }
        Self {
            mark: None,
            name: field.to_string(),
        }
    }

    pub fn callable(&self) -> bool {
        self.mark.is_some()
    }
}

/// One decoded tag line. Line numbers are 0-based from here on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Define {
        kind: DefineKind,
        name: String,
        file: String,
        line: u32,
        note: Option<TypeNote>,
    },
    Ref {
        kind: RefKind,
        name: String,
        file: String,
        line: u32,
        /// Definition site, when the compiler reported one.
        def: Option<(String, u32)>,
        note: Option<TypeNote>,
    },
    Call {
        /// Class-scope prefix of the callee, if any.
        scope: Option<String>,
        name: String,
        file: String,
        line: u32,
        def_file: String,
        def_line: u32,
    },
    CallArg {
        index: usize,
        ty: String,
    },
    CallEnd,
    VarType {
        name: String,
        ty: String,
    },
    ScopeStart {
        kind: ScopeKind,
        name: Option<String>,
    },
    ScopeEnd {
        kind: ScopeKind,
        name: Option<String>,
    },
    Method {
        class: String,
        method: String,
        file: String,
        line: u32,
        start: u32,
        end: u32,
    },
    Arg {
        index: usize,
        ty: String,
    },
}

/// One decoded free-form diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLine {
    /// The full report line; shown to the user verbatim.
    pub message: String,
    /// Subject symbol from the `Symbol(...)` shape, if present.
    pub symbol: Option<String>,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Event(Event),
    Diagnostic(DiagnosticLine),
}
