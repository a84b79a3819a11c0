//! Decoder for the compiler's line-oriented report.
//!
//! Each line is either a tag line (leading `#`, tab-separated fields) or a
//! free-form diagnostic line carrying a `<file>:line` location. Decoding is
//! purely lexical; all state accumulation happens in the index builder.

mod decode;
mod event;

pub use decode::decode_line;
pub use event::{
    CallMark, DefineKind, DiagnosticLine, Event, RefKind, ReportLine, ScopeKind, TypeNote,
};
