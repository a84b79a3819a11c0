//! Semantic indexing engine for the Karu language.
//!
//! The engine turns the line-oriented report of the external `karu` compiler
//! into per-document semantic state: diagnostics, definitions, references,
//! call-argument types, inheritance, and completion data. Everything is
//! rebuilt from scratch on each edit; the `lsp` crate owns the transport.

pub mod builtins;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod query;
pub mod report;
pub mod source;
pub mod store;

pub use error::IndexError;
pub use index::{DocumentIndex, IndexBuilder, IndexOutput};
