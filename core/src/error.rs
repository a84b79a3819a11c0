use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that abort a single reindex pass.
///
/// The caller keeps the previous index and diagnostics for the document when
/// one of these surfaces, so transient compiler trouble never flashes a
/// "no errors" state at the editor.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to launch compiler '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("compiler did not finish within {0:?}")]
    Timeout(Duration),

    #[error("compiler i/o failed: {0}")]
    CompilerIo(#[from] io::Error),

    #[error("failed to read referenced source '{path}': {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
