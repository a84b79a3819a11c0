//! Drives the `karu` compiler subprocess and captures its report.
//!
//! The source text is piped over stdin followed by a sentinel line, so the
//! on-disk file is never touched. Stdout carries the tag/diagnostic report;
//! stderr is appended to it because the compiler splits its output between
//! the two.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::IndexError;
use crate::index::{IndexBuilder, IndexOutput};

/// Terminates the stdin stream; the compiler stops reading at this line.
pub const END_SENTINEL: &str = "__END__";

const COMPILE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Compiler executable, resolved through `PATH` unless absolute.
    pub command: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: "karu".to_string(),
        }
    }
}

/// One full pass: compile the text, then rebuild the document index from
/// the report.
pub fn analyze(
    config: &CompilerConfig,
    text: &str,
    file_name: &str,
    dir: &Path,
) -> Result<IndexOutput, IndexError> {
    let report = run_compiler(config, text, file_name, dir)?;
    IndexBuilder::new(text, file_name, dir).run(&report)
}

/// Runs the compiler in check mode and returns its combined output.
///
/// A pass that outlives the timeout is killed and fails with
/// [`IndexError::Timeout`].
pub fn run_compiler(
    config: &CompilerConfig,
    source: &str,
    file_name: &str,
    workdir: &Path,
) -> Result<String, IndexError> {
    let mut child = Command::new(&config.command)
        .arg("-ic")
        .arg("--output-location")
        .arg("--error-code=0")
        .arg(format!("--filename={file_name}"))
        .arg(format!("--workdir={}", workdir.display()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| IndexError::Spawn {
            command: config.command.clone(),
            source,
        })?;

    // writer and reader threads keep the pipes drained so neither side can
    // block the other
    let payload = format!("{source}\n{END_SENTINEL}\n");
    if let Some(mut stdin) = child.stdin.take() {
        thread::spawn(move || {
            // a compiler that exits early just breaks the pipe
            let _ = stdin.write_all(payload.as_bytes());
        });
    }
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || read_all(stdout));
    let err_reader = thread::spawn(move || read_all(stderr));

    wait_with_timeout(&mut child)?;

    let mut report = out_reader.join().unwrap_or_default();
    let trailing = err_reader.join().unwrap_or_default();
    if !trailing.is_empty() {
        if !report.is_empty() && !report.ends_with('\n') {
            report.push('\n');
        }
        report.push_str(&trailing);
    }
    Ok(report)
}

fn wait_with_timeout(child: &mut Child) -> Result<(), IndexError> {
    let deadline = Instant::now() + COMPILE_TIMEOUT;
    loop {
        match child.try_wait()? {
            Some(_) => return Ok(()),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IndexError::Timeout(COMPILE_TIMEOUT));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

fn read_all<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}
