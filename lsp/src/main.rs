//! Language server for Karu over stdio.
//!
//! The process is a thin transport around the `karu` engine: notifications
//! schedule background reindex passes, requests answer from the last
//! successfully installed pass. Logging goes to stderr because stdout
//! carries the protocol.

use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use lsp_server::{Connection, ExtractError, Message, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument,
    Notification as _, PublishDiagnostics,
};
use lsp_types::request::{Completion, GotoDefinition, HoverRequest, SemanticTokensFullRequest};
use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionOptions, CompletionResponse,
    DiagnosticSeverity, GotoDefinitionResponse, Hover, HoverContents, HoverProviderCapability,
    InitializeParams, LanguageString, MarkedString, OneOf, Position, PublishDiagnosticsParams,
    Range, SemanticToken, SemanticTokenType, SemanticTokens, SemanticTokensFullOptions,
    SemanticTokensLegend, SemanticTokensOptions, SemanticTokensServerCapabilities,
    ServerCapabilities, TextDocumentSyncCapability, TextDocumentSyncKind, Uri,
};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;

use karu::IndexError;
use karu::compiler::{CompilerConfig, analyze};
use karu::diagnostics::Severity;
use karu::index::{IndexOutput, LineSpan};
use karu::query::{self, CandidateKind};
use karu::store::{DocumentStore, Ticket};

fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;
    log::info!("Karu LSP starting...");

    let (connection, io_threads) = Connection::stdio();

    let server_capabilities = serde_json::to_value(&ServerCapabilities {
        // full sync: every change carries the whole document, which is what
        // the compile-over-stdin pipeline wants anyway
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        definition_provider: Some(OneOf::Left(true)),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec![".".to_string(), ":".to_string()]),
            ..Default::default()
        }),
        semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
            SemanticTokensOptions {
                legend: SemanticTokensLegend {
                    token_types: vec![
                        SemanticTokenType::new("unused"),
                        SemanticTokenType::new("used"),
                    ],
                    token_modifiers: vec![],
                },
                full: Some(SemanticTokensFullOptions::Bool(true)),
                ..Default::default()
            },
        )),
        ..Default::default()
    })?;

    let initialization_params = connection.initialize(server_capabilities)?;
    main_loop(connection, initialization_params)?;
    io_threads.join()?;

    log::info!("Karu LSP shutting down");
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Settings {
    compiler_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compiler_path: "karu".to_string(),
        }
    }
}

/// Client configuration as sent by `workspace/didChangeConfiguration`,
/// sectioned under the language key.
#[derive(Debug, Deserialize)]
struct ConfigSections {
    #[serde(default)]
    karu: Option<Settings>,
}

/// Result of one background reindex pass, sent back to the main loop.
struct IndexedDocument {
    uri: Uri,
    ticket: Ticket,
    result: Result<IndexOutput, IndexError>,
}

struct ServerState {
    config: CompilerConfig,
    store: DocumentStore,
    /// Current text of every open document, keyed by URI string. Needed for
    /// completion, which inspects the line being typed.
    texts: HashMap<String, String>,
    results: Sender<IndexedDocument>,
}

fn main_loop(connection: Connection, params: Value) -> Result<(), Box<dyn Error + Sync + Send>> {
    let init: InitializeParams = serde_json::from_value(params)?;
    let settings = init
        .initialization_options
        .and_then(|v| serde_json::from_value::<Settings>(v).ok())
        .unwrap_or_default();
    log::info!("using compiler '{}'", settings.compiler_path);

    let (results, finished): (Sender<IndexedDocument>, Receiver<IndexedDocument>) = unbounded();
    let mut state = ServerState {
        config: CompilerConfig {
            command: settings.compiler_path,
        },
        store: DocumentStore::new(),
        texts: HashMap::new(),
        results,
    };

    loop {
        select! {
            recv(connection.receiver) -> msg => {
                let Ok(msg) = msg else { return Ok(()); };
                match msg {
                    Message::Request(req) => {
                        if connection.handle_shutdown(&req)? {
                            return Ok(());
                        }
                        handle_request(&connection, &state, req)?;
                    }
                    Message::Notification(not) => handle_notification(&connection, &mut state, not)?,
                    Message::Response(_) => {}
                }
            }
            recv(finished) -> done => {
                let Ok(done) = done else { continue; };
                finish_reindex(&connection, &mut state, done)?;
            }
        }
    }
}

fn handle_request(
    connection: &Connection,
    state: &ServerState,
    req: Request,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let id = req.id.clone();
    let req = match cast::<GotoDefinition>(req) {
        Casted::Match(id, params) => {
            let pos = params.text_document_position_params;
            let result = state
                .store
                .get(pos.text_document.uri.as_str())
                .and_then(|out| {
                    query::definition_at(&out.index, pos.position.line, pos.position.character)
                })
                .and_then(|loc| {
                    Some(GotoDefinitionResponse::Scalar(lsp_types::Location {
                        uri: path_to_uri(&loc.path)?,
                        range: to_range(loc.span),
                    }))
                });
            return reply(connection, id, result);
        }
        Casted::Mismatch(req) => req,
        Casted::Invalid(message) => return invalid_params(connection, id, message),
    };
    let req = match cast::<HoverRequest>(req) {
        Casted::Match(id, params) => {
            let pos = params.text_document_position_params;
            let result = state
                .store
                .get(pos.text_document.uri.as_str())
                .and_then(|out| {
                    query::hover_at(&out.index, pos.position.line, pos.position.character)
                })
                .map(|info| Hover {
                    contents: HoverContents::Scalar(MarkedString::LanguageString(
                        LanguageString {
                            language: "karu".to_string(),
                            value: info.signature,
                        },
                    )),
                    range: Some(to_range(info.span)),
                });
            return reply(connection, id, result);
        }
        Casted::Mismatch(req) => req,
        Casted::Invalid(message) => return invalid_params(connection, id, message),
    };
    let req = match cast::<Completion>(req) {
        Casted::Match(id, params) => {
            let pos = params.text_document_position;
            let uri = pos.text_document.uri.as_str();
            let result = state.store.get(uri).map(|out| {
                let line = state
                    .texts
                    .get(uri)
                    .and_then(|text| text.lines().nth(pos.position.line as usize))
                    .unwrap_or("");
                let items =
                    query::completion_at(&out.index, pos.position.line, line, pos.position.character)
                    .into_iter()
                    .map(|c| CompletionItem {
                        label: c.label,
                        kind: Some(completion_kind(c.kind)),
                        detail: c.detail,
                        ..Default::default()
                    })
                    .collect();
                CompletionResponse::Array(items)
            });
            return reply(connection, id, result);
        }
        Casted::Mismatch(req) => req,
        Casted::Invalid(message) => return invalid_params(connection, id, message),
    };
    let req = match cast::<SemanticTokensFullRequest>(req) {
        Casted::Match(id, params) => {
            let result = state
                .store
                .get(params.text_document.uri.as_str())
                .map(|out| SemanticTokens {
                    result_id: None,
                    data: encode_tokens(&out.unused, &out.used),
                });
            return reply(connection, id, result);
        }
        Casted::Mismatch(req) => req,
        Casted::Invalid(message) => return invalid_params(connection, id, message),
    };

    let resp = Response::new_err(
        req.id,
        lsp_server::ErrorCode::MethodNotFound as i32,
        format!("unsupported request: {}", req.method),
    );
    connection.sender.send(Message::Response(resp))?;
    Ok(())
}

fn handle_notification(
    connection: &Connection,
    state: &mut ServerState,
    not: Notification,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let not = match cast_note::<DidOpenTextDocument>(not) {
        CastedNote::Match(params) => {
            let doc = params.text_document;
            schedule_reindex(state, doc.uri, doc.text);
            return Ok(());
        }
        CastedNote::Mismatch(not) => not,
        CastedNote::Invalid => return Ok(()),
    };
    let not = match cast_note::<DidChangeTextDocument>(not) {
        CastedNote::Match(mut params) => {
            // full sync: the last change carries the whole document
            if let Some(change) = params.content_changes.pop() {
                schedule_reindex(state, params.text_document.uri, change.text);
            }
            return Ok(());
        }
        CastedNote::Mismatch(not) => not,
        CastedNote::Invalid => return Ok(()),
    };
    let not = match cast_note::<DidCloseTextDocument>(not) {
        CastedNote::Match(params) => {
            let uri = params.text_document.uri;
            state.texts.remove(uri.as_str());
            state.store.remove(uri.as_str());
            publish_diagnostics(connection, uri, Vec::new())?;
            return Ok(());
        }
        CastedNote::Mismatch(not) => not,
        CastedNote::Invalid => return Ok(()),
    };
    match cast_note::<DidChangeConfiguration>(not) {
        CastedNote::Match(params) => {
            let settings = serde_json::from_value::<ConfigSections>(params.settings.clone())
                .ok()
                .and_then(|s| s.karu)
                .or_else(|| serde_json::from_value::<Settings>(params.settings).ok());
            if let Some(settings) = settings {
                log::info!("compiler changed to '{}'", settings.compiler_path);
                state.config.command = settings.compiler_path;
                // settings affect the compile, so every open document gets
                // a fresh pass
                let open: Vec<String> = state.texts.keys().cloned().collect();
                for uri in open {
                    if let (Ok(uri), Some(text)) =
                        (Uri::from_str(&uri), state.texts.get(&uri).cloned())
                    {
                        schedule_reindex(state, uri, text);
                    }
                }
            }
        }
        CastedNote::Mismatch(not) => log::debug!("ignored notification: {}", not.method),
        CastedNote::Invalid => {}
    }
    Ok(())
}

/// Kicks off a reindex pass on its own thread. The result comes back over
/// the channel and is dropped there if a newer ticket exists by then.
fn schedule_reindex(state: &mut ServerState, uri: Uri, text: String) {
    let key = uri.as_str().to_string();
    state.texts.insert(key.clone(), text.clone());
    let ticket = state.store.begin(&key);

    let path = uri_to_path(&uri);
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled.k")
        .to_string();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = state.config.clone();
    let tx = state.results.clone();
    thread::spawn(move || {
        let result = analyze(&config, &text, &file_name, &dir);
        let _ = tx.send(IndexedDocument {
            uri,
            ticket,
            result,
        });
    });
}

fn finish_reindex(
    connection: &Connection,
    state: &mut ServerState,
    done: IndexedDocument,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let key = done.uri.as_str().to_string();
    match done.result {
        Ok(output) => {
            let diagnostics: Vec<_> = output.diagnostics.iter().map(to_lsp_diagnostic).collect();
            if state.store.apply(&key, done.ticket, output) {
                publish_diagnostics(connection, done.uri, diagnostics)?;
            } else {
                log::debug!("stale pass for {key} dropped");
            }
        }
        // keep the previous index and diagnostics on failure
        Err(err) => log::error!("reindex of {key} failed: {err}"),
    }
    Ok(())
}

fn publish_diagnostics(
    connection: &Connection,
    uri: Uri,
    diagnostics: Vec<lsp_types::Diagnostic>,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let params = PublishDiagnosticsParams {
        uri,
        diagnostics,
        version: None,
    };
    connection.sender.send(Message::Notification(Notification {
        method: PublishDiagnostics::METHOD.to_string(),
        params: serde_json::to_value(params)?,
    }))?;
    Ok(())
}

fn invalid_params(
    connection: &Connection,
    id: RequestId,
    message: String,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    let resp = Response::new_err(id, lsp_server::ErrorCode::InvalidParams as i32, message);
    connection.sender.send(Message::Response(resp))?;
    Ok(())
}

fn reply<T: serde::Serialize>(
    connection: &Connection,
    id: RequestId,
    result: T,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    connection
        .sender
        .send(Message::Response(Response::new_ok(id, result)))?;
    Ok(())
}

fn to_range(span: LineSpan) -> Range {
    Range::new(
        Position::new(span.line, span.start),
        Position::new(span.line, span.end),
    )
}

fn to_lsp_diagnostic(d: &karu::diagnostics::Diagnostic) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: to_range(d.span),
        severity: Some(match d.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        }),
        source: Some(d.source.to_string()),
        message: d.message.clone(),
        ..Default::default()
    }
}

fn completion_kind(kind: CandidateKind) -> CompletionItemKind {
    match kind {
        CandidateKind::TypeName | CandidateKind::Class => CompletionItemKind::CLASS,
        CandidateKind::Keyword => CompletionItemKind::KEYWORD,
        CandidateKind::Method => CompletionItemKind::METHOD,
        CandidateKind::Variable => CompletionItemKind::VARIABLE,
        CandidateKind::Function => CompletionItemKind::FUNCTION,
        CandidateKind::Const => CompletionItemKind::CONSTANT,
        CandidateKind::Keyname => CompletionItemKind::PROPERTY,
    }
}

/// Characters escaped in the path component of a `file://` URI.
const URI_PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'#')
    .add(b'%');

fn uri_to_path(uri: &Uri) -> PathBuf {
    let decoded = percent_decode_str(uri.path().as_str()).decode_utf8_lossy();
    PathBuf::from(decoded.as_ref())
}

fn path_to_uri(path: &Path) -> Option<Uri> {
    let display = path.display().to_string();
    let encoded = utf8_percent_encode(&display, URI_PATH_SET);
    Uri::from_str(&format!("file://{encoded}")).ok()
}

/// Delta-encodes the highlight spans per the semantic tokens wire format.
/// Zero-width spans are dropped, everything else is sorted by position.
fn encode_tokens(unused: &[LineSpan], used: &[LineSpan]) -> Vec<SemanticToken> {
    let mut spans: Vec<(LineSpan, u32)> = unused
        .iter()
        .map(|s| (*s, 0))
        .chain(used.iter().map(|s| (*s, 1)))
        .filter(|(s, _)| s.end > s.start)
        .collect();
    spans.sort_by_key(|(s, _)| (s.line, s.start));

    let mut data = Vec::with_capacity(spans.len());
    let (mut prev_line, mut prev_start) = (0, 0);
    for (span, token_type) in spans {
        let delta_line = span.line - prev_line;
        let delta_start = if delta_line == 0 {
            span.start - prev_start
        } else {
            span.start
        };
        data.push(SemanticToken {
            delta_line,
            delta_start,
            length: span.end - span.start,
            token_type,
            token_modifiers_bitset: 0,
        });
        prev_line = span.line;
        prev_start = span.start;
    }
    data
}

/// Outcome of narrowing a request to one concrete method.
enum Casted<P> {
    Match(RequestId, P),
    Mismatch(Request),
    /// Recognized method, undeserializable params.
    Invalid(String),
}

fn cast<R>(req: Request) -> Casted<R::Params>
where
    R: lsp_types::request::Request,
    R::Params: serde::de::DeserializeOwned,
{
    match req.extract(R::METHOD) {
        Ok((id, params)) => Casted::Match(id, params),
        Err(ExtractError::MethodMismatch(req)) => Casted::Mismatch(req),
        Err(ExtractError::JsonError { method, error }) => {
            Casted::Invalid(format!("invalid {method} params: {error}"))
        }
    }
}

enum CastedNote<P> {
    Match(P),
    Mismatch(Notification),
    Invalid,
}

fn cast_note<N>(not: Notification) -> CastedNote<N::Params>
where
    N: lsp_types::notification::Notification,
    N::Params: serde::de::DeserializeOwned,
{
    match not.extract(N::METHOD) {
        Ok(params) => CastedNote::Match(params),
        Err(ExtractError::MethodMismatch(not)) => CastedNote::Mismatch(not),
        Err(ExtractError::JsonError { method, error }) => {
            log::warn!("dropping {method} notification with invalid params: {error}");
            CastedNote::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_encoding_is_delta_based() {
        let unused = vec![LineSpan::new(0, 4, 5)];
        let used = vec![LineSpan::new(0, 8, 10), LineSpan::new(2, 1, 3)];
        let data = encode_tokens(&unused, &used);
        assert_eq!(data.len(), 3);
        assert_eq!((data[0].delta_line, data[0].delta_start, data[0].length), (0, 4, 1));
        assert_eq!(data[0].token_type, 0);
        assert_eq!((data[1].delta_line, data[1].delta_start, data[1].length), (0, 4, 2));
        assert_eq!(data[1].token_type, 1);
        assert_eq!((data[2].delta_line, data[2].delta_start, data[2].length), (2, 1, 2));
    }

    #[test]
    fn zero_width_spans_are_dropped() {
        let data = encode_tokens(&[LineSpan::new(1, 3, 3)], &[]);
        assert!(data.is_empty());
    }

    #[test]
    fn path_round_trips_through_uri() {
        let uri = path_to_uri(Path::new("/proj/main.k")).unwrap();
        assert_eq!(uri.as_str(), "file:///proj/main.k");
        assert_eq!(uri_to_path(&uri), PathBuf::from("/proj/main.k"));
    }

    #[test]
    fn uri_path_percent_coding_round_trips() {
        let uri = path_to_uri(Path::new("/proj/my file.k")).unwrap();
        assert_eq!(uri.as_str(), "file:///proj/my%20file.k");
        assert_eq!(uri_to_path(&uri), PathBuf::from("/proj/my file.k"));

        let incoming = Uri::from_str("file:///proj/my%20file.k").unwrap();
        assert_eq!(uri_to_path(&incoming), PathBuf::from("/proj/my file.k"));
    }

    #[test]
    fn recognized_request_with_bad_params_is_invalid_not_fatal() {
        let req = Request {
            id: RequestId::from(7),
            method: "textDocument/definition".to_string(),
            params: serde_json::json!("garbage"),
        };
        match cast::<GotoDefinition>(req) {
            Casted::Invalid(message) => assert!(message.contains("textDocument/definition")),
            _ => panic!("expected invalid params"),
        }
    }

    #[test]
    fn recognized_notification_with_bad_params_is_dropped() {
        let not = Notification {
            method: "textDocument/didOpen".to_string(),
            params: serde_json::json!(42),
        };
        assert!(matches!(
            cast_note::<DidOpenTextDocument>(not),
            CastedNote::Invalid
        ));
    }

    #[test]
    fn settings_default_and_rename() {
        let s: Settings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(s.compiler_path, "karu");
        let s: Settings =
            serde_json::from_value(serde_json::json!({"compilerPath": "/opt/karu"})).unwrap();
        assert_eq!(s.compiler_path, "/opt/karu");
    }

    #[test]
    fn sectioned_configuration_parses() {
        let v = serde_json::json!({"karu": {"compilerPath": "/usr/bin/karu"}});
        let s: ConfigSections = serde_json::from_value(v).unwrap();
        assert_eq!(s.karu.unwrap().compiler_path, "/usr/bin/karu");
    }
}
