//! Maps protocol methods of a bound session onto commands.
//!
//! Requests become [`Command`]s run by the [`AsyncExecutor`]; their
//! responses are sent from the worker that finished them. Document
//! notifications are applied synchronously on the dispatch thread so they
//! stay ordered relative to everything the client sends after them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use harbor_core::model::DefinitionKind;
use harbor_core::{CancellationToken, ExecutorContext, NormalizedPath, Project};
use lsp_server::{ErrorCode, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    DidChangeConfiguration, DidChangeTextDocument, DidChangeWatchedFiles, DidCloseTextDocument,
    DidOpenTextDocument, DidRenameFiles, DidSaveTextDocument, Notification as _,
};
use lsp_types::request::{
    CodeActionRequest, CodeActionResolveRequest, Completion, DocumentHighlightRequest,
    DocumentSymbolRequest, Formatting, GotoDefinition, GotoImplementation, GotoTypeDefinition,
    HoverRequest, OnTypeFormatting, RangeFormatting, References, Rename, Request as _,
    ResolveCompletionItem, SignatureHelpRequest, WorkspaceSymbolRequest,
};
use lsp_types::{
    DocumentSymbolResponse, Position, TextDocumentPositionParams, Uri, WorkspaceSymbolResponse,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::Client;
use crate::commands::{self, CodeActionData, Command};
use crate::completion::CompletionCache;
use crate::convert;
use crate::documents::ManagedDocuments;
use crate::error::{CommandError, DocumentError};
use crate::executor::{AsyncExecutor, ExecutionRequest};
use crate::ext::{ClassFileContents, Runnables};
use crate::publish::IndexStatusNotifier;
use crate::symbols::WorkspaceSymbolSearch;

/// URIs of this scheme are console output, never backed by a file.
const OUTPUT_SCHEME: &str = "output:";

pub struct Router {
    client: Client,
    executor: AsyncExecutor,
    project: Arc<dyn Project>,
    documents: Arc<ManagedDocuments>,
    completion: Arc<CompletionCache>,
    index_status: Arc<IndexStatusNotifier>,
    symbols: WorkspaceSymbolSearch,
    cancellation_handles: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
}

impl Router {
    pub fn new(
        client: Client,
        executor: AsyncExecutor,
        project: Arc<dyn Project>,
        documents: Arc<ManagedDocuments>,
        index_status: Arc<IndexStatusNotifier>,
        symbols: WorkspaceSymbolSearch,
    ) -> Self {
        Self {
            client,
            executor,
            project,
            documents,
            completion: Arc::new(CompletionCache::new()),
            index_status,
            symbols,
            cancellation_handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn completion_cache(&self) -> &Arc<CompletionCache> {
        &self.completion
    }

    /// Cancel the in-flight request `id`, if any.
    pub fn cancel(&self, id: &RequestId) {
        if let Some(token) = self.cancellation_handles.lock().remove(id) {
            debug!("cancelling request {id}");
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for (_, token) in self.cancellation_handles.lock().drain() {
            token.cancel();
        }
    }

    // ── Requests ──────────────────────────────────────────────────────

    pub fn handle_request(&self, req: Request) {
        let id = req.id.clone();
        let method = req.method.as_str();
        if method == GotoDefinition::METHOD {
            let Some(p) = self.params::<GotoDefinition>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, find(DefinitionKind::Declaration));
        } else if method == GotoTypeDefinition::METHOD {
            let Some(p) = self.params::<GotoTypeDefinition>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, find(DefinitionKind::TypeDeclaration));
        } else if method == GotoImplementation::METHOD {
            let Some(p) = self.params::<GotoImplementation>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, find(DefinitionKind::Implementation));
        } else if method == References::METHOD {
            let Some(p) = self.params::<References>(&req) else { return };
            self.run_at(id, method, &p.text_document_position, commands::FindUsages);
        } else if method == DocumentHighlightRequest::METHOD {
            let Some(p) = self.params::<DocumentHighlightRequest>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, commands::DocumentHighlight);
        } else if method == DocumentSymbolRequest::METHOD {
            let Some(p) = self.params::<DocumentSymbolRequest>(&req) else { return };
            if p.text_document.uri.as_str().starts_with(OUTPUT_SCHEME) {
                self.client
                    .respond(Response::new_ok(id, DocumentSymbolResponse::Nested(Vec::new())));
                return;
            }
            self.run(id, method, &p.text_document.uri, None, commands::DocumentSymbols);
        } else if method == WorkspaceSymbolRequest::METHOD {
            let Some(p) = self.params::<WorkspaceSymbolRequest>(&req) else { return };
            self.workspace_symbols(id, p.query);
        } else if method == HoverRequest::METHOD {
            let Some(p) = self.params::<HoverRequest>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, commands::Hover);
        } else if method == SignatureHelpRequest::METHOD {
            let Some(p) = self.params::<SignatureHelpRequest>(&req) else { return };
            self.run_at(id, method, &p.text_document_position_params, commands::SignatureHelp);
        } else if method == Completion::METHOD {
            let Some(p) = self.params::<Completion>(&req) else { return };
            let command = commands::Completion {
                cache: Arc::clone(&self.completion),
                position: convert::line_col(p.text_document_position.position),
            };
            self.run_at(id, method, &p.text_document_position, command);
        } else if method == ResolveCompletionItem::METHOD {
            let Some(item) = self.params::<ResolveCompletionItem>(&req) else { return };
            self.resolve_completion(id, item);
        } else if method == CodeActionRequest::METHOD {
            let Some(p) = self.params::<CodeActionRequest>(&req) else { return };
            let command = commands::CodeActions {
                uri: p.text_document.uri.as_str().to_owned(),
                range: convert::text_range(p.range),
            };
            self.run(id, method, &p.text_document.uri, Some(p.range.start), command);
        } else if method == CodeActionResolveRequest::METHOD {
            let Some(action) = self.params::<CodeActionResolveRequest>(&req) else { return };
            let data = action
                .data
                .clone()
                .map(serde_json::from_value::<CodeActionData>);
            let data = match data {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    warn!("malformed code action data: {e}");
                    self.client.respond(Response::new_ok(id, action));
                    return;
                }
                None => {
                    self.client.respond(Response::new_ok(id, action));
                    return;
                }
            };
            let Ok(uri) = data.uri.parse::<Uri>() else {
                warn!("malformed code action uri: {}", data.uri);
                self.client.respond(Response::new_ok(id, action));
                return;
            };
            let command = commands::ResolveCodeAction {
                action,
                range: convert::text_range(data.range),
            };
            self.run(id, method, &uri, Some(data.range.start), command);
        } else if method == Rename::METHOD {
            let Some(p) = self.params::<Rename>(&req) else { return };
            let command = commands::Rename {
                new_name: p.new_name,
            };
            self.run_at(id, method, &p.text_document_position, command);
        } else if method == Formatting::METHOD {
            let Some(p) = self.params::<Formatting>(&req) else { return };
            let command = commands::Formatting {
                range: None,
                options: convert::formatting_options(&p.options),
            };
            self.run(id, method, &p.text_document.uri, None, command);
        } else if method == RangeFormatting::METHOD {
            let Some(p) = self.params::<RangeFormatting>(&req) else { return };
            let command = commands::Formatting {
                range: Some(convert::text_range(p.range)),
                options: convert::formatting_options(&p.options),
            };
            self.run(id, method, &p.text_document.uri, Some(p.range.start), command);
        } else if method == OnTypeFormatting::METHOD {
            let Some(p) = self.params::<OnTypeFormatting>(&req) else { return };
            let Some(typed) = p.ch.chars().next() else {
                self.invalid_params(id, "empty trigger character");
                return;
            };
            let command = commands::OnTypeFormatting {
                typed,
                options: convert::formatting_options(&p.options),
            };
            self.run_at(id, method, &p.text_document_position, command);
        } else if method == ClassFileContents::METHOD {
            let Some(p) = self.params::<ClassFileContents>(&req) else { return };
            self.run(id, method, &p.uri, None, commands::ClassFileContents);
        } else if method == Runnables::METHOD {
            let Some(p) = self.params::<Runnables>(&req) else { return };
            self.run(id, method, &p.uri, None, commands::Runnables);
        } else {
            self.client.respond(Response::new_err(
                id,
                ErrorCode::MethodNotFound as i32,
                format!("method not found: {method}"),
            ));
        }
    }

    fn params<R>(&self, req: &Request) -> Option<R::Params>
    where
        R: lsp_types::request::Request,
        R::Params: DeserializeOwned,
    {
        match serde_json::from_value(req.params.clone()) {
            Ok(params) => Some(params),
            Err(e) => {
                self.invalid_params(req.id.clone(), &format!("invalid params for {}: {e}", R::METHOD));
                None
            }
        }
    }

    fn invalid_params(&self, id: RequestId, message: &str) {
        warn!("{message}");
        self.client.respond(Response::new_err(
            id,
            ErrorCode::InvalidParams as i32,
            message.to_owned(),
        ));
    }

    fn register(&self, id: &RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellation_handles
            .lock()
            .insert(id.clone(), token.clone());
        token
    }

    fn run_at<C: Command>(
        &self,
        id: RequestId,
        method: &str,
        at: &TextDocumentPositionParams,
        command: C,
    ) {
        self.run(id, method, &at.text_document.uri, Some(at.position), command);
    }

    /// Run `command` for the document `uri` and respond when it finishes.
    fn run<C: Command>(
        &self,
        id: RequestId,
        method: &str,
        uri: &Uri,
        position: Option<Position>,
        command: C,
    ) {
        let path = NormalizedPath::from_uri(uri.as_str());
        let command = Arc::new(command);
        let mut request = ExecutionRequest::new(
            Arc::clone(&self.project),
            path,
            position.map(convert::line_col),
        );
        request.cancellable = command.cancellable();
        request.run_on_exclusive = command.run_on_exclusive();
        request.token = self.register(&id);

        let work = {
            let command = Arc::clone(&command);
            let project = Arc::clone(&self.project);
            move |ctx: &ExecutorContext| command.execute(&*project, ctx)
        };
        let finish = self.finisher(id, method);
        self.executor.compute_then(request, work, move |result| {
            finish(result.map(|output| output.or_else(|| command.unresolved())))
        });
    }

    fn workspace_symbols(&self, id: RequestId, query: String) {
        let token = self.register(&id);
        let project = Arc::clone(&self.project);
        let search = self.symbols;
        let finish = self.finisher(id, WorkspaceSymbolRequest::METHOD);
        self.executor.spawn(move || {
            let result = search
                .run(&*project, &query, &token)
                .map(|found| found.map(WorkspaceSymbolResponse::Nested));
            finish(result);
        });
    }

    fn resolve_completion(&self, id: RequestId, item: lsp_types::CompletionItem) {
        let token = self.register(&id);
        let project = Arc::clone(&self.project);
        let cache = Arc::clone(&self.completion);
        let finish = self.finisher(id, ResolveCompletionItem::METHOD);
        self.executor.spawn(move || {
            let result = if token.is_cancelled() {
                Err(CommandError::Cancelled)
            } else {
                cache.resolve(item, &*project, &token).map(Some)
            };
            finish(result);
        });
    }

    /// A callback that answers request `id` and logs its timing.
    fn finisher<T: Serialize>(
        &self,
        id: RequestId,
        method: &str,
    ) -> impl FnOnce(Result<Option<T>, CommandError>) + Send + 'static {
        let client = self.client.clone();
        let handles = Arc::clone(&self.cancellation_handles);
        let method = method.to_owned();
        let started = Instant::now();
        move |result| {
            handles.lock().remove(&id);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let response = match result {
                Ok(value) => {
                    debug!(%method, elapsed_ms, "request finished");
                    Response::new_ok(id, value)
                }
                Err(e) => {
                    debug!(%method, elapsed_ms, error = %e, "request failed");
                    Response::new_err(id, e.code() as i32, e.to_string())
                }
            };
            client.respond(response);
        }
    }

    // ── Notifications ─────────────────────────────────────────────────

    pub fn handle_notification(&self, not: Notification) {
        let method = not.method.as_str();
        if method == DidOpenTextDocument::METHOD {
            let Some(p) = notification_params::<DidOpenTextDocument>(&not) else { return };
            let doc = p.text_document;
            log_document_error(
                method,
                self.documents
                    .start_managing(doc.uri.as_str(), &doc.text, doc.version),
            );
            self.index_status.announce_if_indexing(&*self.project);
        } else if method == DidChangeTextDocument::METHOD {
            let Some(p) = notification_params::<DidChangeTextDocument>(&not) else { return };
            log_document_error(
                method,
                self.documents.update_document(
                    p.text_document.uri.as_str(),
                    p.text_document.version,
                    p.content_changes,
                ),
            );
        } else if method == DidSaveTextDocument::METHOD {
            let Some(p) = notification_params::<DidSaveTextDocument>(&not) else { return };
            log_document_error(method, self.documents.sync_document(p.text_document.uri.as_str()));
        } else if method == DidCloseTextDocument::METHOD {
            let Some(p) = notification_params::<DidCloseTextDocument>(&not) else { return };
            log_document_error(method, self.documents.stop_managing(p.text_document.uri.as_str()));
        } else if method == DidRenameFiles::METHOD {
            let Some(p) = notification_params::<DidRenameFiles>(&not) else { return };
            let paths: Vec<_> = p
                .files
                .iter()
                .flat_map(|f| [&f.old_uri, &f.new_uri])
                .map(|uri| NormalizedPath::from_uri(uri))
                .collect();
            let project = Arc::clone(&self.project);
            let refreshed = self.executor.exclusive().invoke_and_wait(move || {
                for path in &paths {
                    project.refresh(path);
                }
            });
            if let Err(e) = refreshed {
                warn!("failed to refresh renamed files: {e}");
            }
        } else if method == DidChangeConfiguration::METHOD
            || method == DidChangeWatchedFiles::METHOD
        {
            debug!("ignoring {method}");
        } else {
            debug!("unhandled notification {method}");
        }
    }
}

fn find(kind: DefinitionKind) -> commands::FindDefinition {
    commands::FindDefinition { kind }
}

fn notification_params<N>(not: &Notification) -> Option<N::Params>
where
    N: lsp_types::notification::Notification,
    N::Params: DeserializeOwned,
{
    match serde_json::from_value(not.params.clone()) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!("invalid params for {}: {e}", N::METHOD);
            None
        }
    }
}

fn log_document_error(method: &str, result: Result<(), DocumentError>) {
    match result {
        Ok(()) => {}
        Err(DocumentError::UnsupportedScheme(uri)) => debug!("{method}: ignoring {uri}"),
        Err(e) => warn!("{method}: {e}"),
    }
}
