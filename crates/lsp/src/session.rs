//! One client connection from `initialize` to `exit`.
//!
//! A session binds at most one backend project at a time. Re-initializing
//! releases the current binding before the next project is resolved, and
//! any project a prior session left open is force-closed first.

use std::sync::Arc;

use crossbeam_channel::{select, Receiver};
use harbor_core::{Backend, BackendError, NormalizedPath, Project, SubscriptionId};
use lsp_server::{ErrorCode, Message, Notification, Request, RequestId, Response};
use lsp_types::notification::{Cancel, Exit, Initialized, Notification as _};
use lsp_types::request::{Initialize, Request as _, Shutdown};
use lsp_types::{
    CancelParams, InitializeParams, InitializeResult, NumberOrString, ServerCapabilities,
    ServerInfo,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capabilities::server_capabilities;
use crate::client::Client;
use crate::config::ServerConfig;
use crate::documents::ManagedDocuments;
use crate::executor::AsyncExecutor;
use crate::publish::{DiagnosticsPublisher, IndexStatusNotifier, ProgressReporter};
use crate::router::Router;
use crate::runner::LifecycleState;
use crate::symbols::WorkspaceSymbolSearch;

/// The project most recently bound by any session of a runner.
pub type ProjectSlot = Arc<Mutex<Option<Arc<dyn Project>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Serving,
    ShuttingDown,
    Exited,
}

/// Why [`Session::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `exit`.
    Exit,
    /// The client side of the connection went away.
    Disconnected,
    /// The runner was stopped.
    Stopped,
    /// The project named by `initialize` could not be opened.
    InitializeFailed,
}

/// Everything that exists only while a project is bound.
struct Binding {
    project: Arc<dyn Project>,
    documents: Arc<ManagedDocuments>,
    router: Router,
    progress: Arc<ProgressReporter>,
    subscriptions: Vec<SubscriptionId>,
}

pub struct Session {
    client: Client,
    backend: Arc<dyn Backend>,
    executor: AsyncExecutor,
    config: ServerConfig,
    phase: SessionPhase,
    binding: Option<Binding>,
    last_project: ProjectSlot,
    lifecycle: Option<Arc<Mutex<LifecycleState>>>,
}

impl Session {
    pub fn new(
        client: Client,
        backend: Arc<dyn Backend>,
        executor: AsyncExecutor,
        config: ServerConfig,
    ) -> Self {
        Self {
            client,
            backend,
            executor,
            config,
            phase: SessionPhase::Uninitialized,
            binding: None,
            last_project: ProjectSlot::default(),
            lifecycle: None,
        }
    }

    /// Share the last-bound-project slot with other sessions.
    pub fn with_project_slot(mut self, slot: ProjectSlot) -> Self {
        self.last_project = slot;
        self
    }

    /// Report `Serving` and `ShuttingDown` transitions into `state`.
    pub fn with_lifecycle(mut self, state: Arc<Mutex<LifecycleState>>) -> Self {
        self.lifecycle = Some(state);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn project(&self) -> Option<&Arc<dyn Project>> {
        self.binding.as_ref().map(|b| &b.project)
    }

    pub fn router(&self) -> Option<&Router> {
        self.binding.as_ref().map(|b| &b.router)
    }

    /// Dispatch messages until `exit`, a closed connection or a stop
    /// signal. A stop signal is any message on `stop` or its disconnection.
    pub fn serve(&mut self, receiver: &Receiver<Message>, stop: &Receiver<()>) -> SessionEnd {
        let end = loop {
            select! {
                recv(receiver) -> msg => match msg {
                    Ok(msg) => {
                        if let Some(end) = self.handle_message(msg) {
                            break end;
                        }
                    }
                    Err(_) => break SessionEnd::Disconnected,
                },
                recv(stop) -> _ => break SessionEnd::Stopped,
            }
        };
        if let Some(binding) = &self.binding {
            binding.router.cancel_all();
        }
        self.release_binding();
        self.phase = SessionPhase::Exited;
        info!(?end, "session ended");
        end
    }

    /// Handle one message. Returns how the session ends if it should.
    pub fn handle_message(&mut self, msg: Message) -> Option<SessionEnd> {
        match msg {
            Message::Request(req) => self.handle_request(req),
            Message::Notification(not) => self.handle_notification(not),
            Message::Response(resp) => {
                self.client.route_response(resp);
                None
            }
        }
    }

    fn handle_request(&mut self, req: Request) -> Option<SessionEnd> {
        if req.method == Initialize::METHOD {
            return self.handle_initialize(req);
        }
        if req.method == Shutdown::METHOD {
            if self.phase == SessionPhase::Uninitialized {
                self.reject(req.id, ErrorCode::ServerNotInitialized, "server not initialized");
            } else {
                self.shutdown();
                self.client.respond(Response::new_ok(req.id, ()));
            }
            return None;
        }
        match self.phase {
            SessionPhase::Uninitialized => {
                self.reject(req.id, ErrorCode::ServerNotInitialized, "server not initialized");
            }
            SessionPhase::ShuttingDown | SessionPhase::Exited => {
                self.reject(req.id, ErrorCode::InvalidRequest, "server is shutting down");
            }
            SessionPhase::Serving => match &self.binding {
                Some(binding) => binding.router.handle_request(req),
                None => {
                    debug!("no project bound; answering {} with null", req.method);
                    self.client
                        .respond(Response::new_ok(req.id, serde_json::Value::Null));
                }
            },
        }
        None
    }

    fn handle_initialize(&mut self, req: Request) -> Option<SessionEnd> {
        if self.phase == SessionPhase::ShuttingDown {
            self.reject(req.id, ErrorCode::InvalidRequest, "server is shutting down");
            return None;
        }
        let params: InitializeParams = match serde_json::from_value(req.params) {
            Ok(params) => params,
            Err(e) => {
                self.reject(req.id, ErrorCode::InvalidParams, &format!("invalid initialize params: {e}"));
                return None;
            }
        };
        match self.initialize(&params) {
            Ok(result) => {
                self.client.respond(Response::new_ok(req.id, result));
                None
            }
            Err(e) => {
                error!("initialize failed: {e}");
                self.reject(req.id, ErrorCode::RequestFailed, &format!("cannot open project: {e}"));
                Some(SessionEnd::InitializeFailed)
            }
        }
    }

    fn handle_notification(&mut self, not: Notification) -> Option<SessionEnd> {
        if not.method == Exit::METHOD {
            if self.phase != SessionPhase::ShuttingDown {
                warn!("exit received without shutdown");
            }
            return Some(SessionEnd::Exit);
        }
        if not.method == Cancel::METHOD {
            match serde_json::from_value::<CancelParams>(not.params) {
                Ok(params) => {
                    if let Some(router) = self.router() {
                        router.cancel(&request_id(params.id));
                    }
                }
                Err(e) => warn!("invalid cancel params: {e}"),
            }
            return None;
        }
        if not.method == Initialized::METHOD {
            debug!("client initialized");
            return None;
        }
        match (&self.phase, &self.binding) {
            (SessionPhase::Serving, Some(binding)) => binding.router.handle_notification(not),
            _ => debug!("dropping {} in phase {:?}", not.method, self.phase),
        }
        None
    }

    fn reject(&self, id: RequestId, code: ErrorCode, message: &str) {
        self.client
            .respond(Response::new_err(id, code as i32, message.to_owned()));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Bind the project rooted at the first workspace folder (or the root
    /// URI). Without either the session serves without a project and
    /// announces no capabilities.
    pub fn initialize(&mut self, params: &InitializeParams) -> Result<InitializeResult, BackendError> {
        self.release_binding();
        self.close_last_project();

        let server_info = Some(ServerInfo {
            name: "harbor".into(),
            version: Some(env!("CARGO_PKG_VERSION").into()),
        });
        let Some(root) = workspace_root(params) else {
            info!("no workspace root; serving without a project");
            self.set_phase(SessionPhase::Serving);
            return Ok(InitializeResult {
                capabilities: ServerCapabilities::default(),
                server_info,
            });
        };

        let project = self.backend.resolve_project(&root)?;
        if let Err(e) = self.bind(Arc::clone(&project)) {
            warn!(root = %root, "could not bind project: {e}");
            self.backend.close_project(&project);
            return Err(e);
        }
        info!(root = %root, "project bound");
        self.set_phase(SessionPhase::Serving);
        Ok(InitializeResult {
            capabilities: server_capabilities(),
            server_info,
        })
    }

    /// Cancel in-flight work and release the project. Only `exit` is
    /// accepted afterwards.
    pub fn shutdown(&mut self) {
        info!("shutdown requested");
        if let Some(binding) = &self.binding {
            binding.router.cancel_all();
        }
        self.set_phase(SessionPhase::ShuttingDown);
        self.release_binding();
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        let state = match phase {
            SessionPhase::Serving => LifecycleState::Serving,
            SessionPhase::ShuttingDown => LifecycleState::ShuttingDown,
            _ => return,
        };
        if let Some(lifecycle) = &self.lifecycle {
            *lifecycle.lock() = state;
        }
    }

    fn bind(&mut self, project: Arc<dyn Project>) -> Result<(), BackendError> {
        let documents = Arc::new(ManagedDocuments::new(
            Arc::clone(&project),
            Arc::clone(self.executor.exclusive()),
        ));
        let index_status = Arc::new(IndexStatusNotifier::new(self.client.clone()));
        let progress = Arc::new(ProgressReporter::start(
            self.client.clone(),
            self.config.progress_handshake_timeout,
        )?);
        let diagnostics = Arc::new(DiagnosticsPublisher::new(
            self.client.clone(),
            Arc::clone(&documents),
        ));
        let subscriptions = vec![
            project.subscribe(diagnostics),
            project.subscribe(index_status.clone()),
            project.subscribe(progress.clone()),
        ];
        let router = Router::new(
            self.client.clone(),
            self.executor.clone(),
            Arc::clone(&project),
            Arc::clone(&documents),
            index_status,
            WorkspaceSymbolSearch::new(self.config.workspace_symbol_limit),
        );
        *self.last_project.lock() = Some(Arc::clone(&project));
        self.binding = Some(Binding {
            project,
            documents,
            router,
            progress,
            subscriptions,
        });
        Ok(())
    }

    /// Close the bound project's editors, drop its listeners and release it.
    fn release_binding(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        binding.documents.close_all();
        for id in &binding.subscriptions {
            binding.project.unsubscribe(*id);
        }
        binding.progress.stop();
        self.backend.close_project(&binding.project);

        let mut last = self.last_project.lock();
        if last
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, &binding.project))
        {
            *last = None;
        }
        info!(root = %binding.project.root(), "project released");
    }

    fn close_last_project(&mut self) {
        let Some(project) = self.last_project.lock().take() else {
            return;
        };
        if !project.is_open() {
            return;
        }
        warn!(root = %project.root(), "force-closing project left open by a previous session");
        let closing = Arc::clone(&project);
        let closed = self.executor.exclusive().invoke_and_wait(move || {
            for path in closing.open_editors() {
                closing.close_editor(&path);
            }
        });
        if let Err(e) = closed {
            warn!("failed to close editors: {e}");
        }
        self.backend.close_project(&project);
    }
}

fn request_id(id: NumberOrString) -> RequestId {
    match id {
        NumberOrString::Number(n) => RequestId::from(n),
        NumberOrString::String(s) => RequestId::from(s),
    }
}

#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<NormalizedPath> {
    if let Some(folder) = params.workspace_folders.as_ref().and_then(|f| f.first()) {
        return Some(NormalizedPath::from_uri(folder.uri.as_str()));
    }
    params
        .root_uri
        .as_ref()
        .map(|uri| NormalizedPath::from_uri(uri.as_str()))
}
