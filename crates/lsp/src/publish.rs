//! Backend events pushed to the client.
//!
//! Each publisher is a [`ProjectListener`] subscribed while a project is
//! bound. Events arrive on backend threads; nothing here blocks them except
//! queueing a message.

use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use harbor_core::model::TaskInfo;
use harbor_core::{NormalizedPath, Project, ProjectEvent, ProjectListener};
use lsp_types::notification::{Progress, PublishDiagnostics};
use lsp_types::request::WorkDoneProgressCreate;
use lsp_types::{
    NumberOrString, ProgressParams, ProgressParamsValue, PublishDiagnosticsParams, Uri,
    WorkDoneProgress, WorkDoneProgressBegin, WorkDoneProgressCreateParams, WorkDoneProgressEnd,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::Client;
use crate::convert;
use crate::documents::ManagedDocuments;
use crate::ext::{IndexFinished, IndexStarted};

// ── Diagnostics ───────────────────────────────────────────────────────

/// Publishes analysis findings as `textDocument/publishDiagnostics`.
pub struct DiagnosticsPublisher {
    client: Client,
    documents: Arc<ManagedDocuments>,
}

impl DiagnosticsPublisher {
    pub fn new(client: Client, documents: Arc<ManagedDocuments>) -> Self {
        Self { client, documents }
    }

    /// The URI the client knows `path` by.
    fn uri_for(&self, path: &NormalizedPath) -> Option<Uri> {
        self.documents
            .get(path)
            .and_then(|doc| Uri::from_str(&doc.uri).ok())
            .or_else(|| convert::uri(path))
    }
}

impl ProjectListener for DiagnosticsPublisher {
    fn on_event(&self, event: &ProjectEvent) {
        let ProjectEvent::AnalysisFinished { path, findings } = event else {
            return;
        };
        let Some(uri) = self.uri_for(path) else {
            debug!("no uri for {path}; dropping diagnostics");
            return;
        };
        let diagnostics = findings.iter().filter_map(convert::diagnostic).collect();
        self.client
            .notify::<PublishDiagnostics>(PublishDiagnosticsParams {
                uri,
                diagnostics,
                version: self.documents.version(path),
            });
    }
}

// ── Index status ──────────────────────────────────────────────────────

/// Tells the client when the index is being rebuilt so it can show a busy
/// indicator.
pub struct IndexStatusNotifier {
    client: Client,
}

impl IndexStatusNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Repeat the started signal for a client that joined mid-build.
    pub fn announce_if_indexing(&self, project: &dyn Project) {
        if project.is_indexing() {
            self.client.notify::<IndexStarted>(());
        }
    }
}

impl ProjectListener for IndexStatusNotifier {
    fn on_event(&self, event: &ProjectEvent) {
        match event {
            ProjectEvent::IndexingStarted => self.client.notify::<IndexStarted>(()),
            ProjectEvent::IndexingFinished => self.client.notify::<IndexFinished>(()),
            _ => {}
        }
    }
}

// ── Progress ──────────────────────────────────────────────────────────

enum ProgressEvent {
    Begin(TaskInfo),
    End(TaskInfo),
}

/// Reports long-running backend tasks as work-done progress.
///
/// Events are handled in order on one thread. Before a task's begin event
/// the reporter asks the client to create the progress token and waits up
/// to the handshake timeout for the answer; without one it reports anyway.
pub struct ProgressReporter {
    sender: Mutex<Option<Sender<ProgressEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressReporter {
    pub fn start(client: Client, handshake: Duration) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("harbor-progress".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ProgressEvent::Begin(task) => begin(&client, &task, handshake),
                        ProgressEvent::End(task) => end(&client, &task),
                    }
                }
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Report what is queued, then stop.
    pub fn stop(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }

    fn push(&self, event: ProgressEvent) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(event);
        }
    }
}

impl ProjectListener for ProgressReporter {
    fn on_event(&self, event: &ProjectEvent) {
        match event {
            ProjectEvent::TaskStarted(task) => self.push(ProgressEvent::Begin(task.clone())),
            ProjectEvent::TaskFinished(task) => self.push(ProgressEvent::End(task.clone())),
            _ => {}
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn begin(client: &Client, task: &TaskInfo, handshake: Duration) {
    let token = NumberOrString::String(task.progress_token());
    let (id, acknowledged) =
        client.request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
            token: token.clone(),
        });
    if acknowledged.recv_timeout(handshake).is_err() {
        client.forget(&id);
        warn!(
            "client did not acknowledge progress {} within {handshake:?}",
            task.progress_token()
        );
    }
    client.notify::<Progress>(ProgressParams {
        token,
        value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(WorkDoneProgressBegin {
            title: task.title.clone(),
            cancellable: Some(false),
            message: None,
            percentage: Some(0),
        })),
    });
}

fn end(client: &Client, task: &TaskInfo) {
    client.notify::<Progress>(ProgressParams {
        token: NumberOrString::String(task.progress_token()),
        value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(WorkDoneProgressEnd {
            message: None,
        })),
    });
}
