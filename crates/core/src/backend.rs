//! The language intelligence backend interface.
//!
//! The server core never parses or analyzes code itself. It resolves a
//! [`Project`] through a [`Backend`], keeps editor buffers in sync through
//! [`Editor`], and asks the project for results with an
//! [`ExecutorContext`] describing the file, caret and cancellation token of
//! one request.

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::BackendError;
use crate::model::{
    CompletionCandidate, CompletionResolution, CompletionSnapshot, DefinitionKind,
    DefinitionTarget, FileChanges, FileLocation, Finding, FormattingOptions, Highlight,
    HoverInfo, QuickFix, Runnable, SignatureInfo, SymbolMatch, SymbolNode, TaskInfo,
};
use crate::path::NormalizedPath;
use crate::text::TextRange;

/// Entry point into a backend.
pub trait Backend: Send + Sync {
    /// Open (or return the already-open) project rooted at `root`.
    fn resolve_project(&self, root: &NormalizedPath) -> Result<Arc<dyn Project>, BackendError>;

    /// Release a project. Closing a project that is not open is a no-op.
    fn close_project(&self, project: &Arc<dyn Project>);
}

/// Handle returned by [`Project::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Backend state changes pushed to subscribers.
#[derive(Debug, Clone)]
pub enum ProjectEvent {
    IndexingStarted,
    IndexingFinished,
    AnalysisFinished {
        path: NormalizedPath,
        findings: Vec<Finding>,
    },
    TaskStarted(TaskInfo),
    TaskFinished(TaskInfo),
}

pub trait ProjectListener: Send + Sync {
    fn on_event(&self, event: &ProjectEvent);
}

/// An in-memory buffer bound to one file.
///
/// Buffer mutation is only ever performed by the server's exclusive
/// coordination thread.
pub trait Editor: Send + Sync {
    fn path(&self) -> &NormalizedPath;

    fn text(&self) -> String;

    fn is_writable(&self) -> bool;

    /// Mutate the buffer in one step. The closure may apply several edits;
    /// observers see only the final state.
    fn edit(&self, apply: &mut dyn FnMut(&mut String)) -> Result<(), BackendError>;

    /// Discard the buffer and re-read the file from disk.
    fn reload_from_disk(&self) -> Result<(), BackendError>;

    /// Caret byte offset.
    fn caret(&self) -> usize;

    fn move_caret(&self, offset: usize);
}

/// One open project.
///
/// Capability methods take the [`ExecutorContext`] of the request and
/// should poll its token at natural suspension points.
pub trait Project: Send + Sync {
    fn root(&self) -> &NormalizedPath;

    fn is_open(&self) -> bool;

    /// Whether the index is currently being (re)built.
    fn is_indexing(&self) -> bool;

    fn subscribe(&self, listener: Arc<dyn ProjectListener>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Re-scan `path` on disk. Returns whether it exists.
    fn refresh(&self, path: &NormalizedPath) -> bool;

    /// Return the editor for `path`, opening one if needed.
    fn open_editor(&self, path: &NormalizedPath) -> Option<Arc<dyn Editor>>;

    fn close_editor(&self, path: &NormalizedPath);

    fn open_editors(&self) -> Vec<NormalizedPath>;

    /// Run `unit` while the index is stable, waiting for a running index
    /// build to finish first.
    fn run_when_indexed(&self, unit: &mut dyn FnMut());

    fn completions(&self, ctx: &ExecutorContext) -> Result<Vec<CompletionCandidate>, BackendError>;

    fn resolve_completion(
        &self,
        snapshot: &CompletionSnapshot,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<CompletionResolution>, BackendError>;

    fn hover(&self, ctx: &ExecutorContext) -> Result<Option<HoverInfo>, BackendError>;

    fn signature_help(&self, ctx: &ExecutorContext) -> Result<Option<SignatureInfo>, BackendError>;

    fn find_definitions(
        &self,
        ctx: &ExecutorContext,
        kind: DefinitionKind,
    ) -> Result<Vec<DefinitionTarget>, BackendError>;

    fn find_usages(&self, ctx: &ExecutorContext) -> Result<Vec<FileLocation>, BackendError>;

    fn document_highlights(&self, ctx: &ExecutorContext) -> Result<Vec<Highlight>, BackendError>;

    fn document_symbols(&self, ctx: &ExecutorContext) -> Result<Vec<SymbolNode>, BackendError>;

    /// Symbols matching `pattern` (`*` matches everything). The backend may
    /// stop collecting once `limit` matches are found.
    fn workspace_symbols(
        &self,
        pattern: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SymbolMatch>, BackendError>;

    fn code_actions(
        &self,
        ctx: &ExecutorContext,
        range: TextRange,
    ) -> Result<Vec<QuickFix>, BackendError>;

    /// Compute the edits of the quick fix titled `title` without applying
    /// them.
    fn apply_code_action(
        &self,
        ctx: &ExecutorContext,
        title: &str,
        range: TextRange,
    ) -> Result<FileChanges, BackendError>;

    fn rename(&self, ctx: &ExecutorContext, new_name: &str) -> Result<FileChanges, BackendError>;

    /// The buffer text after reformatting `range` (or everything).
    fn reformat(
        &self,
        ctx: &ExecutorContext,
        range: Option<TextRange>,
        options: &FormattingOptions,
    ) -> Result<String, BackendError>;

    /// The buffer text after reacting to `typed` at the caret.
    fn format_on_type(
        &self,
        ctx: &ExecutorContext,
        typed: char,
        options: &FormattingOptions,
    ) -> Result<String, BackendError>;

    fn runnables(&self, ctx: &ExecutorContext) -> Result<Vec<Runnable>, BackendError>;
}

/// Everything one request needs to talk to the backend: the resolved file,
/// its editor, the caret offset captured when the editor was positioned and
/// the request's cancellation token. Built fresh per request and dropped
/// when it completes.
#[derive(Clone)]
pub struct ExecutorContext {
    pub path: NormalizedPath,
    pub editor: Arc<dyn Editor>,
    pub caret: usize,
    pub cancel: CancellationToken,
}

impl ExecutorContext {
    pub fn text(&self) -> String {
        self.editor.text()
    }

    /// Caret byte offset for this request. Other requests may move the
    /// editor's own caret meanwhile.
    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn check_cancelled(&self) -> Result<(), BackendError> {
        self.cancel.check()
    }
}

impl std::fmt::Debug for ExecutorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorContext")
            .field("path", &self.path)
            .field("caret", &self.caret)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Typed wrapper over [`Project::run_when_indexed`]. `None` when the
/// backend dropped the unit without running it.
pub fn run_when_indexed<R>(project: &dyn Project, work: impl FnOnce() -> R) -> Option<R> {
    let mut work = Some(work);
    let mut out = None;
    project.run_when_indexed(&mut || {
        if let Some(work) = work.take() {
            out = Some(work());
        }
    });
    out
}
