use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::editor::TextEditor;
use super::features;
use super::index::{read_text, read_tree, WordIndex};
use crate::backend::{
    Editor, ExecutorContext, Project, ProjectEvent, ProjectListener, SubscriptionId,
};
use crate::cancel::CancellationToken;
use crate::error::BackendError;
use crate::model::{
    CompletionCandidate, CompletionResolution, CompletionSnapshot, DefinitionKind,
    DefinitionTarget, FileChanges, FileLocation, FormattingOptions, Highlight, HoverInfo,
    QuickFix, Runnable, SignatureInfo, SymbolMatch, SymbolNode, TaskInfo,
};
use crate::path::NormalizedPath;
use crate::text::TextRange;

/// A directory opened by [`TextBackend`](super::TextBackend).
pub struct TextProject {
    inner: Arc<ProjectInner>,
}

pub(crate) struct ProjectInner {
    root: NormalizedPath,
    dir: PathBuf,
    library_roots: Vec<PathBuf>,
    open: AtomicBool,
    indexing: Mutex<bool>,
    index_done: Condvar,
    index: RwLock<WordIndex>,
    editors: Mutex<HashMap<NormalizedPath, Arc<TextEditor>>>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn ProjectListener>)>>,
    next_subscription: AtomicU64,
    task_ids: Arc<AtomicU64>,
}

impl TextProject {
    pub(crate) fn open(
        root: NormalizedPath,
        dir: PathBuf,
        library_roots: Vec<PathBuf>,
        task_ids: Arc<AtomicU64>,
    ) -> Self {
        let inner = Arc::new(ProjectInner {
            root,
            dir,
            library_roots,
            open: AtomicBool::new(true),
            indexing: Mutex::new(false),
            index_done: Condvar::new(),
            index: RwLock::new(WordIndex::default()),
            editors: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            task_ids,
        });
        ProjectInner::start_indexing(&inner);
        Self { inner }
    }

    /// Directory on disk.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Rebuild the index in the background.
    pub fn reindex(&self) {
        ProjectInner::start_indexing(&self.inner);
    }

    /// Block until no index build is running.
    pub fn wait_for_index(&self) {
        self.inner.wait_for_index();
    }

    pub(crate) fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.editors.lock().clear();
        self.inner.listeners.lock().clear();
    }
}

impl ProjectInner {
    fn start_indexing(this: &Arc<Self>) {
        {
            let mut indexing = this.indexing.lock();
            if *indexing {
                return;
            }
            *indexing = true;
        }
        let inner = Arc::clone(this);
        let spawned = std::thread::Builder::new()
            .name("harbor-indexer".into())
            .spawn(move || inner.build_index());
        if let Err(e) = spawned {
            warn!("failed to start indexer thread: {e}");
            this.finish_indexing();
        }
    }

    fn build_index(&self) {
        let task = TaskInfo {
            kind: "indexing".into(),
            id: self.task_ids.fetch_add(1, Ordering::Relaxed),
            title: format!("Indexing {}", self.root),
        };
        self.emit(&ProjectEvent::IndexingStarted);
        self.emit(&ProjectEvent::TaskStarted(task.clone()));

        let mut fresh = WordIndex::default();
        for (file, text) in read_tree(&self.dir) {
            fresh.update(NormalizedPath::from_local_path(&file), text, true);
        }
        for lib in &self.library_roots {
            for (file, text) in read_tree(lib) {
                fresh.update(NormalizedPath::from_local_path(&file), text, false);
            }
        }
        // Open buffers win over disk contents.
        let buffers: Vec<_> = self
            .editors
            .lock()
            .iter()
            .map(|(path, editor)| (path.clone(), editor.text()))
            .collect();
        for (path, text) in buffers {
            fresh.update(path, text, true);
        }
        let count = fresh.len();
        *self.index.write() = fresh;
        info!(root = %self.root, files = count, "index built");

        self.finish_indexing();
        self.emit(&ProjectEvent::TaskFinished(task));
        self.emit(&ProjectEvent::IndexingFinished);
    }

    fn finish_indexing(&self) {
        *self.indexing.lock() = false;
        self.index_done.notify_all();
    }

    fn wait_for_index(&self) {
        let mut indexing = self.indexing.lock();
        while *indexing {
            self.index_done.wait(&mut indexing);
        }
    }

    fn emit(&self, event: &ProjectEvent) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_event(event);
        }
    }

    pub(crate) fn buffer_changed(&self, path: &NormalizedPath, text: String) {
        let findings = features::analyze(&text);
        self.index.write().update(path.clone(), text, true);
        self.emit(&ProjectEvent::AnalysisFinished {
            path: path.clone(),
            findings,
        });
    }

    fn rescan_from_disk(&self, path: &NormalizedPath, file: &Path) -> bool {
        if self.editors.lock().contains_key(path) {
            return file.exists();
        }
        match read_text(file) {
            Some(text) => {
                let in_project = self.in_project(path);
                self.index.write().update(path.clone(), text, in_project);
                true
            }
            None => {
                self.index.write().remove(path);
                file.exists()
            }
        }
    }

    fn in_project(&self, path: &NormalizedPath) -> bool {
        path.starts_with(&self.root)
    }
}

impl Project for TextProject {
    fn root(&self) -> &NormalizedPath {
        &self.inner.root
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    fn is_indexing(&self) -> bool {
        *self.inner.indexing.lock()
    }

    fn subscribe(&self, listener: Arc<dyn ProjectListener>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.lock().retain(|(sub, _)| *sub != id);
    }

    fn refresh(&self, path: &NormalizedPath) -> bool {
        let Some(file) = path.to_file_path() else {
            return false;
        };
        if file.is_dir() {
            for (child, _) in read_tree(&file) {
                let child_path = NormalizedPath::from_local_path(&child);
                self.inner.rescan_from_disk(&child_path, &child);
            }
            return true;
        }
        self.inner.rescan_from_disk(path, &file)
    }

    fn open_editor(&self, path: &NormalizedPath) -> Option<Arc<dyn Editor>> {
        if !self.is_open() {
            return None;
        }
        if let Some(editor) = self.inner.editors.lock().get(path) {
            return Some(Arc::clone(editor) as Arc<dyn Editor>);
        }
        let file = path.to_file_path()?;
        let editor = match TextEditor::load(path.clone(), file, Arc::downgrade(&self.inner)) {
            Ok(editor) => Arc::new(editor),
            Err(e) => {
                debug!("cannot open editor for {path}: {e}");
                return None;
            }
        };
        let editor = {
            let mut editors = self.inner.editors.lock();
            Arc::clone(editors.entry(path.clone()).or_insert(editor))
        };
        self.inner.buffer_changed(path, editor.text());
        Some(editor as Arc<dyn Editor>)
    }

    fn close_editor(&self, path: &NormalizedPath) {
        let removed = self.inner.editors.lock().remove(path);
        if removed.is_some() {
            if let Some(file) = path.to_file_path() {
                self.inner.rescan_from_disk(path, &file);
            }
        }
    }

    fn open_editors(&self) -> Vec<NormalizedPath> {
        let mut paths: Vec<_> = self.inner.editors.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn run_when_indexed(&self, unit: &mut dyn FnMut()) {
        self.inner.wait_for_index();
        unit();
    }

    fn completions(&self, ctx: &ExecutorContext) -> Result<Vec<CompletionCandidate>, BackendError> {
        features::completions(&self.inner.index.read(), ctx)
    }

    fn resolve_completion(
        &self,
        snapshot: &CompletionSnapshot,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<CompletionResolution>, BackendError> {
        cancel.check()?;
        Ok(features::resolve_completion(snapshot, index))
    }

    fn hover(&self, ctx: &ExecutorContext) -> Result<Option<HoverInfo>, BackendError> {
        features::hover(&self.inner.index.read(), ctx)
    }

    fn signature_help(&self, ctx: &ExecutorContext) -> Result<Option<SignatureInfo>, BackendError> {
        features::signature_help(&self.inner.index.read(), ctx)
    }

    fn find_definitions(
        &self,
        ctx: &ExecutorContext,
        kind: DefinitionKind,
    ) -> Result<Vec<DefinitionTarget>, BackendError> {
        features::definitions(&self.inner.index.read(), ctx, kind)
    }

    fn find_usages(&self, ctx: &ExecutorContext) -> Result<Vec<FileLocation>, BackendError> {
        features::usages(&self.inner.index.read(), ctx)
    }

    fn document_highlights(&self, ctx: &ExecutorContext) -> Result<Vec<Highlight>, BackendError> {
        features::highlights(ctx)
    }

    fn document_symbols(&self, ctx: &ExecutorContext) -> Result<Vec<SymbolNode>, BackendError> {
        features::document_symbols(ctx)
    }

    fn workspace_symbols(
        &self,
        pattern: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SymbolMatch>, BackendError> {
        let index = self.inner.index.read();
        features::workspace_symbols(&index, pattern, limit, cancel, |p| {
            self.inner.in_project(p)
        })
    }

    fn code_actions(
        &self,
        ctx: &ExecutorContext,
        range: TextRange,
    ) -> Result<Vec<QuickFix>, BackendError> {
        features::code_actions(ctx, range)
    }

    fn apply_code_action(
        &self,
        ctx: &ExecutorContext,
        title: &str,
        range: TextRange,
    ) -> Result<FileChanges, BackendError> {
        features::apply_code_action(ctx, title, range)
    }

    fn rename(&self, ctx: &ExecutorContext, new_name: &str) -> Result<FileChanges, BackendError> {
        features::rename(&self.inner.index.read(), ctx, new_name)
    }

    fn reformat(
        &self,
        ctx: &ExecutorContext,
        range: Option<TextRange>,
        options: &FormattingOptions,
    ) -> Result<String, BackendError> {
        features::reformat(ctx, range, options)
    }

    fn format_on_type(
        &self,
        ctx: &ExecutorContext,
        typed: char,
        options: &FormattingOptions,
    ) -> Result<String, BackendError> {
        features::format_on_type(ctx, typed, options)
    }

    fn runnables(&self, ctx: &ExecutorContext) -> Result<Vec<Runnable>, BackendError> {
        features::runnables(ctx, &self.inner.dir)
    }
}
