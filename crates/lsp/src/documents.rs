//! Client-opened documents of one bound project.
//!
//! The store tracks a version per path and pushes client text into the
//! backend's editor buffers. Every buffer mutation runs on the
//! [`ExclusiveThread`]; the map itself is only locked long enough to read
//! or update one entry, so documents never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use harbor_core::{normalize_line_endings, LineIndex, NormalizedPath, Project};
use lsp_types::TextDocumentContentChangeEvent;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::convert;
use crate::error::DocumentError;
use crate::executor::ExclusiveThread;

/// Schemes the backend can open editors for.
const SUPPORTED_SCHEMES: &[&str] = &["file:/", "jar:/", "jrt:/"];

/// A document the client has opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDocument {
    pub path: NormalizedPath,
    /// The URI exactly as the client sent it.
    pub uri: String,
    /// `None` right after open (version 0) or save: the next change is
    /// accepted whatever version it carries.
    pub version: Option<i32>,
    pub opened_by_client: bool,
}

pub struct ManagedDocuments {
    project: Arc<dyn Project>,
    exclusive: Arc<ExclusiveThread>,
    documents: RwLock<HashMap<NormalizedPath, ManagedDocument>>,
}

impl ManagedDocuments {
    pub fn new(project: Arc<dyn Project>, exclusive: Arc<ExclusiveThread>) -> Self {
        Self {
            project,
            exclusive,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Track `uri` and make the backend buffer hold `text`.
    pub fn start_managing(&self, uri: &str, text: &str, version: i32) -> Result<(), DocumentError> {
        let path = NormalizedPath::from_uri(uri);
        if !is_supported(&path) {
            return Err(DocumentError::UnsupportedScheme(uri.to_owned()));
        }
        let text = normalize_line_endings(text).into_owned();
        let project = Arc::clone(&self.project);
        let target = path.clone();
        self.exclusive.invoke_and_wait(move || {
            project.refresh(&target);
            let editor = project
                .open_editor(&target)
                .ok_or_else(|| DocumentError::FileNotFound(target.clone()))?;
            if !editor.is_writable() {
                debug!("{target} is read-only; keeping the backend copy");
                return Ok(());
            }
            if editor.text() != text {
                editor.edit(&mut |buffer| {
                    buffer.clear();
                    buffer.push_str(&text);
                })?;
            }
            Ok::<(), DocumentError>(())
        })??;

        let document = ManagedDocument {
            path: path.clone(),
            uri: uri.to_owned(),
            version: (version != 0).then_some(version),
            opened_by_client: true,
        };
        if self.documents.write().insert(path.clone(), document).is_some() {
            warn!("{path} is already managed; resetting it");
        }
        Ok(())
    }

    /// Apply one `didChange` notification.
    ///
    /// The notification is rejected unless the stored version is absent or
    /// equals `version` minus the number of changes it carries.
    pub fn update_document(
        &self,
        uri: &str,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(), DocumentError> {
        let path = NormalizedPath::from_uri(uri);
        let count = i32::try_from(changes.len()).unwrap_or(i32::MAX);
        {
            let documents = self.documents.read();
            let document = documents
                .get(&path)
                .ok_or_else(|| DocumentError::NotManaged(path.clone()))?;
            match document.version {
                Some(ours) if version.checked_sub(count) != Some(ours) => {
                    return Err(DocumentError::VersionMismatch {
                        ours,
                        theirs: version,
                        changes: count,
                    });
                }
                Some(_) => {}
                None => debug!("accepting version {version} of {path} without validation"),
            }
        }

        let project = Arc::clone(&self.project);
        let target = path.clone();
        self.exclusive.invoke_and_wait(move || {
            let editor = project
                .open_editor(&target)
                .ok_or_else(|| DocumentError::NoEditor(target.clone()))?;
            if !editor.is_writable() {
                return Err(DocumentError::ReadOnly(target.clone()));
            }
            editor.edit(&mut |buffer| {
                for change in &changes {
                    apply_change(buffer, change);
                }
            })?;
            Ok(())
        })??;

        if let Some(document) = self.documents.write().get_mut(&path) {
            document.version = Some(version);
        }
        Ok(())
    }

    /// Handle `didSave`: reload the buffer from disk and forget the version.
    pub fn sync_document(&self, uri: &str) -> Result<(), DocumentError> {
        let path = NormalizedPath::from_uri(uri);
        match self.documents.write().get_mut(&path) {
            Some(document) => document.version = None,
            None => return Err(DocumentError::NotManaged(path)),
        }
        let project = Arc::clone(&self.project);
        self.exclusive.invoke_and_wait(move || {
            let editor = project
                .open_editor(&path)
                .ok_or_else(|| DocumentError::NoEditor(path.clone()))?;
            editor.reload_from_disk()?;
            Ok(())
        })?
    }

    /// Handle `didClose`: close the backend editor and stop tracking.
    pub fn stop_managing(&self, uri: &str) -> Result<(), DocumentError> {
        let path = NormalizedPath::from_uri(uri);
        if self.documents.write().remove(&path).is_none() {
            return Err(DocumentError::NotManaged(path));
        }
        let project = Arc::clone(&self.project);
        self.exclusive
            .invoke_and_wait(move || project.close_editor(&path))?;
        Ok(())
    }

    /// Stored version of a managed document; `None` when absent or not
    /// managed.
    pub fn version(&self, path: &NormalizedPath) -> Option<i32> {
        self.documents.read().get(path).and_then(|d| d.version)
    }

    pub fn is_managed(&self, path: &NormalizedPath) -> bool {
        self.documents.read().contains_key(path)
    }

    pub fn get(&self, path: &NormalizedPath) -> Option<ManagedDocument> {
        self.documents.read().get(path).cloned()
    }

    pub fn managed_paths(&self) -> Vec<NormalizedPath> {
        let mut paths: Vec<_> = self.documents.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Stop tracking everything and close every editor the project has open.
    pub fn close_all(&self) {
        let tracked: Vec<_> = self.documents.write().drain().map(|(p, _)| p).collect();
        let project = Arc::clone(&self.project);
        let closed = self.exclusive.invoke_and_wait(move || {
            let mut paths = project.open_editors();
            paths.extend(tracked);
            paths.sort();
            paths.dedup();
            for path in &paths {
                project.close_editor(path);
            }
            paths.len()
        });
        match closed {
            Ok(count) => debug!("closed {count} editor(s)"),
            Err(e) => warn!("failed to close editors: {e}"),
        }
    }
}

fn is_supported(path: &NormalizedPath) -> bool {
    SUPPORTED_SCHEMES
        .iter()
        .any(|scheme| path.as_str().starts_with(scheme))
}

fn apply_change(buffer: &mut String, change: &TextDocumentContentChangeEvent) {
    let text = normalize_line_endings(&change.text);
    match change.range {
        None => *buffer = text.into_owned(),
        Some(range) => {
            let (start, end) = LineIndex::new(buffer).span_of(buffer, convert::text_range(range));
            buffer.replace_range(start..end, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::{Backend, TextBackend};
    use lsp_types::{Position, Range};

    struct Fixture {
        _dir: tempfile::TempDir,
        project: Arc<dyn Project>,
        documents: ManagedDocuments,
        uri: String,
    }

    fn fixture(text: &str) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("A.txt");
        std::fs::write(&file, text).unwrap();
        let project = TextBackend::new()
            .resolve_project(&NormalizedPath::from_local_path(dir.path()))
            .unwrap();
        let exclusive = Arc::new(ExclusiveThread::spawn().unwrap());
        let documents = ManagedDocuments::new(Arc::clone(&project), exclusive);
        let uri = NormalizedPath::from_local_path(&file).to_string();
        Fixture {
            _dir: dir,
            project,
            documents,
            uri,
        }
    }

    impl Fixture {
        fn text(&self) -> String {
            self.project
                .open_editor(&NormalizedPath::from_uri(&self.uri))
                .unwrap()
                .text()
        }

        fn path(&self) -> NormalizedPath {
            NormalizedPath::from_uri(&self.uri)
        }
    }

    fn full(text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.into(),
        }
    }

    fn ranged(l1: u32, c1: u32, l2: u32, c2: u32, text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(l1, c1), Position::new(l2, c2))),
            range_length: None,
            text: text.into(),
        }
    }

    #[test]
    fn open_overwrites_divergent_buffer() {
        let f = fixture("on disk");
        f.documents.start_managing(&f.uri, "abc", 1).unwrap();
        assert_eq!(f.text(), "abc");
        assert_eq!(f.documents.version(&f.path()), Some(1));
    }

    #[test]
    fn open_normalizes_crlf_and_version_zero_is_absent() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "a\r\nb", 0).unwrap();
        assert_eq!(f.text(), "a\nb");
        assert!(f.documents.is_managed(&f.path()));
        assert_eq!(f.documents.version(&f.path()), None);
    }

    #[test]
    fn unsupported_scheme_is_not_tracked() {
        let f = fixture("");
        let err = f
            .documents
            .start_managing("untitled:Untitled-1", "x", 1)
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedScheme(_)));
        assert!(f.documents.managed_paths().is_empty());
    }

    #[test]
    fn missing_file_is_not_tracked() {
        let f = fixture("");
        let missing = NormalizedPath::from_uri(&f.uri)
            .to_file_path()
            .unwrap()
            .with_file_name("missing.txt");
        let uri = NormalizedPath::from_local_path(&missing).to_string();
        let err = f.documents.start_managing(&uri, "x", 1).unwrap_err();
        assert!(matches!(err, DocumentError::FileNotFound(_)));
        assert!(!f.documents.is_managed(&NormalizedPath::from_uri(&uri)));
        assert!(f.documents.managed_paths().is_empty());
    }

    #[test]
    fn ranged_changes_apply_in_order() {
        let f = fixture("");
        f.documents
            .start_managing(&f.uri, "fn main() {\n    old();\n}\n", 3)
            .unwrap();
        f.documents
            .update_document(
                &f.uri,
                5,
                vec![ranged(1, 4, 1, 7, "new"), ranged(0, 3, 0, 7, "start")],
            )
            .unwrap();
        assert_eq!(f.text(), "fn start() {\n    new();\n}\n");
        assert_eq!(f.documents.version(&f.path()), Some(5));
    }

    #[test]
    fn ranged_change_uses_utf16_columns() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "a😀b", 1).unwrap();
        // The emoji is two UTF-16 code units wide.
        f.documents
            .update_document(&f.uri, 2, vec![ranged(0, 3, 0, 4, "c")])
            .unwrap();
        assert_eq!(f.text(), "a😀c");
    }

    #[test]
    fn mismatched_version_leaves_buffer_alone() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "abcd", 2).unwrap();
        let err = f
            .documents
            .update_document(&f.uri, 5, vec![full("zzz")])
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::VersionMismatch {
                ours: 2,
                theirs: 5,
                changes: 1
            }
        ));
        assert_eq!(f.text(), "abcd");
        assert_eq!(f.documents.version(&f.path()), Some(2));
    }

    #[test]
    fn extreme_versions_are_mismatches() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "abc", 1).unwrap();
        let err = f
            .documents
            .update_document(&f.uri, i32::MIN, vec![full("x")])
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::VersionMismatch {
                ours: 1,
                theirs: i32::MIN,
                changes: 1
            }
        ));
        assert_eq!(f.text(), "abc");
        assert_eq!(f.documents.version(&f.path()), Some(1));
    }

    #[test]
    fn save_resets_version_tracking() {
        let f = fixture("saved");
        f.documents.start_managing(&f.uri, "edited", 4).unwrap();
        f.documents.sync_document(&f.uri).unwrap();
        assert_eq!(f.text(), "saved");
        assert_eq!(f.documents.version(&f.path()), None);
        f.documents
            .update_document(&f.uri, 42, vec![full("again")])
            .unwrap();
        assert_eq!(f.documents.version(&f.path()), Some(42));
    }

    #[test]
    fn changes_to_unmanaged_documents_are_rejected() {
        let f = fixture("x");
        let err = f
            .documents
            .update_document(&f.uri, 1, vec![full("y")])
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotManaged(_)));
    }

    #[test]
    fn closing_untracked_document_is_an_error_not_a_panic() {
        let f = fixture("x");
        let err = f.documents.stop_managing(&f.uri).unwrap_err();
        assert!(matches!(err, DocumentError::NotManaged(_)));
    }

    #[test]
    fn duplicate_open_resets() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "one", 7).unwrap();
        f.documents.start_managing(&f.uri, "two", 1).unwrap();
        assert_eq!(f.text(), "two");
        assert_eq!(f.documents.version(&f.path()), Some(1));
        assert_eq!(f.documents.managed_paths().len(), 1);
    }

    #[test]
    fn close_all_closes_backend_editors() {
        let f = fixture("");
        f.documents.start_managing(&f.uri, "x", 1).unwrap();
        assert_eq!(f.project.open_editors().len(), 1);
        f.documents.close_all();
        assert!(f.project.open_editors().is_empty());
        assert!(f.documents.managed_paths().is_empty());
    }
}
