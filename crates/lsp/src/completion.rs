//! The per-project completion snapshot.
//!
//! Each completion request replaces the single snapshot; items carry the
//! snapshot version they came from, and `completionItem/resolve` only
//! consults the backend while that version is still current.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use harbor_core::model::{CompletionCandidate, CompletionSnapshot};
use harbor_core::{CancellationToken, Project};
use lsp_types::{CompletionItem, CompletionTextEdit, TextEdit};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::convert;
use crate::error::CommandError;

/// Resolve payload attached to every completion item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItemData {
    pub snapshot_version: u64,
    pub candidate_index: usize,
}

#[derive(Default)]
pub struct CompletionCache {
    slot: ArcSwapOption<CompletionSnapshot>,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot, assigning it the next version. Concurrent
    /// stores both succeed; the last one wins.
    pub fn store(&self, snapshot: CompletionSnapshot) -> Arc<CompletionSnapshot> {
        loop {
            let current = self.slot.load_full();
            let version = current.as_ref().map_or(0, |s| s.version) + 1;
            let next = Arc::new(CompletionSnapshot {
                version,
                ..snapshot.clone()
            });
            let previous = self.slot.compare_and_swap(&current, Some(Arc::clone(&next)));
            if same_snapshot(&*previous, &current) {
                return next;
            }
        }
    }

    /// Version of the current snapshot, 0 before the first completion.
    pub fn current_version(&self) -> u64 {
        self.current().map_or(0, |s| s.version)
    }

    pub fn current(&self) -> Option<Arc<CompletionSnapshot>> {
        self.slot.load_full()
    }

    /// Fill in `item` from the backend if its snapshot is still current.
    /// Stale or foreign items come back unchanged.
    pub fn resolve(
        &self,
        mut item: CompletionItem,
        project: &dyn Project,
        cancel: &CancellationToken,
    ) -> Result<CompletionItem, CommandError> {
        let data = match item.data.clone().map(serde_json::from_value::<CompletionItemData>) {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                warn!("malformed completion resolve data: {e}");
                return Ok(item);
            }
            None => return Ok(item),
        };
        let Some(snapshot) = self.current() else {
            return Ok(item);
        };
        if snapshot.version != data.snapshot_version {
            debug!(
                "completion snapshot {} is stale (current {})",
                data.snapshot_version, snapshot.version
            );
            return Ok(item);
        }
        let Some(candidate) = snapshot.candidates.get(data.candidate_index) else {
            warn!("completion candidate {} out of range", data.candidate_index);
            return Ok(item);
        };

        let Some(resolution) = project.resolve_completion(&snapshot, data.candidate_index, cancel)?
        else {
            return Ok(item);
        };
        match item.text_edit.as_mut() {
            Some(CompletionTextEdit::Edit(edit)) => edit.new_text = resolution.new_text,
            Some(CompletionTextEdit::InsertAndReplace(edit)) => {
                edit.new_text = resolution.new_text
            }
            None => {
                item.text_edit = Some(CompletionTextEdit::Edit(TextEdit::new(
                    convert::range(candidate.replace),
                    resolution.new_text,
                )))
            }
        }
        if !resolution.additional_edits.is_empty() {
            item.additional_text_edits = Some(
                resolution
                    .additional_edits
                    .iter()
                    .map(convert::text_edit)
                    .collect(),
            );
        }
        Ok(item)
    }
}

fn same_snapshot(
    a: &Option<Arc<CompletionSnapshot>>,
    b: &Option<Arc<CompletionSnapshot>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// The protocol item for candidate `index` of snapshot `version`.
pub fn item_for(candidate: &CompletionCandidate, version: u64, index: usize) -> CompletionItem {
    CompletionItem {
        label: candidate.label.clone(),
        kind: Some(convert::completion_kind(candidate.kind)),
        detail: candidate.detail.clone(),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit::new(
            convert::range(candidate.replace),
            candidate.insert_text.clone(),
        ))),
        data: serde_json::to_value(CompletionItemData {
            snapshot_version: version,
            candidate_index: index,
        })
        .ok(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::model::SymbolKind;
    use harbor_core::{LineCol, NormalizedPath, TextRange};

    fn snapshot(labels: &[&str]) -> CompletionSnapshot {
        CompletionSnapshot {
            version: 0,
            path: NormalizedPath::from_uri("file:///p/a.rs"),
            text: String::new(),
            position: LineCol::default(),
            language: Some("rust".into()),
            candidates: labels
                .iter()
                .map(|l| CompletionCandidate {
                    label: (*l).into(),
                    kind: SymbolKind::Function,
                    detail: None,
                    insert_text: (*l).into(),
                    replace: TextRange::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn versions_increase_and_last_store_wins() {
        let cache = CompletionCache::new();
        assert_eq!(cache.current_version(), 0);
        assert_eq!(cache.store(snapshot(&["a"])).version, 1);
        assert_eq!(cache.store(snapshot(&["b"])).version, 2);
        let current = cache.current().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.candidates[0].label, "b");
    }

    #[test]
    fn concurrent_stores_get_distinct_versions() {
        let cache = Arc::new(CompletionCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.store(snapshot(&["x"])).version)
            })
            .collect();
        let mut versions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>());
        assert_eq!(cache.current_version(), 8);
    }

    fn project() -> (tempfile::TempDir, Arc<dyn Project>) {
        use harbor_core::{Backend, TextBackend};
        let dir = tempfile::TempDir::new().unwrap();
        let project = TextBackend::new()
            .resolve_project(&NormalizedPath::from_local_path(dir.path()))
            .unwrap();
        (dir, project)
    }

    #[test]
    fn stale_items_pass_through_unchanged() {
        let (_dir, project) = project();
        let cache = CompletionCache::new();
        let first = cache.store(snapshot(&["run"]));
        let item = item_for(&first.candidates[0], first.version, 0);
        cache.store(snapshot(&["run"]));

        let resolved = cache
            .resolve(item.clone(), &*project, &CancellationToken::new())
            .unwrap();
        assert_eq!(resolved, item);
    }

    #[test]
    fn current_items_are_resolved() {
        let (_dir, project) = project();
        let cache = CompletionCache::new();
        let snap = cache.store(snapshot(&["run"]));
        let item = item_for(&snap.candidates[0], snap.version, 0);

        let resolved = cache
            .resolve(item, &*project, &CancellationToken::new())
            .unwrap();
        match resolved.text_edit {
            Some(CompletionTextEdit::Edit(edit)) => assert_eq!(edit.new_text, "run()"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn items_without_data_pass_through() {
        let (_dir, project) = project();
        let cache = CompletionCache::new();
        cache.store(snapshot(&["run"]));
        let item = CompletionItem::new_simple("run".into(), String::new());
        let resolved = cache
            .resolve(item.clone(), &*project, &CancellationToken::new())
            .unwrap();
        assert_eq!(resolved, item);
    }

    #[test]
    fn item_carries_its_snapshot() {
        let snap = snapshot(&["run"]);
        let item = item_for(&snap.candidates[0], 3, 0);
        let data: CompletionItemData = serde_json::from_value(item.data.unwrap()).unwrap();
        assert_eq!(
            data,
            CompletionItemData {
                snapshot_version: 3,
                candidate_index: 0
            }
        );
    }
}
