use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;

use parking_lot::RwLock;

use super::project::ProjectInner;
use crate::backend::Editor;
use crate::error::BackendError;
use crate::path::NormalizedPath;

/// An in-memory copy of one file.
pub(crate) struct TextEditor {
    path: NormalizedPath,
    file: PathBuf,
    buffer: RwLock<String>,
    caret: AtomicUsize,
    writable: bool,
    owner: Weak<ProjectInner>,
}

impl TextEditor {
    pub fn load(
        path: NormalizedPath,
        file: PathBuf,
        owner: Weak<ProjectInner>,
    ) -> Result<Self, BackendError> {
        let text = std::fs::read_to_string(&file)?;
        let writable = std::fs::metadata(&file)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false);
        Ok(Self {
            path,
            file,
            buffer: RwLock::new(text),
            caret: AtomicUsize::new(0),
            writable,
            owner,
        })
    }

    fn changed(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.buffer_changed(&self.path, self.text());
        }
    }
}

impl Editor for TextEditor {
    fn path(&self) -> &NormalizedPath {
        &self.path
    }

    fn text(&self) -> String {
        self.buffer.read().clone()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn edit(&self, apply: &mut dyn FnMut(&mut String)) -> Result<(), BackendError> {
        if !self.writable {
            return Err(BackendError::Failed(format!("{} is read-only", self.path)));
        }
        {
            let mut buffer = self.buffer.write();
            apply(&mut buffer);
            let len = buffer.len();
            self.caret.fetch_min(len, Ordering::Relaxed);
        }
        self.changed();
        Ok(())
    }

    fn reload_from_disk(&self) -> Result<(), BackendError> {
        let text = std::fs::read_to_string(&self.file)?;
        {
            let mut buffer = self.buffer.write();
            *buffer = text;
            let len = buffer.len();
            self.caret.fetch_min(len, Ordering::Relaxed);
        }
        self.changed();
        Ok(())
    }

    fn caret(&self) -> usize {
        self.caret.load(Ordering::Relaxed)
    }

    fn move_caret(&self, offset: usize) {
        let len = self.buffer.read().len();
        self.caret.store(offset.min(len), Ordering::Relaxed);
    }
}
