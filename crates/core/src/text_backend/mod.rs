//! A plain-text reference backend.
//!
//! `TextBackend` treats any directory as a project and answers every
//! capability with word-level heuristics: declarations are lines starting
//! with a declaration keyword, usages are whole-word matches. It is what the
//! `harbor` binary serves out of the box and what the server tests run
//! against.

mod editor;
mod features;
mod index;
mod project;
mod scan;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::backend::{Backend, Project};
use crate::error::BackendError;
use crate::path::NormalizedPath;

pub use project::TextProject;

#[derive(Default)]
pub struct TextBackend {
    projects: Mutex<HashMap<NormalizedPath, Arc<TextProject>>>,
    library_roots: Vec<PathBuf>,
    task_ids: Arc<AtomicU64>,
}

impl TextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories indexed alongside every project as library (non-project)
    /// sources.
    pub fn with_library_roots(library_roots: Vec<PathBuf>) -> Self {
        Self {
            library_roots,
            ..Self::default()
        }
    }

    /// The open project rooted at `root`, as its concrete type.
    pub fn project(&self, root: &NormalizedPath) -> Option<Arc<TextProject>> {
        self.projects.lock().get(root).cloned()
    }
}

impl Backend for TextBackend {
    fn resolve_project(&self, root: &NormalizedPath) -> Result<Arc<dyn Project>, BackendError> {
        let dir = root
            .to_file_path()
            .ok_or_else(|| BackendError::ProjectNotFound(root.to_string()))?;
        let meta = std::fs::metadata(&dir)
            .map_err(|_| BackendError::ProjectNotFound(root.to_string()))?;
        if !meta.is_dir() {
            return Err(BackendError::NotADirectory(root.to_string()));
        }

        let mut projects = self.projects.lock();
        if let Some(existing) = projects.get(root) {
            if existing.is_open() {
                return Ok(Arc::clone(existing) as Arc<dyn Project>);
            }
        }
        info!("opening project {root}");
        let project = Arc::new(TextProject::open(
            root.clone(),
            dir,
            self.library_roots.clone(),
            Arc::clone(&self.task_ids),
        ));
        projects.insert(root.clone(), Arc::clone(&project));
        Ok(project as Arc<dyn Project>)
    }

    fn close_project(&self, project: &Arc<dyn Project>) {
        let removed = self.projects.lock().remove(project.root());
        match removed {
            Some(project) => {
                info!("closing project {}", project.root());
                project.close();
            }
            None => warn!("project {} wasn't opened by this backend", project.root()),
        }
    }
}
