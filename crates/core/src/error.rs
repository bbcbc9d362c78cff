/// Errors reported by a language intelligence backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No project exists at the requested root.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// The requested project root exists but is a regular file.
    #[error("project root is not a directory: {0}")]
    NotADirectory(String),

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure inside the backend.
    #[error("backend failure: {0}")]
    Failed(String),

    /// The backend panicked while serving the call.
    #[error("backend panicked: {0}")]
    Panicked(String),
}

impl BackendError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }

    /// Turn a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        BackendError::Panicked(message)
    }
}
