use harbor_core::{BackendError, NormalizedPath};
use lsp_server::ErrorCode;

/// Why a document lifecycle notification could not be applied.
///
/// None of these reach the client: notifications have no response, so the
/// router logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unsupported uri scheme: {0}")]
    UnsupportedScheme(String),

    #[error("document is not managed: {0}")]
    NotManaged(NormalizedPath),

    /// The client skipped or repeated a version.
    #[error("version mismatch: stored {ours}, received {theirs} with {changes} change(s)")]
    VersionMismatch { ours: i32, theirs: i32, changes: i32 },

    #[error("file not found: {0}")]
    FileNotFound(NormalizedPath),

    #[error("no editor for {0}")]
    NoEditor(NormalizedPath),

    #[error("buffer is read-only: {0}")]
    ReadOnly(NormalizedPath),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Outcome of a request that did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Cancelled through `$/cancelRequest`; distinct from a failure.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(BackendError),

    /// The worker pool or exclusive thread has shut down.
    #[error("executor is shut down")]
    ExecutorUnavailable,
}

impl From<BackendError> for CommandError {
    fn from(err: BackendError) -> Self {
        if err.is_cancelled() {
            CommandError::Cancelled
        } else {
            CommandError::Backend(err)
        }
    }
}

impl CommandError {
    /// JSON-RPC error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::Cancelled => ErrorCode::RequestCanceled,
            CommandError::Backend(_) => ErrorCode::RequestFailed,
            CommandError::ExecutorUnavailable => ErrorCode::InternalError,
        }
    }
}

/// Fatal errors of the listening loop or of one session's transport.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}
