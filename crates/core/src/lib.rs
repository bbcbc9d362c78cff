//! harbor-core: the backend side of the harbor language server.
//!
//! # Public API
//!
//! - [`NormalizedPath`] -- canonical URI keys
//! - [`LineIndex`], [`LineCol`], [`TextRange`] -- UTF-16 line/column addressing
//! - [`CancellationToken`] -- cooperative cancellation
//! - [`Backend`], [`Project`], [`Editor`] -- the capability interface the
//!   server consumes, with result types in [`model`]
//! - [`TextBackend`] -- a plain-text implementation of that interface

pub mod backend;
pub mod cancel;
pub mod error;
pub mod model;
pub mod path;
pub mod text;
pub mod text_backend;

// ── Convenience re-exports ───────────────────────────────────────────

pub use backend::{
    run_when_indexed, Backend, Editor, ExecutorContext, Project, ProjectEvent, ProjectListener,
    SubscriptionId,
};
pub use cancel::CancellationToken;
pub use error::BackendError;
pub use path::NormalizedPath;
pub use text::{normalize_line_endings, LineCol, LineIndex, TextRange};
pub use text_backend::{TextBackend, TextProject};
