//! Harbor language server: LSP sessions over a loopback TCP socket.
//!
//! A [`ServerRunner`] accepts one client at a time. Each connection gets a
//! [`Session`] that binds a backend project on `initialize`, keeps the
//! client's open documents in sync with backend editors, and runs requests
//! as commands on an [`AsyncExecutor`](executor::AsyncExecutor): a worker
//! pool plus one exclusive thread for work that needs the backend alone.
//!
//! # Public API
//!
//! - [`ServerRunner`], [`ServerHandle`], [`LifecycleState`] -- the
//!   listening loop
//! - [`Session`], [`SessionPhase`] -- one client connection
//! - [`ServerConfig`] -- runner settings
//! - [`commands::Command`] -- one request's work against a project

pub mod capabilities;
pub mod client;
pub mod commands;
pub mod completion;
pub mod config;
pub mod convert;
pub mod documents;
pub mod error;
pub mod executor;
pub mod ext;
pub mod publish;
pub mod router;
pub mod runner;
pub mod session;
pub mod symbols;
pub mod transport;

// ── Convenience re-exports ───────────────────────────────────────────

pub use config::ServerConfig;
pub use error::{CommandError, DocumentError, ServerError};
pub use runner::{LifecycleState, ServerHandle, ServerRunner};
pub use session::{ProjectSlot, Session, SessionEnd, SessionPhase};
