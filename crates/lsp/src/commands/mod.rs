//! One command per protocol request.
//!
//! A command is the parameterized unit of work the router hands to the
//! [`AsyncExecutor`](crate::executor::AsyncExecutor). It declares whether
//! it honours cancellation and which thread it must run on, calls the
//! backend and translates the result into the protocol type. Which union
//! variant a command answers with (locations, location links, nested
//! symbols) is fixed per command.

use harbor_core::{BackendError, ExecutorContext, Project};
use serde::Serialize;

mod editing;
mod extension;
mod navigation;

pub use editing::{
    CodeActionData, CodeActions, Completion, Formatting, OnTypeFormatting, Rename,
    ResolveCodeAction,
};
pub use extension::{ClassFileContents, Runnables};
pub use navigation::{
    DocumentHighlight, DocumentSymbols, FindDefinition, FindUsages, Hover, SignatureHelp,
};

pub trait Command: Send + Sync + 'static {
    type Output: Serialize + Send + 'static;

    /// Whether `$/cancelRequest` reaches the backend call.
    fn cancellable(&self) -> bool;

    /// Whether the backend call must run on the exclusive thread.
    fn run_on_exclusive(&self) -> bool {
        true
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError>;

    /// The answer when no editor could be resolved for the document.
    fn unresolved(&self) -> Option<Self::Output> {
        None
    }
}
