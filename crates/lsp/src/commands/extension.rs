use std::collections::HashSet;

use harbor_core::{BackendError, ExecutorContext, Project};

use super::Command;
use crate::ext::RunnableSpec;

/// Buffer text of a file the client cannot read itself.
#[derive(Debug, Clone, Copy)]
pub struct ClassFileContents;

impl Command for ClassFileContents {
    type Output = String;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        _project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        Ok(ctx.text())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Runnables;

impl Command for Runnables {
    type Output = Vec<RunnableSpec>;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let mut seen = HashSet::new();
        Ok(project
            .runnables(ctx)?
            .into_iter()
            .filter(|r| seen.insert(r.label.clone()))
            .map(|r| RunnableSpec {
                label: r.label,
                working_directory: r.working_directory,
                command: r.command,
                args: r.args,
            })
            .collect())
    }
}
