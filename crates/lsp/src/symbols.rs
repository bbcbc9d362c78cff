use std::cmp::Reverse;

use harbor_core::model::SymbolMatch;
use harbor_core::{run_when_indexed, CancellationToken, Project};
use lsp_types::{OneOf, WorkspaceSymbol};
use tracing::debug;

use crate::convert;
use crate::error::CommandError;

/// `workspace/symbol` over the bound project.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceSymbolSearch {
    pub limit: usize,
}

impl WorkspaceSymbolSearch {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Up to `limit` symbols by descending weight, project symbols ahead of
    /// library symbols of equal weight. `None` while the index is being
    /// built; an empty query matches everything.
    pub fn run(
        &self,
        project: &dyn Project,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<WorkspaceSymbol>>, CommandError> {
        if project.is_indexing() {
            debug!("workspace symbols requested while indexing");
            return Ok(None);
        }
        let pattern = if query.is_empty() { "*" } else { query };
        let Some(found) = run_when_indexed(project, || {
            project.workspace_symbols(pattern, self.limit, cancel)
        }) else {
            return Ok(None);
        };
        let mut matches = found?;
        cancel.check()?;
        rank(&mut matches);
        matches.truncate(self.limit);
        Ok(Some(matches.iter().filter_map(symbol).collect()))
    }
}

fn rank(matches: &mut [SymbolMatch]) {
    matches.sort_by_key(|m| (Reverse(m.weight), !m.in_project));
}

fn symbol(m: &SymbolMatch) -> Option<WorkspaceSymbol> {
    Some(WorkspaceSymbol {
        name: m.name.clone(),
        kind: convert::symbol_kind(m.kind),
        tags: None,
        container_name: m.container.clone(),
        location: OneOf::Left(convert::location(&m.location)?),
        data: None,
    })
}
