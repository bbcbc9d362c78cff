use std::sync::Arc;

use harbor_core::model::{CompletionSnapshot, FormattingOptions};
use harbor_core::{BackendError, ExecutorContext, LineCol, LineIndex, Project, TextRange};
use lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, CompletionList, CompletionResponse, Range,
    TextEdit, WorkspaceEdit,
};
use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag, TextDiff};

use super::Command;
use crate::completion::{item_for, CompletionCache};
use crate::convert;

// ── Completion ────────────────────────────────────────────────────────

/// Completion at `position`; replaces the project's completion snapshot.
pub struct Completion {
    pub cache: Arc<CompletionCache>,
    pub position: LineCol,
}

impl Command for Completion {
    type Output = CompletionResponse;

    fn cancellable(&self) -> bool {
        true
    }

    fn run_on_exclusive(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let candidates = project.completions(ctx)?;
        ctx.check_cancelled()?;
        let snapshot = self.cache.store(CompletionSnapshot {
            version: 0,
            path: ctx.path.clone(),
            text: ctx.text(),
            position: self.position,
            language: ctx.path.extension().map(str::to_owned),
            candidates,
        });
        let items = snapshot
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| item_for(c, snapshot.version, i))
            .collect();
        Ok(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        }))
    }
}

// ── Code actions ──────────────────────────────────────────────────────

/// Resolve payload attached to every listed quick fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeActionData {
    pub uri: String,
    pub range: Range,
}

pub struct CodeActions {
    pub uri: String,
    pub range: TextRange,
}

impl Command for CodeActions {
    type Output = Vec<CodeActionOrCommand>;

    fn cancellable(&self) -> bool {
        false
    }

    fn run_on_exclusive(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let data = serde_json::to_value(CodeActionData {
            uri: self.uri.clone(),
            range: convert::range(self.range),
        })
        .ok();
        Ok(project
            .code_actions(ctx, self.range)?
            .into_iter()
            .map(|fix| {
                CodeActionOrCommand::CodeAction(CodeAction {
                    title: fix.title,
                    kind: Some(CodeActionKind::QUICKFIX),
                    data: data.clone(),
                    ..Default::default()
                })
            })
            .collect())
    }
}

/// Compute the edit of a listed quick fix.
pub struct ResolveCodeAction {
    pub action: CodeAction,
    pub range: TextRange,
}

impl Command for ResolveCodeAction {
    type Output = CodeAction;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let changes = project.apply_code_action(ctx, &self.action.title, self.range)?;
        let mut action = self.action.clone();
        action.edit = Some(convert::workspace_edit(&changes));
        Ok(action)
    }

    fn unresolved(&self) -> Option<Self::Output> {
        Some(self.action.clone())
    }
}

// ── Refactoring and formatting ────────────────────────────────────────

pub struct Rename {
    pub new_name: String,
}

impl Command for Rename {
    type Output = WorkspaceEdit;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let changes = project.rename(ctx, &self.new_name)?;
        Ok(convert::workspace_edit(&changes))
    }
}

/// Full (`range: None`) or range formatting.
pub struct Formatting {
    pub range: Option<TextRange>,
    pub options: FormattingOptions,
}

impl Command for Formatting {
    type Output = Vec<TextEdit>;

    fn cancellable(&self) -> bool {
        true
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let before = ctx.text();
        let after = project.reformat(ctx, self.range, &self.options)?;
        ctx.check_cancelled()?;
        Ok(diff_edits(&before, &after))
    }
}

pub struct OnTypeFormatting {
    pub typed: char,
    pub options: FormattingOptions,
}

impl Command for OnTypeFormatting {
    type Output = Vec<TextEdit>;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let before = ctx.text();
        let after = project.format_on_type(ctx, self.typed, &self.options)?;
        Ok(diff_edits(&before, &after))
    }
}

/// Line-level edits turning `before` into `after`.
pub(crate) fn diff_edits(before: &str, after: &str) -> Vec<TextEdit> {
    if before == after {
        return Vec::new();
    }
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(before, after);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();

    let mut line_starts = Vec::with_capacity(old_lines.len() + 1);
    let mut offset = 0;
    for line in old_lines {
        line_starts.push(offset);
        offset += line.len();
    }
    line_starts.push(offset);

    let index = LineIndex::new(before);
    diff.ops()
        .iter()
        .filter(|op| op.tag() != DiffTag::Equal)
        .map(|op| {
            let old = op.old_range();
            let start = index.position_of(before, line_starts[old.start]);
            let end = index.position_of(before, line_starts[old.end]);
            TextEdit::new(
                convert::range(TextRange { start, end }),
                new_lines[op.new_range()].concat(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply non-overlapping edits from last to first.
    fn apply(text: &str, edits: &[TextEdit]) -> String {
        let index = LineIndex::new(text);
        let mut spans: Vec<_> = edits
            .iter()
            .map(|e| {
                let (s, t) = index.span_of(text, convert::text_range(e.range));
                (s, t, e.new_text.as_str())
            })
            .collect();
        spans.sort_by_key(|(s, _, _)| std::cmp::Reverse(*s));
        let mut out = text.to_owned();
        for (s, t, new) in spans {
            out.replace_range(s..t, new);
        }
        out
    }

    #[test]
    fn identical_text_needs_no_edits() {
        assert!(diff_edits("a\nb\n", "a\nb\n").is_empty());
    }

    #[test]
    fn edits_touch_only_changed_lines() {
        let before = "fn a() {\n\tx();\n}\n\nfn b() {\n\ty();\n}\n";
        let after = "fn a() {\n    x();\n}\n\nfn b() {\n    y();\n}\n";
        let edits = diff_edits(before, after);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].range.start.line, 1);
        assert_eq!(edits[0].range.end.line, 2);
        assert_eq!(edits[0].new_text, "    x();\n");
        assert_eq!(apply(before, &edits), after);
    }

    #[test]
    fn insertions_deletions_and_missing_final_newline() {
        let before = "one\ntwo\nthree";
        let after = "zero\none\nthree\nfour\n";
        let edits = diff_edits(before, after);
        assert_eq!(apply(before, &edits), after);
    }
}
