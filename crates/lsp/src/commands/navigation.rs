use harbor_core::model::{DefinitionKind, SymbolNode};
use harbor_core::{BackendError, ExecutorContext, Project};
use lsp_types::{
    DocumentHighlightKind, DocumentSymbol, DocumentSymbolResponse, Documentation,
    GotoDefinitionResponse, HoverContents, Location, LocationLink, MarkupContent, MarkupKind,
    ParameterInformation, ParameterLabel, SignatureInformation,
};

use super::Command;
use crate::convert;

/// Definition, type definition or implementation, answered with location
/// links.
#[derive(Debug, Clone, Copy)]
pub struct FindDefinition {
    pub kind: DefinitionKind,
}

impl Command for FindDefinition {
    type Output = GotoDefinitionResponse;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let targets = project.find_definitions(ctx, self.kind)?;
        let links = targets
            .iter()
            .filter_map(|t| {
                Some(LocationLink {
                    origin_selection_range: t.origin.map(convert::range),
                    target_uri: convert::uri(&t.path)?,
                    target_range: convert::range(t.range),
                    target_selection_range: convert::range(t.selection),
                })
            })
            .collect();
        Ok(GotoDefinitionResponse::Link(links))
    }
}

/// References, answered with plain locations.
#[derive(Debug, Clone, Copy)]
pub struct FindUsages;

impl Command for FindUsages {
    type Output = Vec<Location>;

    fn cancellable(&self) -> bool {
        true
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        let usages = project.find_usages(ctx)?;
        ctx.check_cancelled()?;
        Ok(usages.iter().filter_map(convert::location).collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentHighlight;

impl Command for DocumentHighlight {
    type Output = Vec<lsp_types::DocumentHighlight>;

    fn cancellable(&self) -> bool {
        false
    }

    fn execute(
        &self,
        project: &dyn Project,
        ctx: &ExecutorContext,
    ) -> Result<Self::Output, BackendError> {
        Ok(project
            .document_highlights(ctx)?
            .into_iter()
            .map(|h| lsp_types::DocumentHighlight {
                range: convert::range(h.range),
                kind: Some(if h.write {
                    DocumentHighlightKind::WRITE
                } else {
                    DocumentHighlightKind::READ
                }),
            })
            .collect())
    }
}

/// The outline, answered as a nested tree.
#[derive(Debug, Clone, Copy)]
pub struct DocumentSymbols;

impl Command for DocumentSymbols {
    type Output = DocumentSymbolResponse;

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
        let nodes = project.document_symbols(ctx)?;
        ctx.check_cancelled()?;
        Ok(DocumentSymbolResponse::Nested(
            nodes.iter().map(document_symbol).collect(),
        ))
    }
}

#[allow(deprecated)]
fn document_symbol(node: &SymbolNode) -> DocumentSymbol {
    DocumentSymbol {
        name: node.name.clone(),
        detail: node.detail.clone(),
        kind: convert::symbol_kind(node.kind),
        tags: None,
        deprecated: None,
        range: convert::range(node.range),
        selection_range: convert::range(node.selection),
        children: if node.children.is_empty() {
            None
        } else {
            Some(node.children.iter().map(document_symbol).collect())
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hover;

impl Command for Hover {
    type Output = Option<lsp_types::Hover>;

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
        Ok(project.hover(ctx)?.map(|info| lsp_types::Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: info.contents,
            }),
            range: info.range.map(convert::range),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SignatureHelp;

impl Command for SignatureHelp {
    type Output = Option<lsp_types::SignatureHelp>;

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
        let Some(info) = project.signature_help(ctx)? else {
            return Ok(None);
        };
        ctx.check_cancelled()?;
        let signature = SignatureInformation {
            label: info.label,
            documentation: info.documentation.map(Documentation::String),
            parameters: Some(
                info.parameters
                    .into_iter()
                    .map(|p| ParameterInformation {
                        label: ParameterLabel::Simple(p),
                        documentation: None,
                    })
                    .collect(),
            ),
            active_parameter: info.active_parameter,
        };
        Ok(Some(lsp_types::SignatureHelp {
            signatures: vec![signature],
            active_signature: Some(0),
            active_parameter: info.active_parameter,
        }))
    }
}
