//! Translation between backend model types and `lsp_types`.

use std::collections::HashMap;
use std::str::FromStr;

use harbor_core::model::{
    FileChanges, FileLocation, Finding, FormattingOptions, Severity, SymbolKind, TextChange,
};
use harbor_core::{LineCol, NormalizedPath, TextRange};
use lsp_types::{
    CompletionItemKind, Diagnostic, DiagnosticSeverity, Location, Position, Range, TextEdit, Uri,
    WorkspaceEdit,
};

/// Source tag on every published diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "harbor";

pub fn line_col(position: Position) -> LineCol {
    LineCol {
        line: position.line,
        character: position.character,
    }
}

pub fn position(pos: LineCol) -> Position {
    Position::new(pos.line, pos.character)
}

pub fn text_range(range: Range) -> TextRange {
    TextRange {
        start: line_col(range.start),
        end: line_col(range.end),
    }
}

pub fn range(range: TextRange) -> Range {
    Range::new(position(range.start), position(range.end))
}

/// A protocol URI for `path`, percent-encoding whatever the normalized form
/// decoded.
pub fn uri(path: &NormalizedPath) -> Option<Uri> {
    let encoded = url::Url::parse(path.as_str()).ok()?;
    Uri::from_str(encoded.as_str()).ok()
}

pub fn location(loc: &FileLocation) -> Option<Location> {
    Some(Location::new(uri(&loc.path)?, range(loc.range)))
}

pub fn text_edit(change: &TextChange) -> TextEdit {
    TextEdit::new(range(change.range), change.new_text.clone())
}

pub fn workspace_edit(changes: &FileChanges) -> WorkspaceEdit {
    let mut out: HashMap<Uri, Vec<TextEdit>> = HashMap::new();
    for (path, edits) in &changes.changes {
        let Some(uri) = uri(path) else {
            tracing::warn!("dropping edits for {path}: not expressible as a uri");
            continue;
        };
        out.entry(uri)
            .or_default()
            .extend(edits.iter().map(text_edit));
    }
    WorkspaceEdit::new(out)
}

pub fn formatting_options(options: &lsp_types::FormattingOptions) -> FormattingOptions {
    FormattingOptions {
        tab_size: options.tab_size,
        insert_spaces: options.insert_spaces,
    }
}

pub fn symbol_kind(kind: SymbolKind) -> lsp_types::SymbolKind {
    use lsp_types::SymbolKind as K;
    match kind {
        SymbolKind::File => K::FILE,
        SymbolKind::Module => K::MODULE,
        SymbolKind::Namespace => K::NAMESPACE,
        SymbolKind::Package => K::PACKAGE,
        SymbolKind::Class => K::CLASS,
        SymbolKind::Interface | SymbolKind::Trait => K::INTERFACE,
        SymbolKind::Enum => K::ENUM,
        SymbolKind::EnumMember => K::ENUM_MEMBER,
        SymbolKind::Struct => K::STRUCT,
        SymbolKind::TypeAlias => K::CLASS,
        SymbolKind::TypeParameter => K::TYPE_PARAMETER,
        SymbolKind::Function => K::FUNCTION,
        SymbolKind::Method => K::METHOD,
        SymbolKind::Constructor => K::CONSTRUCTOR,
        SymbolKind::Field => K::FIELD,
        SymbolKind::Property => K::PROPERTY,
        SymbolKind::Variable => K::VARIABLE,
        SymbolKind::Constant => K::CONSTANT,
        SymbolKind::Keyword | SymbolKind::Text => K::STRING,
    }
}

pub fn completion_kind(kind: SymbolKind) -> CompletionItemKind {
    use CompletionItemKind as K;
    match kind {
        SymbolKind::File => K::FILE,
        SymbolKind::Module | SymbolKind::Namespace | SymbolKind::Package => K::MODULE,
        SymbolKind::Class | SymbolKind::TypeAlias => K::CLASS,
        SymbolKind::Interface | SymbolKind::Trait => K::INTERFACE,
        SymbolKind::Enum => K::ENUM,
        SymbolKind::EnumMember => K::ENUM_MEMBER,
        SymbolKind::Struct => K::STRUCT,
        SymbolKind::TypeParameter => K::TYPE_PARAMETER,
        SymbolKind::Function => K::FUNCTION,
        SymbolKind::Method => K::METHOD,
        SymbolKind::Constructor => K::CONSTRUCTOR,
        SymbolKind::Field => K::FIELD,
        SymbolKind::Property => K::PROPERTY,
        SymbolKind::Variable => K::VARIABLE,
        SymbolKind::Constant => K::CONSTANT,
        SymbolKind::Keyword => K::KEYWORD,
        SymbolKind::Text => K::TEXT,
    }
}

pub fn severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Error => DiagnosticSeverity::ERROR,
        _ => DiagnosticSeverity::HINT,
    }
}

/// `None` for findings without a description; those are never published.
pub fn diagnostic(finding: &Finding) -> Option<Diagnostic> {
    let message = finding.description.as_deref().filter(|d| !d.is_empty())?;
    Some(Diagnostic {
        range: range(finding.range),
        severity: Some(severity(finding.severity)),
        source: Some(DIAGNOSTIC_SOURCE.to_owned()),
        message: message.to_owned(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_reencodes_decoded_characters() {
        let path = NormalizedPath::from_uri("file:///My%20Docs/a.txt");
        assert_eq!(path.as_str(), "file:///My Docs/a.txt");
        assert_eq!(uri(&path).unwrap().as_str(), "file:///My%20Docs/a.txt");
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(severity(Severity::Info), DiagnosticSeverity::INFORMATION);
        assert_eq!(severity(Severity::Warning), DiagnosticSeverity::WARNING);
        assert_eq!(severity(Severity::Error), DiagnosticSeverity::ERROR);
        assert_eq!(severity(Severity::Weak), DiagnosticSeverity::HINT);
    }

    #[test]
    fn findings_without_text_are_skipped() {
        let mut finding = Finding {
            range: TextRange::default(),
            severity: Severity::Error,
            description: None,
        };
        assert!(diagnostic(&finding).is_none());
        finding.description = Some(String::new());
        assert!(diagnostic(&finding).is_none());
        finding.description = Some("unclosed `(`".into());
        let diag = diagnostic(&finding).unwrap();
        assert_eq!(diag.source.as_deref(), Some("harbor"));
        assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
    }

    #[test]
    fn workspace_edit_groups_by_file() {
        let mut changes = FileChanges::default();
        let a = NormalizedPath::from_uri("file:///p/a.rs");
        changes.push(
            a.clone(),
            TextChange {
                range: TextRange::default(),
                new_text: "x".into(),
            },
        );
        changes.push(
            a,
            TextChange {
                range: TextRange::default(),
                new_text: "y".into(),
            },
        );
        let edit = workspace_edit(&changes);
        let map = edit.changes.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.values().next().unwrap().len(), 2);
    }
}
