//! Backend result types.
//!
//! These are what a backend hands back to the server; the lsp crate
//! translates them into protocol types. Kinds and severities are semantic
//! tags, never presentation data.

use std::collections::BTreeMap;

use crate::path::NormalizedPath;
use crate::text::{LineCol, TextRange};

// ── Tags ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Interface,
    Enum,
    EnumMember,
    Struct,
    Trait,
    TypeAlias,
    TypeParameter,
    Function,
    Method,
    Constructor,
    Field,
    Property,
    Variable,
    Constant,
    Keyword,
    Text,
}

impl SymbolKind {
    /// Kinds that name a type, the targets of "go to type definition".
    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Enum
                | SymbolKind::Struct
                | SymbolKind::Trait
                | SymbolKind::TypeAlias
        )
    }

    pub fn is_callable(self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor
        )
    }
}

/// Backend finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Informational finding that is only rendered as a highlight.
    Weak,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Declaration,
    TypeDeclaration,
    Implementation,
}

// ── Locations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocation {
    pub path: NormalizedPath,
    pub range: TextRange,
}

/// A navigation target, with the span that was clicked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionTarget {
    pub origin: Option<TextRange>,
    pub path: NormalizedPath,
    /// The whole declaration.
    pub range: TextRange,
    /// The declared name inside `range`.
    pub selection: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub range: TextRange,
    pub write: bool,
}

// ── Symbols ────────────────────────────────────────────────────────────

/// One entry of a document outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNode {
    pub name: String,
    pub detail: Option<String>,
    pub kind: SymbolKind,
    pub range: TextRange,
    pub selection: TextRange,
    pub children: Vec<SymbolNode>,
}

/// A workspace symbol search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: SymbolKind,
    pub container: Option<String>,
    pub location: FileLocation,
    /// Higher is a better match.
    pub weight: u32,
    /// Whether the symbol lives in the project's own sources rather than a
    /// library.
    pub in_project: bool,
}

// ── Completion ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub kind: SymbolKind,
    pub detail: Option<String>,
    pub insert_text: String,
    /// Span replaced by `insert_text`.
    pub replace: TextRange,
}

/// A computed candidate list, kept so that later resolve calls can refer
/// back to it.
#[derive(Debug, Clone)]
pub struct CompletionSnapshot {
    pub version: u64,
    pub path: NormalizedPath,
    pub text: String,
    pub position: LineCol,
    pub language: Option<String>,
    pub candidates: Vec<CompletionCandidate>,
}

/// The edits produced by inserting a completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResolution {
    pub new_text: String,
    pub additional_edits: Vec<TextChange>,
}

// ── Edits ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub range: TextRange,
    pub new_text: String,
}

/// Edits grouped per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    pub changes: BTreeMap<NormalizedPath, Vec<TextChange>>,
}

impl FileChanges {
    pub fn push(&mut self, path: NormalizedPath, change: TextChange) {
        self.changes.entry(path).or_default().push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.values().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormattingOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

// ── Presentation-free documentation ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    /// Markdown.
    pub contents: String,
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub label: String,
    pub documentation: Option<String>,
    pub parameters: Vec<String>,
    pub active_parameter: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickFix {
    pub title: String,
    pub range: TextRange,
}

/// A run configuration the client can launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runnable {
    pub label: String,
    pub working_directory: String,
    pub command: String,
    pub args: Vec<String>,
}

// ── Events ─────────────────────────────────────────────────────────────

/// A long-running backend task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task type name, e.g. `indexing`.
    pub kind: String,
    /// Unique for the lifetime of the backend.
    pub id: u64,
    pub title: String,
}

impl TaskInfo {
    /// Progress token derived from the task identity.
    pub fn progress_token(&self) -> String {
        format!("{}@{:x}", self.kind, self.id)
    }
}

/// A background analysis result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub range: TextRange,
    pub severity: Severity,
    pub description: Option<String>,
}
