//! Word-level implementations of the backend capabilities.

use std::collections::HashSet;
use std::path::Path;

use super::index::{language_of, WordIndex};
use super::scan::{is_ident_char, occurrences, scan, word_at, words, Declaration, FileScan};
use crate::backend::ExecutorContext;
use crate::cancel::CancellationToken;
use crate::error::BackendError;
use crate::model::{
    CompletionCandidate, CompletionResolution, CompletionSnapshot, DefinitionKind,
    DefinitionTarget, FileChanges, FileLocation, Finding, FormattingOptions, Highlight,
    HoverInfo, QuickFix, Runnable, Severity, SignatureInfo, SymbolKind, SymbolMatch, SymbolNode,
    TextChange,
};
use crate::path::NormalizedPath;
use crate::text::{LineCol, LineIndex, TextRange};

const MAX_COMPLETIONS: usize = 200;
const MAX_LINE_WIDTH: usize = 120;

pub(crate) const REMOVE_TRAILING_WHITESPACE: &str = "Remove trailing whitespace";
pub(crate) const CONVERT_TABS: &str = "Convert indentation tabs to spaces";

/// The identifier under the caret: its text and range.
fn word_under_caret(text: &str, caret: usize) -> Option<(String, TextRange)> {
    let (start, end) = word_at(text, caret)?;
    let index = LineIndex::new(text);
    let range = TextRange::new(index.position_of(text, start), index.position_of(text, end));
    Some((text[start..end].to_owned(), range))
}

fn span_range(index: &LineIndex, text: &str, start: usize, end: usize) -> TextRange {
    TextRange::new(index.position_of(text, start), index.position_of(text, end))
}

// ── Navigation ─────────────────────────────────────────────────────────

pub(crate) fn definitions(
    index: &WordIndex,
    ctx: &ExecutorContext,
    kind: DefinitionKind,
) -> Result<Vec<DefinitionTarget>, BackendError> {
    let text = ctx.text();
    let Some((word, origin)) = word_under_caret(&text, ctx.caret()) else {
        return Ok(Vec::new());
    };
    let target = |path: &NormalizedPath, range: TextRange, selection: TextRange| {
        DefinitionTarget {
            origin: Some(origin),
            path: path.clone(),
            range,
            selection,
        }
    };
    let out = match kind {
        DefinitionKind::Declaration => index
            .declarations_named(&word, &ctx.path)
            .into_iter()
            .map(|(path, d)| target(path, d.range, d.selection))
            .collect(),
        DefinitionKind::TypeDeclaration => {
            let found = index.declarations_named(&word, &ctx.path);
            let mut type_names: Vec<String> = Vec::new();
            if found.iter().any(|(_, d)| d.kind.is_type()) {
                type_names.push(word.clone());
            } else {
                for (_, d) in &found {
                    if let Some(ty) = declared_type(d) {
                        if !type_names.contains(&ty) {
                            type_names.push(ty);
                        }
                    }
                }
            }
            let mut out = Vec::new();
            for ty in &type_names {
                ctx.check_cancelled()?;
                out.extend(
                    index
                        .declarations_named(ty, &ctx.path)
                        .into_iter()
                        .filter(|(_, d)| d.kind.is_type())
                        .map(|(path, d)| target(path, d.range, d.selection)),
                );
            }
            out
        }
        DefinitionKind::Implementation => {
            let mut out = Vec::new();
            for (path, file) in index.files() {
                ctx.check_cancelled()?;
                out.extend(
                    file.scan
                        .implementations
                        .iter()
                        .filter(|i| i.target == word)
                        .map(|i| target(path, i.range, i.selection)),
                );
            }
            out
        }
    };
    Ok(out)
}

/// The type named after `->`, `name:` or `= Type(` in a declaration line.
fn declared_type(decl: &Declaration) -> Option<String> {
    let line = &decl.detail;
    let (at, name) = words(line).find(|(_, w)| *w == decl.name)?;
    let tail = &line[at + name.len()..];
    // A return type wins over parameter annotations.
    let cut = ["->", ":", "="]
        .iter()
        .find_map(|m| tail.find(m).map(|i| i + m.len()))?;
    words(&tail[cut..])
        .map(|(_, w)| w)
        .find(|w| w.starts_with(|c: char| c.is_uppercase()))
        .map(str::to_owned)
}

pub(crate) fn usages(
    index: &WordIndex,
    ctx: &ExecutorContext,
) -> Result<Vec<FileLocation>, BackendError> {
    let text = ctx.text();
    let Some((word, _)) = word_under_caret(&text, ctx.caret()) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (path, file) in index.files() {
        ctx.check_cancelled()?;
        let spans = occurrences(&file.text, &word);
        if spans.is_empty() {
            continue;
        }
        let lines = LineIndex::new(&file.text);
        out.extend(spans.into_iter().map(|(s, e)| FileLocation {
            path: path.clone(),
            range: span_range(&lines, &file.text, s, e),
        }));
    }
    Ok(out)
}

pub(crate) fn highlights(ctx: &ExecutorContext) -> Result<Vec<Highlight>, BackendError> {
    let text = ctx.text();
    let Some((word, _)) = word_under_caret(&text, ctx.caret()) else {
        return Ok(Vec::new());
    };
    let declared: HashSet<TextRange> = scan(&text)
        .named(&word)
        .map(|d| d.selection)
        .collect();
    let lines = LineIndex::new(&text);
    Ok(occurrences(&text, &word)
        .into_iter()
        .map(|(s, e)| {
            let range = span_range(&lines, &text, s, e);
            let rest = text[e..].trim_start();
            let assigned = rest.starts_with('=') && !rest.starts_with("==");
            Highlight {
                range,
                write: declared.contains(&range) || assigned,
            }
        })
        .collect())
}

// ── Symbols ────────────────────────────────────────────────────────────

pub(crate) fn document_symbols(ctx: &ExecutorContext) -> Result<Vec<SymbolNode>, BackendError> {
    let text = ctx.text();
    let file = scan(&text);
    Ok(children_of(&file, None))
}

fn children_of(file: &FileScan, parent: Option<usize>) -> Vec<SymbolNode> {
    file.declarations
        .iter()
        .enumerate()
        .filter(|(_, d)| d.parent == parent)
        .map(|(i, d)| SymbolNode {
            name: d.name.clone(),
            detail: Some(d.detail.clone()),
            kind: d.kind,
            range: d.range,
            selection: d.selection,
            children: children_of(file, Some(i)),
        })
        .collect()
}

pub(crate) fn workspace_symbols(
    index: &WordIndex,
    pattern: &str,
    limit: usize,
    cancel: &CancellationToken,
    in_project: impl Fn(&NormalizedPath) -> bool,
) -> Result<Vec<SymbolMatch>, BackendError> {
    let needle: String = pattern.chars().filter(|&c| c != '*').collect();
    let mut out = Vec::new();
    for (path, file) in index.files() {
        cancel.check()?;
        let local = file.in_project && in_project(path);
        for decl in file.declarations_searchable() {
            let Some(weight) = match_weight(&needle, &decl.name) else {
                continue;
            };
            out.push(SymbolMatch {
                name: decl.name.clone(),
                kind: decl.kind,
                container: file.scan.container_of(decl).map(str::to_owned),
                location: FileLocation {
                    path: path.clone(),
                    range: decl.selection,
                },
                weight,
                in_project: local,
            });
            if out.len() >= limit {
                return Ok(out);
            }
        }
    }
    Ok(out)
}

/// Match quality of `name` against a pattern with wildcards removed.
fn match_weight(needle: &str, name: &str) -> Option<u32> {
    if needle.is_empty() {
        return Some(1);
    }
    if name == needle {
        return Some(100);
    }
    let lower_name = name.to_lowercase();
    let lower_needle = needle.to_lowercase();
    if lower_name == lower_needle {
        Some(90)
    } else if name.starts_with(needle) {
        Some(70)
    } else if lower_name.starts_with(&lower_needle) {
        Some(60)
    } else if lower_name.contains(&lower_needle) {
        Some(40)
    } else if is_subsequence(&lower_needle, &lower_name) {
        Some(10)
    } else {
        None
    }
}

fn is_subsequence(needle: &str, hay: &str) -> bool {
    let mut hay = hay.chars();
    needle.chars().all(|c| hay.any(|h| h == c))
}

// ── Documentation ──────────────────────────────────────────────────────

pub(crate) fn hover(
    index: &WordIndex,
    ctx: &ExecutorContext,
) -> Result<Option<HoverInfo>, BackendError> {
    let text = ctx.text();
    let Some((word, range)) = word_under_caret(&text, ctx.caret()) else {
        return Ok(None);
    };
    let Some((path, decl)) = index.declarations_named(&word, &ctx.path).into_iter().next() else {
        return Ok(None);
    };
    let lang = language_of(path).unwrap_or("");
    let mut contents = format!("```{lang}\n{}\n```", decl.detail.trim_end_matches('{').trim_end());
    if let Some(file) = index.get(path) {
        if let Some(container) = file.scan.container_of(decl) {
            contents.push_str(&format!("\n\n*in* `{container}`"));
        }
        if let Some(doc) = doc_comment(&file.text, decl.range.start.line) {
            contents.push_str("\n\n---\n\n");
            contents.push_str(&doc);
        }
    }
    Ok(Some(HoverInfo {
        contents,
        range: Some(range),
    }))
}

/// Comment lines directly above `line`, markers stripped.
fn doc_comment(text: &str, line: u32) -> Option<String> {
    let lines: Vec<&str> = text.lines().take(line as usize).collect();
    let mut doc: Vec<&str> = lines
        .iter()
        .rev()
        .map(|l| l.trim())
        .take_while(|l| l.starts_with("///") || l.starts_with("//") || l.starts_with('#') && !l.starts_with("#["))
        .map(|l| l.trim_start_matches(['/', '#', '!']).trim())
        .collect();
    if doc.is_empty() {
        return None;
    }
    doc.reverse();
    Some(doc.join("\n"))
}

pub(crate) fn signature_help(
    index: &WordIndex,
    ctx: &ExecutorContext,
) -> Result<Option<SignatureInfo>, BackendError> {
    let text = ctx.text();
    let caret = ctx.caret().min(text.len());
    let Some((open, active)) = enclosing_call(&text[..caret]) else {
        return Ok(None);
    };
    let before = text[..open].trim_end();
    let name_start = before
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_ident_char(c))
        .last()
        .map(|(i, _)| i);
    let Some(name_start) = name_start else {
        return Ok(None);
    };
    let name = &before[name_start..];
    let found = index.declarations_named(name, &ctx.path);
    let Some((path, decl)) = found.into_iter().find(|(_, d)| d.kind.is_callable()) else {
        return Ok(None);
    };
    let label = decl
        .detail
        .trim_end_matches(['{', ':'])
        .trim_end()
        .to_owned();
    let parameters = parameter_list(&label);
    let documentation = index
        .get(path)
        .and_then(|f| doc_comment(&f.text, decl.range.start.line));
    let active_parameter = if parameters.is_empty() {
        None
    } else {
        Some(active.min(parameters.len() as u32 - 1))
    };
    Ok(Some(SignatureInfo {
        label,
        documentation,
        parameters,
        active_parameter,
    }))
}

/// Offset of the unclosed `(` before the caret and the number of top-level
/// commas after it.
fn enclosing_call(before: &str) -> Option<(usize, u32)> {
    let mut depth = 0i32;
    let mut commas = 0u32;
    for (i, c) in before.char_indices().rev() {
        match c {
            ')' | ']' => depth += 1,
            '(' | '[' if depth > 0 => depth -= 1,
            '(' => return Some((i, commas)),
            '[' => return None,
            ',' if depth == 0 => commas += 1,
            ';' | '{' | '}' => return None,
            _ => {}
        }
    }
    None
}

fn parameter_list(label: &str) -> Vec<String> {
    let Some(open) = label.find('(') else {
        return Vec::new();
    };
    let mut depth = 0i32;
    let mut params = Vec::new();
    let mut current = String::new();
    for c in label[open + 1..].chars() {
        match c {
            '(' | '<' | '[' => depth += 1,
            ')' if depth == 0 => break,
            ')' | '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                params.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    params.push(current);
    params
        .into_iter()
        .map(|p| p.trim().to_owned())
        .filter(|p| !p.is_empty())
        .collect()
}

// ── Completion ─────────────────────────────────────────────────────────

pub(crate) fn completions(
    index: &WordIndex,
    ctx: &ExecutorContext,
) -> Result<Vec<CompletionCandidate>, BackendError> {
    let text = ctx.text();
    let caret = ctx.caret().min(text.len());
    let start = text[..caret]
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_ident_char(c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(caret);
    let prefix = &text[start..caret];
    let lower_prefix = prefix.to_lowercase();
    let lines = LineIndex::new(&text);
    let replace = span_range(&lines, &text, start, caret);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (_, file) in index.files() {
        ctx.check_cancelled()?;
        for decl in file.declarations_searchable() {
            if decl.name.to_lowercase().starts_with(&lower_prefix) && seen.insert(decl.name.clone())
            {
                out.push(CompletionCandidate {
                    label: decl.name.clone(),
                    kind: decl.kind,
                    detail: Some(decl.detail.clone()),
                    insert_text: decl.name.clone(),
                    replace,
                });
            }
        }
    }
    for (i, word) in words(&text) {
        if i == start || word == prefix {
            continue;
        }
        if word.to_lowercase().starts_with(&lower_prefix) && seen.insert(word.to_owned()) {
            out.push(CompletionCandidate {
                label: word.to_owned(),
                kind: SymbolKind::Text,
                detail: None,
                insert_text: word.to_owned(),
                replace,
            });
        }
    }
    out.sort_by(|a, b| {
        (a.kind == SymbolKind::Text)
            .cmp(&(b.kind == SymbolKind::Text))
            .then_with(|| a.label.cmp(&b.label))
    });
    out.truncate(MAX_COMPLETIONS);
    Ok(out)
}

pub(crate) fn resolve_completion(
    snapshot: &CompletionSnapshot,
    index: usize,
) -> Option<CompletionResolution> {
    let candidate = snapshot.candidates.get(index)?;
    if !candidate.kind.is_callable() {
        return None;
    }
    Some(CompletionResolution {
        new_text: format!("{}()", candidate.insert_text),
        additional_edits: Vec::new(),
    })
}

// ── Quick fixes and refactoring ────────────────────────────────────────

pub(crate) fn code_actions(
    ctx: &ExecutorContext,
    range: TextRange,
) -> Result<Vec<QuickFix>, BackendError> {
    let text = ctx.text();
    let lines = selected_lines(&text, range);
    let mut out = Vec::new();
    if lines.iter().any(|(_, l)| l.trim_end().len() != l.len()) {
        out.push(QuickFix {
            title: REMOVE_TRAILING_WHITESPACE.into(),
            range,
        });
    }
    if lines.iter().any(|(_, l)| l.starts_with('\t')) {
        out.push(QuickFix {
            title: CONVERT_TABS.into(),
            range,
        });
    }
    Ok(out)
}

pub(crate) fn apply_code_action(
    ctx: &ExecutorContext,
    title: &str,
    range: TextRange,
) -> Result<FileChanges, BackendError> {
    if title != REMOVE_TRAILING_WHITESPACE && title != CONVERT_TABS {
        return Err(BackendError::Failed(format!("unknown quick fix: {title}")));
    }
    let text = ctx.text();
    let mut changes = FileChanges::default();
    for (n, line) in selected_lines(&text, range) {
        let edit = if title == REMOVE_TRAILING_WHITESPACE {
            let kept = line.trim_end().len();
            (kept != line.len()).then(|| TextChange {
                range: TextRange::new(
                    LineCol::new(n, utf16_len(&line[..kept])),
                    LineCol::new(n, utf16_len(line)),
                ),
                new_text: String::new(),
            })
        } else {
            let tabs = line.len() - line.trim_start_matches('\t').len();
            (tabs > 0).then(|| TextChange {
                range: TextRange::new(LineCol::new(n, 0), LineCol::new(n, tabs as u32)),
                new_text: " ".repeat(tabs * 4),
            })
        };
        if let Some(edit) = edit {
            changes.push(ctx.path.clone(), edit);
        }
    }
    Ok(changes)
}

fn selected_lines(text: &str, range: TextRange) -> Vec<(u32, &str)> {
    text.split('\n')
        .enumerate()
        .map(|(n, l)| (n as u32, l.trim_end_matches('\r')))
        .filter(|(n, _)| *n >= range.start.line && *n <= range.end.line)
        .collect()
}

fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}

pub(crate) fn rename(
    index: &WordIndex,
    ctx: &ExecutorContext,
    new_name: &str,
) -> Result<FileChanges, BackendError> {
    let text = ctx.text();
    let mut changes = FileChanges::default();
    let Some((word, _)) = word_under_caret(&text, ctx.caret()) else {
        return Ok(changes);
    };
    if index.declarations_named(&word, &ctx.path).is_empty() {
        return Ok(changes);
    }
    for (path, file) in index.files() {
        ctx.check_cancelled()?;
        let lines = LineIndex::new(&file.text);
        for (s, e) in occurrences(&file.text, &word) {
            changes.push(
                path.clone(),
                TextChange {
                    range: span_range(&lines, &file.text, s, e),
                    new_text: new_name.to_owned(),
                },
            );
        }
    }
    Ok(changes)
}

// ── Formatting ─────────────────────────────────────────────────────────

pub(crate) fn reformat(
    ctx: &ExecutorContext,
    range: Option<TextRange>,
    options: &FormattingOptions,
) -> Result<String, BackendError> {
    let text = ctx.text();
    let (first, last) = match range {
        Some(r) => (r.start.line, r.end.line),
        None => (0, u32::MAX),
    };
    let mut out: Vec<String> = text
        .split('\n')
        .enumerate()
        .map(|(n, line)| {
            let n = n as u32;
            if n < first || n > last {
                return line.to_owned();
            }
            reindent(line.trim_end(), options)
        })
        .collect();
    if range.is_none() {
        while out.len() > 1 && out.last().is_some_and(|l| l.is_empty()) {
            out.pop();
        }
        if out.last().is_some_and(|l| !l.is_empty()) {
            out.push(String::new());
        }
    }
    Ok(out.join("\n"))
}

fn reindent(line: &str, options: &FormattingOptions) -> String {
    let body = line.trim_start_matches([' ', '\t']);
    let width: usize = line[..line.len() - body.len()]
        .chars()
        .map(|c| if c == '\t' { options.tab_size as usize } else { 1 })
        .sum();
    let indent = if options.insert_spaces || options.tab_size == 0 {
        " ".repeat(width)
    } else {
        let tab = options.tab_size as usize;
        format!("{}{}", "\t".repeat(width / tab), " ".repeat(width % tab))
    };
    format!("{indent}{body}")
}

pub(crate) fn format_on_type(
    ctx: &ExecutorContext,
    typed: char,
    options: &FormattingOptions,
) -> Result<String, BackendError> {
    let text = ctx.text();
    let caret = ctx.caret().min(text.len());
    let lines = LineIndex::new(&text);
    let line_no = lines.position_of(&text, caret).line as usize;
    let Some((start, end)) = lines.line_span(&text, line_no) else {
        return Ok(text);
    };
    let line = &text[start..end];
    let replacement = match typed {
        '}' if line.trim_start().starts_with('}') => {
            let Some(indent) = matching_open_indent(&text[..start]) else {
                return Ok(text);
            };
            let aligned = format!("{indent}{}", line.trim_start());
            reindent(&aligned, options)
        }
        ';' => {
            let mut fixed = String::with_capacity(line.len());
            for c in line.chars() {
                if c == ';' {
                    while fixed.ends_with([' ', '\t']) {
                        fixed.pop();
                    }
                }
                fixed.push(c);
            }
            fixed
        }
        _ => return Ok(text),
    };
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(&replacement);
    out.push_str(&text[end..]);
    Ok(out)
}

/// Indentation of the line holding the `{` that an appended `}` closes.
fn matching_open_indent(before: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut line_end = before.len();
    for (i, c) in before.char_indices().rev() {
        match c {
            '}' => depth += 1,
            '{' if depth == 0 => {
                let line_start = before[..i].rfind('\n').map(|p| p + 1).unwrap_or(0);
                let line = &before[line_start..line_end.max(line_start)];
                return Some(&line[..line.len() - line.trim_start().len()]);
            }
            '{' => depth -= 1,
            '\n' => line_end = i,
            _ => {}
        }
    }
    None
}

// ── Runnables ──────────────────────────────────────────────────────────

pub(crate) fn runnables(ctx: &ExecutorContext, dir: &Path) -> Result<Vec<Runnable>, BackendError> {
    let text = ctx.text();
    let cwd = dir.display().to_string();
    let file = ctx
        .path
        .to_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ctx.path.to_string());
    let mut out = Vec::new();
    let mut pending_test = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[test]") || trimmed.starts_with("@Test") {
            pending_test = true;
            continue;
        }
        let decl_words: Vec<&str> = words(trimmed).map(|(_, w)| w).take(4).collect();
        let fn_name = decl_words
            .iter()
            .position(|w| matches!(*w, "fn" | "def" | "fun"))
            .and_then(|i| decl_words.get(i + 1));
        if pending_test {
            if let Some(name) = fn_name {
                out.push(Runnable {
                    label: format!("Test {name}"),
                    working_directory: cwd.clone(),
                    command: "cargo".into(),
                    args: vec!["test".into(), (*name).to_owned()],
                });
                pending_test = false;
            }
            continue;
        }
        if fn_name == Some(&"main") {
            let (command, args) = match language_of(&ctx.path) {
                Some("python") => ("python3".to_owned(), vec![file.clone()]),
                Some("kotlin") => ("kotlin".to_owned(), vec![file.clone()]),
                _ => ("cargo".to_owned(), vec!["run".to_owned()]),
            };
            out.push(Runnable {
                label: "Run main".into(),
                working_directory: cwd.clone(),
                command,
                args,
            });
        } else if trimmed.starts_with("if __name__ == ") {
            out.push(Runnable {
                label: "Run main".into(),
                working_directory: cwd.clone(),
                command: "python3".into(),
                args: vec![file.clone()],
            });
        }
    }
    Ok(out)
}

// ── Background analysis ────────────────────────────────────────────────

/// Findings for a buffer: TODO markers, long lines, trailing whitespace and
/// unbalanced brackets.
pub(crate) fn analyze(text: &str) -> Vec<Finding> {
    let mut out = Vec::new();
    let mut open: Vec<(char, LineCol)> = Vec::new();
    for (n, raw) in text.split('\n').enumerate() {
        let n = n as u32;
        let line = raw.trim_end_matches('\r');
        let width = utf16_len(line);
        if let Some(i) = line.find("TODO").or_else(|| line.find("FIXME")) {
            out.push(Finding {
                range: TextRange::new(LineCol::new(n, utf16_len(&line[..i])), LineCol::new(n, width)),
                severity: Severity::Info,
                description: Some(line[i..].trim().to_owned()),
            });
        }
        if line.chars().count() > MAX_LINE_WIDTH {
            out.push(Finding {
                range: TextRange::new(LineCol::new(n, 0), LineCol::new(n, width)),
                severity: Severity::Warning,
                description: Some(format!("Line exceeds {MAX_LINE_WIDTH} characters")),
            });
        }
        let kept = line.trim_end().len();
        if kept != line.len() {
            out.push(Finding {
                range: TextRange::new(LineCol::new(n, utf16_len(&line[..kept])), LineCol::new(n, width)),
                severity: Severity::Weak,
                description: Some("Trailing whitespace".into()),
            });
        }
        for (i, word) in words(line) {
            if word == "unsafe" {
                // Highlight only, nothing to report.
                out.push(Finding {
                    range: TextRange::new(
                        LineCol::new(n, utf16_len(&line[..i])),
                        LineCol::new(n, utf16_len(&line[..i + word.len()])),
                    ),
                    severity: Severity::Weak,
                    description: None,
                });
            }
        }
        check_brackets(line, n, &mut open, &mut out);
    }
    for (c, at) in open {
        out.push(Finding {
            range: TextRange::new(at, LineCol::new(at.line, at.character + 1)),
            severity: Severity::Error,
            description: Some(format!("Unclosed '{c}'")),
        });
    }
    out
}

fn check_brackets(line: &str, n: u32, open: &mut Vec<(char, LineCol)>, out: &mut Vec<Finding>) {
    let code = line.split("//").next().unwrap_or(line);
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for (i, c) in code.char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        let at = LineCol::new(n, utf16_len(&code[..i]));
        match c {
            '"' => in_string = Some(c),
            '(' | '[' | '{' => open.push((c, at)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.last().map(|(o, _)| *o) == Some(expected) {
                    open.pop();
                } else {
                    out.push(Finding {
                        range: TextRange::new(at, LineCol::new(n, at.character + 1)),
                        severity: Severity::Error,
                        description: Some(format!("Unmatched '{c}'")),
                    });
                }
            }
            _ => {}
        }
    }
}
