//! Word-level declaration scanning.
//!
//! No grammar: a declaration is a line whose first non-modifier word is a
//! declaration keyword followed by an identifier. Nesting comes from
//! indentation, with a closing-bracket line at the same indent ending the
//! block it closes.

use crate::model::SymbolKind;
use crate::text::{LineCol, TextRange};

const MODIFIERS: &[&str] = &[
    "pub", "crate", "super", "private", "public", "protected", "internal", "export", "default",
    "async", "unsafe", "extern", "abstract", "final", "override", "open", "data", "sealed",
    "inline", "suspend", "static", "readonly", "mut",
];

#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    /// Trimmed declaration line.
    pub detail: String,
    pub range: TextRange,
    pub selection: TextRange,
    pub parent: Option<usize>,
    /// Outline-only entries such as `impl` blocks are not searchable.
    pub searchable: bool,
}

/// "`implementor` implements or extends `target`".
#[derive(Debug, Clone)]
pub(crate) struct Implementation {
    pub target: String,
    pub range: TextRange,
    pub selection: TextRange,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FileScan {
    pub declarations: Vec<Declaration>,
    pub implementations: Vec<Implementation>,
}

impl FileScan {
    pub fn container_of(&self, decl: &Declaration) -> Option<&str> {
        let parent = &self.declarations[decl.parent?];
        Some(parent.name.strip_prefix("impl ").unwrap_or(&parent.name))
    }

    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.declarations
            .iter()
            .filter(move |d| d.searchable && d.name == name)
    }
}

struct Open {
    indent: usize,
    decl: Option<usize>,
    start_line: u32,
    body_is_code: bool,
}

pub(crate) fn scan(text: &str) -> FileScan {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = FileScan::default();
    let mut stack: Vec<Open> = Vec::new();
    let mut last_nonblank = 0u32;

    for (n, raw) in lines.iter().enumerate() {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let n = n as u32;
        let indent = indent_width(line);
        let closes = trimmed.starts_with(['}', ')', ']']);

        while let Some(top) = stack.last() {
            if top.indent < indent {
                break;
            }
            let closing_here = closes && top.indent == indent;
            let end = if closing_here { n } else { last_nonblank };
            if let Some(top) = stack.pop() {
                close_block(&mut out, &lines, top, end);
            }
            if closing_here {
                break;
            }
        }
        last_nonblank = n;
        if closes {
            continue;
        }

        let in_code = stack.last().is_some_and(|o| o.body_is_code);
        let parent = stack.iter().rev().find_map(|o| o.decl);
        let parent_kind = parent.map(|p| out.declarations[p].kind);

        if let Some(found) = declaration_on_line(line) {
            match found {
                LineDecl::Named { keyword, name, start } => {
                    if in_code && !is_callable_keyword(keyword) {
                        continue;
                    }
                    let mut kind = keyword_kind(keyword);
                    if kind == SymbolKind::Function
                        && matches!(
                            parent_kind,
                            Some(
                                SymbolKind::Class
                                    | SymbolKind::Struct
                                    | SymbolKind::Trait
                                    | SymbolKind::Interface
                                    | SymbolKind::Namespace
                                    | SymbolKind::Enum
                            )
                        )
                    {
                        kind = SymbolKind::Method;
                    } else if kind == SymbolKind::Variable
                        && matches!(parent_kind, Some(SymbolKind::Class | SymbolKind::Struct))
                    {
                        kind = SymbolKind::Field;
                    }
                    let idx = out.declarations.len();
                    out.declarations.push(Declaration {
                        name: name.to_owned(),
                        kind,
                        detail: trimmed.to_owned(),
                        range: TextRange::new(
                            LineCol::new(n, utf16_col(line, indent_bytes(line))),
                            LineCol::new(n, utf16_col(line, line.len())),
                        ),
                        selection: TextRange::new(
                            LineCol::new(n, utf16_col(line, start)),
                            LineCol::new(n, utf16_col(line, start + name.len())),
                        ),
                        parent,
                        searchable: true,
                    });
                    let supers = if kind.is_type() {
                        supertypes(line, start + name.len())
                    } else {
                        Vec::new()
                    };
                    for (target, t_start) in supers {
                        out.implementations.push(Implementation {
                            target: target.to_owned(),
                            range: out.declarations[idx].range,
                            selection: TextRange::new(
                                LineCol::new(n, utf16_col(line, t_start)),
                                LineCol::new(n, utf16_col(line, t_start + target.len())),
                            ),
                        });
                    }
                    if opens_block(kind) {
                        stack.push(Open {
                            indent,
                            decl: Some(idx),
                            start_line: n,
                            body_is_code: kind.is_callable(),
                        });
                    }
                }
                LineDecl::Impl {
                    label,
                    target,
                    target_start,
                    trait_name,
                } => {
                    if in_code {
                        continue;
                    }
                    let idx = out.declarations.len();
                    let range = TextRange::new(
                        LineCol::new(n, utf16_col(line, indent_bytes(line))),
                        LineCol::new(n, utf16_col(line, line.len())),
                    );
                    let selection = TextRange::new(
                        LineCol::new(n, utf16_col(line, target_start)),
                        LineCol::new(n, utf16_col(line, target_start + target.len())),
                    );
                    out.declarations.push(Declaration {
                        name: label,
                        kind: SymbolKind::Namespace,
                        detail: trimmed.to_owned(),
                        range,
                        selection,
                        parent,
                        searchable: false,
                    });
                    if let Some(trait_name) = trait_name {
                        out.implementations.push(Implementation {
                            target: trait_name,
                            range,
                            selection,
                        });
                    }
                    stack.push(Open {
                        indent,
                        decl: Some(idx),
                        start_line: n,
                        body_is_code: false,
                    });
                }
            }
        } else if !in_code && opens_anonymous_block(trimmed) {
            stack.push(Open {
                indent,
                decl: None,
                start_line: n,
                body_is_code: true,
            });
        }
    }
    while let Some(top) = stack.pop() {
        close_block(&mut out, &lines, top, last_nonblank);
    }
    out
}

fn close_block(out: &mut FileScan, lines: &[&str], open: Open, end_line: u32) {
    let Some(idx) = open.decl else { return };
    if end_line <= open.start_line {
        return;
    }
    let end = lines
        .get(end_line as usize)
        .map(|l| l.trim_end_matches('\r'))
        .unwrap_or("");
    let decl = &mut out.declarations[idx];
    decl.range.end = LineCol::new(end_line, utf16_col(end, end.len()));
}

enum LineDecl<'a> {
    Named {
        keyword: &'a str,
        name: &'a str,
        start: usize,
    },
    Impl {
        label: String,
        target: String,
        target_start: usize,
        trait_name: Option<String>,
    },
}

fn declaration_on_line(line: &str) -> Option<LineDecl<'_>> {
    let code = strip_line_comment(line);
    let mut words = words(code).peekable();
    while let Some((start, word)) = words.next() {
        if MODIFIERS.contains(&word) {
            continue;
        }
        if word == "impl" {
            return impl_block(code, start + word.len());
        }
        if keyword_kind_opt(word).is_none() {
            return None;
        }
        let (name_start, name) = words.next()?;
        // `fn(` style lambdas and keyword-as-expression (`type(x)`) are not
        // declarations.
        if !code[start + word.len()..name_start].trim().is_empty() {
            return None;
        }
        // `let mut x`
        if MODIFIERS.contains(&name) {
            let (real_start, real) = words.next()?;
            return Some(LineDecl::Named {
                keyword: word,
                name: real,
                start: real_start,
            });
        }
        return Some(LineDecl::Named {
            keyword: word,
            name,
            start: name_start,
        });
    }
    None
}

/// `impl<T> Trait for Type<T> {` or `impl Type {`.
fn impl_block(code: &str, after_kw: usize) -> Option<LineDecl<'_>> {
    let mut rest_start = after_kw;
    let rest = &code[after_kw..];
    if rest.trim_start().starts_with('<') {
        let open = after_kw + rest.find('<')?;
        let mut depth = 0;
        for (i, c) in code[open..].char_indices() {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        rest_start = open + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    let idents: Vec<(usize, &str)> = words(&code[rest_start..])
        .map(|(i, w)| (rest_start + i, w))
        .collect();
    let for_pos = idents.iter().position(|(_, w)| *w == "for");
    let (first_start, first) = *idents.first()?;
    match for_pos {
        Some(pos) => {
            let (target_start, target) = *idents.get(pos + 1)?;
            let trait_name = last_path_segment(&idents[..pos]).unwrap_or(first);
            Some(LineDecl::Impl {
                label: format!("impl {trait_name} for {target}"),
                target: target.to_owned(),
                target_start,
                trait_name: Some(trait_name.to_owned()),
            })
        }
        None => {
            let (target_start, target) = last_path_entry(&idents).unwrap_or((first_start, first));
            Some(LineDecl::Impl {
                label: format!("impl {target}"),
                target: target.to_owned(),
                target_start,
                trait_name: None,
            })
        }
    }
}

fn last_path_segment<'a>(idents: &[(usize, &'a str)]) -> Option<&'a str> {
    idents.last().map(|(_, w)| *w)
}

/// First capitalized word of `a::b::Type<X>`.
fn last_path_entry<'a>(idents: &[(usize, &'a str)]) -> Option<(usize, &'a str)> {
    idents
        .iter()
        .copied()
        .find(|(_, w)| w.starts_with(|c: char| c.is_uppercase()))
}

/// Supertypes named after `extends`, `implements` or a `:` following the
/// declared name, up to the opening brace.
fn supertypes(line: &str, after_name: usize) -> Vec<(&str, usize)> {
    let code = strip_line_comment(line);
    let Some(tail) = code.get(after_name..) else {
        return Vec::new();
    };
    let head_end = tail.find(['{', '=']).unwrap_or(tail.len());
    let head = &tail[..head_end];
    let mut out = Vec::new();
    let mut collecting = false;
    let mut depth = 0i32;
    let mut last_end = 0;
    for (i, word) in words(head) {
        let between = &head[last_end..i];
        last_end = i + word.len();
        for c in between.chars() {
            match c {
                '(' | '<' => depth += 1,
                ')' | '>' => depth = (depth - 1).max(0),
                _ => {}
            }
        }
        if matches!(word, "extends" | "implements") {
            collecting = true;
            continue;
        }
        if depth == 0 && between.contains(':') && !between.contains("::") {
            collecting = true;
        }
        if collecting && depth == 0 && word.starts_with(|c: char| c.is_uppercase()) {
            out.push((word, after_name + i));
        }
    }
    out
}

fn is_callable_keyword(keyword: &str) -> bool {
    matches!(keyword, "fn" | "def" | "function" | "fun")
}

fn keyword_kind(keyword: &str) -> SymbolKind {
    keyword_kind_opt(keyword).unwrap_or(SymbolKind::Text)
}

fn keyword_kind_opt(keyword: &str) -> Option<SymbolKind> {
    Some(match keyword {
        "fn" | "def" | "function" | "fun" => SymbolKind::Function,
        "struct" => SymbolKind::Struct,
        "enum" => SymbolKind::Enum,
        "trait" => SymbolKind::Trait,
        "interface" => SymbolKind::Interface,
        "class" | "object" => SymbolKind::Class,
        "type" | "typealias" => SymbolKind::TypeAlias,
        "mod" | "module" => SymbolKind::Module,
        "namespace" => SymbolKind::Namespace,
        "const" => SymbolKind::Constant,
        "let" | "var" | "val" => SymbolKind::Variable,
        _ => return None,
    })
}

fn opens_block(kind: SymbolKind) -> bool {
    matches!(
        kind,
        SymbolKind::Class
            | SymbolKind::Struct
            | SymbolKind::Enum
            | SymbolKind::Trait
            | SymbolKind::Interface
            | SymbolKind::Module
            | SymbolKind::Namespace
            | SymbolKind::Function
            | SymbolKind::Method
    )
}

/// Blocks that are not declarations but whose bodies hold code, such as a
/// top-level `if __name__ == "__main__":`.
fn opens_anonymous_block(trimmed: &str) -> bool {
    let code = strip_line_comment(trimmed).trim_end();
    code.ends_with('{') || code.ends_with(':')
}

fn strip_line_comment(line: &str) -> &str {
    let mut cut = line.find("//").unwrap_or(line.len());
    if let Some(i) = line.find('#') {
        let rest = &line[i + 1..];
        // `#[attr]`, `#!` and preprocessor lines are code.
        let is_code = rest.starts_with(['[', '!'])
            || rest.starts_with("include")
            || rest.starts_with("define");
        if !is_code {
            cut = cut.min(i);
        }
    }
    &line[..cut]
}

fn indent_bytes(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// UTF-16 column of a byte offset within one line.
pub(crate) fn utf16_col(line: &str, byte: usize) -> u32 {
    let byte = byte.min(line.len());
    line[..byte].encode_utf16().count() as u32
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Identifiers in `text` with their byte offsets.
pub(crate) fn words(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut chars = text.char_indices().peekable();
    std::iter::from_fn(move || {
        while let Some(&(i, c)) = chars.peek() {
            if is_ident_char(c) {
                let start = i;
                let mut end = i;
                while let Some(&(j, c)) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    end = j + c.len_utf8();
                    chars.next();
                }
                let word = &text[start..end];
                if word.starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                return Some((start, word));
            }
            chars.next();
        }
        None
    })
}

/// Byte span of the identifier touching `offset`.
pub(crate) fn word_at(text: &str, offset: usize) -> Option<(usize, usize)> {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let start = text[..offset]
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_ident_char(c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);
    let end = text[offset..]
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map(|(i, _)| offset + i)
        .unwrap_or(text.len());
    if start == end {
        None
    } else {
        Some((start, end))
    }
}

/// Byte spans of whole-word occurrences of `word`.
pub(crate) fn occurrences(text: &str, word: &str) -> Vec<(usize, usize)> {
    words(text)
        .filter(|(_, w)| *w == word)
        .map(|(i, w)| (i, i + w.len()))
        .collect()
}
