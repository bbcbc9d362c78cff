//! Canonical path keys shared by the document store, the backend and the
//! publishers.
//!
//! Every URI the client sends and every local path the backend reports is
//! funnelled through [`NormalizedPath`] so that two spellings of the same
//! file compare equal:
//!
//! - backslashes become forward slashes
//! - trailing slashes are dropped
//! - the scheme is followed by exactly three slashes
//! - percent escapes are decoded, except that a literal `%` is kept as `%25`
//! - a drive letter is lowercased
//!
//! Strings without a recognizable `scheme:/` prefix (for example
//! `jar:file:///lib.jar!/A.class`) are only slash-normalized.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// A canonical, comparable URI string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalize a client-supplied URI (or URI-like string).
    pub fn from_uri(uri: &str) -> Self {
        Self(normalize(uri))
    }

    /// Normalize a local filesystem path into a `file:` URI.
    pub fn from_local_path(path: &Path) -> Self {
        let raw = match url::Url::from_file_path(path) {
            Ok(url) => url.to_string(),
            // Relative paths cannot be expressed as a file URL.
            Err(()) => format!("file:///{}", path.display()),
        };
        Self(normalize(&raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI scheme, if the path has one (`file`, `jar`, `jrt`, ...).
    pub fn scheme(&self) -> Option<&str> {
        split_scheme(&self.0).map(|(scheme, _)| scheme)
    }

    /// The local filesystem path for `file:` URIs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        let (scheme, rest) = split_scheme(&self.0)?;
        if scheme != "file" {
            return None;
        }
        let rest = unescape_percent(rest);
        if has_drive_letter(&rest) {
            Some(PathBuf::from(rest.as_ref()))
        } else {
            Some(PathBuf::from(format!("/{rest}")))
        }
    }

    /// The last path segment.
    pub fn file_name(&self) -> Option<Cow<'_, str>> {
        let name = self.0.rsplit(['/', '!']).next()?;
        if name.is_empty() || name.ends_with(':') {
            None
        } else {
            Some(unescape_percent(name))
        }
    }

    /// The extension of the last path segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit(['/', '!']).next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    /// Whether `self` is `ancestor` or lies underneath it.
    pub fn starts_with(&self, ancestor: &NormalizedPath) -> bool {
        match self.0.strip_prefix(ancestor.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn normalize(raw: &str) -> String {
    let slashed = clean_slashes(raw);
    let Some((scheme, rest)) = split_scheme(&slashed) else {
        return slashed;
    };
    // Decoding may surface escaped separators, so clean a second time.
    // A literal `%` is escaped again so a second pass decodes nothing new.
    let decoded = percent_decode_str(rest).decode_utf8_lossy();
    let mut rest = clean_slashes(&decoded).replace('%', "%25");
    if has_drive_letter(&rest) {
        rest[..1].make_ascii_lowercase();
    }
    format!("{scheme}:///{rest}")
}

fn clean_slashes(s: &str) -> String {
    s.replace('\\', "/").trim_end_matches('/').to_owned()
}

/// Split `scheme:/+rest`. The scheme is a word character followed by one or
/// more word characters, `+`, `-` or `.`; at least one slash must follow the
/// colon.
fn split_scheme(s: &str) -> Option<(&str, &str)> {
    let colon = s.find(':')?;
    let scheme = &s[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !is_word_char(first) {
        return None;
    }
    let tail: Vec<char> = chars.collect();
    if tail.is_empty()
        || !tail
            .iter()
            .all(|&c| is_word_char(c) || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let after = &s[colon + 1..];
    let rest = after.trim_start_matches('/');
    if rest.len() == after.len() {
        return None;
    }
    Some((scheme, rest))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn has_drive_letter(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() > 1 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

/// Undo the `%25` escaping `normalize` leaves behind.
fn unescape_percent(s: &str) -> Cow<'_, str> {
    if s.contains('%') {
        percent_decode_str(s).decode_utf8_lossy()
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_gets_three_slashes() {
        assert_eq!(
            NormalizedPath::from_uri("file:/home/user/a.txt").as_str(),
            "file:///home/user/a.txt"
        );
        assert_eq!(
            NormalizedPath::from_uri("file:///home/user/a.txt").as_str(),
            "file:///home/user/a.txt"
        );
    }

    #[test]
    fn trailing_slash_and_backslashes_are_removed() {
        assert_eq!(
            NormalizedPath::from_uri("file:///C:\\work\\proj\\").as_str(),
            "file:///c:/work/proj"
        );
    }

    #[test]
    fn percent_escapes_are_decoded() {
        assert_eq!(
            NormalizedPath::from_uri("file:///c%3A/My%20Docs/%C3%A9t%C3%A9.txt").as_str(),
            "file:///c:/My Docs/été.txt"
        );
    }

    #[test]
    fn drive_letter_is_lowercased_only() {
        let a = NormalizedPath::from_uri("file:///C:/Work/A.txt");
        let b = NormalizedPath::from_uri("file:///c:/Work/A.txt");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "file:///c:/Work/A.txt");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "file:///C:/a/b/",
            "file:/x%2Fy/",
            "jar:file:///lib.jar!/A.class",
            "output:build",
            "file:///p/A.txt",
            "file:///c:/dir%5C",
            "file:///tmp/50%2541.txt",
            "file:///tmp/100%25",
            "file:///tmp/bad%zz",
        ];
        for input in inputs {
            let once = NormalizedPath::from_uri(input);
            let twice = NormalizedPath::from_uri(once.as_str());
            assert_eq!(once, twice, "normalizing {input} twice changed it");
        }
    }

    #[test]
    fn strings_without_scheme_are_left_alone() {
        assert_eq!(
            NormalizedPath::from_uri("jar:file:///lib.jar!/A.class").as_str(),
            "jar:file:///lib.jar!/A.class"
        );
        assert_eq!(NormalizedPath::from_uri("relative\\dir/").as_str(), "relative/dir");
    }

    #[test]
    fn scheme_and_file_path() {
        let p = NormalizedPath::from_uri("file:///tmp/proj/src/main.rs");
        assert_eq!(p.scheme(), Some("file"));
        assert_eq!(p.to_file_path(), Some(PathBuf::from("/tmp/proj/src/main.rs")));
        assert_eq!(p.file_name().as_deref(), Some("main.rs"));
        assert_eq!(p.extension(), Some("rs"));

        let jrt = NormalizedPath::from_uri("jrt:/java.base/java/lang/String.class");
        assert_eq!(jrt.scheme(), Some("jrt"));
        assert_eq!(jrt.to_file_path(), None);
    }

    #[test]
    fn local_path_round_trips() {
        let p = NormalizedPath::from_local_path(Path::new("/tmp/some dir/x.txt"));
        assert_eq!(p.as_str(), "file:///tmp/some dir/x.txt");
        assert_eq!(p.to_file_path(), Some(PathBuf::from("/tmp/some dir/x.txt")));
    }

    #[test]
    fn literal_percent_survives_normalization() {
        let p = NormalizedPath::from_uri("file:///tmp/50%2541.txt");
        assert_eq!(p.as_str(), "file:///tmp/50%2541.txt");
        assert_eq!(p.file_name().as_deref(), Some("50%41.txt"));
        assert_eq!(p.to_file_path(), Some(PathBuf::from("/tmp/50%41.txt")));

        let local = NormalizedPath::from_local_path(Path::new("/tmp/50%41.txt"));
        assert_eq!(local, p);
        assert_eq!(NormalizedPath::from_uri(local.as_str()), local);
    }

    #[test]
    fn ancestry() {
        let root = NormalizedPath::from_uri("file:///p");
        assert!(NormalizedPath::from_uri("file:///p/A.txt").starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!NormalizedPath::from_uri("file:///px/A.txt").starts_with(&root));
    }
}
