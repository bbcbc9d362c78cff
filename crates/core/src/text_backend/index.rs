use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::scan::{scan, Declaration, FileScan};
use crate::path::NormalizedPath;

/// Files larger than this are not indexed.
const MAX_FILE_BYTES: u64 = 1 << 20;

const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "build", "out", "__pycache__"];

pub(crate) struct IndexedFile {
    pub text: String,
    pub scan: FileScan,
    pub in_project: bool,
}

impl IndexedFile {
    pub fn declarations_searchable(&self) -> impl Iterator<Item = &Declaration> {
        self.scan.declarations.iter().filter(|d| d.searchable)
    }
}

/// Declarations of every text file under the project and library roots.
#[derive(Default)]
pub(crate) struct WordIndex {
    files: BTreeMap<NormalizedPath, IndexedFile>,
}

impl WordIndex {
    pub fn update(&mut self, path: NormalizedPath, text: String, in_project: bool) {
        let scan = scan(&text);
        self.files.insert(
            path,
            IndexedFile {
                text,
                scan,
                in_project,
            },
        );
    }

    pub fn remove(&mut self, path: &NormalizedPath) {
        self.files.remove(path);
    }

    pub fn get(&self, path: &NormalizedPath) -> Option<&IndexedFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Project files first, then library files, each in path order.
    pub fn files(&self) -> impl Iterator<Item = (&NormalizedPath, &IndexedFile)> {
        let project = self.files.iter().filter(|(_, f)| f.in_project);
        let library = self.files.iter().filter(|(_, f)| !f.in_project);
        project.chain(library)
    }

    /// Searchable declarations named `name`, those in `prefer` first.
    pub fn declarations_named<'a>(
        &'a self,
        name: &'a str,
        prefer: &NormalizedPath,
    ) -> Vec<(&'a NormalizedPath, &'a Declaration)> {
        let mut out: Vec<_> = self
            .files()
            .flat_map(|(path, file)| file.scan.named(name).map(move |d| (path, d)))
            .collect();
        out.sort_by_key(|(path, _)| *path != prefer);
        out
    }
}

/// Read every indexable file under `root`.
pub(crate) fn read_tree(root: &Path) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    collect_files(root, &mut files);
    files
        .into_iter()
        .filter_map(|path| {
            let text = read_text(&path)?;
            Some((path, text))
        })
        .collect()
}

/// A file's text, or `None` for large, binary or unreadable files.
pub(crate) fn read_text(path: &Path) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() || meta.len() > MAX_FILE_BYTES {
        return None;
    }
    let text = std::fs::read_to_string(path).ok()?;
    if text.contains('\0') {
        return None;
    }
    Some(text)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if dir.is_file() {
        files.push(dir.to_path_buf());
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name.as_ref()) {
                collect_files(&path, files);
            }
        } else {
            files.push(path);
        }
    }
}

pub(crate) fn language_of(path: &NormalizedPath) -> Option<&'static str> {
    Some(match path.extension()? {
        "rs" => "rust",
        "py" => "python",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "toml" => "toml",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_walk_skips_hidden_and_build_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("target/out.rs"), "fn b() {}\n").unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::write(dir.path().join("blob.bin"), b"\0\x01\x02").unwrap();

        let files = read_tree(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].0.ends_with("src/lib.rs"));
    }

    #[test]
    fn preferred_file_comes_first() {
        let mut index = WordIndex::default();
        let a = NormalizedPath::from_uri("file:///p/a.rs");
        let b = NormalizedPath::from_uri("file:///p/b.rs");
        index.update(a.clone(), "fn run() {}\n".into(), true);
        index.update(b.clone(), "fn run() {}\n".into(), true);
        let found = index.declarations_named("run", &b);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, &b);
    }
}
