//! Tests for the plain-text reference backend.
//!
//! Each test opens a temporary directory as a project and calls the
//! capability interface directly, the way the server does.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use harbor_core::model::{DefinitionKind, FormattingOptions, Severity, SymbolKind};
use harbor_core::{
    Backend, BackendError, CancellationToken, Editor, ExecutorContext, NormalizedPath, Project,
    ProjectEvent, ProjectListener, TextBackend,
};
use tempfile::TempDir;

const SHAPES: &str = "pub trait Shape {
    fn area(&self) -> f64;
}

pub struct Circle {
    radius: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.14 * self.radius * self.radius
    }
}

pub fn make_circle(radius: f64) -> Circle {
    Circle { radius }
}
";

const MAIN: &str = "fn main() {
    let c = make_circle(2.0);
    println!(\"{}\", c.area());
}
";

/// Write the fixture project and open it, waiting for the first index build.
fn open_fixture() -> (TempDir, TextBackend, Arc<dyn Project>) {
    let dir = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    std::fs::write(dir.path().join("src/shapes.rs"), SHAPES).expect("write shapes");
    std::fs::write(dir.path().join("src/main.rs"), MAIN).expect("write main");

    let backend = TextBackend::new();
    let root = NormalizedPath::from_local_path(dir.path());
    let project = backend.resolve_project(&root).expect("project resolves");
    backend.project(&root).expect("tracked").wait_for_index();
    (dir, backend, project)
}

fn file(dir: &TempDir, rel: &str) -> NormalizedPath {
    NormalizedPath::from_local_path(&dir.path().join(rel))
}

/// An executor context with the caret on the first occurrence of `needle`
/// (plus `skip` bytes).
fn context_at(project: &Arc<dyn Project>, path: &NormalizedPath, needle: &str, skip: usize) -> ExecutorContext {
    let editor = project.open_editor(path).expect("editor opens");
    let offset = editor.text().find(needle).expect("needle present") + skip;
    editor.move_caret(offset);
    ExecutorContext {
        path: path.clone(),
        editor,
        caret: offset,
        cancel: CancellationToken::new(),
    }
}

/// Poll `cond` for up to two seconds.
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ProjectEvent>>);

impl ProjectListener for Recorder {
    fn on_event(&self, event: &ProjectEvent) {
        self.0.lock().expect("lock").push(event.clone());
    }
}

// ──────────────────────────────────────────────
// Project lifecycle
// ──────────────────────────────────────────────

#[test]
fn missing_root_is_not_found() {
    let backend = TextBackend::new();
    let err = backend
        .resolve_project(&NormalizedPath::from_uri("file:///definitely/not/here"))
        .err()
        .expect("resolution fails");
    assert!(matches!(err, BackendError::ProjectNotFound(_)), "got {err:?}");
}

#[test]
fn file_root_is_not_a_directory() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "x").expect("write");
    let err = TextBackend::new()
        .resolve_project(&NormalizedPath::from_local_path(&path))
        .err()
        .expect("resolution fails");
    assert!(matches!(err, BackendError::NotADirectory(_)), "got {err:?}");
}

#[test]
fn resolving_twice_returns_the_open_project() {
    let (dir, backend, first) = open_fixture();
    let second = backend
        .resolve_project(&NormalizedPath::from_local_path(dir.path()))
        .expect("resolves");
    assert_eq!(first.root(), second.root());
    backend.close_project(&first);
    assert!(!second.is_open(), "closing closes the shared project");
}

#[test]
fn close_project_drops_editors() {
    let (dir, backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    project.open_editor(&main).expect("editor");
    assert_eq!(project.open_editors(), vec![main.clone()]);
    backend.close_project(&project);
    assert!(project.open_editors().is_empty());
    assert!(project.open_editor(&main).is_none(), "closed project opens nothing");
}

#[test]
fn editing_a_buffer_publishes_analysis() {
    let (dir, _backend, project) = open_fixture();
    let recorder = Arc::new(Recorder::default());
    let id = project.subscribe(recorder.clone());

    let main = file(&dir, "src/main.rs");
    let editor = project.open_editor(&main).expect("editor");
    editor
        .edit(&mut |buf: &mut String| buf.push_str("// TODO: more shapes\n"))
        .expect("edit applies");
    project.unsubscribe(id);

    let events = recorder.0.lock().expect("lock");
    let todo = events.iter().find_map(|e| match e {
        ProjectEvent::AnalysisFinished { path, findings } if *path == main => findings
            .iter()
            .find(|f| f.description.as_deref() == Some("TODO: more shapes")),
        _ => None,
    });
    assert_eq!(todo.map(|f| f.severity), Some(Severity::Info));
}

#[test]
fn reindex_reports_tasks() {
    let (dir, backend, project) = open_fixture();
    let recorder = Arc::new(Recorder::default());
    project.subscribe(recorder.clone());
    let concrete = backend
        .project(&NormalizedPath::from_local_path(dir.path()))
        .expect("tracked");
    concrete.reindex();
    concrete.wait_for_index();

    // The listener may still see the tail of the first build, so only look
    // at what follows the reindex's own start event.
    let reindex_events = || {
        let events = recorder.0.lock().expect("lock");
        let start = events
            .iter()
            .position(|e| matches!(e, ProjectEvent::IndexingStarted));
        start.map(|i| events[i..].to_vec()).unwrap_or_default()
    };
    let started_task = |events: &[ProjectEvent]| {
        events.iter().find_map(|e| match e {
            ProjectEvent::TaskStarted(t) => Some(t.progress_token()),
            _ => None,
        })
    };
    let finished = |events: &[ProjectEvent], token: &str| {
        events
            .iter()
            .any(|e| matches!(e, ProjectEvent::TaskFinished(t) if t.progress_token() == token))
    };
    assert!(wait_until(|| {
        let events = reindex_events();
        started_task(&events).is_some_and(|token| finished(&events, &token))
            && events
                .iter()
                .any(|e| matches!(e, ProjectEvent::IndexingFinished))
    }));

    let events = reindex_events();
    let token = started_task(&events).expect("task started");
    let started = events
        .iter()
        .filter(|e| matches!(e, ProjectEvent::TaskStarted(t) if t.progress_token() == token))
        .count();
    assert_eq!(started, 1);
    assert!(finished(&events, &token), "start and finish share a token");
}

// ──────────────────────────────────────────────
// Navigation
// ──────────────────────────────────────────────

#[test]
fn definition_crosses_files() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "make_circle", 2);
    let targets = project
        .find_definitions(&ctx, DefinitionKind::Declaration)
        .expect("definitions");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].path, file(&dir, "src/shapes.rs"));
    assert_eq!(targets[0].selection.start.line, 14);
}

#[test]
fn implementation_of_trait() {
    let (dir, _backend, project) = open_fixture();
    let shapes = file(&dir, "src/shapes.rs");
    let ctx = context_at(&project, &shapes, "Shape {", 0);
    let targets = project
        .find_definitions(&ctx, DefinitionKind::Implementation)
        .expect("implementations");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].range.start.line, 8);
}

#[test]
fn type_definition_follows_return_type() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "make_circle", 0);
    let targets = project
        .find_definitions(&ctx, DefinitionKind::TypeDeclaration)
        .expect("type definitions");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].selection.start.line, 4, "struct Circle");
}

#[test]
fn usages_cover_every_file() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "area", 0);
    let usages = project.find_usages(&ctx).expect("usages");
    assert_eq!(usages.len(), 3);
}

#[test]
fn cancelled_usages_fail_with_cancelled() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "area", 0);
    ctx.cancel.cancel();
    let err = project.find_usages(&ctx).err().expect("cancelled");
    assert!(err.is_cancelled());
}

// ──────────────────────────────────────────────
// Symbols and documentation
// ──────────────────────────────────────────────

#[test]
fn document_outline_nests_methods_under_impl() {
    let (dir, _backend, project) = open_fixture();
    let shapes = file(&dir, "src/shapes.rs");
    let ctx = context_at(&project, &shapes, "Shape", 0);
    let outline = project.document_symbols(&ctx).expect("symbols");
    let names: Vec<_> = outline.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Shape", "Circle", "impl Shape for Circle", "make_circle"]);
    let imp = &outline[2];
    assert_eq!(imp.children.len(), 1);
    assert_eq!(imp.children[0].kind, SymbolKind::Method);
}

#[test]
fn workspace_symbols_mark_library_matches() {
    let lib = TempDir::new().expect("lib dir");
    std::fs::write(lib.path().join("ext.rs"), "pub fn make_square() {}\n").expect("write");
    let dir = TempDir::new().expect("project dir");
    std::fs::write(dir.path().join("a.rs"), "fn make_circle() {}\n").expect("write");

    let backend = TextBackend::with_library_roots(vec![lib.path().to_path_buf()]);
    let root = NormalizedPath::from_local_path(dir.path());
    let project = backend.resolve_project(&root).expect("resolves");
    backend.project(&root).expect("tracked").wait_for_index();

    let hits = project
        .workspace_symbols("make", 100, &CancellationToken::new())
        .expect("search");
    assert_eq!(hits.len(), 2);
    let circle = hits.iter().find(|h| h.name == "make_circle").expect("circle");
    let square = hits.iter().find(|h| h.name == "make_square").expect("square");
    assert!(circle.in_project);
    assert!(!square.in_project);
}

#[test]
fn hover_shows_declaration_line() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "make_circle", 0);
    let hover = project.hover(&ctx).expect("hover").expect("some hover");
    assert!(
        hover.contents.contains("pub fn make_circle(radius: f64) -> Circle"),
        "got {}",
        hover.contents
    );
}

#[test]
fn signature_help_tracks_active_parameter() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("a.rs"),
        "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\nfn main() {\n    add(1, \n}\n",
    )
    .expect("write");
    let backend = TextBackend::new();
    let root = NormalizedPath::from_local_path(dir.path());
    let project = backend.resolve_project(&root).expect("resolves");
    backend.project(&root).expect("tracked").wait_for_index();

    let path = file(&dir, "a.rs");
    let ctx = context_at(&project, &path, "add(1, ", 7);
    let help = project.signature_help(&ctx).expect("help").expect("some help");
    assert_eq!(help.parameters, vec!["a: i32".to_owned(), "b: i32".to_owned()]);
    assert_eq!(help.active_parameter, Some(1));
}

// ──────────────────────────────────────────────
// Editing features
// ──────────────────────────────────────────────

#[test]
fn rename_touches_every_occurrence() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "make_circle", 0);
    let changes = project.rename(&ctx, "new_circle").expect("rename");
    let total: usize = changes.changes.values().map(Vec::len).sum();
    assert_eq!(total, 2);
    assert_eq!(changes.changes.len(), 2);
}

#[test]
fn rename_without_declaration_is_empty() {
    let (dir, _backend, project) = open_fixture();
    let main = file(&dir, "src/main.rs");
    let ctx = context_at(&project, &main, "println", 0);
    assert!(project.rename(&ctx, "print").expect("rename").is_empty());
}

#[test]
fn reformat_trims_and_converts_tabs() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("a.rs"), "fn a() {  \n\tx();\n}").expect("write");
    let backend = TextBackend::new();
    let project = backend
        .resolve_project(&NormalizedPath::from_local_path(dir.path()))
        .expect("resolves");
    let path = file(&dir, "a.rs");
    let ctx = context_at(&project, &path, "fn", 0);
    let formatted = project
        .reformat(&ctx, None, &FormattingOptions::default())
        .expect("reformat");
    assert_eq!(formatted, "fn a() {\n    x();\n}\n");
}

#[test]
fn quick_fix_removes_trailing_whitespace() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("a.rs"), "let x = 1;   \n").expect("write");
    let backend = TextBackend::new();
    let project = backend
        .resolve_project(&NormalizedPath::from_local_path(dir.path()))
        .expect("resolves");
    let path = file(&dir, "a.rs");
    let ctx = context_at(&project, &path, "let", 0);
    let range = harbor_core::TextRange::new(
        harbor_core::LineCol::new(0, 0),
        harbor_core::LineCol::new(0, 0),
    );
    let fixes = project.code_actions(&ctx, range).expect("actions");
    assert_eq!(fixes.len(), 1);
    let changes = project
        .apply_code_action(&ctx, &fixes[0].title, range)
        .expect("apply");
    let edits = &changes.changes[&path];
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].range.start.character, 10);
    assert_eq!(edits[0].new_text, "");
}

#[test]
fn runnables_for_main_and_tests() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("lib.rs"),
        "fn main() {}\n\n#[test]\nfn adds() {}\n",
    )
    .expect("write");
    let backend = TextBackend::new();
    let project = backend
        .resolve_project(&NormalizedPath::from_local_path(dir.path()))
        .expect("resolves");
    let path = file(&dir, "lib.rs");
    let ctx = context_at(&project, &path, "fn", 0);
    let runnables = project.runnables(&ctx).expect("runnables");
    let labels: Vec<_> = runnables.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Run main", "Test adds"]);
    assert_eq!(runnables[1].args, vec!["test".to_owned(), "adds".to_owned()]);
}
