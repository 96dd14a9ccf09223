//! End-to-end behavior of the dependency discovery pipeline.

use depsuite_core::{
    annotate, inject, synthesize, wrap_in_require_include, AnnotationProperty, BuildSession,
    CollectedDiagnostics, DirectoryScanner, EngineConfig, ExpandContext, FileRequest, GlobConfig,
    GlobExpander, MemoryFileSystem, ModuleResolver, NodeResolver, RequireData, RequireDataBase,
    ScanOptions, SynthesisContext, DEFAULT_DEBOUNCE,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn memory_fs() -> Arc<MemoryFileSystem> {
    let fs = MemoryFileSystem::new();
    fs.add_file("/app/src/sub/a.html", "");
    fs.add_file("/app/src/sub/b.html", "");
    fs.add_file("/app/src/sub/c.js", "");
    Arc::new(fs)
}

fn expander(fs: Arc<MemoryFileSystem>) -> GlobExpander {
    GlobExpander::new(
        Arc::new(DirectoryScanner::new(fs, DEFAULT_DEBOUNCE)),
        Arc::new(NodeResolver::default()),
        GlobConfig::default(),
        DEFAULT_DEBOUNCE,
    )
}

#[tokio::test]
async fn test_glob_expands_to_exact_matches() {
    let glob = expander(memory_fs());
    let mut paths = glob
        .expand("./sub/*.html", &ExpandContext::new("/app/src"))
        .await;
    paths.sort();

    assert_eq!(
        paths,
        vec![
            PathBuf::from("/app/src/sub/a.html"),
            PathBuf::from("/app/src/sub/b.html"),
        ]
    );
}

#[tokio::test]
async fn test_non_glob_literals_skip_expansion() {
    let fs = memory_fs();
    let glob = expander(fs.clone());
    let entries: Vec<RequireData> = vec![RequireDataBase::new("./sub/a.html").into()];

    let out = glob
        .expand_all(entries.clone(), &ExpandContext::new("/app/src"), None)
        .await;

    assert_eq!(out, entries);
    assert_eq!(fs.read_dir_calls(), 0);
    assert_eq!(glob.stats().misses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_debounce_window() {
    let fs = memory_fs();
    let scanner = DirectoryScanner::new(fs.clone(), DEFAULT_DEBOUNCE);
    let dir = Path::new("/app/src/sub");
    let options = ScanOptions::default();

    scanner.list_files(dir, &options, None).await;
    scanner.list_files(dir, &options, None).await;
    assert_eq!(fs.read_dir_calls(), 1);

    tokio::time::advance(DEFAULT_DEBOUNCE + Duration::from_millis(1)).await;
    scanner.list_files(dir, &options, None).await;
    assert_eq!(fs.read_dir_calls(), 2);
}

#[test]
fn test_annotation_composition() {
    let out = annotate(
        vec![
            RequireDataBase::new("./a").lazy().chunk("vendor").into(),
            RequireDataBase::new("./b").into(),
        ],
        AnnotationProperty::FallbackLoaders,
    );
    assert_eq!(
        out[0].fallback_loaders,
        Some(vec!["bundle?lazy&name=vendor".to_string()])
    );
    assert!(out[1].fallback_loaders.is_none());
    assert!(out[1].loaders.is_none());
}

#[test]
fn test_inject_example() {
    let out = inject(
        "const a = 1",
        &[wrap_in_require_include("x")],
        None,
        None,
    )
    .unwrap();
    assert_eq!(out.code, "const a = 1;\nrequire.include('x');\n");
}

#[tokio::test]
async fn test_unresolvable_literal_warns_once() {
    let dir = tempdir().unwrap();
    let sink = CollectedDiagnostics::new();
    let resolver = NodeResolver::default();

    let result =
        depsuite_core::resolve_literal(&resolver, "./nowhere.js", dir.path(), Some(&sink)).await;

    assert!(result.is_none());
    assert_eq!(sink.warnings().len(), 1);
}

#[tokio::test]
async fn test_synthesis_round_trips() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.html"), "").unwrap();
    fs::write(dir.path().join("b.html"), "").unwrap();
    let resolver = NodeResolver::default();
    let ctx = SynthesisContext {
        resolver: &resolver as &dyn ModuleResolver,
        requester_dir: dir.path(),
        policy: None,
        force_override: false,
        sink: None,
    };

    let entries = annotate(
        vec![
            RequireDataBase::new("./a.html").lazy().into(),
            RequireDataBase::new("./b.html").into(),
        ],
        AnnotationProperty::Loaders,
    );
    let first = synthesize(entries.clone(), ctx).await.unwrap();

    let fed_back: Vec<RequireData> = first
        .iter()
        .zip(&entries)
        .map(|(literal, entry)| RequireData {
            literal: literal.clone(),
            resolve: None,
            ..entry.clone()
        })
        .collect();
    let second = synthesize(fed_back, ctx).await.unwrap();

    assert_eq!(first, vec!["!bundle?lazy!./a.html", "./b.html"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_session_over_real_project() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("views/nested")).unwrap();
    fs::write(src.join("app.js"), "boot();\n").unwrap();
    fs::write(src.join("views/a.html"), "").unwrap();
    fs::write(src.join("views/nested/b.html"), "").unwrap();
    fs::write(src.join("views/skip.css"), "").unwrap();

    let session = BuildSession::new(EngineConfig {
        enable_globbing: true,
        ..Default::default()
    });
    let sink = CollectedDiagnostics::new();
    let request = FileRequest::new(src.join("app.js"), "boot();\n", &sink).requires(vec![
        RequireDataBase::new("./views/**/*.html").lazy(),
        RequireDataBase::new("./views/missing.html"),
    ]);

    let out = session.process(request).await.unwrap();

    assert_eq!(
        out.code,
        "boot();\n\
         require.include('!bundle?lazy!./views/a.html');\n\
         require.include('!bundle?lazy!./views/nested/b.html');\n"
    );
    assert_eq!(out.dependencies.len(), 2);
    assert_eq!(sink.warnings().len(), 1);
    assert!(sink.errors().is_empty());
}
