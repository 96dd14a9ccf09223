//! Filtered directory listing with debounced memoization.

use crate::cache::{CacheStats, DebouncedCache};
use crate::diagnostics::Diagnostics;
use crate::fs::{FileStat, FileSystem};
use depsuite_util::path::to_slash;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Listing options. Part of the memoization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanOptions {
    /// Skip entries whose name starts with `.`.
    pub skip_hidden: bool,
    pub recursive: bool,
    /// Regex a file path must match. Directories are never filtered by it.
    pub include: Option<String>,
    /// Directory names not descended into.
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            recursive: false,
            include: None,
            exclude: vec![crate::resolver::DEFAULT_MODULE_DIRECTORY.to_string()],
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include = Some(pattern.into());
        self
    }
}

/// A file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub file_path: PathBuf,
    pub stat: FileStat,
    /// Path below the scanned directory, `/`-separated.
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScanKey {
    directory: PathBuf,
    options: ScanOptions,
}

#[derive(Debug, Default)]
struct ScanOutcome {
    files: Arc<Vec<ScannedFile>>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Directory scanner bound to one build session.
#[derive(Debug)]
pub struct DirectoryScanner {
    fs: Arc<dyn FileSystem>,
    cache: DebouncedCache<ScanKey, Arc<ScanOutcome>>,
}

impl DirectoryScanner {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, debounce: Duration) -> Self {
        Self {
            fs,
            cache: DebouncedCache::new(debounce),
        }
    }

    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// List files under `directory`.
    ///
    /// A missing directory yields an empty list and a warning. Identical
    /// calls within the debounce window share one underlying scan.
    pub async fn list_files(
        &self,
        directory: &Path,
        options: &ScanOptions,
        sink: Option<&dyn Diagnostics>,
    ) -> Arc<Vec<ScannedFile>> {
        if directory.as_os_str().is_empty() {
            if let Some(sink) = sink {
                sink.emit_error("No directory supplied");
            }
            return Arc::new(Vec::new());
        }

        let key = ScanKey {
            directory: directory.to_path_buf(),
            options: options.clone(),
        };
        let fs = Arc::clone(&self.fs);
        let outcome = self
            .cache
            .get_or_insert_with(key.clone(), move || async move {
                Arc::new(scan(fs, key.directory, key.options).await)
            })
            .await;

        if let Some(sink) = sink {
            for warning in &outcome.warnings {
                sink.emit_warning(warning);
            }
            for error in &outcome.errors {
                sink.emit_error(error);
            }
        }
        Arc::clone(&outcome.files)
    }

    /// Evict scans whose window lapsed.
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    /// Forget every memoized scan.
    pub fn clear(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

async fn scan(fs: Arc<dyn FileSystem>, directory: PathBuf, options: ScanOptions) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let include = match options.include.as_deref().map(Regex::new).transpose() {
        Ok(include) => include,
        Err(err) => {
            outcome.errors.push(format!("Invalid include pattern: {err}"));
            return outcome;
        }
    };

    let ctx = ScanContext {
        fs: fs.as_ref(),
        root: &directory,
        options: &options,
        include: include.as_ref(),
    };
    let mut files = Vec::new();
    ctx.walk(directory.clone(), &mut files, &mut outcome.warnings).await;
    outcome.files = Arc::new(files);

    debug!(
        dir = %directory.display(),
        count = outcome.files.len(),
        recursive = options.recursive,
        "scanned directory"
    );
    outcome
}

struct ScanContext<'a> {
    fs: &'a dyn FileSystem,
    root: &'a Path,
    options: &'a ScanOptions,
    include: Option<&'a Regex>,
}

impl<'a> ScanContext<'a> {
    fn walk<'s>(
        &'s self,
        dir: PathBuf,
        files: &'s mut Vec<ScannedFile>,
        warnings: &'s mut Vec<String>,
    ) -> BoxFuture<'s, ()>
    where
        'a: 's,
    {
        async move {
            let mut names = match self.fs.read_dir(&dir).await {
                Ok(names) => names,
                Err(err) => {
                    warnings.push(format!("Error when trying to load {}: {err}", dir.display()));
                    return;
                }
            };
            names.sort();

            let names: Vec<String> = names
                .into_iter()
                .filter(|name| !(self.options.skip_hidden && name.starts_with('.')))
                .collect();
            let paths: Vec<PathBuf> = names.iter().map(|name| dir.join(name)).collect();
            let stats = join_all(paths.iter().map(|p| self.fs.stat(p))).await;

            let mut subdirs = Vec::new();
            for ((name, path), stat) in names.into_iter().zip(paths).zip(stats) {
                // entries that vanish between listing and stat are skipped
                let Ok(stat) = stat else {
                    trace!(path = %path.display(), "stat failed");
                    continue;
                };

                if stat.is_dir() {
                    if self.options.recursive && !self.options.exclude.contains(&name) {
                        subdirs.push(path);
                    }
                    continue;
                }
                if !stat.is_file() {
                    continue;
                }

                let slash = to_slash(&path);
                if self.include.is_some_and(|re| !re.is_match(&slash)) {
                    continue;
                }

                let relative_path = path
                    .strip_prefix(self.root)
                    .map(to_slash)
                    .unwrap_or(slash);
                files.push(ScannedFile {
                    file_path: path,
                    stat,
                    relative_path,
                });
            }

            for sub in subdirs {
                self.walk(sub, files, warnings).await;
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_DEBOUNCE;
    use crate::diagnostics::CollectedDiagnostics;
    use crate::fs::{MemoryFileSystem, OsFileSystem};
    use tempfile::tempdir;

    fn fixture() -> Arc<MemoryFileSystem> {
        let fs = MemoryFileSystem::new();
        fs.add_file("/app/src/a.html", "");
        fs.add_file("/app/src/b.html", "");
        fs.add_file("/app/src/c.js", "");
        fs.add_file("/app/src/.hidden.html", "");
        fs.add_file("/app/src/views/d.html", "");
        fs.add_file("/app/src/views/deep/e.html", "");
        fs.add_file("/app/src/node_modules/x/f.html", "");
        Arc::new(fs)
    }

    fn relative(files: &[ScannedFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_flat_listing_returns_files_only() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let files = scanner
            .list_files(Path::new("/app/src"), &ScanOptions::default(), None)
            .await;
        assert_eq!(relative(&files), vec!["a.html", "b.html", "c.js"]);
    }

    #[tokio::test]
    async fn test_recursive_is_depth_first_and_excludes() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let files = scanner
            .list_files(Path::new("/app/src"), &ScanOptions::default().recursive(), None)
            .await;
        assert_eq!(
            relative(&files),
            vec!["a.html", "b.html", "c.js", "views/d.html", "views/deep/e.html"]
        );
    }

    #[tokio::test]
    async fn test_include_filters_files() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let options = ScanOptions::default().recursive().include(r"\.html$");
        let files = scanner
            .list_files(Path::new("/app/src"), &options, None)
            .await;
        assert!(files.iter().all(|f| f.relative_path.ends_with(".html")));
        assert_eq!(files.len(), 4);
    }

    #[tokio::test]
    async fn test_cached_listing_is_shared() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let options = ScanOptions::default();
        let first = scanner.list_files(Path::new("/app/src"), &options, None).await;
        let second = scanner.list_files(Path::new("/app/src"), &options, None).await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_with_warning() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let sink = CollectedDiagnostics::new();
        let files = scanner
            .list_files(Path::new("/app/missing"), &ScanOptions::default(), Some(&sink))
            .await;
        assert!(files.is_empty());
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_directory_argument_is_error() {
        let scanner = DirectoryScanner::new(fixture(), DEFAULT_DEBOUNCE);
        let sink = CollectedDiagnostics::new();
        let files = scanner
            .list_files(Path::new(""), &ScanOptions::default(), Some(&sink))
            .await;
        assert!(files.is_empty());
        assert_eq!(sink.errors(), vec!["No directory supplied".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_scans_within_window_hit_fs_once() {
        let fs = fixture();
        let scanner = DirectoryScanner::new(fs.clone(), DEFAULT_DEBOUNCE);
        let dir = Path::new("/app/src");
        let options = ScanOptions::default();

        scanner.list_files(dir, &options, None).await;
        tokio::time::advance(Duration::from_secs(9)).await;
        scanner.list_files(dir, &options, None).await;
        assert_eq!(fs.read_dir_calls(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        scanner.list_files(dir, &options, None).await;
        assert_eq!(fs.read_dir_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_scans_collapse() {
        let fs = fixture();
        let scanner = DirectoryScanner::new(fs.clone(), DEFAULT_DEBOUNCE);
        let options = ScanOptions::default();
        let dir = Path::new("/app/src");

        let (a, b) = futures::join!(
            scanner.list_files(dir, &options, None),
            scanner.list_files(dir, &options, None)
        );
        assert_eq!(a, b);
        assert_eq!(fs.read_dir_calls(), 1);
    }

    #[tokio::test]
    async fn test_different_options_are_different_keys() {
        let fs = fixture();
        let scanner = DirectoryScanner::new(fs.clone(), DEFAULT_DEBOUNCE);
        let dir = Path::new("/app/src");

        scanner.list_files(dir, &ScanOptions::default(), None).await;
        scanner.list_files(dir, &ScanOptions::default().include("html"), None).await;
        assert_eq!(fs.read_dir_calls(), 2);
    }

    #[tokio::test]
    async fn test_os_filesystem_scan() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.html"), "").unwrap();

        let scanner = DirectoryScanner::new(Arc::new(OsFileSystem), DEFAULT_DEBOUNCE);
        let files = scanner
            .list_files(dir.path(), &ScanOptions::default().recursive(), None)
            .await;
        assert_eq!(relative(&files), vec!["sub/a.html"]);
    }
}
