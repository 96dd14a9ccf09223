//! Convention-based companion discovery.
//!
//! A convention maps the file being built to files it implicitly depends on,
//! such as `view.ts` to `view.html`.

use crate::diagnostics::Diagnostics;
use crate::require::RequireDataBase;
use crate::scan::{DirectoryScanner, ScanOptions};
use depsuite_util::path::relative_request;
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Built-in conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NamedConvention {
    /// Same basename, other extensions.
    ExtensionSwap {
        #[serde(default = "default_swap_extensions")]
        extensions: Vec<String>,
    },
    /// Every file under `directory` whose path matches `pattern`.
    AllFilesMatchingRegex { directory: PathBuf, pattern: String },
}

fn default_swap_extensions() -> Vec<String> {
    vec![".html".to_string()]
}

impl Default for NamedConvention {
    fn default() -> Self {
        Self::ExtensionSwap {
            extensions: default_swap_extensions(),
        }
    }
}

/// Host-supplied convention: file path in, candidate paths out.
pub type ConventionFn = Arc<dyn Fn(&Path) -> BoxFuture<'static, Vec<PathBuf>> + Send + Sync>;

/// A built-in or custom convention.
#[derive(Clone)]
pub enum Convention {
    Named(NamedConvention),
    Custom(ConventionFn),
}

impl fmt::Debug for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => f.debug_tuple("Named").field(named).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<NamedConvention> for Convention {
    fn from(named: NamedConvention) -> Self {
        Self::Named(named)
    }
}

/// `dir/name.ts` with `[".html"]` gives `dir/name.html`.
#[must_use]
pub fn swap_extension(file: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let Some(name) = file.file_name().map(|n| n.to_string_lossy()) else {
        return Vec::new();
    };
    let stem = match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => &name[..],
    };
    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    extensions
        .iter()
        .map(|ext| dir.join(format!("{stem}{ext}")))
        .collect()
}

async fn candidates(
    convention: &Convention,
    file: &Path,
    scanner: &DirectoryScanner,
    sink: Option<&dyn Diagnostics>,
) -> Vec<PathBuf> {
    match convention {
        Convention::Named(NamedConvention::ExtensionSwap { extensions }) => {
            swap_extension(file, extensions)
        }
        Convention::Named(NamedConvention::AllFilesMatchingRegex { directory, pattern }) => {
            let options = ScanOptions::default().recursive().include(pattern.clone());
            scanner
                .list_files(directory, &options, sink)
                .await
                .iter()
                .filter(|f| f.file_path.as_path() != file)
                .map(|f| f.file_path.clone())
                .collect()
        }
        Convention::Custom(custom) => custom(file).await,
    }
}

/// Run every convention for `file` and return the existing companions as
/// literals relative to the file's directory.
pub async fn discover(
    conventions: &[Convention],
    file: &Path,
    scanner: &DirectoryScanner,
    sink: Option<&dyn Diagnostics>,
) -> Vec<RequireDataBase> {
    let found = join_all(
        conventions
            .iter()
            .map(|c| candidates(c, file, scanner, sink)),
    )
    .await;

    let mut seen = HashSet::new();
    let paths: Vec<PathBuf> = found
        .into_iter()
        .flatten()
        .filter(|p| seen.insert(p.clone()))
        .collect();

    let fs = scanner.file_system();
    let exists = join_all(paths.iter().map(|p| fs.stat(p))).await;

    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    let literals: Vec<RequireDataBase> = paths
        .iter()
        .zip(exists)
        .filter(|(_, stat)| stat.as_ref().is_ok_and(|s| s.is_file()))
        .map(|(path, _)| RequireDataBase::new(relative_request(dir, path)))
        .collect();

    debug!(file = %file.display(), count = literals.len(), "convention companions");
    literals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_DEBOUNCE;
    use crate::fs::MemoryFileSystem;
    use futures::FutureExt;

    fn scanner() -> DirectoryScanner {
        let fs = MemoryFileSystem::new();
        fs.add_file("/app/src/view.ts", "");
        fs.add_file("/app/src/view.html", "");
        fs.add_file("/app/src/styles/a.css", "");
        fs.add_file("/app/src/styles/b.css", "");
        fs.add_file("/app/src/styles/notes.txt", "");
        DirectoryScanner::new(Arc::new(fs), DEFAULT_DEBOUNCE)
    }

    fn literals(found: &[RequireDataBase]) -> Vec<&str> {
        found.iter().map(|r| r.literal.as_str()).collect()
    }

    #[test]
    fn test_swap_extension() {
        assert_eq!(
            swap_extension(Path::new("/a/view.model.ts"), &[".html".into(), ".css".into()]),
            vec![PathBuf::from("/a/view.model.html"), PathBuf::from("/a/view.model.css")]
        );
        assert_eq!(
            swap_extension(Path::new("/a/.rc"), &[".html".into()]),
            vec![PathBuf::from("/a/.rc.html")]
        );
    }

    #[tokio::test]
    async fn test_extension_swap_keeps_existing_only() {
        let scanner = scanner();
        let conventions = vec![Convention::Named(NamedConvention::ExtensionSwap {
            extensions: vec![".html".into(), ".css".into()],
        })];

        let found = discover(&conventions, Path::new("/app/src/view.ts"), &scanner, None).await;
        assert_eq!(literals(&found), vec!["./view.html"]);
    }

    #[tokio::test]
    async fn test_all_files_matching_regex_and_custom() {
        let scanner = scanner();
        let custom: ConventionFn = Arc::new(|file: &Path| {
            let sibling = file.with_file_name("view.html");
            async move { vec![sibling, PathBuf::from("/app/missing.js")] }.boxed()
        });
        let conventions: Vec<Convention> = vec![
            NamedConvention::AllFilesMatchingRegex {
                directory: PathBuf::from("/app/src/styles"),
                pattern: r"\.css$".into(),
            }
            .into(),
            Convention::Custom(custom),
            NamedConvention::default().into(),
        ];

        let found = discover(&conventions, Path::new("/app/src/view.ts"), &scanner, None).await;
        assert_eq!(
            literals(&found),
            vec!["./styles/a.css", "./styles/b.css", "./view.html"]
        );
    }

    #[test]
    fn test_named_convention_serde() {
        let parsed: NamedConvention =
            serde_json::from_str(r#"{"type": "extension-swap"}"#).unwrap();
        assert_eq!(parsed, NamedConvention::default());
    }
}
