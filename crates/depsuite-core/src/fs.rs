//! Pluggable filesystem abstraction.
//!
//! The scanner only needs `read_dir` and `stat`, so a host with its own
//! cached or virtual filesystem can stand in for the real one.

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Other,
}

/// Metadata the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub len: u64,
    /// Modification time in milliseconds since epoch.
    pub mtime_ms: Option<u64>,
}

impl FileStat {
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Convert from std metadata (symlinks already followed).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let kind = if meta.is_file() {
            FileKind::File
        } else if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        };
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);
        Self {
            kind,
            len: meta.len(),
            mtime_ms,
        }
    }
}

/// Async filesystem used by the directory scanner and conventions.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// List entry names (not paths) of a directory.
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>>;

    /// Stat a path, following symlinks.
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>>;
}

/// The real filesystem, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>> {
        async move {
            let mut entries = tokio::fs::read_dir(path).await?;
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            Ok(names)
        }
        .boxed()
    }

    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>> {
        async move {
            let meta = tokio::fs::metadata(path).await?;
            Ok(FileStat::from_metadata(&meta))
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
enum MemoryNode {
    File(u64),
    Directory,
}

/// In-memory filesystem for hosts that build from virtual sources.
///
/// Counts `read_dir` calls so callers can observe scan memoization.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: RwLock<BTreeMap<PathBuf, MemoryNode>>,
    read_dir_calls: AtomicUsize,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: &str) {
        let path = path.as_ref();
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.insert(ancestor.to_path_buf(), MemoryNode::Directory);
        }
        nodes.insert(path.to_path_buf(), MemoryNode::File(contents.len() as u64));
    }

    /// Add an (empty) directory and its parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.insert(ancestor.to_path_buf(), MemoryNode::Directory);
        }
    }

    /// Remove a file or directory subtree.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes.retain(|p, _| !p.starts_with(path));
    }

    /// Number of `read_dir` calls served so far.
    #[must_use]
    pub fn read_dir_calls(&self) -> usize {
        self.read_dir_calls.load(Ordering::SeqCst)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<String>> {
        self.read_dir_calls.fetch_add(1, Ordering::SeqCst);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(path) {
            Some(MemoryNode::Directory) => Ok(nodes
                .keys()
                .filter(|p| p.parent() == Some(path))
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect()),
            Some(MemoryNode::File(_)) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn lookup(&self, path: &Path) -> io::Result<FileStat> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(path) {
            Some(MemoryNode::File(len)) => Ok(FileStat {
                kind: FileKind::File,
                len: *len,
                mtime_ms: None,
            }),
            Some(MemoryNode::Directory) => Ok(FileStat {
                kind: FileKind::Directory,
                len: 0,
                mtime_ms: None,
            }),
            None => Err(not_found(path)),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MemoryFileSystem {
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>> {
        future::ready(self.list(path)).boxed()
    }

    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>> {
        future::ready(self.lookup(path)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_os_fs_read_dir_and_stat() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "<template></template>").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = OsFileSystem;
        let mut names = fs.read_dir(dir.path()).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a.html".to_string(), "sub".to_string()]);

        let stat = fs.stat(&dir.path().join("a.html")).await.unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.len, 21);
        assert!(fs.stat(&dir.path().join("sub")).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_os_fs_missing_dir_errors() {
        let dir = tempdir().unwrap();
        let err = OsFileSystem
            .read_dir(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_memory_fs_tree() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/app/src/main.js", "x");
        fs.add_file("/app/src/views/a.html", "");
        fs.add_dir("/app/empty");

        let mut names = fs.read_dir(Path::new("/app/src")).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["main.js".to_string(), "views".to_string()]);
        assert!(fs.read_dir(Path::new("/app/empty")).await.unwrap().is_empty());
        assert!(fs.stat(Path::new("/app/src/views")).await.unwrap().is_dir());
        assert_eq!(fs.stat(Path::new("/app/src/main.js")).await.unwrap().len, 1);
        assert_eq!(fs.read_dir_calls(), 2);

        fs.remove("/app/src/views");
        assert!(fs.stat(Path::new("/app/src/views/a.html")).await.is_err());
    }
}
