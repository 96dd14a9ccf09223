//! Lexical path helpers.
//!
//! None of these touch the filesystem: paths handed to the engine may live in a
//! host's virtual filesystem, so symlinks are never followed here.

use std::path::{Component, Path, PathBuf};

/// Render a path with forward slashes regardless of platform.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Lexically normalize a path, folding `.` and `..` components.
///
/// A `..` that would climb above the root is dropped for absolute paths and
/// kept for relative ones.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    let mut out = PathBuf::new();
    for part in parts {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Compute the path of `to` relative to the directory `from_dir`.
///
/// Returns `to` unchanged when the two paths do not share a root.
#[must_use]
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from = normalize(from_dir);
    let to = normalize(to);

    if from.has_root() != to.has_root() {
        return to;
    }

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && from.has_root() {
        return to;
    }

    let mut out = PathBuf::new();
    for part in &from_parts[common..] {
        if !matches!(part, Component::CurDir) {
            out.push("..");
        }
    }
    for part in &to_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Express `to` as a relative request from `from_dir`: `./x` or `../x`, forward slashes.
#[must_use]
pub fn relative_request(from_dir: &Path, to: &Path) -> String {
    let rel = to_slash(&relative_path(from_dir, to));
    if rel.starts_with("../") || rel == ".." {
        rel
    } else {
        format!("./{rel}")
    }
}
