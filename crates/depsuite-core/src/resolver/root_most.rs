//! Root-most substitution for nested installs.
//!
//! A package installed under another package's module directory
//! (`node_modules/a/node_modules/b`) is swapped for the copy resolvable from
//! the project root when that copy satisfies the issuer's declared range.

use semver::{Version, VersionReq};
use std::path::{Component, Path};

/// The request below the innermost module directory, if `path` is nested under more than one.
///
/// `/p/node_modules/a/node_modules/b/index.js` gives `b/index.js`.
#[must_use]
pub fn nested_request(path: &Path, module_directories: &[String]) -> Option<String> {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let is_module_dir = |s: &String| module_directories.iter().any(|d| d == s);
    let count = parts.iter().filter(|p| is_module_dir(*p)).count();
    if count <= 1 {
        return None;
    }

    let last = parts.iter().rposition(is_module_dir)?;
    let rest = &parts[last + 1..];
    if rest.is_empty() {
        return None;
    }
    Some(rest.join("/"))
}

/// Check whether an npm-style range admits `version`.
///
/// Handles `||` alternatives, hyphen ranges, x-ranges and space-separated
/// comparators. Unparseable ranges admit nothing.
#[must_use]
pub fn range_allows(range: &str, version: &str) -> bool {
    let Ok(version) = Version::parse(version.trim().trim_start_matches('v')) else {
        return false;
    };

    range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(parse_range)
        .any(|req| req.matches(&version))
}

fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    if let Some((start, end)) = range.split_once(" - ") {
        let (start, end) = (start.trim(), end.trim());
        if !start.is_empty() && !end.is_empty() {
            return VersionReq::parse(&format!(">={start}, <={end}")).ok();
        }
    }

    if range == "*" || range.is_empty() || range.contains(['x', 'X']) {
        return VersionReq::parse(&convert_x_range(range)).ok();
    }

    VersionReq::parse(&join_comparators(range)).ok()
}

/// `>= 2.1.2 < 3.0.0` becomes `>=2.1.2, <3.0.0`.
fn join_comparators(range: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            out.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }

    if out.is_empty() {
        return range.to_string();
    }
    out.join(", ")
}

fn convert_x_range(range: &str) -> String {
    let parts: Vec<&str> = range.split('.').collect();
    let wild = |s: &str| matches!(s, "x" | "X" | "*");

    match parts.as_slice() {
        [major, minor] | [major, minor, _] if wild(*minor) => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, patch] if wild(*patch) => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    ">=0.0.0".to_string()
}
