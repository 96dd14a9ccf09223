//! Literal classification: relative vs module-rooted.

use crate::require::is_glob;
use crate::resolver::{is_absolute_path, ModuleResolver, PACKAGE_JSON};
use std::path::{Path, PathBuf};
use tracing::trace;

/// A literal broken into module name and in-module request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitRequest {
    /// Empty for relative and non-module literals.
    pub module_name: String,
    /// Package root, when the module name was confirmed by resolution.
    pub module_root: Option<PathBuf>,
    /// Request below the module (the whole literal for non-module literals).
    pub remaining_request: String,
    /// Path segments of the normalized literal.
    pub segments: Vec<String>,
}

impl SplitRequest {
    #[must_use]
    pub fn is_module(&self) -> bool {
        !self.module_name.is_empty()
    }

    fn non_module(literal: &str) -> Self {
        Self {
            module_name: String::new(),
            module_root: None,
            remaining_request: literal.to_string(),
            segments: segments(literal),
        }
    }
}

fn segments(literal: &str) -> Vec<String> {
    literal
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Drop everything up to and including the last `/<marker>/` of an absolute path.
fn strip_to_last_marker<'a>(literal: &'a str, markers: &[String]) -> Option<&'a str> {
    markers
        .iter()
        .filter_map(|marker| {
            [format!("/{marker}/"), format!("\\{marker}\\")]
                .iter()
                .filter_map(|needle| literal.rfind(needle.as_str()).map(|i| i + needle.len()))
                .max()
        })
        .max()
        .map(|end| &literal[end..])
}

/// Split without consulting a resolver.
#[must_use]
pub fn split_literal(literal: &str, markers: &[String]) -> SplitRequest {
    if literal.starts_with('.') {
        return SplitRequest::non_module(literal);
    }

    let normalized = if is_absolute_path(literal) {
        match strip_to_last_marker(literal, markers) {
            Some(rest) => rest,
            None => return SplitRequest::non_module(literal),
        }
    } else {
        literal
    };

    let segments = segments(normalized);
    let name_len = match segments.first() {
        Some(first) if first.starts_with('@') => 2.min(segments.len()),
        Some(_) => 1,
        None => 0,
    };

    SplitRequest {
        module_name: segments[..name_len].join("/"),
        module_root: None,
        remaining_request: segments[name_len..].join("/"),
        segments,
    }
}

/// Split, confirming the module name against a resolver when one is supplied.
///
/// A module name that does not resolve degrades the literal to non-module.
pub async fn split_request(
    literal: &str,
    markers: &[String],
    resolver: Option<(&dyn ModuleResolver, &Path)>,
) -> SplitRequest {
    let mut split = split_literal(literal, markers);
    let Some((resolver, context)) = resolver else {
        return split;
    };
    if !split.is_module() || is_glob(&split.module_name) {
        return split;
    }

    // packages without a main still resolve through their descriptor
    let descriptor = format!("{}/{PACKAGE_JSON}", split.module_name);
    let mut root = None;
    for request in [split.module_name.as_str(), descriptor.as_str()] {
        if let Ok(result) = resolver.resolve(context, request).await {
            root = result.package_root;
            if root.is_some() {
                break;
            }
        }
    }

    match root {
        Some(root) => split.module_root = Some(root),
        None => {
            trace!(literal, module = %split.module_name, "module name unresolved, treating as path");
            split = SplitRequest::non_module(literal);
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NodeResolver;
    use std::fs;
    use tempfile::tempdir;

    fn markers() -> Vec<String> {
        vec!["node_modules".to_string()]
    }

    #[test]
    fn test_relative_passes_through() {
        let split = split_literal("./views/*.html", &markers());
        assert!(!split.is_module());
        assert_eq!(split.remaining_request, "./views/*.html");
        assert_eq!(split.segments, vec![".", "views", "*.html"]);
    }

    #[test]
    fn test_plain_and_scoped_modules() {
        let split = split_literal("lodash/fp/map", &markers());
        assert_eq!(split.module_name, "lodash");
        assert_eq!(split.remaining_request, "fp/map");

        let scoped = split_literal("@ui/kit/views/*.html", &markers());
        assert_eq!(scoped.module_name, "@ui/kit");
        assert_eq!(scoped.remaining_request, "views/*.html");
        assert_eq!(scoped.segments.len(), 4);
    }

    #[test]
    fn test_absolute_path_strips_to_last_marker() {
        let split = split_literal(
            "/app/node_modules/a/node_modules/b/lib/x.js",
            &markers(),
        );
        assert_eq!(split.module_name, "b");
        assert_eq!(split.remaining_request, "lib/x.js");

        let plain = split_literal("/app/src/x.js", &markers());
        assert!(!plain.is_module());
        assert_eq!(plain.remaining_request, "/app/src/x.js");
    }

    #[tokio::test]
    async fn test_resolver_confirms_module_root() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/kit");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"name": "kit"}"#).unwrap();

        let resolver = NodeResolver::default();
        let ctx: (&dyn ModuleResolver, &Path) = (&resolver, dir.path());
        let split = split_request("kit/*.html", &markers(), Some(ctx)).await;
        assert_eq!(split.module_name, "kit");
        assert_eq!(
            split.module_root.map(|p| dunce::canonicalize(p).unwrap()),
            Some(dunce::canonicalize(&pkg).unwrap())
        );
    }

    #[tokio::test]
    async fn test_unresolvable_module_degrades() {
        let dir = tempdir().unwrap();
        let resolver = NodeResolver::default();
        let ctx: (&dyn ModuleResolver, &Path) = (&resolver, dir.path());
        let split = split_request("views/*.html", &markers(), Some(ctx)).await;
        assert!(!split.is_module());
        assert_eq!(split.remaining_request, "views/*.html");
    }
}
