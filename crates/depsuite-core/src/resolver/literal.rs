//! Literal resolution with the engine's never-fail contract.

use super::node::is_absolute_path;
use super::ModuleResolver;
use crate::diagnostics::Diagnostics;
use crate::require::{RequireData, ResolveResult};
use depsuite_util::path::relative_request;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Resolve one literal. Failure is `None`, optionally reported once to `sink`.
pub async fn resolve_literal(
    resolver: &dyn ModuleResolver,
    literal: &str,
    context_dir: &Path,
    sink: Option<&dyn Diagnostics>,
) -> Option<ResolveResult> {
    match resolver.resolve(context_dir, literal).await {
        Ok(result) => {
            trace!(literal, path = %result.path.display(), "resolved");
            Some(result)
        }
        Err(err) => {
            debug!(literal, reason = %err.reason, tried = err.tried.len(), "unresolved");
            if let Some(sink) = sink {
                sink.emit_warning(&err.to_string());
            }
            None
        }
    }
}

/// Fill in `entry.resolve` unless it is already present.
pub async fn resolve_require(
    resolver: &dyn ModuleResolver,
    mut entry: RequireData,
    context_dir: &Path,
    sink: Option<&dyn Diagnostics>,
) -> RequireData {
    if entry.resolve.is_none() {
        entry.resolve = resolve_literal(resolver, &entry.literal, context_dir, sink).await;
    }
    entry
}

/// The package a manifest-listed literal belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PackageContext<'a> {
    /// Resolution of the file doing the requiring.
    pub requester: &'a ResolveResult,
    /// Project root; literals listed by the root package are not prefixed.
    pub root_dir: Option<&'a Path>,
    /// Also try resolving from the project root.
    pub fallback_to_root: bool,
}

impl PackageContext<'_> {
    fn package_name(&self) -> Option<&str> {
        self.requester.package_name()
    }

    fn is_root(&self) -> bool {
        match (self.root_dir, self.requester.package_root.as_deref()) {
            (Some(root), Some(pkg_root)) => root == pkg_root,
            _ => false,
        }
    }

    fn contexts(&self) -> Vec<PathBuf> {
        let mut contexts = Vec::new();
        if let Some(pkg_root) = &self.requester.package_root {
            contexts.push(pkg_root.clone());
        }
        if self.fallback_to_root {
            if let Some(root) = self.root_dir {
                contexts.push(root.to_path_buf());
            }
        }
        contexts
    }
}

/// Resolve a literal listed in a package manifest.
///
/// Tries `<package>/<literal>` then the literal itself in each context
/// directory. Warns once when nothing resolves. Module literals pointing
/// back into the requester's own package become relative requests.
pub async fn resolve_in_package_context(
    resolver: &dyn ModuleResolver,
    mut entry: RequireData,
    ctx: &PackageContext<'_>,
    sink: Option<&dyn Diagnostics>,
) -> Option<RequireData> {
    let package_name = ctx.package_name();
    let names_package = package_name.is_some_and(|name| {
        entry.literal == name || entry.literal.starts_with(&format!("{name}/"))
    });
    let try_prefixed =
        !names_package && !is_absolute_path(&entry.literal) && !ctx.is_root();

    let mut resolved = None;
    let mut attempt = 0;
    for context in ctx.contexts() {
        if let (true, Some(name)) = (try_prefixed, package_name) {
            let prefixed = format!("{name}/{}", entry.literal);
            resolved = resolve_literal(resolver, &prefixed, &context, None).await;
            attempt += 1;
            trace!(attempt, literal = %prefixed, context = %context.display(), ok = resolved.is_some());
        }
        if resolved.is_none() {
            resolved = resolve_literal(resolver, &entry.literal, &context, None).await;
            attempt += 1;
            trace!(attempt, literal = %entry.literal, context = %context.display(), ok = resolved.is_some());
        }
        if resolved.is_some() {
            break;
        }
    }

    let Some(resolved) = resolved else {
        if let Some(sink) = sink {
            sink.emit_warning(&format!(
                "Unable to resolve {} in context of {}",
                entry.literal,
                package_name.unwrap_or("<unnamed package>")
            ));
        }
        return None;
    };

    let same_package = package_name.is_some() && resolved.package_name() == package_name;
    if !entry.literal.starts_with('.') && same_package {
        if let Some(from_dir) = ctx.requester.path.parent() {
            let relative = relative_request(from_dir, &resolved.path);
            debug!(from = %entry.literal, to = %relative, "mapped same-package literal to relative");
            entry.literal = relative;
        }
    }

    entry.resolve = Some(resolved);
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectedDiagnostics;
    use crate::require::RequireDataBase;
    use crate::resolver::NodeResolver;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_missing_literal_warns_once() {
        let dir = tempdir().unwrap();
        let sink = CollectedDiagnostics::new();

        let result =
            resolve_literal(&NodeResolver::default(), "./missing", dir.path(), Some(&sink)).await;

        assert!(result.is_none());
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_require_keeps_existing_result() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.js"), "");
        let resolver = NodeResolver::default();

        let entry = resolve_require(
            &resolver,
            RequireDataBase::new("./a").into(),
            dir.path(),
            None,
        )
        .await;
        let first = entry.resolve.clone().unwrap();

        // a second pass from a context where "./a" does not exist is a no-op
        let again = resolve_require(&resolver, entry, Path::new("/"), None).await;
        assert_eq!(again.resolve, Some(first));
    }

    #[tokio::test]
    async fn test_package_context_prefixes_and_relativizes() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/ui-kit");
        write(&pkg.join("package.json"), r#"{"name": "ui-kit"}"#);
        write(&pkg.join("index.js"), "");
        write(&pkg.join("views/panel.html"), "");

        let resolver = NodeResolver::default();
        let requester = resolver.resolve_sync(dir.path(), "ui-kit").unwrap();
        let ctx = PackageContext {
            requester: &requester,
            root_dir: Some(dir.path()),
            fallback_to_root: false,
        };

        let entry = resolve_in_package_context(
            &resolver,
            RequireDataBase::new("views/panel.html").into(),
            &ctx,
            None,
        )
        .await
        .unwrap();

        assert_eq!(entry.literal, "./views/panel.html");
        assert!(entry.resolve.unwrap().path.ends_with("views/panel.html"));
    }

    #[tokio::test]
    async fn test_package_context_warns_when_unresolvable() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/ui-kit");
        write(&pkg.join("package.json"), r#"{"name": "ui-kit"}"#);
        write(&pkg.join("index.js"), "");

        let resolver = NodeResolver::default();
        let requester = resolver.resolve_sync(dir.path(), "ui-kit").unwrap();
        let ctx = PackageContext {
            requester: &requester,
            root_dir: Some(dir.path()),
            fallback_to_root: true,
        };
        let sink = CollectedDiagnostics::new();

        let entry = resolve_in_package_context(
            &resolver,
            RequireDataBase::new("nope.html").into(),
            &ctx,
            Some(&sink),
        )
        .await;

        assert!(entry.is_none());
        assert_eq!(
            sink.warnings(),
            vec!["Unable to resolve nope.html in context of ui-kit".to_string()]
        );
    }
}
