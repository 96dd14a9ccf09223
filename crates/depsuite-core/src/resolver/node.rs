//! Default module resolution service.
//!
//! Supports:
//! - Relative specifiers: `./`, `../`
//! - Absolute filesystem specifiers
//! - Bare specifiers, looked up in module directories walking up from the
//!   context, then in configured search roots
//! - Extension probing
//! - Directory resolution (`package.json` main, then `index.*`)
//! - Loader-chain prefixes (`!loader!./x`), stripped before resolving
//! - Optional root-most substitution of nested installs

use super::pkg_json_cache::{DescriptorCache, MemoryDescriptorCache};
use super::root_most::{nested_request, range_allows};
use super::ModuleResolver;
use crate::require::{PackageDescriptor, ResolveResult};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default extensions for probing.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json"];

/// Default module directory name.
pub const DEFAULT_MODULE_DIRECTORY: &str = "node_modules";

/// Package descriptor file name.
pub const PACKAGE_JSON: &str = "package.json";

/// Maximum number of tried paths to record.
const MAX_TRIED_PATHS: usize = 20;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Extensions to probe (in order).
    pub extensions: Vec<String>,
    /// Directory names searched hierarchically for bare specifiers.
    pub module_directories: Vec<String>,
    /// Absolute directories searched for bare specifiers after module directories.
    pub search_roots: Vec<PathBuf>,
    /// Project root for root-most substitution of nested installs.
    pub root_most: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            module_directories: vec![DEFAULT_MODULE_DIRECTORY.to_string()],
            search_roots: Vec::new(),
            root_most: None,
        }
    }
}

/// Reason codes for unresolved literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReasonCode {
    SpecifierInvalid,
    UnsupportedScheme,
    NotFound,
    IsDirectory,
    ModuleDirectoryNotFound,
    PackageMainNotFound,
}

impl fmt::Display for ResolveReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SpecifierInvalid => "SPECIFIER_INVALID",
            Self::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            Self::NotFound => "NOT_FOUND",
            Self::IsDirectory => "IS_DIRECTORY",
            Self::ModuleDirectoryNotFound => "MODULE_DIRECTORY_NOT_FOUND",
            Self::PackageMainNotFound => "PACKAGE_MAIN_NOT_FOUND",
        };
        write!(f, "{s}")
    }
}

/// Failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub request: String,
    pub context: PathBuf,
    pub reason: ResolveReasonCode,
    /// Candidate paths tried (capped).
    pub tried: Vec<PathBuf>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot resolve '{}' in '{}': {}",
            self.request,
            self.context.display(),
            self.reason
        )
    }
}

impl std::error::Error for ResolveError {}

/// Split a request into its loader chain and the resource part.
///
/// `!bundle?lazy!html!./a.html` gives `(["bundle?lazy", "html"], "./a.html")`.
#[must_use]
pub fn split_loader_chain(request: &str) -> (Vec<&str>, &str) {
    match request.rfind('!') {
        Some(pos) => {
            let loaders = request[..pos]
                .split('!')
                .filter(|l| !l.is_empty())
                .collect();
            (loaders, &request[pos + 1..])
        }
        None => (Vec::new(), request),
    }
}

/// Filesystem resolver following node's module lookup.
#[derive(Debug, Clone)]
pub struct NodeResolver {
    config: Arc<ResolverConfig>,
    descriptors: Arc<dyn DescriptorCache>,
}

impl Default for NodeResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl NodeResolver {
    /// Create a resolver with its own descriptor cache.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_cache(config, Arc::new(MemoryDescriptorCache::new()))
    }

    /// Create a resolver sharing a descriptor cache.
    #[must_use]
    pub fn with_cache(config: ResolverConfig, descriptors: Arc<dyn DescriptorCache>) -> Self {
        Self {
            config: Arc::new(config),
            descriptors,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve synchronously.
    pub fn resolve_sync(&self, context: &Path, request: &str) -> Result<ResolveResult, ResolveError> {
        let (_, spec) = split_loader_chain(request);
        let spec = spec.split('?').next().unwrap_or(spec);
        let mut tried = Vec::new();

        let fail = |reason, tried: Vec<PathBuf>| ResolveError {
            request: request.to_string(),
            context: context.to_path_buf(),
            reason,
            tried,
        };

        if spec.is_empty() {
            return Err(fail(ResolveReasonCode::SpecifierInvalid, tried));
        }

        if spec.contains("://") || spec.starts_with("data:") {
            return Err(fail(ResolveReasonCode::UnsupportedScheme, tried));
        }

        let (resolved, is_module) = if is_relative(spec) {
            (self.resolve_path(&context.join(spec), &mut tried), false)
        } else if is_absolute_path(spec) {
            (self.resolve_path(Path::new(spec), &mut tried), false)
        } else {
            (self.resolve_bare(context, spec, &mut tried), true)
        };

        let path = resolved.map_err(|reason| fail(reason, tried))?;
        let result = self.describe(path, is_module);

        match &self.config.root_most {
            Some(root) if is_module => Ok(self.prefer_root_most(context, result, root)),
            _ => Ok(result),
        }
    }

    /// Attach the owning package to a resolved path.
    fn describe(&self, path: PathBuf, is_module: bool) -> ResolveResult {
        let owner = path.parent().and_then(|dir| self.find_package(dir));
        let (package_root, package) = match owner {
            Some((root, desc)) => (Some(root), Some(desc)),
            None => (None, None),
        };
        ResolveResult {
            path,
            package_root,
            package,
            is_file: true,
            is_module,
        }
    }

    /// Find the nearest directory at or above `dir` holding a readable `package.json`.
    pub fn find_package(&self, dir: &Path) -> Option<(PathBuf, Arc<PackageDescriptor>)> {
        dir.ancestors().find_map(|candidate| {
            let pkg_json = candidate.join(PACKAGE_JSON);
            if !pkg_json.is_file() {
                return None;
            }
            self.read_descriptor(&pkg_json)
                .map(|desc| (candidate.to_path_buf(), desc))
        })
    }

    /// Read and parse `package.json`, using the cache if possible.
    fn read_descriptor(&self, path: &Path) -> Option<Arc<PackageDescriptor>> {
        if let Some(desc) = self.descriptors.get(path) {
            return Some(desc);
        }
        let content = std::fs::read_to_string(path).ok()?;
        let value: Value = serde_json::from_str(&content).ok()?;
        let desc = Arc::new(PackageDescriptor::from_value(value));
        self.descriptors.set(path, Arc::clone(&desc));
        Some(desc)
    }

    /// Resolve a path (with extension probing and directory resolution).
    fn resolve_path(&self, base: &Path, tried: &mut Vec<PathBuf>) -> Result<PathBuf, ResolveReasonCode> {
        add_tried(tried, base);
        if base.is_file() {
            return Ok(canonical(base));
        }

        if let Some(found) = self.probe_extensions(base, tried) {
            return Ok(found);
        }

        // "./foo" where "./foo/index.js" exists
        self.resolve_directory(base, tried)
    }

    fn probe_extensions(&self, base: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for ext in &self.config.extensions {
            let mut with_ext = base.as_os_str().to_owned();
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            add_tried(tried, &with_ext);

            if with_ext.is_file() {
                return Some(canonical(&with_ext));
            }
        }
        None
    }

    /// Resolve a directory (package.json main > index.*).
    fn resolve_directory(&self, dir: &Path, tried: &mut Vec<PathBuf>) -> Result<PathBuf, ResolveReasonCode> {
        let pkg_json_path = dir.join(PACKAGE_JSON);
        let mut main_declared = false;

        if pkg_json_path.is_file() {
            add_tried(tried, &pkg_json_path);

            if let Some(main) = self
                .read_descriptor(&pkg_json_path)
                .and_then(|desc| desc.data.get("main").and_then(Value::as_str).map(String::from))
            {
                main_declared = true;
                let main_path = dir.join(main);
                add_tried(tried, &main_path);

                if main_path.is_file() {
                    return Ok(canonical(&main_path));
                }
                if let Some(found) = self.probe_extensions(&main_path, tried) {
                    return Ok(found);
                }
                if main_path.is_dir() {
                    if let Some(found) = self.probe_index(&main_path, tried) {
                        return Ok(found);
                    }
                }
            }
        }

        if let Some(found) = self.probe_index(dir, tried) {
            return Ok(found);
        }

        if main_declared {
            Err(ResolveReasonCode::PackageMainNotFound)
        } else if dir.is_dir() {
            Err(ResolveReasonCode::IsDirectory)
        } else {
            Err(ResolveReasonCode::NotFound)
        }
    }

    fn probe_index(&self, dir: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for ext in &self.config.extensions {
            let index = dir.join(format!("index{ext}"));
            add_tried(tried, &index);

            if index.is_file() {
                return Some(canonical(&index));
            }
        }
        None
    }

    /// Resolve a bare specifier via module directories, then search roots.
    fn resolve_bare(&self, context: &Path, spec: &str, tried: &mut Vec<PathBuf>) -> Result<PathBuf, ResolveReasonCode> {
        let (pkg_name, subpath) = parse_bare_specifier(spec);
        let mut found_module_dir = false;
        let mut specific_error: Option<ResolveReasonCode> = None;

        for dir in context.ancestors() {
            for module_dir in &self.config.module_directories {
                let modules = dir.join(module_dir);
                if !modules.is_dir() {
                    continue;
                }
                found_module_dir = true;

                let pkg_dir = modules.join(pkg_name);
                add_tried(tried, &pkg_dir);
                if !pkg_dir.exists() && subpath.is_none() && !self.has_extension_match(&pkg_dir) {
                    continue;
                }

                let target = subpath.map_or_else(|| pkg_dir.clone(), |sub| pkg_dir.join(sub));
                match self.resolve_path(&target, tried) {
                    Ok(path) => return Ok(path),
                    Err(ResolveReasonCode::PackageMainNotFound) => {
                        specific_error = Some(ResolveReasonCode::PackageMainNotFound);
                    }
                    Err(_) => {}
                }
            }
        }

        for root in &self.config.search_roots {
            found_module_dir |= root.is_dir();
            if let Ok(path) = self.resolve_path(&root.join(spec), tried) {
                return Ok(path);
            }
        }

        if let Some(error) = specific_error {
            return Err(error);
        }
        if found_module_dir {
            Err(ResolveReasonCode::NotFound)
        } else {
            Err(ResolveReasonCode::ModuleDirectoryNotFound)
        }
    }

    /// `node_modules/foo.js` may exist without a `foo` directory.
    fn has_extension_match(&self, base: &Path) -> bool {
        self.config.extensions.iter().any(|ext| {
            let mut with_ext = base.as_os_str().to_owned();
            with_ext.push(ext);
            Path::new(&with_ext).is_file()
        })
    }

    /// Swap a nested install for the root copy when the issuer's range allows it.
    fn prefer_root_most(&self, context: &Path, resolved: ResolveResult, root: &Path) -> ResolveResult {
        let Some(request) = nested_request(&resolved.path, &self.config.module_directories) else {
            return resolved;
        };

        // the package doing the requiring
        let Some((_, issuer)) = self.find_package(context) else {
            return resolved;
        };

        let mut tried = Vec::new();
        let Ok(candidate) = self.resolve_bare(root, &request, &mut tried) else {
            return resolved;
        };
        let candidate = self.describe(candidate, true);

        let (Some(name), Some(version)) = (
            candidate.package_name(),
            candidate.package.as_ref().and_then(|p| p.version.as_deref()),
        ) else {
            return resolved;
        };

        let Some(allowed) = issuer.dependency_range(name) else {
            return resolved;
        };

        trace!(package = name, range = allowed, version, "checking root-most substitution");
        if candidate.path != resolved.path && range_allows(allowed, version) {
            debug!(
                from = %resolved.path.display(),
                to = %candidate.path.display(),
                "root-most substitution"
            );
            candidate
        } else {
            resolved
        }
    }
}

/// Probing uses blocking `std::fs` calls and completes on first poll.
impl ModuleResolver for NodeResolver {
    fn resolve<'a>(
        &'a self,
        context: &'a Path,
        request: &'a str,
    ) -> BoxFuture<'a, Result<ResolveResult, ResolveError>> {
        future::ready(self.resolve_sync(context, request)).boxed()
    }
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Relative specifiers start with `./`, `../`, or are `.`/`..` themselves.
#[must_use]
pub fn is_relative(spec: &str) -> bool {
    spec == "."
        || spec == ".."
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with(".\\")
        || spec.starts_with("..\\")
}

/// Check if a specifier is an absolute path.
#[must_use]
pub fn is_absolute_path(spec: &str) -> bool {
    // Unix absolute
    if spec.starts_with('/') {
        return true;
    }

    // Windows absolute: C:\, D:\, etc.
    let bytes = spec.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        return true;
    }

    // UNC path: \\server\share
    spec.starts_with("\\\\")
}

/// Parse a bare specifier into package name and optional subpath.
///
/// `lodash/fp` gives `("lodash", Some("fp"))`, `@scope/pkg/sub` gives `("@scope/pkg", Some("sub"))`.
#[must_use]
pub fn parse_bare_specifier(spec: &str) -> (&str, Option<&str>) {
    let split_at = if spec.starts_with('@') {
        spec.match_indices('/').nth(1).map(|(i, _)| i)
    } else {
        spec.find('/')
    };

    match split_at {
        Some(i) => (&spec[..i], Some(&spec[i + 1..]).filter(|s| !s.is_empty())),
        None => (spec, None),
    }
}

/// Add a path to tried list (with cap).
fn add_tried(tried: &mut Vec<PathBuf>, path: &Path) {
    if tried.len() < MAX_TRIED_PATHS {
        tried.push(path.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn canon(path: &Path) -> PathBuf {
        dunce::canonicalize(path).unwrap()
    }

    #[test]
    fn test_parse_bare_specifier() {
        assert_eq!(parse_bare_specifier("lodash"), ("lodash", None));
        assert_eq!(parse_bare_specifier("lodash/fp"), ("lodash", Some("fp")));
        assert_eq!(parse_bare_specifier("@s/pkg"), ("@s/pkg", None));
        assert_eq!(parse_bare_specifier("@s/pkg/a/b"), ("@s/pkg", Some("a/b")));
    }

    #[test]
    fn test_split_loader_chain() {
        assert_eq!(split_loader_chain("./a.js"), (vec![], "./a.js"));
        assert_eq!(
            split_loader_chain("!bundle?lazy&name=v!html!./a.html"),
            (vec!["bundle?lazy&name=v", "html"], "./a.html")
        );
    }

    #[test]
    fn test_is_absolute_and_relative() {
        assert!(is_absolute_path("/abs/x"));
        assert!(is_absolute_path("C:\\x"));
        assert!(is_absolute_path("\\\\server\\share"));
        assert!(!is_absolute_path("./x"));
        assert!(is_relative("./x"));
        assert!(is_relative(".."));
        assert!(!is_relative(".hidden"));
        assert!(!is_relative("pkg"));
    }

    #[test]
    fn test_resolve_relative_with_extension_probe() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("src/util.js"), "");
        write(&dir.path().join("package.json"), r#"{"name": "app", "version": "1.0.0"}"#);

        let resolver = NodeResolver::default();
        let result = resolver
            .resolve_sync(&dir.path().join("src"), "./util")
            .unwrap();

        assert_eq!(result.path, canon(&dir.path().join("src/util.js")));
        assert!(!result.is_module);
        assert!(result.is_file);
        assert_eq!(result.package_name(), Some("app"));
        assert_eq!(result.package_root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_resolve_strips_loader_chain() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.html"), "");

        let resolver = NodeResolver::default();
        let result = resolver
            .resolve_sync(dir.path(), "!bundle?lazy!./a.html")
            .unwrap();
        assert_eq!(result.path, canon(&dir.path().join("a.html")));
    }

    #[test]
    fn test_resolve_bare_package_main_and_subpath() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/widgets");
        write(&pkg.join("package.json"), r#"{"name": "widgets", "main": "dist/main"}"#);
        write(&pkg.join("dist/main.js"), "");
        write(&pkg.join("dist/button.html"), "");
        fs::create_dir_all(dir.path().join("src")).unwrap();

        let resolver = NodeResolver::default();
        let src = dir.path().join("src");

        let main = resolver.resolve_sync(&src, "widgets").unwrap();
        assert_eq!(main.path, canon(&pkg.join("dist/main.js")));
        assert!(main.is_module);
        assert_eq!(main.package_root.as_deref(), Some(pkg.as_path()));

        let sub = resolver.resolve_sync(&src, "widgets/dist/button.html").unwrap();
        assert_eq!(sub.path, canon(&pkg.join("dist/button.html")));
    }

    #[test]
    fn test_resolve_bare_missing_main_reports_reason() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("node_modules/broken");
        write(&pkg.join("package.json"), r#"{"name": "broken", "main": "gone.js"}"#);

        let err = NodeResolver::default()
            .resolve_sync(dir.path(), "broken")
            .unwrap_err();
        assert_eq!(err.reason, ResolveReasonCode::PackageMainNotFound);
        assert!(!err.tried.is_empty());
    }

    #[test]
    fn test_resolve_search_root() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("src/components/nav.js"), "");

        let resolver = NodeResolver::new(ResolverConfig {
            search_roots: vec![dir.path().join("src")],
            ..Default::default()
        });
        let result = resolver
            .resolve_sync(&dir.path().join("elsewhere"), "components/nav")
            .unwrap();
        assert_eq!(result.path, canon(&dir.path().join("src/components/nav.js")));
        assert!(result.is_module);
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = tempdir().unwrap();
        let err = NodeResolver::default()
            .resolve_sync(dir.path(), "./nope")
            .unwrap_err();
        assert_eq!(err.reason, ResolveReasonCode::NotFound);
        assert!(err.to_string().contains("Cannot resolve './nope'"));
    }

    #[test]
    fn test_resolve_future_is_ready_on_first_poll() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.js"), "");
        let resolver = NodeResolver::default();

        let found = resolver.resolve(dir.path(), "./a.js").now_or_never();
        assert_eq!(found.unwrap().unwrap().path, canon(&dir.path().join("a.js")));
    }

    #[test]
    fn test_resolve_rejects_urls() {
        let err = NodeResolver::default()
            .resolve_sync(Path::new("/"), "https://cdn/x.js")
            .unwrap_err();
        assert_eq!(err.reason, ResolveReasonCode::UnsupportedScheme);
    }

    #[test]
    fn test_root_most_substitution() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("package.json"),
            r#"{"name": "app", "dependencies": {"lib": "^1.0.0"}}"#,
        );
        // root copy of shared
        write(
            &root.join("node_modules/shared/package.json"),
            r#"{"name": "shared", "version": "2.1.0"}"#,
        );
        write(&root.join("node_modules/shared/index.js"), "");
        // lib with its own nested copy of shared
        let lib = root.join("node_modules/lib");
        write(
            &lib.join("package.json"),
            r#"{"name": "lib", "version": "1.0.0", "dependencies": {"shared": "^2.0.0"}}"#,
        );
        write(&lib.join("index.js"), "");
        write(
            &lib.join("node_modules/shared/package.json"),
            r#"{"name": "shared", "version": "2.0.0"}"#,
        );
        write(&lib.join("node_modules/shared/index.js"), "");

        let plain = NodeResolver::default();
        let nested = plain.resolve_sync(&lib, "shared").unwrap();
        assert_eq!(nested.path, canon(&lib.join("node_modules/shared/index.js")));

        let root_most = NodeResolver::new(ResolverConfig {
            root_most: Some(root.to_path_buf()),
            ..Default::default()
        });
        let hoisted = root_most.resolve_sync(&lib, "shared").unwrap();
        assert_eq!(hoisted.path, canon(&root.join("node_modules/shared/index.js")));
        assert_eq!(
            hoisted.package.as_ref().and_then(|p| p.version.as_deref()),
            Some("2.1.0")
        );
    }

    #[test]
    fn test_root_most_keeps_nested_when_range_disallows() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("node_modules/shared/package.json"),
            r#"{"name": "shared", "version": "3.0.0"}"#,
        );
        write(&root.join("node_modules/shared/index.js"), "");
        let lib = root.join("node_modules/lib");
        write(
            &lib.join("package.json"),
            r#"{"name": "lib", "dependencies": {"shared": "^2.0.0"}}"#,
        );
        write(&lib.join("node_modules/shared/index.js"), "");

        let resolver = NodeResolver::new(ResolverConfig {
            root_most: Some(root.to_path_buf()),
            ..Default::default()
        });
        let kept = resolver.resolve_sync(&lib, "shared").unwrap();
        assert_eq!(kept.path, canon(&lib.join("node_modules/shared/index.js")));
    }
}
