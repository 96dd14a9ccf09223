//! Per-build session: owns the caches and runs the per-file pipeline.
//!
//! A session is created per build (or per watch rebuild) and passed by
//! reference; nothing is cached outside of it.

use crate::annotate::annotate;
use crate::config::EngineConfig;
use crate::convention::{discover, Convention};
use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::fs::{FileSystem, OsFileSystem};
use crate::glob::{ExpandContext, GlobExpander};
use crate::inject::{inject, wrap_in_require_include};
use crate::require::{is_glob, PathWithLoaders, RequireData, RequireDataBase, ResolveResult};
use crate::resolver::{
    resolve_in_package_context, resolve_literal, ModuleResolver, NodeResolver, PackageContext,
};
use crate::scan::DirectoryScanner;
use crate::sourcemap::SourceMap;
use crate::synthesize::{synthesize_detailed, OverridePolicy, SynthesisContext};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info_span, Instrument};

/// Manifest-listed requests: resolve them inside the requester's package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageScope {
    /// Project root. Requests from the root package are not name-prefixed.
    pub root_dir: Option<PathBuf>,
    /// Also try resolving from `root_dir`.
    pub fallback_to_root: bool,
    /// Inject only into the first file processed from each package root.
    pub first_file_only: bool,
}

impl Default for PackageScope {
    fn default() -> Self {
        Self {
            root_dir: None,
            fallback_to_root: false,
            first_file_only: true,
        }
    }
}

/// One file to process.
pub struct FileRequest<'a> {
    pub path: PathBuf,
    pub source: String,
    pub map: Option<SourceMap>,
    pub requires: Vec<RequireDataBase>,
    pub package_scope: Option<PackageScope>,
    pub policy: Option<&'a dyn OverridePolicy>,
    pub sink: &'a dyn Diagnostics,
}

impl<'a> FileRequest<'a> {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>, sink: &'a dyn Diagnostics) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            map: None,
            requires: Vec::new(),
            package_scope: None,
            policy: None,
            sink,
        }
    }

    #[must_use]
    pub fn requires(mut self, requires: Vec<RequireDataBase>) -> Self {
        self.requires = requires;
        self
    }

    #[must_use]
    pub fn map(mut self, map: SourceMap) -> Self {
        self.map = Some(map);
        self
    }

    #[must_use]
    pub fn package_scope(mut self, scope: PackageScope) -> Self {
        self.package_scope = Some(scope);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: &'a dyn OverridePolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Output for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub path: PathBuf,
    pub code: String,
    pub map: Option<SourceMap>,
    /// Injected reference strings, in order.
    pub references: Vec<String>,
    /// Resolved dependencies for host dependency recording.
    pub dependencies: Vec<PathWithLoaders>,
}

impl Processed {
    fn unchanged(path: PathBuf, source: String, map: Option<SourceMap>) -> Self {
        Self {
            path,
            code: source,
            map,
            references: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// Everything one build shares.
#[derive(Debug)]
pub struct BuildSession {
    config: EngineConfig,
    resolver: Arc<dyn ModuleResolver>,
    scanner: Arc<DirectoryScanner>,
    globs: GlobExpander,
    /// Package roots whose manifest list has been injected already.
    packages_done: Mutex<HashSet<PathBuf>>,
}

impl BuildSession {
    /// Session over the real filesystem with the default resolver.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let resolver = Arc::new(NodeResolver::new(config.resolver_config()));
        Self::with_parts(config, Arc::new(OsFileSystem), resolver)
    }

    /// Session over a host filesystem and resolution service.
    #[must_use]
    pub fn with_parts(
        config: EngineConfig,
        fs: Arc<dyn FileSystem>,
        resolver: Arc<dyn ModuleResolver>,
    ) -> Self {
        let scanner = Arc::new(DirectoryScanner::new(fs, config.debounce()));
        let globs = GlobExpander::new(
            Arc::clone(&scanner),
            Arc::clone(&resolver),
            config.glob_config(),
            config.debounce(),
        );
        Self {
            config,
            resolver,
            scanner,
            globs,
            packages_done: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &dyn ModuleResolver {
        self.resolver.as_ref()
    }

    #[must_use]
    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    #[must_use]
    pub fn globs(&self) -> &GlobExpander {
        &self.globs
    }

    /// Evict lapsed scan and glob results.
    pub fn sweep(&self) -> usize {
        self.scanner.sweep() + self.globs.sweep()
    }

    /// Companion files of `file` found by `conventions`.
    pub async fn discover(
        &self,
        conventions: &[Convention],
        file: &Path,
        sink: Option<&dyn Diagnostics>,
    ) -> Vec<RequireDataBase> {
        discover(conventions, file, &self.scanner, sink).await
    }

    /// Run the full pipeline for one file.
    ///
    /// A failing override policy is reported through the sink and leaves the
    /// file unchanged. A source map that does not match the source fails the
    /// file.
    pub async fn process(&self, request: FileRequest<'_>) -> Result<Processed, Error> {
        let span = info_span!("process", file = %request.path.display());
        self.process_inner(request).instrument(span).await
    }

    /// Process many files concurrently. Each file fails on its own.
    pub async fn process_batch(&self, requests: Vec<FileRequest<'_>>) -> Vec<Result<Processed, Error>> {
        join_all(requests.into_iter().map(|r| self.process(r))).await
    }

    /// Mark `root` as injected. False when an earlier file already claimed it.
    fn claim_package(&self, root: &Path) -> bool {
        self.packages_done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root.to_path_buf())
    }

    async fn process_inner(&self, request: FileRequest<'_>) -> Result<Processed, Error> {
        let FileRequest {
            path,
            source,
            map,
            requires,
            package_scope,
            policy,
            sink,
        } = request;
        let requester_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if requires.is_empty() {
            return Ok(Processed::unchanged(path, source, map));
        }

        let entries: Vec<RequireData> = requires.into_iter().map(RequireData::from).collect();
        let mut entries = annotate(entries, self.config.annotation_property);

        // the requester's own package, for manifest-listed requests
        let requester: Option<ResolveResult> = match &package_scope {
            Some(_) => {
                let own = path.to_string_lossy();
                let found = resolve_literal(self.resolver(), &own, &requester_dir, None).await;
                if found.is_none() {
                    debug!(file = %path.display(), "requester does not resolve, skipping");
                    return Ok(Processed::unchanged(path, source, map));
                }
                found
            }
            None => None,
        };

        if let (Some(scope), Some(pkg_root)) = (
            &package_scope,
            requester.as_ref().and_then(|r| r.package_root.as_ref()),
        ) {
            if scope.first_file_only && !self.claim_package(pkg_root) {
                debug!(package = %pkg_root.display(), "manifest list already injected");
                return Ok(Processed::unchanged(path, source, map));
            }
        }

        let mut expand_ctx = ExpandContext::new(&requester_dir);
        if let (Some(scope), Some(own)) = (&package_scope, &requester) {
            let is_root = scope.root_dir.is_some() && scope.root_dir == own.package_root;
            if let (false, Some(pkg_root)) = (is_root, &own.package_root) {
                expand_ctx = expand_ctx.with_resolution_root(pkg_root);
            }
        }

        if self.config.enable_globbing {
            entries = self.globs.expand_all(entries, &expand_ctx, Some(sink)).await;
        } else {
            let before = entries.len();
            entries.retain(|e| !is_glob(&e.literal));
            if entries.len() != before {
                debug!(dropped = before - entries.len(), "globbing disabled, dropping wildcard literals");
            }
        }

        if let (Some(scope), Some(own)) = (&package_scope, &requester) {
            let ctx = PackageContext {
                requester: own,
                root_dir: scope.root_dir.as_deref(),
                fallback_to_root: scope.fallback_to_root,
            };
            entries = join_all(
                entries
                    .into_iter()
                    .map(|e| resolve_in_package_context(self.resolver(), e, &ctx, Some(sink))),
            )
            .await
            .into_iter()
            .flatten()
            .filter(|e| e.resolve.as_ref().map(|r| r.path.as_path()) != Some(own.path.as_path()))
            .collect();
        }

        let ctx = SynthesisContext {
            resolver: self.resolver(),
            requester_dir: &requester_dir,
            policy,
            force_override: self.config.force_override,
            sink: Some(sink),
        };
        let synthesized = match synthesize_detailed(entries, ctx).await {
            Ok(synthesized) => synthesized,
            Err(err) => {
                sink.emit_error(&err.to_string());
                return Ok(Processed::unchanged(path, source, map));
            }
        };

        let statements: Vec<String> = synthesized
            .iter()
            .map(|s| wrap_in_require_include(&s.reference))
            .collect();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());

        let injected = match inject(&source, &statements, map, file_name.as_deref()) {
            Ok(injected) => injected,
            Err(err) => {
                sink.emit_error(&err.to_string());
                return Err(err);
            }
        };

        debug!(count = statements.len(), "injected references");
        Ok(Processed {
            path,
            code: injected.code,
            map: injected.map,
            references: synthesized.iter().map(|s| s.reference.clone()).collect(),
            dependencies: synthesized.iter().map(|s| s.path_with_loaders()).collect(),
        })
    }
}
