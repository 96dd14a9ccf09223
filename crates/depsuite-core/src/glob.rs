//! Wildcard literal expansion.
//!
//! `*` matches within one path segment, `**` matches any number of segments.
//! Candidate roots come from the literal's shape: a resolvable module expands
//! under its package root, a relative literal under the requester's directory
//! plus the configured extra roots, anything else under the resolution root
//! or every search root.

use crate::cache::{CacheStats, DebouncedCache};
use crate::diagnostics::Diagnostics;
use crate::require::{is_glob, RequireData};
use crate::resolver::{is_absolute_path, split_loader_chain, ModuleResolver};
use crate::scan::{DirectoryScanner, ScanOptions};
use crate::split::split_request;
use depsuite_util::path::{normalize, relative_request, to_slash};
use regex_lite::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const SEGMENT: &str = r"[^/\\]";
const SEPARATOR: &str = r"[/\\]";

/// Translate a glob suffix into an anchored regex source.
#[must_use]
pub fn glob_to_regex(pattern: &str) -> String {
    let parts: Vec<&str> = pattern.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    let mut out = String::from("^");

    for (i, part) in parts.iter().enumerate() {
        let last = i + 1 == parts.len();
        if *part == "**" {
            if last {
                out.push_str(".*");
            } else {
                out.push_str(&format!("(?:{SEGMENT}+{SEPARATOR})*"));
            }
            continue;
        }

        for (j, literal) in part.split('*').enumerate() {
            if j > 0 {
                out.push_str(&format!("{SEGMENT}*"));
            }
            out.push_str(&regex_lite::escape(literal));
        }
        if !last {
            out.push_str(SEPARATOR);
        }
    }

    out.push('$');
    out
}

/// Split a request at the first wildcard segment.
///
/// Without a wildcard the last segment is the suffix.
fn split_at_wildcard(request: &str) -> (&str, &str) {
    let mut start = 0;
    let mut last_start = 0;
    for (i, c) in request.char_indices().chain(std::iter::once((request.len(), '/'))) {
        if c == '/' || c == '\\' {
            if request[start..i].contains('*') {
                return (request[..start].trim_end_matches(['/', '\\']), &request[start..]);
            }
            last_start = start;
            start = i + 1;
        }
    }
    (
        request[..last_start].trim_end_matches(['/', '\\']),
        &request[last_start..],
    )
}

/// Where an expansion happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExpandContext {
    /// Directory of the requesting file.
    pub requester_dir: PathBuf,
    /// Single root for non-module, non-relative literals.
    pub resolution_root: Option<PathBuf>,
}

impl ExpandContext {
    #[must_use]
    pub fn new(requester_dir: impl Into<PathBuf>) -> Self {
        Self {
            requester_dir: requester_dir.into(),
            resolution_root: None,
        }
    }

    #[must_use]
    pub fn with_resolution_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resolution_root = Some(root.into());
        self
    }
}

/// One file matched by a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobMatch {
    pub path: PathBuf,
    /// The candidate root it was found under.
    pub root: PathBuf,
    /// Module name when the root is a package root.
    pub module_name: Option<String>,
}

/// Roots and markers the expander searches.
#[derive(Debug, Clone, Default)]
pub struct GlobConfig {
    pub search_roots: Vec<PathBuf>,
    pub extra_roots: Vec<PathBuf>,
    /// Module directory names, used to normalize absolute literals.
    pub markers: Vec<String>,
    /// Directory names not descended into.
    pub exclude: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    scanner: Arc<DirectoryScanner>,
    resolver: Arc<dyn ModuleResolver>,
    config: GlobConfig,
}

type ExpandKey = (String, PathBuf, Option<PathBuf>);

/// Glob expander bound to one build session.
#[derive(Debug)]
pub struct GlobExpander {
    inner: Arc<Inner>,
    cache: DebouncedCache<ExpandKey, Arc<Vec<GlobMatch>>>,
}

impl GlobExpander {
    #[must_use]
    pub fn new(
        scanner: Arc<DirectoryScanner>,
        resolver: Arc<dyn ModuleResolver>,
        config: GlobConfig,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scanner,
                resolver,
                config,
            }),
            cache: DebouncedCache::new(debounce),
        }
    }

    /// Expand a wildcard literal into absolute paths.
    pub async fn expand(&self, literal: &str, ctx: &ExpandContext) -> Vec<PathBuf> {
        self.expand_matches(literal, ctx)
            .await
            .iter()
            .map(|m| m.path.clone())
            .collect()
    }

    /// Expand, keeping the root each match was found under.
    pub async fn expand_matches(&self, literal: &str, ctx: &ExpandContext) -> Arc<Vec<GlobMatch>> {
        let key = (
            literal.to_string(),
            ctx.requester_dir.clone(),
            ctx.resolution_root.clone(),
        );
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let literal = literal.to_string();
        self.cache
            .get_or_insert_with(key, move || async move {
                Arc::new(inner.expand_uncached(&literal, &ctx).await)
            })
            .await
    }

    /// Replace wildcard entries with one entry per matched file.
    ///
    /// Non-wildcard entries pass through untouched. Expanded entries keep the
    /// source entry's lazy, chunk and loader fields and are deduplicated by
    /// absolute path.
    pub async fn expand_all(
        &self,
        entries: Vec<RequireData>,
        ctx: &ExpandContext,
        sink: Option<&dyn Diagnostics>,
    ) -> Vec<RequireData> {
        let mut out = Vec::with_capacity(entries.len());
        let mut seen_literals = HashSet::new();
        let mut seen_paths = HashSet::new();

        for entry in entries {
            if !is_glob(&entry.literal) {
                if seen_literals.insert(entry.literal.clone()) {
                    out.push(entry);
                }
                continue;
            }

            let (_, resource) = split_loader_chain(&entry.literal);
            let chain = &entry.literal[..entry.literal.len() - resource.len()];
            let matches = self.expand_matches(resource, ctx).await;
            if matches.is_empty() {
                if let Some(sink) = sink {
                    sink.emit_warning(&format!("No files matched {}", entry.literal));
                }
                continue;
            }

            let relative = resource.starts_with('.');
            for m in matches.iter() {
                if !seen_paths.insert(m.path.clone()) {
                    continue;
                }
                let literal = expanded_literal(m, relative, &ctx.requester_dir);
                trace!(glob = %entry.literal, %literal, "expanded");
                out.push(RequireData {
                    literal: format!("{chain}{literal}"),
                    resolve: None,
                    ..entry.clone()
                });
            }
        }
        out
    }

    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn expanded_literal(m: &GlobMatch, relative: bool, requester_dir: &Path) -> String {
    let below_root = m
        .path
        .strip_prefix(&m.root)
        .map(to_slash)
        .unwrap_or_else(|_| to_slash(&m.path));
    match &m.module_name {
        Some(name) => format!("{name}/{below_root}"),
        None if relative => relative_request(requester_dir, &m.path),
        None => below_root,
    }
}

impl Inner {
    async fn expand_uncached(&self, literal: &str, ctx: &ExpandContext) -> Vec<GlobMatch> {
        let resolver_ctx: (&dyn ModuleResolver, &Path) =
            (self.resolver.as_ref(), &ctx.requester_dir);
        let split = split_request(literal, &self.config.markers, Some(resolver_ctx)).await;

        let relative = literal.starts_with('.');
        let (roots, request, module_name) = match &split.module_root {
            Some(root) => (
                vec![root.clone()],
                split.remaining_request.as_str(),
                Some(split.module_name.clone()),
            ),
            None if relative => {
                let mut roots = vec![ctx.requester_dir.clone()];
                roots.extend(self.config.extra_roots.iter().cloned());
                (roots, literal, None)
            }
            None if is_absolute_path(literal) => (vec![PathBuf::new()], literal, None),
            None => match &ctx.resolution_root {
                Some(root) => (vec![root.clone()], literal, None),
                None => (self.config.search_roots.clone(), literal, None),
            },
        };

        if roots.is_empty() {
            debug!(literal, "no candidate root for glob");
            return Vec::new();
        }

        let (prefix, suffix) = split_at_wildcard(request);
        let pattern = glob_to_regex(suffix);
        let Ok(re) = Regex::new(&pattern) else {
            debug!(literal, pattern, "glob produced an invalid pattern");
            return Vec::new();
        };

        let options = ScanOptions {
            recursive: true,
            exclude: self.config.exclude.clone(),
            ..ScanOptions::default()
        };

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for root in roots {
            let base = normalize(&root.join(prefix));
            let files = self.scanner.list_files(&base, &options, None).await;
            for file in files.iter() {
                if !re.is_match(&file.relative_path) {
                    continue;
                }
                let path = normalize(&file.file_path);
                if seen.insert(path.clone()) {
                    matches.push(GlobMatch {
                        path,
                        root: root.clone(),
                        module_name: module_name.clone(),
                    });
                }
            }
        }

        debug!(literal, count = matches.len(), "expanded glob");
        matches
    }
}
