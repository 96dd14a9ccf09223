use crate::annotate::AnnotationProperty;
use crate::error::Error;
use crate::glob::GlobConfig;
use crate::resolver::{ResolverConfig, DEFAULT_EXTENSIONS, DEFAULT_MODULE_DIRECTORY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for the depsuite CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Engine configuration file name.
pub const CONFIG_FILE: &str = "depsuite.json";

/// Engine settings for one build, as stored in `depsuite.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Directories searched for non-relative literals.
    pub search_roots: Vec<PathBuf>,
    /// Extra candidate roots for relative wildcard literals.
    pub extra_roots: Vec<PathBuf>,
    /// Hierarchical module directory names (also search-root markers).
    pub module_directories: Vec<String>,
    pub extensions: Vec<String>,
    /// Debounce window of the scan and glob caches.
    pub debounce_ms: u64,
    /// Directory names recursive scans do not descend into.
    pub exclude: Vec<String>,
    pub enable_globbing: bool,
    pub force_override: bool,
    pub annotation_property: AnnotationProperty,
    /// Project root for root-most resolution of nested installs.
    pub root_most: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            extra_roots: Vec::new(),
            module_directories: vec![DEFAULT_MODULE_DIRECTORY.to_string()],
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            debounce_ms: 10_000,
            exclude: vec![DEFAULT_MODULE_DIRECTORY.to_string()],
            enable_globbing: false,
            force_override: false,
            annotation_property: AnnotationProperty::default(),
            root_most: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Make every relative path absolute against `base`.
    #[must_use]
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let absolute = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = depsuite_util::path::normalize(&base.join(&*p));
            }
        };
        self.search_roots.iter_mut().for_each(absolute);
        self.extra_roots.iter_mut().for_each(absolute);
        if let Some(root) = self.root_most.as_mut() {
            absolute(root);
        }
        self
    }

    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            extensions: self.extensions.clone(),
            module_directories: self.module_directories.clone(),
            search_roots: self.search_roots.clone(),
            root_most: self.root_most.clone(),
        }
    }

    #[must_use]
    pub fn glob_config(&self) -> GlobConfig {
        GlobConfig {
            search_roots: self.search_roots.clone(),
            extra_roots: self.extra_roots.clone(),
            markers: self.module_directories.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

/// Find `depsuite.json` in `root`.
#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    let path = root.join(CONFIG_FILE);
    path.is_file().then_some(path)
}

/// Load the engine configuration.
///
/// With `config_path` that file must exist; otherwise `root` is searched and
/// a missing file gives `Ok(None)`. Relative paths inside the file are
/// resolved against its directory.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
) -> Result<Option<(PathBuf, EngineConfig)>, Error> {
    let path = match config_path {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => match find_config_file(root) {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let config: EngineConfig =
        serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;

    let base = path.parent().unwrap_or(root);
    let config = config.resolve_paths(base);
    Ok(Some((path, config)))
}
