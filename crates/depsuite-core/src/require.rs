//! Dependency request records.
//!
//! A [`RequireDataBase`] is what a convention scanner hands the engine. It is
//! widened into a [`RequireData`] as it gets resolved and annotated, and
//! finally consumed by the synthesizer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Wildcard marker in a literal.
pub const GLOB_MARKER: char = '*';

/// Check whether a literal needs glob expansion.
#[must_use]
pub fn is_glob(literal: &str) -> bool {
    literal.contains(GLOB_MARKER)
}

/// A candidate dependency as emitted by a scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequireDataBase {
    /// Raw specifier, pre-resolution.
    pub literal: String,
    /// Load on demand rather than eagerly.
    #[serde(default)]
    pub lazy: bool,
    /// Named group for deferred loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
}

impl RequireDataBase {
    /// Create an eager, ungrouped request.
    #[must_use]
    pub fn new(literal: impl Into<String>) -> Self {
        Self {
            literal: literal.into(),
            lazy: false,
            chunk: None,
        }
    }

    /// Mark as lazy.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Assign a chunk name.
    #[must_use]
    pub fn chunk(mut self, name: impl Into<String>) -> Self {
        self.chunk = Some(name.into());
        self
    }
}

/// Parsed `package.json` of the package owning a resolved file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    /// `dependencies` merged over `peerDependencies` (name -> range).
    pub dependencies: BTreeMap<String, String>,
    /// The full document, for host-specific properties.
    pub data: Value,
}

impl PackageDescriptor {
    /// Build a descriptor from a parsed `package.json`.
    #[must_use]
    pub fn from_value(data: Value) -> Self {
        let text = |key: &str| data.get(key).and_then(Value::as_str).map(String::from);

        let mut dependencies = BTreeMap::new();
        for field in ["peerDependencies", "dependencies"] {
            if let Some(map) = data.get(field).and_then(Value::as_object) {
                for (name, range) in map {
                    if let Some(range) = range.as_str() {
                        dependencies.insert(name.clone(), range.to_string());
                    }
                }
            }
        }

        Self {
            name: text("name"),
            version: text("version"),
            dependencies,
            data,
        }
    }

    /// Declared version range for a dependency.
    #[must_use]
    pub fn dependency_range(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }
}

/// Successful resolution of a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveResult {
    /// Absolute path of the resolved file.
    pub path: PathBuf,
    /// Directory holding the owning `package.json`.
    pub package_root: Option<PathBuf>,
    pub package: Option<Arc<PackageDescriptor>>,
    pub is_file: bool,
    /// Resolved through module-directory lookup rather than a path.
    pub is_module: bool,
}

impl ResolveResult {
    /// Name of the owning package, if it declares one.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().and_then(|p| p.name.as_deref())
    }
}

/// A request being carried through resolution and annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequireData {
    pub literal: String,
    pub lazy: bool,
    pub chunk: Option<String>,
    /// Absent until the resolver has run; downstream stages resolve on demand.
    pub resolve: Option<ResolveResult>,
    /// Loader chain assigned explicitly.
    pub loaders: Option<Vec<String>>,
    /// Loader chain used when nothing else assigns one.
    pub fallback_loaders: Option<Vec<String>>,
}

impl RequireData {
    /// The entry's own loader chain: explicit loaders, then fallback loaders.
    #[must_use]
    pub fn own_loaders(&self) -> &[String] {
        self.loaders
            .as_deref()
            .or(self.fallback_loaders.as_deref())
            .unwrap_or(&[])
    }

    /// Strip back to the scanner-level fields.
    #[must_use]
    pub fn base(&self) -> RequireDataBase {
        RequireDataBase {
            literal: self.literal.clone(),
            lazy: self.lazy,
            chunk: self.chunk.clone(),
        }
    }
}

impl From<RequireDataBase> for RequireData {
    fn from(base: RequireDataBase) -> Self {
        Self {
            literal: base.literal,
            lazy: base.lazy,
            chunk: base.chunk,
            resolve: None,
            loaders: None,
            fallback_loaders: None,
        }
    }
}

/// A resolved path with the loader chain to apply, for host dependency recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathWithLoaders {
    pub path: PathBuf,
    /// Loader names with their queries, without `!` separators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaders: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_glob() {
        assert!(is_glob("./views/*.html"));
        assert!(is_glob("pkg/**/x.js"));
        assert!(!is_glob("./views/app.html"));
    }

    #[test]
    fn test_require_base_lazy_defaults_to_false() {
        let parsed: RequireDataBase = serde_json::from_str(r#"{"literal": "./a"}"#).unwrap();
        assert_eq!(parsed, RequireDataBase::new("./a"));
        assert!(!parsed.lazy);
    }

    #[test]
    fn test_descriptor_from_value() {
        let desc = PackageDescriptor::from_value(json!({
            "name": "app",
            "version": "1.2.3",
            "dependencies": { "left-pad": "^1.0.0" },
            "peerDependencies": { "left-pad": "*", "react": ">=16" }
        }));
        assert_eq!(desc.name.as_deref(), Some("app"));
        assert_eq!(desc.version.as_deref(), Some("1.2.3"));
        // dependencies win over peers
        assert_eq!(desc.dependency_range("left-pad"), Some("^1.0.0"));
        assert_eq!(desc.dependency_range("react"), Some(">=16"));
        assert_eq!(desc.dependency_range("vue"), None);
    }

    #[test]
    fn test_own_loaders_prefers_explicit() {
        let mut data = RequireData::from(RequireDataBase::new("./a"));
        assert!(data.own_loaders().is_empty());

        data.fallback_loaders = Some(vec!["bundle?lazy".into()]);
        assert_eq!(data.own_loaders(), ["bundle?lazy".to_string()]);

        data.loaders = Some(vec!["html".into()]);
        assert_eq!(data.own_loaders(), ["html".to_string()]);
    }
}
