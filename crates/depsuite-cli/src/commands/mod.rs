pub mod expand;
pub mod inject;
pub mod resolve;
pub mod version;

use depsuite_core::{load_config, EngineConfig};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

/// Engine configuration from `--config` or `depsuite.json` in `cwd`.
pub fn engine_config(cwd: &Path, config_file: Option<&Path>) -> Result<EngineConfig> {
    match load_config(cwd, config_file).into_diagnostic()? {
        Some((path, config)) => {
            tracing::debug!(path = %path.display(), "loaded engine config");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Single-threaded runtime; the engine only needs cooperative scheduling.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

/// Make `path` absolute against `cwd`.
pub fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        depsuite_util::path::normalize(&cwd.join(path))
    }
}
