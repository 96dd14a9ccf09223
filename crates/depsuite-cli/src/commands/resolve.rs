//! `depsuite resolve` command implementation.

use super::{absolute, engine_config, runtime};
use depsuite_core::{Config, ModuleResolver, NodeResolver};
use miette::{miette, Result};
use std::path::Path;

pub fn run(config: &Config, literal: &str, from: &Path, config_file: Option<&Path>) -> Result<()> {
    let engine = engine_config(&config.cwd, config_file)?;
    let resolver = NodeResolver::new(engine.resolver_config());

    let from = absolute(&config.cwd, from);
    let context = from.parent().unwrap_or(&config.cwd);

    let result = runtime()?.block_on(resolver.resolve(context, literal));

    match result {
        Ok(resolved) => {
            if config.json_logs {
                let output = serde_json::json!({
                    "ok": true,
                    "literal": literal,
                    "path": resolved.path.display().to_string(),
                    "packageRoot": resolved.package_root.as_ref().map(|p| p.display().to_string()),
                    "packageName": resolved.package_name(),
                    "isModule": resolved.is_module,
                });
                println!("{output:#}");
            } else {
                println!("{}", resolved.path.display());
            }
            Ok(())
        }
        Err(err) => {
            if config.json_logs {
                let output = serde_json::json!({
                    "ok": false,
                    "literal": literal,
                    "error": {
                        "code": err.reason.to_string(),
                        "message": err.to_string(),
                        "tried": err.tried.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                    }
                });
                println!("{output:#}");
            }
            Err(miette!("{err}"))
        }
    }
}
