//! `depsuite expand` command implementation.

use super::{absolute, engine_config, runtime};
use depsuite_core::{BuildSession, Config, ExpandContext};
use miette::Result;
use std::path::Path;

pub fn run(config: &Config, literal: &str, from: &Path, config_file: Option<&Path>) -> Result<()> {
    let engine = engine_config(&config.cwd, config_file)?;
    let session = BuildSession::new(engine);

    let from = absolute(&config.cwd, from);
    let ctx = ExpandContext::new(from.parent().unwrap_or(&config.cwd));

    let paths = runtime()?.block_on(session.globs().expand(literal, &ctx));
    if paths.is_empty() {
        tracing::warn!(literal, "no files matched");
    }

    if config.json_logs {
        let output = serde_json::json!({
            "ok": true,
            "literal": literal,
            "paths": paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{output:#}");
    } else {
        for path in &paths {
            println!("{}", path.display());
        }
    }
    Ok(())
}
