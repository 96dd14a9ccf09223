//! `depsuite inject` command implementation.

use super::{absolute, engine_config, runtime};
use depsuite_core::{
    BuildSession, Config, FileRequest, Processed, RequireDataBase, SourceMap, TracingDiagnostics,
};
use depsuite_util::fs::{read_source_lossy, write_output};
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments of one inject invocation.
#[derive(Debug, Clone)]
pub struct InjectAction {
    pub file: PathBuf,
    /// JSON array of requests.
    pub requires: String,
    pub map: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub glob: bool,
    pub force_override: bool,
    pub config_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct InjectOutput<'a> {
    ok: bool,
    file: String,
    references: &'a [String],
    dependencies: &'a [depsuite_core::PathWithLoaders],
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    map: Option<&'a SourceMap>,
}

pub fn run(config: &Config, action: InjectAction) -> Result<()> {
    let cwd = &config.cwd;
    let mut engine = engine_config(cwd, action.config_file.as_deref())?;
    engine.enable_globbing |= action.glob;
    engine.force_override |= action.force_override;

    let file = absolute(cwd, &action.file);
    let source = read_source_lossy(&file)
        .map_err(|e| miette!("Failed to read {}: {e}", file.display()))?;
    let requires: Vec<RequireDataBase> = serde_json::from_str(&action.requires)
        .map_err(|e| miette!("Invalid --requires JSON: {e}"))?;

    let map = match &action.map {
        Some(path) => {
            let text = std::fs::read_to_string(absolute(cwd, path)).into_diagnostic()?;
            Some(SourceMap::from_json(&text).into_diagnostic()?)
        }
        None => None,
    };

    let session = BuildSession::new(engine);
    let sink = TracingDiagnostics;
    let mut request = FileRequest::new(&file, source, &sink).requires(requires);
    if let Some(map) = map {
        request = request.map(map);
    }

    let processed = runtime()?
        .block_on(session.process(request))
        .into_diagnostic()?;

    match &action.out {
        Some(out) => write_result(&absolute(cwd, out), &processed)?,
        None if !config.json_logs => print!("{}", processed.code),
        None => {}
    }

    if config.json_logs {
        let inline = action.out.is_none();
        let output = InjectOutput {
            ok: true,
            file: file.display().to_string(),
            references: &processed.references,
            dependencies: &processed.dependencies,
            code: inline.then_some(processed.code.as_str()),
            map: if inline { processed.map.as_ref() } else { None },
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    }

    Ok(())
}

fn write_result(out: &std::path::Path, processed: &Processed) -> Result<()> {
    write_output(out, processed.code.as_bytes()).into_diagnostic()?;
    if let Some(map) = &processed.map {
        let mut map_path = out.as_os_str().to_owned();
        map_path.push(".map");
        let json = map.to_json().into_diagnostic()?;
        write_output(std::path::Path::new(&map_path), json.as_bytes()).into_diagnostic()?;
    }
    tracing::info!(out = %out.display(), references = processed.references.len(), "wrote output");
    Ok(())
}
