#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use depsuite_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "depsuite")]
#[command(author, version, about = "Build-time dependency discovery and injection", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Append dependency statements to a source file
    Inject {
        /// Source file to process
        file: PathBuf,

        /// JSON array of requests: [{"literal": "./a.html", "lazy": true, "chunk": "views"}]
        #[arg(long, value_name = "JSON")]
        requires: String,

        /// Existing source map of the file
        #[arg(long, value_name = "FILE")]
        map: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(long, short, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Expand wildcard literals
        #[arg(long)]
        glob: bool,

        /// Prefer each request's own loaders
        #[arg(long)]
        force_override: bool,

        /// Engine configuration file (defaults to depsuite.json in cwd)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Resolve a literal as if required from a file
    Resolve {
        literal: String,

        /// The requiring file
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Engine configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Expand a wildcard literal as if required from a file
    Expand {
        literal: String,

        /// The requiring file
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Engine configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Inject {
            file,
            requires,
            map,
            out,
            glob,
            force_override,
            config: config_file,
        }) => {
            let span = tracing::info_span!("inject", cmd = "inject", cwd = %cwd.display());
            let _guard = span.enter();
            commands::inject::run(
                &config,
                commands::inject::InjectAction {
                    file,
                    requires,
                    map,
                    out,
                    glob,
                    force_override,
                    config_file,
                },
            )
        }
        Some(Commands::Resolve {
            literal,
            from,
            config: config_file,
        }) => commands::resolve::run(&config, &literal, &from, config_file.as_deref()),
        Some(Commands::Expand {
            literal,
            from,
            config: config_file,
        }) => commands::expand::run(&config, &literal, &from, config_file.as_deref()),
    }
}
