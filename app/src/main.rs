use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crag_core::config::RagConfig;
use crag_core::error::AppError;
use serde::Serialize;

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "crag", about = "Contextual chunking, embedding and retrieval over crawled pages")]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split and situate every `<input_dir>/<site>/*.json` page into chunk files
    Chunk { input_dir: PathBuf },
    /// Embed all chunk files under `<input_dir>/<site>/chunks/` and save the store
    Ingest { input_dir: PathBuf },
    /// Print the top-k chunks for a query as JSON
    Search {
        query: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Report duplicate chunks and non-unit vectors in the saved store
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(code = %err.code, kind = ?err.kind, retryable = err.retryable, "{}", err.message);
            match serde_json::to_string_pretty(&err) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let cfg = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::default(),
    };
    cfg.validate()?;

    match &cli.command {
        Command::Chunk { input_dir } => print_json(&commands::chunk(&cfg, input_dir)?),
        Command::Ingest { input_dir } => print_json(&commands::ingest(&cfg, input_dir)?),
        Command::Search { query, k } => print_json(&commands::search(&cfg, query, *k)?),
        Command::Validate => print_json(&commands::validate(&cfg)?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new(
            crag_core::error::ErrorKind::Io,
            "RAG_OUTPUT_FAILED",
            "Failed to encode command output",
        )
        .with_details(e.to_string())
    })?;
    println!("{json}");
    Ok(())
}
