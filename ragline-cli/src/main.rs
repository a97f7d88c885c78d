//! `ragline`: ask questions about a document, or call a hosted inference task.
//!
//! ```text
//! ragline ask --file langchain.pdf --question "When to use LangChain?"
//! ragline ask --file langchain.pdf --question "..." --store chroma
//! ragline chunks --file langchain.pdf --json
//! ragline translate "I love my country"
//! ```
//!
//! Settings are read from flags, then environment variables, then a `.env`
//! file in the working directory.

mod cli;
mod commands;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ragline_telemetry::SpanStorage;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let spans = match &cli.command {
        Command::Ask(args) if args.timings => Some(SpanStorage::new()),
        _ => None,
    };
    match (&spans, cli.json_logs) {
        (Some(storage), _) => {
            ragline_telemetry::init_with_storage("ragline", &cli.log_level, storage.clone())
        }
        (None, true) => ragline_telemetry::init_json_telemetry("ragline", &cli.log_level),
        (None, false) => ragline_telemetry::init_telemetry("ragline", &cli.log_level),
    }

    let timeout = Duration::from_secs(cli.timeout_secs.max(1));
    match cli.command {
        Command::Ask(args) => commands::ask(args, timeout, spans).await,
        Command::Chunks(args) => commands::chunks(args).await,
        Command::Embed(args) => commands::embed(args, timeout).await,
        Command::Translate(args) => commands::translate(args, timeout).await,
        Command::Qa(args) => commands::qa(args, timeout).await,
        Command::Generate(args) => commands::generate(args, timeout).await,
    }
}
