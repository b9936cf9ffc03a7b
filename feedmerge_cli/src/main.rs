use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_filter = match cli.verbose {
        0 => "feedmerge_cli=info,feedmerge_core=info",
        1 => "feedmerge_cli=debug,feedmerge_core=debug",
        _ => "feedmerge_cli=trace,feedmerge_core=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Search {
            query,
            sources,
            max_results,
            date_range,
            category,
            caller,
        } => {
            let request = feedmerge_core::SearchRequest {
                query: query.clone(),
                sources: sources.clone(),
                category: category.clone(),
                date_range: date_range.clone(),
                max_results: *max_results,
            };
            search::run(&cli, caller, request).await
        }
        Commands::Health => health::run(&cli).await,
        Commands::Connections => connections::run(&cli).await,
        Commands::Stored { limit } => stored::run(&cli, *limit).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}
