use feedmerge_core::{AggregatorError, SearchRequest};

use crate::cli::Cli;
use crate::commands::{build_aggregator, load_config, spinner, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli, caller: &str, request: SearchRequest) -> Result<()> {
    // Reject bad input before any client is built.
    let query = request.into_query().map_err(AggregatorError::from)?;

    let config = load_config(cli)?;
    let aggregator = build_aggregator(&config)?;

    let names: Vec<&str> = query.sources().iter().map(|s| s.as_str()).collect();
    let progress = spinner(
        cli,
        format!("Searching {} for '{}'...", names.join(", "), query.text()),
    );

    let outcome = aggregator.search_with_origin(caller, &query).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    // Let queued persistence finish before the process exits.
    aggregator.shutdown().await;

    let (response, origin) = outcome?;
    format_output(&OutputData::SearchResults { response, origin }, &cli.output)
}
