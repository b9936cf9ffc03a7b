use crate::cli::Cli;
use crate::commands::{build_status_aggregator, load_config, spinner, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let aggregator = build_status_aggregator(&config)?;

    let progress = spinner(cli, "Probing providers...".to_string());
    let reports = aggregator.check_connections().await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    format_output(&OutputData::Connections(reports), &cli.output)
}
