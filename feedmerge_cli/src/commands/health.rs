use crate::cli::Cli;
use crate::commands::{build_status_aggregator, load_config, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let aggregator = build_status_aggregator(&config)?;
    let report = aggregator.health();

    format_output(&OutputData::Health(report), &cli.output)
}
