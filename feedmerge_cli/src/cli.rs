use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "feedmerge")]
#[command(about = "feedmerge - search news, video and forums in one ranked list")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  feedmerge search \"rust async\"                   Search every source
  feedmerge search \"wasm\" -s news,social -n 10     Pick sources and cap results
  feedmerge --offline search \"cloud computing\"    Use fixed payloads, no network
  feedmerge health                                Source configuration and cache stats
  feedmerge connections                           Probe every provider
  feedmerge stored --limit 20                     Show persisted results

\x1b[1;36mCredentials:\x1b[0m
  GNEWS_API_KEY, YOUTUBE_API_KEY, REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// TOML config file
    #[arg(long, global = true, env = "FEEDMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve fixed payloads instead of calling providers (also MOCK_MODE=true)
    #[arg(long, global = true)]
    pub offline: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search every enabled source and merge results newest first
    #[command(after_help = "\x1b[1;33mExamples:\x1b[0m
  feedmerge search \"machine learning\"
  feedmerge search \"rust\" --sources news,video --max-results 20
  feedmerge search \"kubernetes\" --date-range month --category technology
  feedmerge search \"zig\" --output json")]
    Search {
        /// Query text (1-500 characters)
        query: String,
        /// Comma-separated sources: news, video, social
        #[arg(short = 's', long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        /// Maximum merged results (1-100)
        #[arg(short = 'n', long)]
        max_results: Option<u32>,
        /// day, week, month or year
        #[arg(short, long)]
        date_range: Option<String>,
        /// Provider category hint
        #[arg(short, long)]
        category: Option<String>,
        /// Identity used for rate limiting
        #[arg(long, default_value = "cli")]
        caller: String,
    },

    /// Show source configuration, cache and persistence status
    Health,

    /// Probe each provider and report latency
    Connections,

    /// List persisted results, newest first
    Stored {
        /// Maximum rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Plain text output
    Text,
}
