use clap::Parser;
use tweetamo_pipeline::InitialPosition;

#[derive(Debug, Parser)]
#[command(name = "tweetamo-server")]
#[command(about = "Ingest social-media statuses into a partitioned log and an indexed store")]
#[command(version)]
pub(crate) struct Args {
    #[arg(long, short = 'c', help = "Path to the YAML config file")]
    pub(crate) config_file: String,

    #[arg(
        long,
        short = 'i',
        default_value = "-",
        help = "JSONL file of upstream statuses, '-' reads stdin"
    )]
    pub(crate) input: String,

    #[arg(
        long,
        help = "Where shards without a checkpoint start: TRIM_HORIZON or LATEST (overrides config)"
    )]
    pub(crate) initial_position: Option<InitialPosition>,

    #[arg(long, help = "Prometheus exporter http address (overrides config)")]
    pub(crate) prom_exporter: Option<String>,
}
