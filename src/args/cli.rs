use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::{EngineSettings, Options};

use super::parsers::parse_positive_u64;

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Programmable load generator - concurrent HTTP/TCP traffic, multi-step transactions and live aggregate reports."
)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["options", "report"])
))]
pub struct RunArgs {
    /// Task options file (.json or .toml)
    #[arg(long, short = 'o', env = "LOADRIG_OPTIONS")]
    pub options: Option<PathBuf>,

    /// Print a persisted report by task id instead of running
    #[arg(long = "report", value_name = "ID")]
    pub report: Option<String>,

    /// Engine settings file (defaults to ./loadrig.toml or ./loadrig.json)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Override the target URL
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// Override the number of concurrent workers
    #[arg(long, short = 'c', value_parser = parse_positive_u64)]
    pub concurrency: Option<u64>,

    /// Override the run duration in seconds (0 runs until interrupted)
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Override the pause between attempts in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "request-timeout-ms", value_parser = parse_positive_u64)]
    pub request_timeout_ms: Option<u64>,

    /// Consecutive failures a worker tolerates before giving up
    #[arg(long)]
    pub retries: Option<u32>,

    /// Directory for persisted reports
    #[arg(long = "store-dir")]
    pub store_dir: Option<PathBuf>,

    /// Base directory for file-backed data sources
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Seconds between progress lines
    #[arg(long = "progress-interval", default_value = "1", value_parser = parse_positive_u64)]
    pub progress_interval: u64,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl RunArgs {
    /// Applies option overrides given on the command line.
    pub fn apply_options(&self, options: &mut Options) {
        if let Some(url) = self.url.as_ref() {
            options.url.clone_from(url);
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrent = concurrency;
        }
        if let Some(duration) = self.duration {
            options.duration = duration;
        }
        if let Some(interval) = self.interval {
            options.interval = interval;
        }
    }

    /// Applies engine setting overrides given on the command line.
    pub fn apply_settings(&self, settings: &mut EngineSettings) {
        if let Some(timeout) = self.request_timeout_ms {
            settings.request_timeout_ms = timeout;
        }
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if let Some(dir) = self.store_dir.as_ref() {
            settings.store_dir.clone_from(dir);
        }
        if let Some(dir) = self.data_dir.as_ref() {
            settings.data_dir.clone_from(dir);
        }
    }
}
