use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LOG_ENV_VARS: [&str; 2] = ["LOADRIG_LOG", "RUST_LOG"];

fn filter_from_env(verbose: bool) -> EnvFilter {
    let directive = LOG_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok());
    match directive {
        Some(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    }
}

/// Sends logs to stderr so a run's JSON report is the only thing on stdout.
/// A second call keeps the subscriber installed by the first.
pub fn init_logging(verbose: bool) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter_from_env(verbose))
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Logging already initialised: {}", err);
    }
}
