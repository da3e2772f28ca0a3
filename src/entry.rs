use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use loadrig::args::RunArgs;
use loadrig::config::{load_options, load_settings};
use loadrig::error::{AppError, AppResult, ValidationError};
use loadrig::report::{ReportSnapshot, ReportStore};
use loadrig::task::{Task, TaskId, TaskRegistry};

pub(crate) fn run() -> AppResult<()> {
    let args = RunArgs::parse();

    loadrig::logger::init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args))
}

async fn run_async(args: RunArgs) -> AppResult<()> {
    let mut settings = load_settings(args.config.as_deref())?;
    args.apply_settings(&mut settings);
    settings.validate().map_err(AppError::config)?;

    let registry = TaskRegistry::new();

    if let Some(id) = args.report.as_ref() {
        let store = ReportStore::new(settings.store_dir.clone());
        let task = Task::detached(TaskId::from(id.clone()), store, registry);
        let snapshot = task.persisted_info().await?;
        return print_snapshot(&snapshot);
    }

    let path = args
        .options
        .as_ref()
        .ok_or_else(|| AppError::validation(ValidationError::MissingOptionsFile))?;
    let mut options = load_options(path)?;
    args.apply_options(&mut options);
    options.validate()?;

    let task = Task::new(options, settings, registry.clone())?;
    info!("Task {} starting", task.id());
    let completion = task.run()?;
    let wait = completion.wait();
    tokio::pin!(wait);

    let mut ticker = tokio::time::interval(Duration::from_secs(args.progress_interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            _ = ticker.tick() => log_progress(&task),
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(err) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", err);
                    continue;
                }
                info!("Interrupt received, stopping task {}", task.id());
                if let Err(err) = registry.stop(task.id().as_str()) {
                    warn!("Stop request ignored: {}", err);
                }
            }
        }
    };

    info!("Task {} finished with status {}", task.id(), outcome.status);
    let snapshot = outcome.result?;
    print_snapshot(&snapshot)
}

fn log_progress(task: &Task) {
    let snapshot = task.info();
    let (workers, remaining) = task
        .engine()
        .map_or((0, 0), |engine| {
            (engine.concurrency(), engine.remaining_duration())
        });
    info!(
        "workers={} success={} failure={} avg={}us p99={}us remaining={}s",
        workers,
        snapshot.success_num,
        snapshot.failure_num,
        snapshot.average_time,
        snapshot.p99_time,
        remaining
    );
}

fn print_snapshot(snapshot: &ReportSnapshot) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(snapshot)?;
    println!("{}", rendered);
    Ok(())
}
