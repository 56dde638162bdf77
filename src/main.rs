#![forbid(unsafe_code)]

//! `regcheck`: multi-session phone number registration checker.
//!
//! Loads the input list, resumes from the last checkpoint, starts the
//! session pool against the HTTP session bridge and schedules every
//! remaining number across the ready sessions until done or interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use regcheck::config::{GlobalConfig, SinkKind};
use regcheck::input;
use regcheck::models::report::RunReport;
use regcheck::orchestrator::pool::SessionPool;
use regcheck::orchestrator::queue::WorkQueue;
use regcheck::orchestrator::recorder::Recorder;
use regcheck::orchestrator::scheduler::{Scheduler, SchedulerEvent};
use regcheck::orchestrator::session::SessionSettings;
use regcheck::persistence::jsonl_writer::JsonlResultWriter;
use regcheck::persistence::progress_repo::ProgressRepo;
use regcheck::persistence::result_repo::ResultRepo;
use regcheck::persistence::{db, ProgressStore, ResultSink};
use regcheck::transport::HttpTransportFactory;
use regcheck::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "regcheck", about = "Multi-session phone number registration checker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// CSV file with the numbers to check.
    #[arg(long)]
    input: PathBuf,

    /// Discard the saved checkpoint and results for this run and start over.
    #[arg(long)]
    fresh: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("regcheck bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration and input ────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    let items = input::load_items(&args.input)?;
    let run_key = config.run_key(&args.input);
    info!(run_key = %run_key, items = items.len(), safe_mode = config.safe_mode, "configuration loaded");

    // ── Open persistence ────────────────────────────────
    let db = Arc::new(db::connect(&config.output.db_path).await?);
    let progress = Arc::new(ProgressRepo::new(Arc::clone(&db)));
    let sink: Arc<dyn ResultSink> = match config.output.sink {
        SinkKind::Jsonl => {
            let writer = JsonlResultWriter::open(&config.output.results_path)?;
            if args.fresh {
                writer.truncate()?;
            }
            Arc::new(writer)
        }
        SinkKind::Sqlite => {
            let repo = ResultRepo::new(Arc::clone(&db), run_key.clone());
            if args.fresh {
                repo.delete_for_run().await?;
            }
            Arc::new(repo)
        }
    };
    if args.fresh {
        progress.delete(&run_key).await?;
        info!(run_key = %run_key, "starting fresh");
    }

    // ── Resume ──────────────────────────────────────────
    let checkpoint = progress.load_or_default(&run_key).await?;
    let recorded = sink.recorded_indices().await?;
    let queue = Arc::new(WorkQueue::resume(items, &checkpoint, &recorded));
    info!(
        last_index = checkpoint.last_index,
        already_recorded = recorded.len(),
        queued = queue.queued(),
        "work queue ready"
    );
    let recorder = Arc::new(Mutex::new(Recorder::new(
        sink,
        progress,
        checkpoint,
        config.checkpoint.every,
        &recorded,
    )));

    // ── Interrupt handling ──────────────────────────────
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("shutdown signal received; stopping all sessions");
        signal_cancel.cancel();
    });

    // ── Start sessions ──────────────────────────────────
    let factory = HttpTransportFactory::new(config.transport.clone());
    let settings = SessionSettings::from_config(&config)?;
    let mut pool = SessionPool::initialize(&config.sessions, &factory, &settings, &cancel)
        .instrument(info_span!("pool_startup", sessions = config.sessions.count))
        .await?;

    // ── Schedule ────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel(256);
    let event_handle = tokio::spawn(log_events(event_rx, queue.queued()));
    let scheduler = Scheduler::new(config.sessions.concurrency).with_events(event_tx);
    let outcome = scheduler.run(&mut pool, queue, recorder, cancel.clone()).await;
    drop(scheduler);

    pool.shutdown().instrument(info_span!("shutdown")).await;
    signal_handle.abort();
    if let Err(err) = event_handle.await {
        debug!(%err, "event logger ended abnormally");
    }

    let report = outcome.map_err(|err| {
        error!(%err, "run failed while persisting results");
        err
    })?;
    log_report(&report);
    info!("regcheck shut down");
    Ok(())
}

async fn log_events(mut rx: mpsc::Receiver<SchedulerEvent>, queued: usize) {
    while let Some(event) = rx.recv().await {
        match event {
            SchedulerEvent::CheckpointSaved {
                last_index,
                total_checked,
            } => info!(last_index, total_checked, queued, "progress"),
            SchedulerEvent::SessionSuspended { session_id, reason } => {
                warn!(session_id = %session_id, %reason, "session removed from rotation");
            }
            SchedulerEvent::DriverFinished {
                session_id,
                checked,
            } => info!(session_id = %session_id, checked, "session finished"),
            other => debug!(?other, "scheduler event"),
        }
    }
}

fn log_report(report: &RunReport) {
    info!(
        queued = report.queued,
        checked = report.checked,
        verified = report.verified,
        not_registered = report.not_registered,
        errors = report.errors,
        unprocessed = report.unprocessed,
        elapsed_secs = report.elapsed.as_secs(),
        cancelled = report.cancelled,
        "run complete"
    );
    for session in &report.sessions {
        info!(
            session_id = %session.session_id,
            status = ?session.status,
            checked = session.checked,
            verified = session.verified,
            errors = session.errors,
            "session summary"
        );
    }
    for suspension in &report.suspensions {
        warn!(session_id = %suspension.session_id, reason = %suspension.reason, "session was suspended");
    }
    for failure in &report.startup_failures {
        warn!(session_id = %failure.session_id, reason = %failure.reason, "session never started");
    }
    match serde_json::to_string(report) {
        Ok(json) => info!(report = %json, "final report"),
        Err(err) => warn!(%err, "failed to serialize final report"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
