use std::{path::PathBuf, process, sync::Arc};

use sos_cache::{
    application::{
        controller::{ContentCacheController, RebuildReport},
        error::{AppError, error_chain},
        repos::{ContentStore, SnapshotRepo},
        update::CacheUpdateOrchestrator,
    },
    cache::CacheConfig,
    config,
    infra::{
        db::PostgresStore, error::InfraError, memory::MemoryStore,
        persistence::FileSnapshotRepo, telemetry,
    },
};
use tokio::{runtime::Handle, time::MissedTickBehavior};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error).join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Run(config::RunArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Run(_) => run_scheduler(settings).await,
        config::Command::Rebuild(args) => run_rebuild(settings, args).await,
        config::Command::Inspect(args) => run_inspect(settings, args),
    }
}

async fn run_scheduler(settings: config::Settings) -> Result<(), AppError> {
    let store = open_store(&settings).await?;
    let controller = build_controller(&settings, store);

    let restoring = Arc::clone(&controller);
    match tokio::task::spawn_blocking(move || restoring.restore())
        .await
        .map_err(|err| AppError::unexpected(format!("restore worker failed: {err}")))?
    {
        Ok(Some(generation)) => info!(generation, "Serving restored content cache"),
        Ok(None) => {}
        Err(err) => warn!(
            error = %error_chain(&err).join(": "),
            "Ignoring unreadable persisted content cache"
        ),
    }

    log_report(&rebuild_blocking(Arc::clone(&controller)).await?);

    let cadence = settings.cache.rebuild_interval;
    info!(
        interval_seconds = cadence.as_secs(),
        "Scheduling content cache rebuilds"
    );
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // Skip the first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match rebuild_blocking(Arc::clone(&controller)).await {
                    Ok(report) => log_report(&report),
                    Err(err) => error!(
                        error = %error_chain(&err).join(": "),
                        "Scheduled content cache rebuild failed"
                    ),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(InfraError::from)?;
                info!("Shutdown requested; stopping rebuild scheduler");
                break;
            }
        }
    }

    Ok(())
}

async fn run_rebuild(
    settings: config::Settings,
    args: config::RebuildArgs,
) -> Result<(), AppError> {
    let store = open_store(&settings).await?;
    let controller = build_controller(&settings, store);

    let report = rebuild_blocking(controller).await?;
    log_report(&report);

    let summary = serde_json::json!({
        "rebuild_id": report.rebuild_id,
        "generation": report.generation,
        "degraded": report.degraded,
        "duration_ms": report.duration.as_millis() as u64,
        "phases": report.phases.iter().map(|phase| serde_json::json!({
            "name": phase.name,
            "status": phase.status.as_str(),
            "tasks": phase.tasks,
            "failures": phase.failures,
            "duration_ms": phase.duration.as_millis() as u64,
        })).collect::<Vec<_>>(),
        "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    print_json(&summary)?;

    if args.fail_on_degraded && report.degraded {
        return Err(AppError::Degraded {
            failures: report.errors.len(),
        });
    }
    Ok(())
}

fn run_inspect(settings: config::Settings, args: config::InspectArgs) -> Result<(), AppError> {
    let path: PathBuf = args
        .snapshot
        .or(settings.cache.persistence_path)
        .ok_or_else(|| {
            AppError::validation("inspect needs a snapshot path or cache.persistence_path")
        })?;

    let image = FileSnapshotRepo::new(&path)
        .load()?
        .ok_or_else(|| AppError::validation(format!("no snapshot at `{}`", path.display())))?;

    print_json(&image.summary(args.identifiers))
}

async fn open_store(settings: &config::Settings) -> Result<Arc<dyn ContentStore>, AppError> {
    if let Some(url) = settings.database.url.as_deref() {
        let pool = PostgresStore::connect(url, settings.database.max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        PostgresStore::run_migrations(&pool)
            .await
            .map_err(|err| InfraError::migration(err.to_string()))?;
        info!(
            max_connections = settings.database.max_connections.get(),
            "Using Postgres content store"
        );
        return Ok(Arc::new(PostgresStore::new(pool, Handle::current())));
    }

    if let Some(path) = settings.store.archive.as_ref() {
        let store = MemoryStore::from_path(path)?;
        info!(archive = %path.display(), "Using archive content store");
        return Ok(Arc::new(store));
    }

    Err(AppError::validation(
        "no content store configured; set database.url or store.archive",
    ))
}

fn build_controller(
    settings: &config::Settings,
    store: Arc<dyn ContentStore>,
) -> Arc<ContentCacheController> {
    let orchestrator = CacheUpdateOrchestrator::new(store, CacheConfig::from(&settings.cache));
    let mut controller = ContentCacheController::new(orchestrator);
    if let Some(path) = settings.cache.persistence_path.as_ref() {
        let repo: Arc<dyn SnapshotRepo> = Arc::new(FileSnapshotRepo::new(path.clone()));
        controller = controller.with_persistence(repo);
    }
    Arc::new(controller)
}

/// Runs a rebuild off the async runtime; store sessions block on queries.
async fn rebuild_blocking(
    controller: Arc<ContentCacheController>,
) -> Result<RebuildReport, AppError> {
    tokio::task::spawn_blocking(move || controller.rebuild())
        .await
        .map_err(|err| AppError::unexpected(format!("rebuild worker failed: {err}")))?
        .map_err(AppError::from)
}

fn log_report(report: &RebuildReport) {
    match report.generation {
        Some(generation) => info!(
            rebuild_id = %report.rebuild_id,
            generation,
            degraded = report.degraded,
            failures = report.errors.len(),
            "Published content cache"
        ),
        None => warn!(
            rebuild_id = %report.rebuild_id,
            failures = report.errors.len(),
            "Content cache rebuild not published"
        ),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
