use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the sos-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "sos-cache",
    version,
    about = "Content cache builder for a sensor observation service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SOS_CACHE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Restore the persisted snapshot, then rebuild on a fixed cadence until interrupted.
    Run(RunArgs),
    /// Rebuild the content cache once and print a summary.
    Rebuild(RebuildArgs),
    /// Summarize a persisted content cache snapshot.
    Inspect(InspectArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: CacheOverrides,

    /// Override the interval between scheduled rebuilds.
    #[arg(long = "cache-rebuild-interval-seconds", value_name = "SECONDS")]
    pub rebuild_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RebuildArgs {
    #[command(flatten)]
    pub overrides: CacheOverrides,

    /// Exit with a failure status when the rebuild recorded any failure.
    #[arg(long = "fail-on-degraded", action = clap::ArgAction::SetTrue)]
    pub fail_on_degraded: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Snapshot file to read; defaults to `cache.persistence_path`.
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub snapshot: Option<PathBuf>,

    /// Also list the identifiers of every entity kind.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub identifiers: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the TOML archive served by the in-memory store.
    #[arg(long = "store-archive", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub store_archive: Option<PathBuf>,

    /// Override the worker pool size of the parallel phases.
    #[arg(long = "cache-threads", value_name = "COUNT")]
    pub cache_threads: Option<usize>,

    /// Override the per-task deadline; 0 disables it.
    #[arg(long = "cache-task-deadline-seconds", value_name = "SECONDS")]
    pub cache_task_deadline_seconds: Option<u64>,

    /// Override what happens to a degraded rebuild (publish|retain_previous).
    #[arg(long = "cache-degraded-policy", value_name = "POLICY")]
    pub cache_degraded_policy: Option<String>,

    /// Override the locale used for display names.
    #[arg(long = "cache-default-locale", value_name = "LOCALE")]
    pub cache_default_locale: Option<String>,

    /// Override the SRID assumed for geometries without one.
    #[arg(long = "cache-default-srid", value_name = "SRID")]
    pub cache_default_srid: Option<i32>,

    /// Override the file the published snapshot is persisted to.
    #[arg(
        long = "cache-persistence-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub cache_persistence_path: Option<PathBuf>,
}
