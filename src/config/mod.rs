//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::DegradedPolicy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sos-cache";
const ENV_PREFIX: &str = "SOS_CACHE";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_THREADS: usize = 5;
const DEFAULT_TASK_DEADLINE_SECS: u64 = 120;
const DEFAULT_REBUILD_INTERVAL_SECS: u64 = 600;
const DEFAULT_LOCALE: &str = "eng";
const DEFAULT_SRID: i32 = 4326;
const DEFAULT_NORTHING_FIRST_SRIDS: [i32; 2] = [4326, 4258];

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// When absent the archive store is used.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub threads: NonZeroUsize,
    pub task_deadline_seconds: u64,
    pub rebuild_interval: Duration,
    pub degraded_policy: DegradedPolicy,
    pub default_locale: String,
    pub default_srid: i32,
    pub northing_first_srids: Vec<i32>,
    pub persistence_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("cache.northing_first_srids"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Run(args)) => raw.apply_run_overrides(args),
        Some(Command::Rebuild(args)) => raw.apply_cache_overrides(&args.overrides),
        Some(Command::Inspect(args)) => raw.apply_logging_overrides(&args.logging),
        None => raw.apply_run_overrides(&RunArgs::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    store: RawStoreSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_run_overrides(&mut self, args: &RunArgs) {
        self.apply_cache_overrides(&args.overrides);
        if let Some(seconds) = args.rebuild_interval_seconds {
            self.cache.rebuild_interval_seconds = Some(seconds);
        }
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(path) = overrides.store_archive.as_ref() {
            self.store.archive = Some(path.clone());
        }
        if let Some(threads) = overrides.cache_threads {
            self.cache.threads = Some(threads);
        }
        if let Some(seconds) = overrides.cache_task_deadline_seconds {
            self.cache.task_deadline_seconds = Some(seconds);
        }
        if let Some(policy) = overrides.cache_degraded_policy.as_ref() {
            self.cache.degraded_policy = Some(policy.clone());
        }
        if let Some(locale) = overrides.cache_default_locale.as_ref() {
            self.cache.default_locale = Some(locale.clone());
        }
        if let Some(srid) = overrides.cache_default_srid {
            self.cache.default_srid = Some(srid);
        }
        if let Some(path) = overrides.cache_persistence_path.as_ref() {
            self.cache.persistence_path = Some(path.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            store,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let store = build_store_settings(store)?;
        let cache = build_cache_settings(cache)?;

        if database.url.is_some() && (database.max_connections.get() as usize) < cache.threads.get()
        {
            return Err(LoadError::invalid(
                "database.max_connections",
                format!(
                    "must be at least cache.threads ({}) so every worker can hold a session",
                    cache.threads
                ),
            ));
        }

        Ok(Self {
            logging,
            database,
            store,
            cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = NonZeroU32::new(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )
    .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    if store
        .archive
        .as_ref()
        .is_some_and(|path| path.as_os_str().is_empty())
    {
        return Err(LoadError::invalid("store.archive", "path must not be empty"));
    }
    Ok(StoreSettings {
        archive: store.archive,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let threads = NonZeroUsize::new(cache.threads.unwrap_or(DEFAULT_CACHE_THREADS))
        .ok_or_else(|| LoadError::invalid("cache.threads", "must be greater than zero"))?;

    let task_deadline_seconds = cache
        .task_deadline_seconds
        .unwrap_or(DEFAULT_TASK_DEADLINE_SECS);

    let interval_seconds = cache
        .rebuild_interval_seconds
        .unwrap_or(DEFAULT_REBUILD_INTERVAL_SECS);
    if interval_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.rebuild_interval_seconds",
            "must be greater than zero",
        ));
    }

    let degraded_policy = match cache.degraded_policy.as_deref() {
        Some(value) => DegradedPolicy::try_from(value).map_err(|_| {
            LoadError::invalid(
                "cache.degraded_policy",
                format!("unknown policy `{value}`; expected publish or retain_previous"),
            )
        })?,
        None => DegradedPolicy::default(),
    };

    let default_locale = cache
        .default_locale
        .map(|locale| locale.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
    if default_locale.is_empty() {
        return Err(LoadError::invalid(
            "cache.default_locale",
            "must not be empty",
        ));
    }

    let default_srid = cache.default_srid.unwrap_or(DEFAULT_SRID);
    if default_srid <= 0 {
        return Err(LoadError::invalid(
            "cache.default_srid",
            "must be a positive EPSG code",
        ));
    }

    let northing_first_srids = cache
        .northing_first_srids
        .unwrap_or_else(|| DEFAULT_NORTHING_FIRST_SRIDS.to_vec());
    if let Some(srid) = northing_first_srids.iter().find(|srid| **srid <= 0) {
        return Err(LoadError::invalid(
            "cache.northing_first_srids",
            format!("`{srid}` is not a positive EPSG code"),
        ));
    }

    let persistence_path = cache
        .persistence_path
        .filter(|path| !path.as_os_str().is_empty());

    Ok(CacheSettings {
        threads,
        task_deadline_seconds,
        rebuild_interval: Duration::from_secs(interval_seconds),
        degraded_policy,
        default_locale,
        default_srid,
        northing_first_srids,
        persistence_path,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    archive: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    threads: Option<usize>,
    task_deadline_seconds: Option<u64>,
    rebuild_interval_seconds: Option<u64>,
    degraded_policy: Option<String>,
    default_locale: Option<String>,
    default_srid: Option<i32>,
    northing_first_srids: Option<Vec<i32>>,
    persistence_path: Option<PathBuf>,
}
