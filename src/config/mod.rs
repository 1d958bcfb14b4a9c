//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "gqlstore";
const ENV_PREFIX: &str = "GQLSTORE";
const DEFAULT_MEMORY_MAX_RECORDS: usize = 10_000;
const DEFAULT_MEMORY_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Command-line arguments for the gqlstore binary.
#[derive(Debug, Parser)]
#[command(
    name = "gqlstore",
    version,
    about = "Normalized GraphQL response cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GQLSTORE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CacheOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Normalize a response and merge it into the store.
    Normalize(NormalizeArgs),
    /// Rebuild an operation's response from the store.
    Read(ReadArgs),
    /// Print every stored record as JSON.
    Dump,
    /// Remove every stored record, or one record with --key.
    Clear(ClearArgs),
}

#[derive(Debug, Args, Clone)]
pub struct NormalizeArgs {
    /// Operation descriptor (JSON).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub operation: PathBuf,

    /// Response body (JSON); either the `data` object or a full `{"data": ..}` body.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub response: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ReadArgs {
    /// Operation descriptor (JSON).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub operation: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ClearArgs {
    /// Remove only this record.
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// With --key, also remove every record reachable through its references.
    #[arg(long, requires = "key", action = clap::ArgAction::SetTrue)]
    pub cascade: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the directory backing the disk store.
    #[arg(
        long = "cache-dir",
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::DirPath
    )]
    pub cache_dir: Option<PathBuf>,

    /// Override the in-memory record limit (0 = unbounded).
    #[arg(long = "memory-max-records", global = true, value_name = "COUNT")]
    pub memory_max_records: Option<usize>,

    /// Toggle id-based record keys.
    #[arg(
        long = "resolve-ids",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub resolve_ids: Option<bool>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        global = true,
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub memory_max_records: usize,
    pub memory_max_bytes: usize,
    pub disk_directory: Option<PathBuf>,
    pub resolve_ids: bool,
    pub typename_prefix: bool,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(directory) = overrides.cache_dir.as_ref() {
            self.cache.disk_directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.memory_max_records {
            self.cache.memory_max_records = Some(limit);
        }
        if let Some(resolve_ids) = overrides.resolve_ids {
            self.cache.resolve_ids = Some(resolve_ids);
        }
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
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let disk_directory = match cache.disk_directory {
        Some(directory) if directory.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "cache.disk_directory",
                "must not be empty when set",
            ));
        }
        other => other,
    };

    let resolve_ids = cache.resolve_ids.unwrap_or(true);
    let typename_prefix = cache.typename_prefix.unwrap_or(false);
    if typename_prefix && !resolve_ids {
        return Err(LoadError::invalid(
            "cache.typename_prefix",
            "requires cache.resolve_ids to be enabled",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        memory_max_records: cache
            .memory_max_records
            .unwrap_or(DEFAULT_MEMORY_MAX_RECORDS),
        memory_max_bytes: cache.memory_max_bytes.unwrap_or(DEFAULT_MEMORY_MAX_BYTES),
        disk_directory,
        resolve_ids,
        typename_prefix,
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
struct RawCacheSettings {
    enabled: Option<bool>,
    memory_max_records: Option<usize>,
    memory_max_bytes: Option<usize>,
    disk_directory: Option<PathBuf>,
    resolve_ids: Option<bool>,
    typename_prefix: Option<bool>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
