use std::{
    fs,
    io::{self, Write},
    path::Path,
    process,
};

use gqlstore::{
    cache::{CacheConfig, CacheError, NoCache, NormalizedCache, Operation, cache_from_config},
    config::{self, ClearArgs, Command, NormalizeArgs, ReadArgs},
    error::AppError,
    infra::{error::InfraError, telemetry},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let cache_config = CacheConfig::from(&settings.cache);
    if !cache_config.enabled {
        info!("Cache disabled; commands run against the no-op cache");
        return execute(&NoCache::new(), cli_args.command);
    }

    if cache_config.disk_directory.is_none() {
        return Err(AppError::validation(
            "no cache directory configured; pass --cache-dir or set cache.disk_directory",
        ));
    }

    let cache = cache_from_config(&cache_config).map_err(CacheError::from)?;
    execute(&cache, cli_args.command)
}

fn execute<C: NormalizedCache>(cache: &C, command: Command) -> Result<(), AppError> {
    match command {
        Command::Normalize(args) => run_normalize(cache, &args),
        Command::Read(args) => run_read(cache, &args),
        Command::Dump => run_dump(cache),
        Command::Clear(args) => run_clear(cache, &args),
    }
}

fn run_normalize<C: NormalizedCache>(cache: &C, args: &NormalizeArgs) -> Result<(), AppError> {
    let operation: Operation = read_json(&args.operation, "an operation descriptor")?;
    let body: Value = read_json(&args.response, "a response body")?;
    let data = response_data(&operation, body);

    let written = cache.write_response(&operation, &data)?;
    info!(
        operation = %operation.name,
        changed = written.changed_keys.len(),
        dependent = written.dependent_keys.len(),
        "Normalized response"
    );

    print_json(&json!({
        "operation": operation.name,
        "changed_keys": sorted(written.changed_keys),
        "dependent_keys": sorted(written.dependent_keys),
    }))
}

fn run_read<C: NormalizedCache>(cache: &C, args: &ReadArgs) -> Result<(), AppError> {
    let operation: Operation = read_json(&args.operation, "an operation descriptor")?;
    let read = cache.read_operation(&operation)?;
    print_json(&json!({ "data": read.data }))
}

fn run_dump<C: NormalizedCache>(cache: &C) -> Result<(), AppError> {
    let mut records = cache.dump()?;
    records.sort_by(|a, b| a.key().cmp(b.key()));

    let rendered: Vec<Value> = records
        .iter()
        .map(|record| {
            let fields: serde_json::Map<String, Value> = record
                .fields()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect();
            json!({ "key": record.key(), "fields": fields })
        })
        .collect();
    print_json(&Value::Array(rendered))
}

fn run_clear<C: NormalizedCache>(cache: &C, args: &ClearArgs) -> Result<(), AppError> {
    match args.key.as_deref() {
        Some(key) => {
            let cascade = args.cascade;
            let existed = cache.write_transaction(|tx| tx.remove(key, cascade))?;
            if existed {
                info!(key, cascade, "Removed record");
            } else {
                warn!(key, "No record stored under key");
            }
        }
        None => {
            cache.clear_all()?;
            info!("Cleared store");
        }
    }
    Ok(())
}

/// Accept either the bare `data` object or a full `{"data": ..}` response body.
fn response_data(operation: &Operation, body: Value) -> Value {
    let selects_data = operation
        .selections
        .iter()
        .any(|field| field.response_name == "data");
    match body {
        Value::Object(mut object) if !selects_data && object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T, AppError> {
    let raw = fs::read_to_string(path).map_err(|err| InfraError::input(path, err))?;
    let value = serde_json::from_str(&raw).map_err(|err| InfraError::decode(path, what, err))?;
    Ok(value)
}

fn print_json(value: &Value) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(InfraError::from)?;
    Ok(())
}

fn sorted(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    keys
}
