#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `vehid`: identify the vehicle behind a bus log and drive its interface.

mod cli;
mod commands;
mod error_fmt;

use std::path::Path;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};
use vehid_core::{Catalog, CycleCfg, FingerprintDatabase, IdentifyCfg, VehidError};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::commands::{Context, DriveArgs};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: &Cli) -> Result<()> {
    color_eyre::install()?;

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    let catalog = load_catalog(cli.fingerprints.as_deref(), cfg.fingerprint.file.as_deref())?;
    let ctx = Context {
        catalog,
        identify: IdentifyCfg::from(&cfg.fingerprint),
        cycle: CycleCfg::from(&cfg.cycle),
        json: cli.json,
    };

    match &cli.cmd {
        Commands::Identify { log, strict } => commands::identify(&ctx, log, *strict),
        Commands::Drive {
            log,
            engage_after,
            steer,
            accel,
        } => commands::drive(
            &ctx,
            log,
            &DriveArgs {
                engage_after: *engage_after,
                steer: *steer,
                accel: *accel,
            },
        ),
        Commands::List => commands::list(&ctx),
        Commands::SelfCheck => commands::self_check(&ctx),
    }
}

fn load_config(path: Option<&Path>) -> Result<vehid_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            vehid_config::load_toml(&text)
                .map_err(|e| VehidError::Config(format!("parse {}: {e}", p.display())))?
        }
        None => vehid_config::Config::default(),
    };
    cfg.validate()
        .map_err(|e| VehidError::Config(format!("{e}")))?;
    Ok(cfg)
}

/// Built-in catalog, with its fingerprints replaced when a table file is given
/// (the flag wins over `fingerprint.file`).
fn load_catalog(flag: Option<&Path>, configured: Option<&str>) -> Result<Catalog> {
    let builtin = vehid_brands::catalog()?;
    let Some(path) = flag.or_else(|| configured.map(Path::new)) else {
        return Ok(builtin.clone());
    };
    let table = vehid_config::load_fingerprint_file(path)?;
    let db = FingerprintDatabase::try_from(&table)?;
    let catalog = builtin.with_fingerprints(db);
    catalog.check_consistency()?;
    tracing::info!(
        path = %path.display(),
        cars = catalog.fingerprints.len(),
        "fingerprint table loaded"
    );
    Ok(catalog)
}

/// Console layer on stderr plus an optional JSON file sink from `[logging]`.
///
/// `RUST_LOG` overrides `--log-level` for the console; the file uses
/// `logging.level` and falls back to the console level.
fn init_tracing(cli: &Cli, logging: &vehid_config::Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err_with(|| format!("invalid log level {:?}", cli.log_level))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    if cli.json {
        layers.push(console.json().with_filter(console_filter).boxed());
    } else {
        layers.push(console.with_filter(console_filter).boxed());
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = logging.level.as_deref().unwrap_or(&cli.log_level);
        let file_filter =
            EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level {level:?}"))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
