use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::config::{Config, VendorPreference};
use crate::core::gpu::{BackendKind, Session};
use crate::ui::{print_snapshot, snapshot_line};

/// Config from `--config` (or the default location) with `--vendor` applied
pub fn resolve_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(vendor) = matches.get_one::<String>("vendor") {
        config.vendor = vendor
            .parse::<VendorPreference>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid --vendor")?;
    }

    Ok(config)
}

pub fn execute_info(matches: &ArgMatches, config: &Config) -> Result<()> {
    let mut session = Session::init(config);

    if matches.get_flag("human") {
        let snapshot = session
            .snapshot()
            .map_err(|e| anyhow::anyhow!("No GPU telemetry available: {}", e))?;
        print_snapshot(&snapshot, &session.describe(), &session.cached_infos());
        return Ok(());
    }

    let json = if matches.get_flag("pretty") {
        session.snapshot().ok().and_then(|s| s.to_json_pretty().ok())
    } else {
        session.get_info_json()
    };

    match json {
        Some(json) => {
            println!("{}", json);
            Ok(())
        }
        None => {
            println!("null");
            anyhow::bail!("No GPU telemetry available ({})", session.describe())
        }
    }
}

pub fn execute_count(config: &Config) -> Result<()> {
    let session = Session::init(config);
    println!("{}", session.get_count());
    Ok(())
}

pub fn execute_usage(config: &Config) -> Result<()> {
    let mut session = Session::init(config);
    println!("{}", session.get_usage());
    Ok(())
}

pub fn execute_status(config: &Config) -> Result<()> {
    let session = Session::init(config);

    let (kind, vendor) = match session.kind() {
        Some(BackendKind::Vendor(vendor)) => ("vendor", vendor.display_name()),
        Some(BackendKind::Counters) => ("counters", "-"),
        None => ("none", "-"),
    };

    let state = if session.is_available() {
        session.state().name().green()
    } else {
        session.state().name().red()
    };

    println!("{} {}", "State:".bold(), state);
    println!("{} {}", "Backend:".bold(), kind);
    println!("{} {}", "Vendor:".bold(), vendor);
    println!("{} {}", "Source:".bold(), session.describe());
    println!("{} {}", "Init status:".bold(), session.status().code());
    Ok(())
}

/// Sample one session until Ctrl+C
pub fn execute_watch(matches: &ArgMatches, config: &Config) -> Result<()> {
    let interval = Duration::from_millis(*matches.get_one::<u64>("interval").unwrap_or(&1000));
    let as_json = matches.get_flag("json");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let mut session = Session::init(config);
    if !session.is_available() {
        anyhow::bail!("No GPU telemetry available ({})", session.describe());
    }

    if !as_json {
        println!("{}", session.describe().dimmed());
        println!("{}", "Press Ctrl+C to stop".dimmed());
    }

    while !stop.load(Ordering::Relaxed) {
        if as_json {
            println!("{}", session.get_info_json().unwrap_or_else(|| "null".to_string()));
        } else {
            match session.snapshot() {
                Ok(snapshot) => println!("{}", snapshot_line(&snapshot)),
                Err(e) => println!("{}", format!("sample failed: {}", e).yellow()),
            }
        }
        sleep_unless_stopped(interval, &stop);
    }

    session.shutdown();
    Ok(())
}

fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
