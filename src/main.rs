use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use gpustat::commands;

fn main() -> Result<()> {
    let matches = Command::new("gpustat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("GPU utilization, memory, temperature and power across vendors")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('V')
                .long("version")
                .help("Print version information")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("vendor")
                .long("vendor")
                .value_name("VENDOR")
                .help("Vendor backend to probe: auto, nvidia, amd or intel")
                .value_parser(["auto", "nvidia", "amd", "intel"])
                .global(true)
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Configuration file (default: <config dir>/gpustat/config.json)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log probe attempts and backend selection")
                .action(ArgAction::SetTrue)
                .global(true)
        )
        .subcommand(
            Command::new("info")
                .about("Print a JSON snapshot of every GPU")
                .arg(
                    Arg::new("pretty")
                        .short('p')
                        .long("pretty")
                        .help("Indent the JSON output")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("human")
                        .short('H')
                        .long("human")
                        .help("Print a readable table instead of JSON")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("pretty")
                )
        )
        .subcommand(
            Command::new("count")
                .about("Print the number of GPUs, or -1 when unknown")
        )
        .subcommand(
            Command::new("usage")
                .about("Print utilization of GPU 0, or -1 when unavailable")
        )
        .subcommand(
            Command::new("status")
                .about("Show which telemetry backend was selected")
        )
        .subcommand(
            Command::new("watch")
                .about("Sample continuously until Ctrl+C")
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .value_name("MS")
                        .help("Milliseconds between samples (default: 1000)")
                        .value_parser(clap::value_parser!(u64).range(50..))
                        .default_value("1000")
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print one JSON document per sample")
                        .action(ArgAction::SetTrue)
                )
        )
        .subcommand(
            Command::new("export")
                .about("Write one snapshot to a timestamped JSON or CSV file")
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .help("Write CSV instead of JSON")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .value_name("DIR")
                        .help("Directory to write into (default: current directory)")
                        .value_parser(clap::value_parser!(PathBuf))
                )
        )
        .subcommand(
            Command::new("config")
                .about("Show or change stored configuration (use 'gpustat config --help' for subcommands)")
                .subcommand(
                    Command::new("show")
                        .about("Print the effective configuration as JSON")
                )
                .subcommand(
                    Command::new("set")
                        .about("Store one configuration value")
                        .arg(
                            Arg::new("key")
                                .help("vendor, library, warmup_delay_ms, discrete_fallback_memory_bytes, integrated_memory_divisor or drm_root")
                                .required(true)
                                .index(1)
                        )
                        .arg(
                            Arg::new("value")
                                .help("New value; 'library' appends a path")
                                .required(true)
                                .index(2)
                        )
                )
                .subcommand(
                    Command::new("path")
                        .about("Print where the configuration file lives")
                )
        )
        .subcommand(
            Command::new("version")
                .about("Shows version information")
        )
        .get_matches();

    gpustat::init_logging(matches.get_flag("verbose"));

    if matches.get_flag("version") {
        return commands::version();
    }

    let config = commands::gpu::resolve_config(&matches)?;

    match matches.subcommand() {
        Some(("info", sub_matches)) => {
            commands::gpu::execute_info(sub_matches, &config)?;
        }
        Some(("count", _)) => {
            commands::gpu::execute_count(&config)?;
        }
        Some(("usage", _)) => {
            commands::gpu::execute_usage(&config)?;
        }
        Some(("status", _)) => {
            commands::gpu::execute_status(&config)?;
        }
        Some(("watch", sub_matches)) => {
            commands::gpu::execute_watch(sub_matches, &config)?;
        }
        Some(("export", sub_matches)) => {
            commands::export::execute(sub_matches, &config)?;
        }
        Some(("config", sub_matches)) => {
            commands::config::handle_config(
                sub_matches,
                &config,
                matches.get_one::<PathBuf>("config"),
            )?;
        }
        Some(("version", _)) => {
            commands::version()?;
        }
        _ => {
            println!("Welcome to gpustat!");
            println!("Use 'gpustat --help' for more information.");
        }
    }

    Ok(())
}
