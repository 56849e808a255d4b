//! `gg-latent` entry point.
//!
//! Operator tooling for the prefix latent cache:
//! - Configuration inspection and validation
//! - End-to-end smoke test against the configured backend
//!
//! ## CLI Subcommands
//!
//! - `gg-latent config [show|defaults|validate]`
//! - `gg-latent smoke` - Store and retrieve a synthetic sequence (exit 0/1)

use std::process::ExitCode;

use gg_latent::cli::{run_defaults, run_show, run_smoke, run_validate};
use gg_latent::config;
use gg_latent::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("gg-latent {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json = args.get(3).map(|s| s.as_str()) == Some("--json");
                    ExitCode::from(run_show(json) as u8)
                }
                "defaults" => {
                    run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "smoke" => {
            init_logging_from_env();
            ExitCode::from(run_smoke().await as u8)
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Install the subscriber from the resolved log settings. Failures only warn.
fn init_logging_from_env() {
    let log = match config::load() {
        Ok(cfg) => cfg.log,
        Err(_) => return,
    };
    if let Err(e) = init_logging(&log) {
        eprintln!("WARNING: logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "gg-latent - prefix latent cache tooling v{}

USAGE:
    gg-latent [COMMAND] [OPTIONS]

COMMANDS:
    config       Inspect configuration (show, defaults, validate)
    smoke        Store and retrieve a synthetic sequence
    version      Show version information
    help         Show this help message

EXAMPLES:
    gg-latent config show --json
    GG_LATENT_BACKEND=lmdb gg-latent smoke

ENVIRONMENT:
    GG_LATENT_CONFIG      Path to a TOML config file
    GG_LATENT_BACKEND     memory, lmdb, redis, redis-pipelined
    GG_LATENT_CHUNK_SIZE  Tokens per chunk (default 256)
    GG_LATENT_LOG_LEVEL   Log filter (default info)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "config" => eprintln!(
            "gg-latent config [show [--json]|defaults|validate]

    show      Print effective configuration (file + env)
    defaults  Print built-in defaults
    validate  Exit 0 if the configuration is usable, 2 otherwise"
        ),
        "smoke" => eprintln!(
            "gg-latent smoke

    Opens the configured backend, stores a synthetic sequence of three full
    chunks plus a partial tail, retrieves it and compares the result."
        ),
        _ => print_usage(),
    }
}
