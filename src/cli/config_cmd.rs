// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands resolve configuration from the optional TOML file and
//! `GG_LATENT_*` environment variables without opening any backend.

use crate::config::{self, LatentCacheConfig};

/// Print effective config as key-value pairs to stdout.
///
/// Returns 0 on success, 2 if the configuration cannot be loaded.
pub fn run_show(json: bool) -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let effective = cfg.effective_config();
    if json {
        match serde_json::to_string_pretty(&effective) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        println!("{}", effective);
    }
    0
}

/// Print default config values (no file, no env overrides) to stdout.
pub fn run_defaults() {
    println!("{}", LatentCacheConfig::default().effective_config());
}

/// Validate configuration.
///
/// Returns 0 if valid, 2 on a load or validation error.
pub fn run_validate() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 2;
        }
    };
    match cfg.validate() {
        Ok(()) => {
            println!("Configuration is valid.");
            0
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_validate(), 0, "default config should pass validation");
    }

    #[test]
    fn test_validate_fails_for_raw_without_layout() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_CODEC", "raw");
        assert_eq!(run_validate(), 2);
        clear_env_vars();
    }

    #[test]
    fn test_show_reports_load_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_CODEC", "zstd");
        assert_eq!(run_show(false), 2);
        clear_env_vars();
    }

    #[test]
    fn test_show_json() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_show(true), 0);
    }
}
