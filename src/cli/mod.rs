// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for `gg-latent` commands.
//!
//! ## Usage
//!
//! ```bash
//! gg-latent config show      # Effective configuration
//! gg-latent config validate  # Exit 0 if the configuration is usable
//! gg-latent smoke            # Store and retrieve a synthetic sequence
//! ```

pub mod config_cmd;
pub mod smoke_cmd;

pub use config_cmd::{run_defaults, run_show, run_validate};
pub use smoke_cmd::run_smoke;
