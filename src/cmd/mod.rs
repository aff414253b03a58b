//! CLI command implementations.
//!
//! | Module   | Commands handled                                   |
//! |----------|----------------------------------------------------|
//! | `serve`  | `Serve`                                            |
//! | `site`   | `Commit`, `Undo`, `Redo`, `Publish`, `StartOver`   |
//! | `config` | `Config`                                           |

pub mod config;
pub mod serve;
pub mod site;

pub use config::cmd_config;
pub use serve::cmd_serve;
pub use site::{SiteOp, cmd_site};

use anyhow::Result;
use sitesmith::config::Config;

use super::Cli;

/// sitesmith.toml (or defaults), then `SITESMITH_*` env, then CLI flags.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env()?;
    if let Some(root) = &cli.sites_root {
        config.sites.root = root.clone();
    }
    Ok(config)
}
