use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use sitesmith::config::DEFAULT_CONFIG_FILE;
use sitesmith::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(version, about = "Chat-driven website builder backed by per-site git repositories")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory holding one working copy per site. Overrides sitesmith.toml.
    #[arg(long, global = true)]
    pub sites_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
    },
    /// Stage and commit everything in a site's working copy
    Commit {
        site_id: String,
        #[arg(short, long)]
        message: String,
    },
    /// Undo the latest commit of a site
    Undo { site_id: String },
    /// Restore the commit removed by the last undo
    Redo { site_id: String },
    /// Push a site's commits to its remote
    Publish { site_id: String },
    /// Rebuild a site's repository from the remote's latest state
    StartOver { site_id: String },
    /// Show, validate or create sitesmith.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the config file and effective values
    Show,
    /// Report configuration warnings
    Validate,
    /// Write a default sitesmith.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        cmd::cmd_config(&cli.config, command.clone())?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = cmd::load_config(&cli)?;
    let _log_guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json || config.logging.json,
        dir: config.logging.dir.clone(),
    })?;

    let succeeded = match cli.command {
        Commands::Serve { port, host } => {
            cmd::cmd_serve(config, port, host).await?;
            true
        }
        Commands::Commit { site_id, message } => {
            cmd::cmd_site(&config, cmd::SiteOp::Commit(message), &site_id).await?
        }
        Commands::Undo { site_id } => cmd::cmd_site(&config, cmd::SiteOp::Undo, &site_id).await?,
        Commands::Redo { site_id } => cmd::cmd_site(&config, cmd::SiteOp::Redo, &site_id).await?,
        Commands::Publish { site_id } => {
            cmd::cmd_site(&config, cmd::SiteOp::Publish, &site_id).await?
        }
        Commands::StartOver { site_id } => {
            cmd::cmd_site(&config, cmd::SiteOp::StartOver, &site_id).await?
        }
        Commands::Config { .. } => true,
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
