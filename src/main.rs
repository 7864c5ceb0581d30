//! cattle-harness - Rancher template install helper
//!
//! Installs cluster-template charts through the Rancher catalog API and waits
//! for the resulting App to deploy.

use anyhow::Result;
use cattle_harness::cli::{self, ConfigSubcommand, InstallTemplateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rancher template install helper
#[derive(Parser, Debug)]
#[command(name = "cattle-harness")]
#[command(about = "Install Rancher cluster-template charts and verify them", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Main commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Install the latest version of a template chart
    InstallTemplate(InstallTemplateArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Version => {
            cli::display_version();
            Ok(())
        }
        Command::Config { subcommand } => cli::handle_config_command(subcommand).await,
        Command::InstallTemplate(install) => {
            if let Some(path) = cli::init_logging(args.debug, args.log_file.as_deref())? {
                eprintln!("Logs written to: {}", path.display());
            }
            tracing::debug!("Installing template {} from {}", install.template, install.repo);
            cli::handle_install_template(install).await
        }
    }
}
