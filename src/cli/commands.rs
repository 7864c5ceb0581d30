//! CLI command handlers

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{KubeAppWatcher, RancherClient};
use crate::charts::{InstallerOptions, TemplateChartRequest, TemplateInstaller};
use crate::config::{self, Config, ConfigLoader, paths};
use crate::session::Session;

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get configuration value
    Get {
        /// Configuration key (e.g., "rancher.url", "install.fleetNamespace")
        key: Option<String>,
    },
    /// Set configuration value
    Set {
        /// Configuration key (e.g., "rancher.url", "install.fleetNamespace")
        key: String,
        /// Configuration value
        value: String,
    },
    /// List all configuration
    List,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

/// Arguments of `install-template`
#[derive(Args, Debug, Clone)]
pub struct InstallTemplateArgs {
    /// Cluster repository holding the template chart
    #[arg(long)]
    pub repo: String,
    /// Template chart name
    #[arg(long)]
    pub template: String,
    /// Name of the cluster the template creates
    #[arg(long)]
    pub cluster: String,
    /// Kubernetes version of the created cluster
    #[arg(long = "k8s-version")]
    pub k8s_version: String,
    /// Cloud credential secret, e.g. cattle-global-data:cc-abcde
    #[arg(long)]
    pub credential: String,
    /// Uninstall again once the install is verified
    #[arg(long)]
    pub cleanup: bool,
}

impl From<&InstallTemplateArgs> for TemplateChartRequest {
    fn from(args: &InstallTemplateArgs) -> Self {
        Self {
            repo_name: args.repo.clone(),
            template_name: args.template.clone(),
            cluster_name: args.cluster.clone(),
            k8s_version: args.k8s_version.clone(),
            credential_id: args.credential.clone(),
        }
    }
}

fn print_yaml(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

/// Handle configuration subcommands
pub async fn handle_config_command(cmd: ConfigSubcommand) -> Result<()> {
    match cmd {
        ConfigSubcommand::Get { key } => {
            let config = ConfigLoader::load().context("Failed to load configuration")?;

            if let Some(key) = key {
                println!("{}", config::get_config_value(&config, &key)?);
            } else {
                print_yaml(&config)?;
            }
        }
        ConfigSubcommand::Set { key, value } => {
            // Environment overrides must not leak into the saved file
            let path = paths::root_config_path();
            let mut config = if path.exists() {
                ConfigLoader::load_file(&path)?
            } else {
                Config::default()
            };

            config::set_config_value(&mut config, &key, &value)
                .with_context(|| format!("Failed to set {} = {}", key, value))?;

            ConfigLoader::save_root(&config).context("Failed to save configuration")?;
            println!("Configuration saved");
        }
        ConfigSubcommand::List => {
            let config = ConfigLoader::load().context("Failed to load configuration")?;
            print_yaml(&config)?;
        }
        ConfigSubcommand::Path => {
            println!("{}", paths::root_config_path().display());
        }
        ConfigSubcommand::Validate => match ConfigLoader::validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                eprintln!("Configuration validation failed: {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Install a template chart against the configured Rancher server
pub async fn handle_install_template(args: InstallTemplateArgs) -> Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    ConfigLoader::validate_config(&config)?;

    if config.rancher.url.is_empty() {
        return Err(anyhow::anyhow!(
            "rancher.url is not set; use `cattle-harness config set rancher.url <url>`"
        ));
    }
    let token = std::env::var(&config.rancher.token_env).with_context(|| {
        format!(
            "Rancher API token not found in ${}",
            config.rancher.token_env
        )
    })?;

    let catalog = RancherClient::new(
        &config.rancher.url,
        token,
        config.rancher.insecure,
        Duration::from_secs(config.rancher.request_timeout_seconds),
    )?;
    let context = config.kube.context.as_deref();
    match crate::kube::current_context(context) {
        Some(name) => tracing::info!("Using kubeconfig context {}", name),
        None => tracing::info!("No kubeconfig context, using in-cluster configuration"),
    }
    let client = crate::kube::create_client(context).await?;

    let installer = TemplateInstaller::with_options(
        Arc::new(catalog),
        Arc::new(KubeAppWatcher::new(client)),
        InstallerOptions::from(&config.install),
    );
    let request = TemplateChartRequest::from(&args);
    let mut session = Session::new();

    let result = installer
        .install_template_chart(&mut session, &request)
        .await
        .with_context(|| format!("Failed to install template {}", args.template));

    if result.is_ok() && !args.cleanup {
        println!(
            "Installed {}/{} for cluster {}",
            installer.options().fleet_namespace,
            args.template,
            args.cluster
        );
        for name in session.release() {
            tracing::debug!("Keeping installed state, skipped cleanup: {}", name);
        }
    } else if !session.is_empty() {
        tracing::info!("Running {} cleanup action(s)", session.len());
        let cleanup = session.cleanup().await.context("Cleanup failed");
        if cleanup.is_ok() {
            println!("Removed {}", args.template);
        }
        return finish_with_cleanup(result, cleanup);
    }

    result
}

/// Combine the install outcome with the cleanup that followed it
///
/// An install error is returned ahead of a cleanup error; the cleanup error
/// is logged and attached to it as context.
fn finish_with_cleanup(result: Result<()>, cleanup: Result<()>) -> Result<()> {
    match (result, cleanup) {
        (Ok(()), cleanup) => cleanup,
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup_err)) => {
            tracing::error!("{:#}", cleanup_err);
            Err(e.context(format!("{:#}", cleanup_err)))
        }
    }
}
