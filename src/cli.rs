//! Command line surface
//!
//! Every subcommand loads the project file (except `init`), opens one SSH
//! session and hands it to the matching service entry point.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::env::constants::{DEFAULT_TUNNEL_PORT, LOCAL_LOG_DIR};
use crate::config::{init_project, EnvOverrides, ProjectConfig};
use crate::services::deploy::{self, build, container, DeployOptions, StageTracker, DEPLOY_STAGES};
use crate::services::provision::{proxy, registry};
use crate::services::ssh::client::SshSession;
use crate::services::{diff, logs, monitor, ui};

#[derive(Debug, Parser)]
#[command(name = "xjp-hostctl")]
#[command(about = "Provision a host with Docker and Traefik, then deploy one container to it")]
#[command(version)]
pub struct Cli {
    /// Use `<ENV>.hostctl.yml` instead of `hostctl.yml`
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Write a starter hostctl.yml
    Init,
    /// Build, push and deploy the application container
    Deploy,
    /// Follow the container logs
    Logs,
    /// Download the full container log into ./hostctl-logs
    DownloadLogs,
    /// Stop and remove the application container
    Destroy,
    /// Show the application container status
    Status,
    /// Install Docker and authenticate to the registry
    Server,
    /// Set up the reverse proxy
    Proxy,
    /// Force a reinstall of Docker and registry tooling
    Recover,
    /// Authenticate to the registry
    Registry,
    /// Show a host resource snapshot
    Monitor {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Compare local project files with the files inside the running container
    Diff,
    /// Tunnel the remote Docker socket and open a local log viewer
    TunnelUi {
        /// Local port for the Docker socket tunnel
        #[arg(short, long, default_value_t = DEFAULT_TUNNEL_PORT)]
        port: u16,
    },
}

impl Command {
    /// Action shown in the error report
    fn action(&self) -> &'static str {
        match self {
            Command::Init => "writing config file",
            Command::Deploy => "deploying container",
            Command::Logs => "streaming logs",
            Command::DownloadLogs => "downloading logs",
            Command::Destroy => "destroying container",
            Command::Status => "getting container status",
            Command::Server => "setting up server",
            Command::Proxy => "setting up reverse proxy",
            Command::Recover => "recovering server",
            Command::Registry => "authenticating to registry",
            Command::Monitor { .. } => "collecting host snapshot",
            Command::Diff => "comparing local files with container",
            Command::TunnelUi { .. } => "running log viewer",
        }
    }
}

async fn load(env: Option<&str>) -> anyhow::Result<ProjectConfig> {
    let overrides = EnvOverrides::from_env();
    ProjectConfig::load(Path::new("."), env, &overrides)
        .await
        .context("loading config")
}

async fn connect(config: &ProjectConfig) -> anyhow::Result<SshSession> {
    SshSession::connect(&config.target)
        .await
        .with_context(|| format!("connecting to {}", config.target))
}

/// Run the selected subcommand
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let action = cli.command.action();
    execute(cli).await.context(action)
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    if cli.command == Command::Init {
        if init_project(Path::new(".")).await? {
            println!("wrote hostctl.yml");
        } else {
            println!("hostctl.yml already exists, leaving it untouched");
        }
        return Ok(());
    }

    let config = load(cli.env.as_deref()).await?;
    if cli.command == Command::Deploy {
        return run_deploy(&config).await;
    }

    let session = connect(&config).await?;
    let result = dispatch(&cli.command, &config, &session).await;
    // Logs closes its own session after the interrupt
    if cli.command != Command::Logs {
        session.close().await?;
    }
    result
}

async fn dispatch(command: &Command, config: &ProjectConfig, session: &SshSession) -> anyhow::Result<()> {
    let spec = &config.spec;
    match command {
        Command::Logs => logs::stream_logs(session, &spec.name).await?,
        Command::DownloadLogs => {
            let path = logs::download_logs(session, &spec.name, &PathBuf::from(LOCAL_LOG_DIR)).await?;
            println!("logs saved to {}", path.display());
        }
        Command::Destroy => {
            container::teardown(session, &spec.name).await?;
        }
        Command::Status => print!("{}", container::status(session, &spec.name).await?),
        Command::Server | Command::Recover => {
            let recover = *command == Command::Recover;
            deploy::check_local_files(spec)?;
            deploy::provision_runtime(session, recover).await?;
            registry::ensure_authenticated(session, spec, recover).await?;
        }
        Command::Proxy => {
            let outcome = proxy::ensure_setup(session, &spec.email, &spec.web_advanced).await?;
            println!("reverse proxy: {:?}", outcome);
        }
        Command::Registry => {
            deploy::check_local_files(spec)?;
            registry::ensure_authenticated(session, spec, false).await?;
        }
        Command::Monitor { json } => {
            let snap = monitor::snapshot(session).await?;
            if *json {
                println!("{}", monitor::render_json(&snap)?);
            } else {
                println!("{}", monitor::render_human(&snap));
            }
        }
        Command::Diff => {
            let result = diff::compare(session, &spec.name, &config.work_dir).await?;
            print!("{}", diff::render(&result));
        }
        Command::TunnelUi { port } => ui::run_log_viewer(session, *port).await?,
        Command::Init | Command::Deploy => {}
    }
    Ok(())
}

async fn run_deploy(config: &ProjectConfig) -> anyhow::Result<()> {
    let spec = &config.spec;
    deploy::check_local_files(spec)?;

    let mut tracker = StageTracker::new(&DEPLOY_STAGES);
    let result = async {
        let archive = tracker
            .track(
                "build",
                build::build_and_publish(&config.work_dir, spec, config.build_target.as_deref()),
            )
            .await?;

        let session = connect(config).await?;
        let opts = DeployOptions {
            recover: false,
            archive,
        };
        let outcome = deploy::run_pipeline(&session, spec, &opts, &mut tracker).await;
        session.close().await?;
        outcome?;
        anyhow::Ok(())
    }
    .await;

    println!("{}", tracker.summary());
    result
}
