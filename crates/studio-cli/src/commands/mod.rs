//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use studio_core::GatewayConfig;
use studio_graph::{Account, Connector, Gateway};
use tracing::debug;

pub mod console;
pub mod hosts;
pub mod query;

/// Graph Studio - session gateway to the graph engine
#[derive(Parser)]
#[command(name = "studio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Gateway configuration file (TOML)
    #[arg(short, long, global = true, env = "STUDIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Engine address
    #[arg(short, long, global = true, env = "STUDIO_ADDRESS", default_value = "127.0.0.1")]
    pub address: String,

    /// Engine port
    #[arg(short = 'P', long, global = true, env = "STUDIO_PORT", default_value_t = 9669)]
    pub port: u16,

    /// Engine user
    #[arg(short, long, global = true, env = "STUDIO_USER", default_value = "root")]
    pub user: String,

    /// Engine password (prompted for when omitted)
    #[arg(long, global = true, env = "STUDIO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more statements as a single batch
    Query(query::QueryArgs),

    /// List the hosts of the cluster
    Hosts,

    /// Interactive statement console
    Console(console::ConsoleArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = GatewayConfig::load(self.config.as_deref())
            .context("Failed to load gateway configuration")?;
        debug!(?config, "Gateway configuration loaded");

        let password = match self.password.clone() {
            Some(password) => password,
            None => dialoguer::Password::new()
                .with_prompt(format!("Password for {}", self.user))
                .allow_empty_password(true)
                .interact()
                .context("Failed to read password")?,
        };
        let account = Account::new(self.address.clone(), self.port, self.user.clone(), password);

        let gateway = Gateway::new(connector()?, config);
        let client_id = gateway
            .login(&account)
            .await
            .with_context(|| format!("Login to {}:{} failed", self.address, self.port))?;
        let session = Session {
            gateway: &gateway,
            client_id: &client_id,
        };

        let outcome = match self.command {
            Commands::Query(args) => query::execute(&session, args).await,
            Commands::Hosts => hosts::execute(&session).await,
            Commands::Console(args) => console::execute(&session, args).await,
        };

        gateway.shutdown().await;
        outcome
    }
}

/// A logged-in client of the gateway.
pub struct Session<'a> {
    pub gateway: &'a Gateway,
    pub client_id: &'a str,
}

#[cfg(feature = "neo4j")]
fn connector() -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(studio_graph::BoltConnector))
}

#[cfg(not(feature = "neo4j"))]
fn connector() -> Result<Arc<dyn Connector>> {
    anyhow::bail!("No engine backend compiled in. Rebuild with `--features neo4j`.")
}
