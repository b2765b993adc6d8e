//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bgg_proxy_service::config::Config;
use bgg_proxy_service::metrics;
use bgg_proxy_service::services::create_service;
use bgg_proxy_service::types::{ThingId, Username};
use clap::{Parser, Subcommand};

use crate::healthcheck;
use crate::logging;
use crate::server;

/// BGG proxy commands.
#[derive(Subcommand)]
enum Command {
    /// Run the web server.
    Run,

    /// Resolve a single entity through the cache and print it as JSON.
    Lookup {
        #[command(subcommand)]
        entity: Entity,
    },

    /// Check the health of a running proxy.
    Healthcheck {
        /// Address of the proxy. Defaults to the configured bind address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum Entity {
    /// A thing, by its BGG id.
    Thing { id: String },
    /// A user, by name.
    User { name: String },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "bgg-proxy", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // SAFETY: We are at the start of the program, no other threads exist yet.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let mut tags = config.metrics.custom_tags.clone();

        if let Some(hostname_tag) = config.metrics.hostname_tag.clone() {
            if let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
                tags.insert(hostname_tag, hostname);
            }
        }
        if let Some(environment_tag) = config.metrics.environment_tag.clone() {
            if let Some(environment) = sentry.options().environment.as_ref() {
                tags.insert(environment_tag, environment.to_string());
            }
        }

        metrics::configure_statsd(&config.metrics.prefix, statsd, tags)
            .context("failed to configure statsd")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Lookup { entity } => lookup(config, entity)?,
        Command::Healthcheck { addr, timeout } => {
            healthcheck::healthcheck(config, addr, timeout)?
        }
    }

    Ok(())
}

/// Resolves one entity through the configured cache and BGG, and prints it to stdout.
fn lookup(config: Config, entity: Entity) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let json = runtime.block_on(async {
        let service = create_service(&config).await?;
        let json = match entity {
            Entity::Thing { id } => {
                let id = ThingId::parse(&id)?;
                let thing = service
                    .fetch_thing(id)
                    .await
                    .with_context(|| format!("failed to look up thing {id}"))?;
                serde_json::to_string_pretty(&*thing)?
            }
            Entity::User { name } => {
                let name = Username::parse(&name)?;
                let user = service
                    .fetch_user(name.clone())
                    .await
                    .with_context(|| format!("failed to look up user {name}"))?;
                serde_json::to_string_pretty(&*user)?
            }
        };
        anyhow::Ok(json)
    })?;

    println!("{json}");
    Ok(())
}
