//! HTTP server command
//!
//! Flags override environment, which overrides the config file.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use hope_server::db::{create_pool_with_options, migrations};
use hope_server::http::{run_server, ServerConfig};

use crate::config::HopeConfig;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Extra allowed CORS origin (repeatable)
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub allowed_origins: Vec<String>,

    /// Database URL (overrides config/environment)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Do not apply schema migrations on startup
    #[arg(long)]
    pub skip_migrations: bool,
}

impl ServeArgs {
    /// Fold the flags into the loaded configuration.
    pub fn apply(self, config: &mut HopeConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if self.cors_permissive {
            config.server.cors_permissive = true;
        }
        config.server.allowed_origins.extend(self.allowed_origins);
        if let Some(url) = self.database_url {
            config.database.url = Some(url);
        }
        if self.skip_migrations {
            config.database.run_migrations = false;
        }
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, mut config: HopeConfig) -> Result<()> {
    args.apply(&mut config);
    let database_url = config.database_url()?;

    let pool = create_pool_with_options(database_url, config.database.max_connections)
        .await
        .context("Failed to create database pool")?;

    if config.database.run_migrations {
        migrations::run(&pool)
            .await
            .context("Failed to apply migrations")?;
    }

    let server = ServerConfig {
        bind_addr: config.server.bind,
        cors_permissive: config.server.cors_permissive,
        allowed_origins: config.server.allowed_origins,
    };
    tracing::info!(bind = %server.bind_addr, "starting hope API");

    run_server(pool, server).await.context("Server error")?;
    Ok(())
}
