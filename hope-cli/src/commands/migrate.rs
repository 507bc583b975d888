//! Schema migration command

use anyhow::{Context, Result};
use clap::Parser;

use hope_server::db::{create_pool, migrations};

use crate::config::HopeConfig;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Print the DDL instead of applying it
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run_migrate(args: MigrateArgs, config: HopeConfig) -> Result<()> {
    if args.dry_run {
        for statement in migrations::statements() {
            println!("{};\n", statement.trim());
        }
        return Ok(());
    }

    let database_url = match args.database_url {
        Some(url) => url,
        None => config.database_url()?.to_string(),
    };
    let pool = create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;
    migrations::run(&pool)
        .await
        .context("Failed to apply migrations")?;

    println!("Schema up to date ({} tables)", migrations::TABLES.len());
    Ok(())
}
