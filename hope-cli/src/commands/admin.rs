//! Admin account bootstrap
//!
//! The API has no endpoint that creates admins; the first (and every later)
//! admin account is made here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hope_server::credentials::hash_secret;
use hope_server::db::{create_pool, AdminRepo, NewAdmin};
use hope_server::models::{Email, Mpin, Password, PersonName, Username};

use crate::config::HopeConfig;

#[derive(Parser, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommands,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Create an admin account
    Create(CreateAdminArgs),
}

#[derive(Parser, Debug)]
pub struct CreateAdminArgs {
    /// Login name
    #[arg(long)]
    pub username: String,

    /// Contact email
    #[arg(long)]
    pub email: String,

    /// Display name
    #[arg(long)]
    pub full_name: String,

    /// Login password (at least 8 characters)
    #[arg(long, env = "HOPECTL_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Four-digit MPIN required at admin login
    #[arg(long, env = "HOPECTL_ADMIN_MPIN", hide_env_values = true)]
    pub mpin: String,

    /// Database URL (overrides config/environment)
    #[arg(long)]
    pub database_url: Option<String>,
}

impl CreateAdminArgs {
    /// Validate the fields and hash both secrets.
    fn into_new_admin(self) -> Result<NewAdmin> {
        let username = Username::new(&self.username)?;
        let email = Email::new(&self.email)?;
        let full_name = PersonName::new(&self.full_name)?;
        let password = Password::new(&self.password)?;
        let mpin = Mpin::new(&self.mpin)?;

        Ok(NewAdmin {
            username: username.as_str().to_owned(),
            email: email.as_str().to_owned(),
            full_name: full_name.into_string(),
            password_hash: hash_secret(password.expose())?,
            mpin_hash: hash_secret(mpin.expose())?,
        })
    }
}

pub async fn run_admin(args: AdminArgs, config: HopeConfig) -> Result<()> {
    match args.command {
        AdminCommands::Create(args) => create_admin(args, config).await,
    }
}

async fn create_admin(args: CreateAdminArgs, config: HopeConfig) -> Result<()> {
    let database_url = match args.database_url.clone() {
        Some(url) => url,
        None => config.database_url()?.to_string(),
    };
    let new = args.into_new_admin()?;

    let pool = create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;
    let admin = AdminRepo::new(&pool)
        .create(new)
        .await
        .context("Failed to create admin")?;

    println!("Created admin {} ({})", admin.username, admin.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mpin: &str) -> CreateAdminArgs {
        CreateAdminArgs {
            username: "founder".into(),
            email: "Founder@Example.org".into(),
            full_name: "Foundation Founder".into(),
            password: "long enough secret".into(),
            mpin: mpin.into(),
            database_url: None,
        }
    }

    #[test]
    fn hashes_both_secrets() {
        let new = args("4821").into_new_admin().unwrap();
        assert_eq!(new.username, "founder");
        assert!(new.password_hash.starts_with("$argon2"));
        assert!(new.mpin_hash.starts_with("$argon2"));
        assert_ne!(new.mpin_hash, "4821");
    }

    #[test]
    fn rejects_bad_mpin() {
        let err = args("48a1").into_new_admin().unwrap_err();
        assert!(err.to_string().contains("mpin"));
    }
}
