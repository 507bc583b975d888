//! Admin repository - admin accounts, MPIN and the dashboard summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DbError;

const ADMIN_COLUMNS: &str = "id, username, email, full_name, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub mpin_hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AdminCredentials {
    pub id: Uuid,
    pub password_hash: String,
    pub mpin_hash: String,
}

/// Counts shown on the admin landing page
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dashboard {
    pub volunteers: i64,
    pub scholars: i64,
    pub sponsors: i64,
    pub staff: i64,
    pub open_events: i64,
    pub completed_events: i64,
    pub upcoming_events: i64,
    pub pending_donations: i64,
    pub pending_report_cards: i64,
    pub verified_donation_cents: i64,
}

pub struct AdminRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> AdminRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewAdmin) -> Result<Admin, DbError> {
        let admin: Admin = sqlx::query_as(&format!(
            r#"
            INSERT INTO admin_users (username, email, full_name, password_hash, mpin_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.password_hash)
        .bind(&new.mpin_hash)
        .fetch_one(self.pool)
        .await?;

        tracing::info!(admin_id = %admin.id, username = %admin.username, "admin account created");
        Ok(admin)
    }

    pub async fn get(&self, id: Uuid) -> Result<Admin, DbError> {
        sqlx::query_as(&format!("SELECT {ADMIN_COLUMNS} FROM admin_users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("admin", id))
    }

    pub async fn credentials_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminCredentials>, DbError> {
        let creds = sqlx::query_as(
            r#"
            SELECT id, password_hash, mpin_hash
            FROM admin_users
            WHERE LOWER(username) = LOWER($1)
            "#,
        )
        .bind(username.trim())
        .fetch_optional(self.pool)
        .await?;
        Ok(creds)
    }

    pub async fn credentials_by_id(&self, id: Uuid) -> Result<AdminCredentials, DbError> {
        sqlx::query_as("SELECT id, password_hash, mpin_hash FROM admin_users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("admin", id))
    }

    pub async fn set_mpin_hash(&self, id: Uuid, mpin_hash: &str) -> Result<(), DbError> {
        let updated = sqlx::query(
            "UPDATE admin_users SET mpin_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(mpin_hash)
        .execute(self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(DbError::not_found("admin", id));
        }
        tracing::info!(admin_id = %id, "admin MPIN changed");
        Ok(())
    }

    /// Single-query dashboard summary.
    pub async fn dashboard(&self) -> Result<Dashboard, DbError> {
        let dashboard = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE role = 'volunteer') AS volunteers,
                (SELECT COUNT(*) FROM users WHERE role = 'scholar') AS scholars,
                (SELECT COUNT(*) FROM users WHERE role = 'sponsor') AS sponsors,
                (SELECT COUNT(*) FROM staff_users) AS staff,
                (SELECT COUNT(*) FROM events WHERE status = 'open') AS open_events,
                (SELECT COUNT(*) FROM events WHERE status = 'completed') AS completed_events,
                (SELECT COUNT(*) FROM events
                    WHERE status = 'open' AND starts_at > NOW()) AS upcoming_events,
                (SELECT COUNT(*) FROM scholar_donations
                    WHERE verification_status = 'pending') AS pending_donations,
                (SELECT COUNT(*) FROM report_cards
                    WHERE verification_status = 'pending') AS pending_report_cards,
                (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM scholar_donations
                    WHERE verification_status = 'verified') AS verified_donation_cents
            "#,
        )
        .fetch_one(self.pool)
        .await?;
        Ok(dashboard)
    }
}
