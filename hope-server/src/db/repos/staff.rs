//! Staff repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{forum, paginate, DbError};
use crate::db::Patch;
use crate::models::{ActorKind, Paginated, Pagination};

const STAFF_COLUMNS: &str =
    "id, username, email, full_name, position, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Staff {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub position: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStaff {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StaffCredentials {
    pub id: Uuid,
    pub password_hash: String,
    pub is_active: bool,
}

pub struct StaffRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> StaffRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewStaff) -> Result<Staff, DbError> {
        let staff: Staff = sqlx::query_as(&format!(
            r#"
            INSERT INTO staff_users (username, email, password_hash, full_name, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {STAFF_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.full_name)
        .bind(new.position.as_deref())
        .fetch_one(self.pool)
        .await?;

        tracing::info!(staff_id = %staff.id, "staff account created");
        Ok(staff)
    }

    pub async fn get(&self, id: Uuid) -> Result<Staff, DbError> {
        sqlx::query_as(&format!("SELECT {STAFF_COLUMNS} FROM staff_users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("staff", id))
    }

    pub async fn list(
        &self,
        search: Option<&str>,
        page: Pagination,
    ) -> Result<Paginated<Staff>, DbError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {STAFF_COLUMNS}, COUNT(*) OVER() AS total FROM staff_users WHERE TRUE"
        ));
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (username ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR full_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY full_name ASC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    pub async fn update(&self, id: Uuid, patch: Patch) -> Result<Staff, DbError> {
        let mut qb = patch
            .into_builder(id, STAFF_COLUMNS)
            .map_err(|e| DbError::InvalidInput {
                message: e.to_string(),
            })?;
        qb.build_query_as::<Staff>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("staff", id))
    }

    /// Delete a staff account along with its forum activity and
    /// notifications.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let kind = ActorKind::Staff.as_str();
        let mut tx = self.pool.begin().await?;

        forum::purge_author(&mut *tx, id, kind).await?;

        sqlx::query("DELETE FROM notifications WHERE recipient_id = $1 AND recipient_type = $2")
            .bind(id)
            .bind(kind)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM staff_users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DbError::not_found("staff", id));
        }

        tx.commit().await?;
        tracing::info!(staff_id = %id, "staff account deleted");
        Ok(())
    }

    pub async fn credentials(&self, identifier: &str) -> Result<Option<StaffCredentials>, DbError> {
        let creds = sqlx::query_as(
            r#"
            SELECT id, password_hash, is_active
            FROM staff_users
            WHERE LOWER(username) = LOWER($1) OR email = LOWER($1)
            LIMIT 1
            "#,
        )
        .bind(identifier.trim())
        .fetch_optional(self.pool)
        .await?;
        Ok(creds)
    }
}
