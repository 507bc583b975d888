//! Scholar profile repository
//!
//! A scholar profile extends a `users` row with role `scholar`. Listings join
//! the scholar's account and their sponsor's name in one query.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::notifications::{self, NewNotification, Recipient};
use super::users::{purge_user, UserPurge};
use super::{paginate, DbError};
use crate::db::Patch;
use crate::models::{Money, Paginated, Pagination, ScholarStatus, UserRole};

const PROFILE_SELECT: &str = r#"
    SELECT s.user_id, u.username, u.full_name, u.email, u.phone,
           s.school, s.course, s.year_level,
           s.sponsor_id, sp.full_name AS sponsor_name,
           s.amount_needed_cents, s.amount_received_cents, s.status,
           s.created_at, s.updated_at
    FROM scholars s
    JOIN users u ON u.id = s.user_id
    LEFT JOIN users sp ON sp.id = s.sponsor_id
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScholarProfile {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub school: String,
    pub course: Option<String>,
    pub year_level: Option<String>,
    pub sponsor_id: Option<Uuid>,
    pub sponsor_name: Option<String>,
    pub amount_needed_cents: i64,
    pub amount_received_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScholarProfile {
    /// Remaining need, never negative.
    pub fn amount_outstanding_cents(&self) -> i64 {
        (self.amount_needed_cents - self.amount_received_cents).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewScholar {
    pub user_id: Uuid,
    pub school: String,
    pub course: Option<String>,
    pub year_level: Option<String>,
    pub amount_needed: Money,
}

#[derive(Debug, Clone, Default)]
pub struct ScholarFilter {
    pub status: Option<ScholarStatus>,
    pub sponsor_id: Option<Uuid>,
    /// Only scholars without a sponsor
    pub unsponsored: bool,
    pub search: Option<String>,
}

pub struct ScholarRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ScholarRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create the profile for an existing scholar account.
    pub async fn create(&self, new: NewScholar) -> Result<ScholarProfile, DbError> {
        let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = $1")
            .bind(new.user_id)
            .fetch_optional(self.pool)
            .await?;
        let (role,) = role.ok_or_else(|| DbError::not_found("user", new.user_id))?;
        if role != UserRole::Scholar.as_str() {
            return Err(DbError::Conflict {
                field: Some("user_id".to_owned()),
                message: "user is not registered as a scholar".to_owned(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO scholars (user_id, school, course, year_level, amount_needed_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(new.user_id)
        .bind(&new.school)
        .bind(new.course.as_deref())
        .bind(new.year_level.as_deref())
        .bind(new.amount_needed.cents())
        .execute(self.pool)
        .await
        .map_err(|e| DbError::from(e).on_conflict("scholar profile already exists"))?;

        tracing::info!(scholar_id = %new.user_id, "scholar profile created");
        self.get(new.user_id).await
    }

    pub async fn get(&self, user_id: Uuid) -> Result<ScholarProfile, DbError> {
        sqlx::query_as(&format!("{PROFILE_SELECT} WHERE s.user_id = $1"))
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("scholar", user_id))
    }

    pub async fn list(
        &self,
        filter: &ScholarFilter,
        page: Pagination,
    ) -> Result<Paginated<ScholarProfile>, DbError> {
        let select = PROFILE_SELECT.replacen(
            "s.created_at, s.updated_at",
            "s.created_at, s.updated_at, COUNT(*) OVER() AS total",
            1,
        );
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(select);
        qb.push(" WHERE TRUE");
        if let Some(status) = filter.status {
            qb.push(" AND s.status = ").push_bind(status.as_str());
        }
        if let Some(sponsor_id) = filter.sponsor_id {
            qb.push(" AND s.sponsor_id = ").push_bind(sponsor_id);
        }
        if filter.unsponsored {
            qb.push(" AND s.sponsor_id IS NULL");
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (u.full_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.school ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY u.full_name ASC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    pub async fn update(&self, user_id: Uuid, patch: Patch) -> Result<ScholarProfile, DbError> {
        let mut qb = patch
            .into_builder(user_id, "user_id")
            .map_err(|e| DbError::InvalidInput {
                message: e.to_string(),
            })?;
        qb.build_query_as::<(Uuid,)>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("scholar", user_id))?;
        self.get(user_id).await
    }

    /// Link a sponsor to a scholar (or unlink with `None`). Both parties are
    /// notified of a new link.
    pub async fn assign_sponsor(
        &self,
        scholar_id: Uuid,
        sponsor_id: Option<Uuid>,
    ) -> Result<ScholarProfile, DbError> {
        let mut tx = self.pool.begin().await?;

        if let Some(sponsor_id) = sponsor_id {
            let role: Option<(String,)> =
                sqlx::query_as("SELECT role FROM users WHERE id = $1 AND is_active")
                    .bind(sponsor_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (role,) = role.ok_or_else(|| DbError::not_found("sponsor", sponsor_id))?;
            if role != UserRole::Sponsor.as_str() {
                return Err(DbError::Conflict {
                    field: Some("sponsor_id".to_owned()),
                    message: "user is not registered as a sponsor".to_owned(),
                });
            }
        }

        let updated = sqlx::query(
            "UPDATE scholars SET sponsor_id = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(scholar_id)
        .bind(sponsor_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(DbError::not_found("scholar", scholar_id));
        }

        if let Some(sponsor_id) = sponsor_id {
            notifications::insert(
                &mut *tx,
                &NewNotification {
                    recipient: Recipient::user(scholar_id),
                    title: "Sponsor assigned".to_owned(),
                    message: "A sponsor has been assigned to your scholarship.".to_owned(),
                    kind: "sponsorship".to_owned(),
                },
            )
            .await?;
            notifications::insert(
                &mut *tx,
                &NewNotification {
                    recipient: Recipient::user(sponsor_id),
                    title: "New scholar".to_owned(),
                    message: "You have been linked to a new scholar.".to_owned(),
                    kind: "sponsorship".to_owned(),
                },
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(%scholar_id, ?sponsor_id, "scholar sponsor changed");
        self.get(scholar_id).await
    }

    /// Delete a scholar's account along with the profile, donations and
    /// report cards.
    pub async fn delete(&self, user_id: Uuid) -> Result<UserPurge, DbError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM scholars WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DbError::not_found("scholar", user_id));
        }

        let purge = purge_user(&mut *tx, user_id).await?;
        tx.commit().await?;

        tracing::info!(scholar_id = %user_id, ?purge, "scholar deleted");
        Ok(purge)
    }
}
