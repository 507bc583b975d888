//! Report card repository
//!
//! Each scholar has at most one current report card. Submitting a new one
//! archives the current card into `report_card_history` and replaces it,
//! all inside one transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::donations::Decision;
use super::notifications::{self, NewNotification, Recipient};
use super::{paginate, DbError};
use crate::models::{Paginated, Pagination, VerificationStatus};

const CARD_SELECT: &str = r#"
    SELECT r.id, r.scholar_id, u.full_name AS scholar_name,
           r.academic_year, r.term, r.file_url, r.gpa, r.remarks,
           r.verification_status, r.verified_by, r.verified_at, r.rejection_reason,
           r.submitted_at
    FROM report_cards r
    JOIN users u ON u.id = r.scholar_id
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReportCard {
    pub id: Uuid,
    pub scholar_id: Uuid,
    pub scholar_name: String,
    pub academic_year: String,
    pub term: String,
    pub file_url: String,
    pub gpa: Option<f64>,
    pub remarks: Option<String>,
    pub verification_status: String,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// A replaced report card
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReportCardHistory {
    pub id: Uuid,
    pub original_id: Uuid,
    pub scholar_id: Uuid,
    pub academic_year: String,
    pub term: String,
    pub file_url: String,
    pub gpa: Option<f64>,
    pub remarks: Option<String>,
    pub verification_status: String,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReportCard {
    pub scholar_id: Uuid,
    pub academic_year: String,
    pub term: String,
    pub file_url: String,
    pub gpa: Option<f64>,
    pub remarks: Option<String>,
}

pub struct ReportCardRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportCardRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Submit a report card, archiving the one it replaces.
    pub async fn submit(&self, new: NewReportCard) -> Result<ReportCard, DbError> {
        let mut tx = self.pool.begin().await?;

        // Locking the profile row serialises concurrent renewals
        let scholar: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM scholars WHERE user_id = $1 FOR UPDATE")
                .bind(new.scholar_id)
                .fetch_optional(&mut *tx)
                .await?;
        if scholar.is_none() {
            return Err(DbError::not_found("scholar", new.scholar_id));
        }

        let archived = sqlx::query(
            r#"
            INSERT INTO report_card_history (
                original_id, scholar_id, academic_year, term, file_url, gpa, remarks,
                verification_status, rejection_reason, submitted_at
            )
            SELECT id, scholar_id, academic_year, term, file_url, gpa, remarks,
                   verification_status, rejection_reason, submitted_at
            FROM report_cards
            WHERE scholar_id = $1
            "#,
        )
        .bind(new.scholar_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM report_cards WHERE scholar_id = $1")
            .bind(new.scholar_id)
            .execute(&mut *tx)
            .await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO report_cards (scholar_id, academic_year, term, file_url, gpa, remarks)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new.scholar_id)
        .bind(&new.academic_year)
        .bind(&new.term)
        .bind(&new.file_url)
        .bind(new.gpa)
        .bind(new.remarks.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            report_card_id = %id,
            scholar_id = %new.scholar_id,
            archived,
            "report card submitted"
        );
        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<ReportCard, DbError> {
        sqlx::query_as(&format!("{CARD_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("report card", id))
    }

    /// The scholar's current report card.
    pub async fn current(&self, scholar_id: Uuid) -> Result<ReportCard, DbError> {
        sqlx::query_as(&format!("{CARD_SELECT} WHERE r.scholar_id = $1"))
            .bind(scholar_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("report card", scholar_id))
    }

    /// Archived cards, most recently replaced first.
    pub async fn history(&self, scholar_id: Uuid) -> Result<Vec<ReportCardHistory>, DbError> {
        let history = sqlx::query_as(
            r#"
            SELECT id, original_id, scholar_id, academic_year, term, file_url, gpa, remarks,
                   verification_status, rejection_reason, submitted_at, archived_at
            FROM report_card_history
            WHERE scholar_id = $1
            ORDER BY archived_at DESC
            "#,
        )
        .bind(scholar_id)
        .fetch_all(self.pool)
        .await?;
        Ok(history)
    }

    /// Admin review queue, oldest submission first.
    pub async fn list(
        &self,
        status: Option<VerificationStatus>,
        page: Pagination,
    ) -> Result<Paginated<ReportCard>, DbError> {
        let select = CARD_SELECT.replacen(
            "r.submitted_at",
            "r.submitted_at, COUNT(*) OVER() AS total",
            1,
        );
        let rows = sqlx::query(&format!(
            r#"
            {select}
            WHERE ($1::TEXT IS NULL OR r.verification_status = $1)
            ORDER BY r.submitted_at ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool)
        .await?;
        paginate(rows, page)
    }

    /// Verify or reject a pending report card and notify the scholar.
    pub async fn decide(&self, id: Uuid, decision: Decision) -> Result<ReportCard, DbError> {
        let status = decision.decision.resulting_status();
        let mut tx = self.pool.begin().await?;

        let decided: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE report_cards
            SET verification_status = $2, verified_by = $3, verified_at = NOW(),
                rejection_reason = $4
            WHERE id = $1 AND verification_status = 'pending'
            RETURNING scholar_id
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(decision.admin_id)
        .bind(decision.reason.as_deref())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((scholar_id,)) = decided else {
            let existing: Option<(String,)> =
                sqlx::query_as("SELECT verification_status FROM report_cards WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match existing {
                Some((current,)) => {
                    DbError::conflict(format!("report card already {}", current))
                }
                None => DbError::not_found("report card", id),
            });
        };

        let message = match (status, decision.reason.as_deref()) {
            (VerificationStatus::Verified, _) => "Your report card has been verified.".to_owned(),
            (_, Some(reason)) => format!("Your report card was rejected: {}", reason),
            _ => "Your report card was rejected. Please submit a new one.".to_owned(),
        };
        notifications::insert(
            &mut *tx,
            &NewNotification {
                recipient: Recipient::user(scholar_id),
                title: format!("Report card {}", status),
                message,
                kind: "report_card".to_owned(),
            },
        )
        .await?;

        tx.commit().await?;
        tracing::info!(report_card_id = %id, status = %status, "report card decided");
        self.get(id).await
    }
}
