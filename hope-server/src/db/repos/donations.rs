//! Scholar donation repository
//!
//! Sponsors record donations as `pending`; an admin verifies or rejects each
//! one exactly once. Verification credits the scholar's received amount and
//! notifies the sponsor in the same transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::notifications::{self, NewNotification, Recipient};
use super::{paginate, DbError};
use crate::models::{
    Money, Paginated, Pagination, UserRole, VerificationDecision, VerificationStatus,
};

const DONATION_SELECT: &str = r#"
    SELECT d.id, d.sponsor_id, sp.full_name AS sponsor_name,
           d.scholar_id, sc.full_name AS scholar_name,
           d.amount_cents, d.reference, d.proof_url, d.message,
           d.verification_status, d.verified_by, d.verified_at, d.rejection_reason,
           d.created_at
"#;

const DONATION_FROM: &str = r#"
    FROM scholar_donations d
    JOIN users sp ON sp.id = d.sponsor_id
    JOIN users sc ON sc.id = d.scholar_id
"#;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Donation {
    pub id: Uuid,
    pub sponsor_id: Uuid,
    pub sponsor_name: String,
    pub scholar_id: Uuid,
    pub scholar_name: String,
    pub amount_cents: i64,
    pub reference: Option<String>,
    pub proof_url: Option<String>,
    pub message: Option<String>,
    pub verification_status: String,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub sponsor_id: Uuid,
    pub scholar_id: Uuid,
    pub amount: Money,
    pub reference: Option<String>,
    pub proof_url: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    pub status: Option<VerificationStatus>,
    pub sponsor_id: Option<Uuid>,
    pub scholar_id: Option<Uuid>,
}

/// An admin's verdict on a pending record
#[derive(Debug, Clone)]
pub struct Decision {
    pub decision: VerificationDecision,
    pub admin_id: Uuid,
    pub reason: Option<String>,
}

pub struct DonationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> DonationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewDonation) -> Result<Donation, DbError> {
        let role: Option<(String,)> =
            sqlx::query_as("SELECT role FROM users WHERE id = $1 AND is_active")
                .bind(new.sponsor_id)
                .fetch_optional(self.pool)
                .await?;
        let (role,) = role.ok_or_else(|| DbError::not_found("sponsor", new.sponsor_id))?;
        if role != UserRole::Sponsor.as_str() {
            return Err(DbError::forbidden("only sponsors can record donations"));
        }

        let scholar: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM scholars WHERE user_id = $1")
                .bind(new.scholar_id)
                .fetch_optional(self.pool)
                .await?;
        if scholar.is_none() {
            return Err(DbError::not_found("scholar", new.scholar_id));
        }

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO scholar_donations
                (sponsor_id, scholar_id, amount_cents, reference, proof_url, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new.sponsor_id)
        .bind(new.scholar_id)
        .bind(new.amount.cents())
        .bind(new.reference.as_deref())
        .bind(new.proof_url.as_deref())
        .bind(new.message.as_deref())
        .fetch_one(self.pool)
        .await?;

        tracing::info!(
            donation_id = %id,
            sponsor_id = %new.sponsor_id,
            scholar_id = %new.scholar_id,
            amount = %new.amount,
            "donation recorded"
        );
        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Donation, DbError> {
        sqlx::query_as(&format!("{DONATION_SELECT} {DONATION_FROM} WHERE d.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("donation", id))
    }

    /// Newest first.
    pub async fn list(
        &self,
        filter: &DonationFilter,
        page: Pagination,
    ) -> Result<Paginated<Donation>, DbError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "{DONATION_SELECT}, COUNT(*) OVER() AS total {DONATION_FROM} WHERE TRUE"
        ));
        if let Some(status) = filter.status {
            qb.push(" AND d.verification_status = ")
                .push_bind(status.as_str());
        }
        if let Some(sponsor_id) = filter.sponsor_id {
            qb.push(" AND d.sponsor_id = ").push_bind(sponsor_id);
        }
        if let Some(scholar_id) = filter.scholar_id {
            qb.push(" AND d.scholar_id = ").push_bind(scholar_id);
        }
        qb.push(" ORDER BY d.created_at DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    pub async fn list_for_sponsor(
        &self,
        sponsor_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Donation>, DbError> {
        let filter = DonationFilter {
            sponsor_id: Some(sponsor_id),
            ..DonationFilter::default()
        };
        self.list(&filter, page).await
    }

    pub async fn list_for_scholar(
        &self,
        scholar_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Donation>, DbError> {
        let filter = DonationFilter {
            scholar_id: Some(scholar_id),
            ..DonationFilter::default()
        };
        self.list(&filter, page).await
    }

    /// Verify or reject a pending donation.
    pub async fn decide(&self, id: Uuid, decision: Decision) -> Result<Donation, DbError> {
        let status = decision.decision.resulting_status();
        let mut tx = self.pool.begin().await?;

        let decided: Option<(Uuid, Uuid, i64)> = sqlx::query_as(
            r#"
            UPDATE scholar_donations
            SET verification_status = $2, verified_by = $3, verified_at = NOW(),
                rejection_reason = $4
            WHERE id = $1 AND verification_status = 'pending'
            RETURNING sponsor_id, scholar_id, amount_cents
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(decision.admin_id)
        .bind(decision.reason.as_deref())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((sponsor_id, scholar_id, amount_cents)) = decided else {
            let existing: Option<(String,)> =
                sqlx::query_as("SELECT verification_status FROM scholar_donations WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match existing {
                Some((current,)) => DbError::conflict(format!("donation already {}", current)),
                None => DbError::not_found("donation", id),
            });
        };

        if status == VerificationStatus::Verified {
            sqlx::query(
                r#"
                UPDATE scholars
                SET amount_received_cents = amount_received_cents + $2, updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(scholar_id)
            .bind(amount_cents)
            .execute(&mut *tx)
            .await?;
        }

        let amount = Money::from_cents(amount_cents).unwrap_or(Money::ZERO);
        let message = match (&status, decision.reason.as_deref()) {
            (VerificationStatus::Verified, _) => {
                format!("Your donation of {} has been verified. Thank you!", amount)
            }
            (_, Some(reason)) => format!("Your donation of {} was rejected: {}", amount, reason),
            _ => format!("Your donation of {} was rejected.", amount),
        };
        notifications::insert(
            &mut *tx,
            &NewNotification {
                recipient: Recipient::user(sponsor_id),
                title: format!("Donation {}", status),
                message,
                kind: "donation".to_owned(),
            },
        )
        .await?;

        tx.commit().await?;
        tracing::info!(donation_id = %id, status = %status, admin_id = %decision.admin_id, "donation decided");
        self.get(id).await
    }
}
