//! Notification repository
//!
//! Notifications are addressed to `(recipient_id, recipient_type)` so the same
//! table serves users, staff and admins. Other repositories insert through
//! [`insert`] inside their own transactions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{paginate, DbError};
use crate::models::{ActorKind, Paginated, Pagination, UserRole};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, recipient_type, title, message, kind, is_read, created_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_type: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Addressee of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub id: Uuid,
    pub kind: ActorKind,
}

impl Recipient {
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            kind: ActorKind::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub kind: String,
}

/// Insert one notification on an existing connection or transaction.
pub(crate) async fn insert(
    conn: &mut PgConnection,
    new: &NewNotification,
) -> Result<Notification, DbError> {
    let notification = sqlx::query_as(&format!(
        r#"
        INSERT INTO notifications (recipient_id, recipient_type, title, message, kind)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {NOTIFICATION_COLUMNS}
        "#
    ))
    .bind(new.recipient.id)
    .bind(new.recipient.kind.as_str())
    .bind(&new.title)
    .bind(&new.message)
    .bind(&new.kind)
    .fetch_one(conn)
    .await?;
    Ok(notification)
}

pub struct NotificationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewNotification) -> Result<Notification, DbError> {
        let mut conn = self.pool.acquire().await?;
        let notification = insert(&mut conn, &new).await?;
        tracing::debug!(
            notification_id = %notification.id,
            recipient = %new.recipient.id,
            "notification created"
        );
        Ok(notification)
    }

    /// Send the same notification to every active user with `role`.
    /// Returns how many were created.
    pub async fn broadcast_to_role(
        &self,
        role: UserRole,
        title: &str,
        message: &str,
        kind: &str,
    ) -> Result<u64, DbError> {
        let sent = sqlx::query(
            r#"
            INSERT INTO notifications (recipient_id, recipient_type, title, message, kind)
            SELECT id, 'user', $2, $3, $4
            FROM users
            WHERE role = $1 AND is_active
            "#,
        )
        .bind(role.as_str())
        .bind(title)
        .bind(message)
        .bind(kind)
        .execute(self.pool)
        .await?
        .rows_affected();

        tracing::info!(role = %role, sent, "notification broadcast");
        Ok(sent)
    }

    /// Newest first.
    pub async fn list_for(
        &self,
        recipient: Recipient,
        unread_only: bool,
        page: Pagination,
    ) -> Result<Paginated<Notification>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}, COUNT(*) OVER() AS total
            FROM notifications
            WHERE recipient_id = $1 AND recipient_type = $2 AND (NOT $3 OR NOT is_read)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .bind(unread_only)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool)
        .await?;
        paginate(rows, page)
    }

    pub async fn unread_count(&self, recipient: Recipient) -> Result<i64, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE recipient_id = $1 AND recipient_type = $2 AND NOT is_read
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Mark one of the recipient's notifications as read. Another
    /// recipient's notification is reported as not found.
    pub async fn mark_read(&self, id: Uuid, recipient: Recipient) -> Result<Notification, DbError> {
        sqlx::query_as(&format!(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE id = $1 AND recipient_id = $2 AND recipient_type = $3
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("notification", id))
    }

    pub async fn mark_all_read(&self, recipient: Recipient) -> Result<u64, DbError> {
        let updated = sqlx::query(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE recipient_id = $1 AND recipient_type = $2 AND NOT is_read
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .execute(self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid, recipient: Recipient) -> Result<(), DbError> {
        let deleted = sqlx::query(
            "DELETE FROM notifications WHERE id = $1 AND recipient_id = $2 AND recipient_type = $3",
        )
        .bind(id)
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .execute(self.pool)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Err(DbError::not_found("notification", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_recipient_shorthand() {
        let id = Uuid::new_v4();
        assert_eq!(
            Recipient::user(id),
            Recipient {
                id,
                kind: ActorKind::User
            }
        );
    }
}
