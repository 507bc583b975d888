//! Event repository
//!
//! Handles event CRUD plus the capacity-bounded participation workflow:
//! - join: lock the event row, insert the participant, then bump
//!   `current_volunteers` only while it is below `total_volunteers`
//! - leave: remove the participant and release the seat
//! Both run in one transaction so a failed step leaves no partial state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{paginate, DbError};
use crate::db::{Patch, PatchValue};
use crate::models::{ActorKind, EventStatus, Paginated, Pagination, UserRole};

const EVENT_COLUMNS: &str = "id, title, description, location, latitude, longitude, starts_at, \
     ends_at, total_volunteers, current_volunteers, status, created_by, created_by_type, \
     created_at, updated_at";

/// Event record from database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_volunteers: i32,
    pub current_volunteers: i32,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_by_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn slots_left(&self) -> i32 {
        (self.total_volunteers - self.current_volunteers).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.current_volunteers >= self.total_volunteers
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_volunteers: i32,
    pub created_by: Uuid,
    pub created_by_type: ActorKind,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    /// Only events starting in the future
    pub upcoming: bool,
    pub search: Option<String>,
}

/// Volunteer signed up for an event
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Participant {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventFeedback {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event repository
pub struct EventRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> EventRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewEvent) -> Result<Event, DbError> {
        let event: Event = sqlx::query_as(&format!(
            r#"
            INSERT INTO events (
                title, description, location, latitude, longitude,
                starts_at, ends_at, total_volunteers, created_by, created_by_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&new.title)
        .bind(new.description.as_deref())
        .bind(new.location.as_deref())
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.starts_at)
        .bind(new.ends_at)
        .bind(new.total_volunteers)
        .bind(new.created_by)
        .bind(new.created_by_type.as_str())
        .fetch_one(self.pool)
        .await?;

        tracing::info!(event_id = %event.id, capacity = event.total_volunteers, "event created");
        Ok(event)
    }

    pub async fn get(&self, id: Uuid) -> Result<Event, DbError> {
        sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("event", id))
    }

    /// List events ordered by start time.
    pub async fn list(
        &self,
        filter: &EventFilter,
        page: Pagination,
    ) -> Result<Paginated<Event>, DbError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS}, COUNT(*) OVER() AS total FROM events WHERE TRUE"
        ));
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if filter.upcoming {
            qb.push(" AND starts_at > NOW()");
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY starts_at ASC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    /// Apply a partial update. Lowering `total_volunteers` below the number
    /// of volunteers already signed up is a conflict.
    pub async fn update(&self, id: Uuid, patch: Patch) -> Result<Event, DbError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i32,)> =
            sqlx::query_as("SELECT current_volunteers FROM events WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (current,) = current.ok_or_else(|| DbError::not_found("event", id))?;

        if let Some(PatchValue::Int(Some(total))) = patch.get("total_volunteers") {
            if *total < current {
                return Err(DbError::Conflict {
                    field: Some("total_volunteers".to_owned()),
                    message: format!(
                        "total_volunteers cannot be lower than the {} volunteers already joined",
                        current
                    ),
                });
            }
        }

        let mut qb = patch
            .into_builder(id, EVENT_COLUMNS)
            .map_err(|e| DbError::InvalidInput {
                message: e.to_string(),
            })?;
        let event = qb
            .build_query_as::<Event>()
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(event)
    }

    /// Delete an event, its participants and feedback. Participants get a
    /// notification in the same transaction.
    pub async fn delete(&self, id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let notified = sqlx::query(
            r#"
            INSERT INTO notifications (recipient_id, recipient_type, title, message, kind)
            SELECT p.user_id, 'user', 'Event cancelled',
                   'The event "' || e.title || '" has been removed.', 'event'
            FROM event_participants p
            JOIN events e ON e.id = p.event_id
            WHERE p.event_id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM event_feedback WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_participants WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DbError::not_found("event", id));
        }

        tx.commit().await?;
        tracing::info!(event_id = %id, notified, "event deleted");
        Ok(())
    }

    /// Sign a volunteer up for an event.
    pub async fn join(&self, event_id: Uuid, user_id: Uuid) -> Result<Event, DbError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent joins on the same event
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) = status.ok_or_else(|| DbError::not_found("event", event_id))?;
        if status != EventStatus::Open.as_str() {
            return Err(DbError::conflict("event is not open"));
        }

        let role: Option<(String,)> =
            sqlx::query_as("SELECT role FROM users WHERE id = $1 AND is_active")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (role,) = role.ok_or_else(|| DbError::not_found("user", user_id))?;
        if role != UserRole::Volunteer.as_str() {
            return Err(DbError::forbidden("only volunteers can join events"));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO event_participants (event_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(DbError::conflict("already joined this event"));
        }

        let event: Option<Event> = sqlx::query_as(&format!(
            r#"
            UPDATE events
            SET current_volunteers = current_volunteers + 1, updated_at = NOW()
            WHERE id = $1 AND current_volunteers < total_volunteers
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(event) = event else {
            tracing::warn!(%event_id, %user_id, "join rejected: event full");
            return Err(DbError::conflict("event is full"));
        };

        tx.commit().await?;
        tracing::info!(%event_id, %user_id, seats = event.current_volunteers, "volunteer joined");
        Ok(event)
    }

    /// Withdraw a volunteer and release their seat.
    pub async fn leave(&self, event_id: Uuid, user_id: Uuid) -> Result<Event, DbError> {
        let mut tx = self.pool.begin().await?;

        let removed =
            sqlx::query("DELETE FROM event_participants WHERE event_id = $1 AND user_id = $2")
                .bind(event_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if removed == 0 {
            return Err(DbError::not_found("participation", user_id));
        }

        let event: Event = sqlx::query_as(&format!(
            r#"
            UPDATE events
            SET current_volunteers = GREATEST(current_volunteers - 1, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(%event_id, %user_id, seats = event.current_volunteers, "volunteer left");
        Ok(event)
    }

    pub async fn participants(&self, event_id: Uuid) -> Result<Vec<Participant>, DbError> {
        self.get(event_id).await?;
        let participants = sqlx::query_as(
            r#"
            SELECT u.id AS user_id, u.username, u.full_name, u.email, u.phone, p.joined_at
            FROM event_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.event_id = $1
            ORDER BY p.joined_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool)
        .await?;
        Ok(participants)
    }

    /// Events a user has joined, soonest first.
    pub async fn events_for_user(
        &self,
        user_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Event>, DbError> {
        let columns = EVENT_COLUMNS
            .split(", ")
            .map(|c| format!("e.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            r#"
            SELECT {columns}, COUNT(*) OVER() AS total
            FROM event_participants p
            JOIN events e ON e.id = p.event_id
            WHERE p.user_id = $1
            ORDER BY e.starts_at ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool)
        .await?;
        paginate(rows, page)
    }

    /// Record a participant's rating of an event (once per user).
    pub async fn submit_feedback(&self, new: NewFeedback) -> Result<EventFeedback, DbError> {
        self.get(new.event_id).await?;

        let feedback: Option<EventFeedback> = sqlx::query_as(
            r#"
            WITH inserted AS (
                INSERT INTO event_feedback (event_id, user_id, rating, comment)
                SELECT $1, $2, $3, $4
                WHERE EXISTS (
                    SELECT 1 FROM event_participants WHERE event_id = $1 AND user_id = $2
                )
                RETURNING id, event_id, user_id, rating, comment, created_at
            )
            SELECT i.id, i.event_id, i.user_id, u.full_name, i.rating, i.comment, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(new.event_id)
        .bind(new.user_id)
        .bind(new.rating)
        .bind(new.comment.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DbError::from(e).on_conflict("feedback already submitted"))?;

        feedback.ok_or_else(|| DbError::forbidden("only participants can leave feedback"))
    }

    pub async fn feedback(&self, event_id: Uuid) -> Result<Vec<EventFeedback>, DbError> {
        let feedback = sqlx::query_as(
            r#"
            SELECT f.id, f.event_id, f.user_id, u.full_name, f.rating, f.comment, f.created_at
            FROM event_feedback f
            JOIN users u ON u.id = f.user_id
            WHERE f.event_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool)
        .await?;
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(total: i32, current: i32) -> Event {
        Event {
            id: Uuid::nil(),
            title: "Tree planting".into(),
            description: None,
            location: None,
            latitude: None,
            longitude: None,
            starts_at: Utc::now(),
            ends_at: None,
            total_volunteers: total,
            current_volunteers: current,
            status: "open".into(),
            created_by: None,
            created_by_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn capacity_helpers() {
        assert_eq!(event(10, 3).slots_left(), 7);
        assert!(!event(10, 9).is_full());
        assert!(event(10, 10).is_full());
        assert_eq!(event(5, 7).slots_left(), 0);
    }
}
