//! User repository - volunteers, scholars and sponsors
//!
//! Handles:
//! - Registration relying on unique constraints for duplicates
//! - Filtered, paginated listing for the admin portal
//! - Cascading delete of everything a user owns (one transaction)
//! - Face descriptor storage and matching

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{forum, paginate, DbError};
use crate::db::Patch;
use crate::models::{ActorKind, FaceDescriptor, Paginated, Pagination, UserRole};

pub(crate) const USER_COLUMNS: &str = "id, username, email, full_name, phone, address, role, \
     is_active, (face_descriptor IS NOT NULL) AS has_face_data, created_at, updated_at";

/// User record (never includes the password hash)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub has_face_data: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<UserRole> {
        self.role.parse().ok()
    }
}

/// Validated registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: UserRole,
}

/// Login lookup result
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub password_hash: String,
    pub is_active: bool,
}

/// Admin list filters
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub active: Option<bool>,
    /// Case-insensitive match on username, full name or email
    pub search: Option<String>,
}

/// Row counts removed by a cascading delete
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPurge {
    pub participations: u64,
    pub feedback: u64,
    pub notifications: u64,
    pub donations: u64,
    pub report_cards: u64,
    pub posts: u64,
    pub comments: u64,
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user. Duplicate username/email surfaces as
    /// `DbError::Conflict` naming the field.
    pub async fn register(&self, new: NewUser) -> Result<User, DbError> {
        let user: User = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, phone, address, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.full_name)
        .bind(new.phone.as_deref())
        .bind(new.address.as_deref())
        .bind(new.role.as_str())
        .fetch_one(self.pool)
        .await?;

        tracing::info!(user_id = %user.id, role = %new.role, "user registered");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, DbError> {
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Fetch a user and require a role.
    pub async fn get_with_role(&self, id: Uuid, role: UserRole) -> Result<User, DbError> {
        let user = self.get(id).await?;
        if user.role() != Some(role) {
            return Err(DbError::forbidden(format!("user is not a {}", role)));
        }
        Ok(user)
    }

    /// List users, newest first.
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: Pagination,
    ) -> Result<Paginated<User>, DbError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {USER_COLUMNS}, COUNT(*) OVER() AS total FROM users WHERE TRUE"
        ));
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(active) = filter.active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            qb.push(" AND (username ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR full_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        paginate(rows, page)
    }

    /// Apply a partial update built by the caller.
    pub async fn update(&self, id: Uuid, patch: Patch) -> Result<User, DbError> {
        let mut qb = patch
            .into_builder(id, USER_COLUMNS)
            .map_err(|e| DbError::InvalidInput {
                message: e.to_string(),
            })?;
        qb.build_query_as::<User>()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("user", id))
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<User, DbError> {
        let mut patch = Patch::new("users", "id");
        patch.set("is_active", active);
        let user = self.update(id, patch).await?;
        tracing::info!(user_id = %id, active, "user activation changed");
        Ok(user)
    }

    /// Delete a user and everything that references them.
    pub async fn delete(&self, id: Uuid) -> Result<UserPurge, DbError> {
        let mut tx = self.pool.begin().await?;
        let purge = purge_user(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(user_id = %id, ?purge, "user deleted");
        Ok(purge)
    }

    /// Look up login credentials by username or email.
    pub async fn credentials(&self, identifier: &str) -> Result<Option<UserCredentials>, DbError> {
        let creds = sqlx::query_as(
            r#"
            SELECT id, password_hash, is_active
            FROM users
            WHERE LOWER(username) = LOWER($1) OR email = LOWER($1)
            LIMIT 1
            "#,
        )
        .bind(identifier.trim())
        .fetch_optional(self.pool)
        .await?;
        Ok(creds)
    }

    pub async fn set_face_descriptor(
        &self,
        id: Uuid,
        descriptor: FaceDescriptor,
    ) -> Result<User, DbError> {
        sqlx::query_as(&format!(
            r#"
            UPDATE users SET face_descriptor = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(descriptor.into_inner())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", id))
    }

    /// Find the active user whose stored descriptor is closest to `probe`,
    /// provided it is under the match threshold.
    pub async fn find_by_face(&self, probe: &FaceDescriptor) -> Result<(User, f32), DbError> {
        let stored: Vec<(Uuid, Vec<f32>)> = sqlx::query_as(
            r#"
            SELECT id, face_descriptor
            FROM users
            WHERE face_descriptor IS NOT NULL AND is_active
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let candidates = stored.iter().map(|(id, d)| (*id, d.as_slice()));
        let (id, distance) = probe
            .best_match(candidates)
            .ok_or_else(|| DbError::not_found("face match", "descriptor"))?;

        tracing::debug!(user_id = %id, distance, scanned = stored.len(), "face matched");
        Ok((self.get(id).await?, distance))
    }
}

/// Remove a user and their dependent rows inside the caller's transaction.
///
/// Seats held in events are released before the participation rows go.
pub(crate) async fn purge_user(conn: &mut PgConnection, id: Uuid) -> Result<UserPurge, DbError> {
    let mut purge = UserPurge::default();
    let kind = ActorKind::User.as_str();

    let (posts, comments) = forum::purge_author(&mut *conn, id, kind).await?;
    purge.posts = posts;
    purge.comments = comments;

    purge.feedback = sqlx::query("DELETE FROM event_feedback WHERE user_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    sqlx::query(
        r#"
        UPDATE events SET current_volunteers = current_volunteers - 1, updated_at = NOW()
        WHERE id IN (SELECT event_id FROM event_participants WHERE user_id = $1)
          AND current_volunteers > 0
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    purge.participations = sqlx::query("DELETE FROM event_participants WHERE user_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    purge.notifications = sqlx::query(
        "DELETE FROM notifications WHERE recipient_id = $1 AND recipient_type = $2",
    )
    .bind(id)
    .bind(kind)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query("UPDATE scholars SET sponsor_id = NULL, updated_at = NOW() WHERE sponsor_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    purge.donations =
        sqlx::query("DELETE FROM scholar_donations WHERE sponsor_id = $1 OR scholar_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

    sqlx::query("DELETE FROM report_card_history WHERE scholar_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    purge.report_cards = sqlx::query("DELETE FROM report_cards WHERE scholar_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM scholars WHERE user_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(DbError::not_found("user", id));
    }

    Ok(purge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_role_parses_stored_text() {
        let user = User {
            id: Uuid::nil(),
            username: "maria".into(),
            email: "maria@example.org".into(),
            full_name: "Maria Santos".into(),
            phone: None,
            address: None,
            role: "sponsor".into(),
            is_active: true,
            has_face_data: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.role(), Some(UserRole::Sponsor));
    }

    #[test]
    fn user_json_has_no_password_field() {
        let user = User {
            id: Uuid::nil(),
            username: "maria".into(),
            email: "maria@example.org".into(),
            full_name: "Maria Santos".into(),
            phone: None,
            address: None,
            role: "volunteer".into(),
            is_active: true,
            has_face_data: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["has_face_data"], true);
    }
}
