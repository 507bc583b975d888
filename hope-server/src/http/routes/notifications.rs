//! Notification inbox endpoints
//!
//! Every actor reads only their own inbox; the recipient comes from the
//! caller's identity, never from the request.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{page_of, CountResponse};
use crate::db::{NewNotification, Notification, NotificationRepo, Recipient};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{ActorKind, Body, Paginated, Title, UserRole, ValidationError};

const DEFAULT_KIND: &str = "general";
const MAX_KIND_LEN: usize = 32;

#[derive(Deserialize, Default)]
pub struct InboxQuery {
    pub unread_only: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,
    pub recipient_type: Option<String>,
    pub title: String,
    pub message: String,
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub role: String,
    pub title: String,
    pub message: String,
    pub kind: Option<String>,
}

/// Notification kind: a short lowercase tag such as `event` or `donation`.
fn kind(value: Option<&str>) -> Result<String, ValidationError> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_KIND.to_owned()),
        Some(v) => v,
    };
    if value.len() > MAX_KIND_LEN {
        return Err(ValidationError::TooLong {
            field: "kind",
            max: MAX_KIND_LEN,
        });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "kind",
            reason: "must be lowercase letters, digits or underscores",
        });
    }
    Ok(value.to_owned())
}

impl CreateNotificationRequest {
    fn validate(self) -> Result<NewNotification, ValidationError> {
        let recipient_kind = match self.recipient_type.as_deref() {
            Some(t) => ActorKind::parse(t)?,
            None => ActorKind::User,
        };
        Ok(NewNotification {
            recipient: Recipient {
                id: self.recipient_id,
                kind: recipient_kind,
            },
            title: Title::new(&self.title)?.into_string(),
            message: Body::new("message", &self.message)?.into_string(),
            kind: kind(self.kind.as_deref())?,
        })
    }
}

/// GET /notifications
async fn inbox(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Paginated<Notification>>, ApiError> {
    let page = page_of(query.page, query.per_page);
    let notifications = NotificationRepo::new(&state.pool)
        .list_for(actor.recipient(), query.unread_only.unwrap_or(false), page)
        .await?;
    Ok(Json(notifications))
}

/// POST /notifications - staff message a single account
async fn create_notification(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    actor.require_manager()?;
    let new = req.validate()?;
    let notification = NotificationRepo::new(&state.pool).create(new).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /notifications/unread-count
async fn unread_count(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<CountResponse>, ApiError> {
    let count = NotificationRepo::new(&state.pool)
        .unread_count(actor.recipient())
        .await?;
    Ok(Json(CountResponse {
        count: u64::try_from(count).unwrap_or_default(),
    }))
}

/// POST /notifications/{id}/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Notification>, ApiError> {
    let notification = NotificationRepo::new(&state.pool)
        .mark_read(id, actor.recipient())
        .await?;
    Ok(Json(notification))
}

/// POST /notifications/read-all
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<CountResponse>, ApiError> {
    let count = NotificationRepo::new(&state.pool)
        .mark_all_read(actor.recipient())
        .await?;
    Ok(Json(CountResponse { count }))
}

/// DELETE /notifications/{id}
async fn delete_notification(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    NotificationRepo::new(&state.pool)
        .delete(id, actor.recipient())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /notifications/broadcast - every active user with a role
async fn broadcast(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<CountResponse>, ApiError> {
    actor.require_admin()?;
    let role = UserRole::parse(&req.role)?;
    let title = Title::new(&req.title)?;
    let message = Body::new("message", &req.message)?;
    let kind = kind(req.kind.as_deref())?;

    let count = NotificationRepo::new(&state.pool)
        .broadcast_to_role(role, title.as_str(), message.as_str(), &kind)
        .await?;
    Ok(Json(CountResponse { count }))
}

/// Notification routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(inbox).post(create_notification))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/broadcast", post(broadcast))
        .route("/notifications/{id}", delete(delete_notification))
        .route("/notifications/{id}/read", post(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, staff, user};
    use serde_json::json;

    #[tokio::test]
    async fn inbox_requires_identity() {
        let (status, _) = send("GET", "/notifications/unread-count", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn users_cannot_send_notifications() {
        let (status, _) = send(
            "POST",
            "/notifications",
            user(),
            Some(json!({
                "recipient_id": Uuid::new_v4(),
                "title": "Hi",
                "message": "Hello"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn broadcast_is_admin_only() {
        let body = json!({"role": "volunteer", "title": "Reminder", "message": "See you"});
        let (status, _) = send("POST", "/notifications/broadcast", staff(), Some(body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let body = json!({"role": "staff", "title": "Reminder", "message": "See you"});
        let (status, body) = send("POST", "/notifications/broadcast", admin(), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "role");
    }

    #[test]
    fn kind_defaults_and_validates() {
        assert_eq!(kind(None).unwrap(), "general");
        assert_eq!(kind(Some(" ")).unwrap(), "general");
        assert_eq!(kind(Some("report_card")).unwrap(), "report_card");
        assert!(kind(Some("Donation!")).is_err());
    }

    #[test]
    fn recipient_type_defaults_to_user() {
        let req = CreateNotificationRequest {
            recipient_id: Uuid::nil(),
            recipient_type: None,
            title: "Welcome".into(),
            message: "Thanks for joining".into(),
            kind: Some("account".into()),
        };
        let new = req.validate().unwrap();
        assert_eq!(new.recipient, Recipient::user(Uuid::nil()));
    }
}
