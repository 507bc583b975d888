//! Volunteer event endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::page_of;
use crate::db::{
    Event, EventFeedback, EventFilter, EventRepo, NewEvent, NewFeedback, Participant, Patch,
};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{optional_text, ActorKind, EventStatus, Paginated, Title, ValidationError};

const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_LOCATION_LEN: usize = 255;
const MAX_VOLUNTEERS: i64 = 10_000;
const MAX_COMMENT_LEN: usize = 2_000;

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_volunteers: i32,
}

#[derive(Deserialize, Default)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_volunteers: Option<i32>,
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct EventListQuery {
    pub status: Option<String>,
    pub upcoming: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Serialize)]
pub struct FeedbackSummary {
    pub count: usize,
    pub average_rating: Option<f64>,
    pub items: Vec<EventFeedback>,
}

impl FeedbackSummary {
    fn new(items: Vec<EventFeedback>) -> Self {
        let average_rating = if items.is_empty() {
            None
        } else {
            let sum: i64 = items.iter().map(|f| i64::from(f.rating)).sum();
            Some(sum as f64 / items.len() as f64)
        };
        Self {
            count: items.len(),
            average_rating,
            items,
        }
    }
}

fn capacity(total: i32) -> Result<i32, ValidationError> {
    if !(1..=MAX_VOLUNTEERS).contains(&i64::from(total)) {
        return Err(ValidationError::OutOfRange {
            field: "total_volunteers",
            min: 1,
            max: MAX_VOLUNTEERS,
        });
    }
    Ok(total)
}

fn coordinate(field: &'static str, value: f64, limit: i64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value.abs() > limit as f64 {
        return Err(ValidationError::OutOfRange {
            field,
            min: -limit,
            max: limit,
        });
    }
    Ok(value)
}

fn check_schedule(
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match ends_at {
        Some(ends_at) if ends_at <= starts_at => Err(ValidationError::InvalidFormat {
            field: "ends_at",
            reason: "must be after starts_at",
        }),
        _ => Ok(()),
    }
}

impl CreateEventRequest {
    fn validate(self, actor: Actor) -> Result<NewEvent, ValidationError> {
        check_schedule(self.starts_at, self.ends_at)?;
        Ok(NewEvent {
            title: Title::new(&self.title)?.into_string(),
            description: optional_text(
                "description",
                self.description.as_deref(),
                MAX_DESCRIPTION_LEN,
            )?,
            location: optional_text("location", self.location.as_deref(), MAX_LOCATION_LEN)?,
            latitude: self
                .latitude
                .map(|v| coordinate("latitude", v, 90))
                .transpose()?,
            longitude: self
                .longitude
                .map(|v| coordinate("longitude", v, 180))
                .transpose()?,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            total_volunteers: capacity(self.total_volunteers)?,
            created_by: actor.id,
            created_by_type: actor.kind,
        })
    }
}

impl UpdateEventRequest {
    fn into_patch(self) -> Result<Patch, ValidationError> {
        if let (Some(starts_at), ends_at) = (self.starts_at, self.ends_at) {
            check_schedule(starts_at, ends_at)?;
        }

        let mut patch = Patch::new("events", "id");
        if let Some(title) = self.title {
            patch.set("title", Title::new(&title)?.into_string());
        }
        if let Some(description) = self.description {
            patch.set(
                "description",
                optional_text("description", Some(&description), MAX_DESCRIPTION_LEN)?,
            );
        }
        if let Some(location) = self.location {
            patch.set(
                "location",
                optional_text("location", Some(&location), MAX_LOCATION_LEN)?,
            );
        }
        if let Some(latitude) = self.latitude {
            patch.set("latitude", coordinate("latitude", latitude, 90)?);
        }
        if let Some(longitude) = self.longitude {
            patch.set("longitude", coordinate("longitude", longitude, 180)?);
        }
        patch.set_some("starts_at", self.starts_at);
        patch.set_some("ends_at", self.ends_at);
        if let Some(total) = self.total_volunteers {
            patch.set("total_volunteers", capacity(total)?);
        }
        if let Some(status) = self.status {
            patch.set("status", EventStatus::parse(&status)?.as_str());
        }
        if patch.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        Ok(patch)
    }
}

/// GET /events
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Paginated<Event>>, ApiError> {
    let filter = EventFilter {
        status: query.status.as_deref().map(EventStatus::parse).transpose()?,
        upcoming: query.upcoming.unwrap_or(false),
        search: query.search,
    };
    let page = page_of(query.page, query.per_page);
    let events = EventRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(events))
}

/// POST /events
async fn create_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    actor.require_manager()?;
    let new = req.validate(actor)?;
    let event = EventRepo::new(&state.pool).create(new).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Event>, ApiError> {
    let event = EventRepo::new(&state.pool).get(id).await?;
    Ok(Json(event))
}

/// PATCH /events/{id}
async fn update_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<Event>, ApiError> {
    actor.require_manager()?;
    let patch = req.into_patch()?;
    let event = EventRepo::new(&state.pool).update(id, patch).await?;
    Ok(Json(event))
}

/// DELETE /events/{id}
async fn delete_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    actor.require_manager()?;
    EventRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /events/{id}/join
async fn join_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Event>, ApiError> {
    actor.require(&[ActorKind::User])?;
    let event = EventRepo::new(&state.pool).join(id, actor.id).await?;
    Ok(Json(event))
}

/// POST /events/{id}/leave
async fn leave_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Event>, ApiError> {
    actor.require(&[ActorKind::User])?;
    let event = EventRepo::new(&state.pool).leave(id, actor.id).await?;
    Ok(Json(event))
}

/// GET /events/{id}/participants
async fn participants(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Vec<Participant>>, ApiError> {
    actor.require_manager()?;
    let participants = EventRepo::new(&state.pool).participants(id).await?;
    Ok(Json(participants))
}

/// GET /events/{id}/feedback
async fn list_feedback(
    State(state): State<Arc<AppState>>,
    ValidUuid(id): ValidUuid,
) -> Result<Json<FeedbackSummary>, ApiError> {
    let feedback = EventRepo::new(&state.pool).feedback(id).await?;
    Ok(Json(FeedbackSummary::new(feedback)))
}

/// POST /events/{id}/feedback
async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<EventFeedback>), ApiError> {
    actor.require(&[ActorKind::User])?;
    if !(1..=5).contains(&req.rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating",
            min: 1,
            max: 5,
        }
        .into());
    }
    let comment = optional_text("comment", req.comment.as_deref(), MAX_COMMENT_LEN)?;

    let feedback = EventRepo::new(&state.pool)
        .submit_feedback(NewFeedback {
            event_id: id,
            user_id: actor.id,
            rating: req.rating,
            comment,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// Event routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/events/{id}/join", post(join_event))
        .route("/events/{id}/leave", post(leave_event))
        .route("/events/{id}/participants", get(participants))
        .route(
            "/events/{id}/feedback",
            get(list_feedback).post(submit_feedback),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{send, staff, user};
    use serde_json::json;
    use uuid::Uuid;

    fn event_body() -> serde_json::Value {
        json!({
            "title": "Coastal clean-up",
            "starts_at": "2026-11-07T08:00:00Z",
            "total_volunteers": 25
        })
    }

    #[tokio::test]
    async fn volunteers_cannot_create_events() {
        let (status, _) = send("POST", "/events", user(), Some(event_body())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn capacity_must_be_positive() {
        let mut body = event_body();
        body["total_volunteers"] = json!(0);
        let (status, body) = send("POST", "/events", staff(), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "total_volunteers");
    }

    #[tokio::test]
    async fn end_must_follow_start() {
        let mut body = event_body();
        body["ends_at"] = json!("2026-11-07T07:00:00Z");
        let (status, body) = send("POST", "/events", staff(), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "ends_at");
    }

    #[tokio::test]
    async fn only_user_accounts_join() {
        let uri = format!("/events/{}/join", Uuid::new_v4());
        let (status, _) = send("POST", &uri, staff(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send("POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rating_must_be_one_to_five() {
        let uri = format!("/events/{}/feedback", Uuid::new_v4());
        let (status, body) = send("POST", &uri, user(), Some(json!({"rating": 6}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "rating");
    }

    #[tokio::test]
    async fn list_rejects_unknown_status() {
        let (status, body) = send("GET", "/events?status=someday", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "status");
    }

    #[test]
    fn update_patch_validates_status() {
        let req = UpdateEventRequest {
            status: Some("closed".into()),
            total_volunteers: Some(40),
            ..UpdateEventRequest::default()
        };
        let patch = req.into_patch().unwrap();
        assert_eq!(
            patch.columns().collect::<Vec<_>>(),
            vec!["total_volunteers", "status"]
        );

        let bad = UpdateEventRequest {
            status: Some("paused".into()),
            ..UpdateEventRequest::default()
        };
        assert!(bad.into_patch().is_err());
    }

    #[test]
    fn feedback_summary_averages() {
        let item = |rating| EventFeedback {
            id: Uuid::nil(),
            event_id: Uuid::nil(),
            user_id: Uuid::nil(),
            full_name: "Ana".into(),
            rating,
            comment: None,
            created_at: Utc::now(),
        };
        let summary = FeedbackSummary::new(vec![item(4), item(5)]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average_rating, Some(4.5));
        assert_eq!(FeedbackSummary::new(vec![]).average_rating, None);
    }
}
