//! Staff account endpoints (admin only)

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::page_of;
use crate::credentials::hash_secret_async;
use crate::db::{NewStaff, Patch, Staff, StaffRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{
    optional_text, ActorKind, Email, Paginated, Password, PersonName, Username, ValidationError,
};

const MAX_POSITION_LEN: usize = 128;

#[derive(Deserialize)]
pub struct CreateStaffRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub position: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateStaffRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub position: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct StaffListQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl UpdateStaffRequest {
    async fn into_patch(self) -> Result<Patch, ApiError> {
        let mut patch = Patch::new("staff_users", "id");
        if let Some(email) = self.email {
            patch.set("email", Email::new(&email)?.as_str().to_owned());
        }
        if let Some(name) = self.full_name {
            patch.set("full_name", PersonName::new(&name)?.into_string());
        }
        if let Some(position) = self.position {
            patch.set(
                "position",
                optional_text("position", Some(&position), MAX_POSITION_LEN)?,
            );
        }
        if let Some(password) = self.password {
            let password = Password::new(&password)?;
            patch.set(
                "password_hash",
                hash_secret_async(password.expose().to_owned()).await?,
            );
        }
        if let Some(active) = self.is_active {
            patch.set("is_active", active);
        }
        if patch.is_empty() {
            return Err(ValidationError::NothingToUpdate.into());
        }
        Ok(patch)
    }
}

/// GET /staff
async fn list_staff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<StaffListQuery>,
) -> Result<Json<Paginated<Staff>>, ApiError> {
    actor.require_admin()?;
    let page = page_of(query.page, query.per_page);
    let staff = StaffRepo::new(&state.pool)
        .list(query.search.as_deref(), page)
        .await?;
    Ok(Json(staff))
}

/// POST /staff
async fn create_staff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<Staff>), ApiError> {
    actor.require_admin()?;
    let username = Username::new(&req.username)?;
    let email = Email::new(&req.email)?;
    let full_name = PersonName::new(&req.full_name)?;
    let position = optional_text("position", req.position.as_deref(), MAX_POSITION_LEN)?;
    let password = Password::new(&req.password)?;
    let password_hash = hash_secret_async(password.expose().to_owned()).await?;

    let staff = StaffRepo::new(&state.pool)
        .create(NewStaff {
            username: username.as_str().to_owned(),
            email: email.as_str().to_owned(),
            password_hash,
            full_name: full_name.into_string(),
            position,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(staff)))
}

/// GET /staff/{id} - admins, or the staff member themselves
async fn get_staff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Staff>, ApiError> {
    if !(actor.kind == ActorKind::Staff && actor.id == id) {
        actor.require_admin()?;
    }
    let staff = StaffRepo::new(&state.pool).get(id).await?;
    Ok(Json(staff))
}

/// PATCH /staff/{id}
async fn update_staff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<UpdateStaffRequest>,
) -> Result<Json<Staff>, ApiError> {
    actor.require_admin()?;
    let patch = req.into_patch().await?;
    let staff = StaffRepo::new(&state.pool).update(id, patch).await?;
    Ok(Json(staff))
}

/// DELETE /staff/{id}
async fn delete_staff(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    actor.require_admin()?;
    StaffRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Staff routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/staff", get(list_staff).post(create_staff))
        .route(
            "/staff/{id}",
            get(get_staff).patch(update_staff).delete(delete_staff),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, staff};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn staff_cannot_manage_staff() {
        let (status, _) = send(
            "POST",
            "/staff",
            staff(),
            Some(json!({
                "username": "desk1",
                "email": "desk1@example.org",
                "password": "long enough secret",
                "full_name": "Front Desk"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_validates_email() {
        let (status, body) = send(
            "POST",
            "/staff",
            admin(),
            Some(json!({
                "username": "desk1",
                "email": "not-an-email",
                "password": "long enough secret",
                "full_name": "Front Desk"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "email");
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let uri = format!("/staff/{}", Uuid::new_v4());
        let (status, _) = send("PATCH", &uri, admin(), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deactivation_is_a_patch() {
        let req = UpdateStaffRequest {
            is_active: Some(false),
            ..UpdateStaffRequest::default()
        };
        let patch = req.into_patch().await.unwrap();
        assert_eq!(patch.columns().collect::<Vec<_>>(), vec!["is_active"]);
    }
}
