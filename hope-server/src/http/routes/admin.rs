//! Admin portal endpoints - dashboard, account lists, moderation

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;

use super::page_of;
use crate::credentials::{hash_secret_async, verify_secret_async};
use crate::db::{
    AdminRepo, Dashboard, ScholarFilter, ScholarProfile, ScholarRepo, User, UserFilter, UserPurge,
    UserRepo,
};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{Mpin, Paginated, ScholarStatus, UserRole};

#[derive(Deserialize, Default)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, Default)]
pub struct ScholarListQuery {
    pub status: Option<String>,
    pub unsponsored: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct ChangeMpinRequest {
    pub current_password: String,
    pub new_mpin: String,
}

/// GET /admin/dashboard
async fn dashboard(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Dashboard>, ApiError> {
    actor.require_admin()?;
    let dashboard = AdminRepo::new(&state.pool).dashboard().await?;
    Ok(Json(dashboard))
}

async fn list_role(
    state: &AppState,
    actor: Actor,
    role: UserRole,
    query: UserListQuery,
) -> Result<Json<Paginated<User>>, ApiError> {
    actor.require_admin()?;
    let filter = UserFilter {
        role: Some(role),
        active: query.active,
        search: query.search,
    };
    let page = page_of(query.page, query.per_page);
    let users = UserRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(users))
}

/// GET /admin/volunteers
async fn volunteers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    list_role(&state, actor, UserRole::Volunteer, query).await
}

/// GET /admin/sponsors
async fn sponsors(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    list_role(&state, actor, UserRole::Sponsor, query).await
}

/// GET /admin/scholars - scholar profiles with sponsor names
async fn scholars(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ScholarListQuery>,
) -> Result<Json<Paginated<ScholarProfile>>, ApiError> {
    actor.require_admin()?;
    let filter = ScholarFilter {
        status: query.status.as_deref().map(ScholarStatus::parse).transpose()?,
        sponsor_id: None,
        unsponsored: query.unsponsored.unwrap_or(false),
        search: query.search,
    };
    let page = page_of(query.page, query.per_page);
    let scholars = ScholarRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(scholars))
}

/// DELETE /admin/users/{id} - remove a user and everything they own
async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<UserPurge>, ApiError> {
    actor.require_admin()?;
    let purge = UserRepo::new(&state.pool).delete(id).await?;
    tracing::info!(user_id = %id, admin_id = %actor.id, "user removed by admin");
    Ok(Json(purge))
}

/// PUT /admin/users/{id}/active
async fn set_active(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<User>, ApiError> {
    actor.require_admin()?;
    let user = UserRepo::new(&state.pool)
        .set_active(id, req.is_active)
        .await?;
    Ok(Json(user))
}

/// PUT /admin/mpin - change the caller's MPIN after re-checking the password
async fn change_mpin(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<ChangeMpinRequest>,
) -> Result<StatusCode, ApiError> {
    actor.require_admin()?;
    let mpin = Mpin::new(&req.new_mpin)?;

    let repo = AdminRepo::new(&state.pool);
    let creds = repo.credentials_by_id(actor.id).await?;
    if !verify_secret_async(req.current_password, creds.password_hash).await? {
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let mpin_hash = hash_secret_async(mpin.expose().to_owned()).await?;
    repo.set_mpin_hash(actor.id, &mpin_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/volunteers", get(volunteers))
        .route("/admin/sponsors", get(sponsors))
        .route("/admin/scholars", get(scholars))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/users/{id}/active", put(set_active))
        .route("/admin/mpin", put(change_mpin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, staff, user};
    use serde_json::json;

    #[tokio::test]
    async fn dashboard_is_admin_only() {
        let (status, _) = send("GET", "/admin/dashboard", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send("GET", "/admin/dashboard", staff(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send("GET", "/admin/volunteers", user(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn scholar_list_validates_status_filter() {
        let (status, body) = send("GET", "/admin/scholars?status=expelled", admin(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "status");
    }

    #[tokio::test]
    async fn new_mpin_must_be_four_digits() {
        let (status, body) = send(
            "PUT",
            "/admin/mpin",
            admin(),
            Some(json!({"current_password": "whatever", "new_mpin": "12a4"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "mpin");
    }
}
