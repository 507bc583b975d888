//! Login endpoints for the three account kinds
//!
//! A successful login returns the identity the gateway should forward as
//! `X-Actor-Id` / `X-Actor-Type` on later requests. Unknown accounts and wrong
//! secrets produce the same 401.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::{verify_or_dummy_async, verify_secret_async};
use crate::db::{Admin, AdminRepo, Staff, StaffRepo, User, UserRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::models::{ActorKind, ValidationError};

const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
    pub mpin: String,
}

#[derive(Serialize)]
pub struct LoginResponse<T> {
    pub actor_id: Uuid,
    pub actor_type: ActorKind,
    pub account: T,
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed)
}

/// POST /auth/users/login
async fn user_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse<User>>, ApiError> {
    let identifier = required("identifier", &req.identifier)?;
    required("password", &req.password)?;

    let repo = UserRepo::new(&state.pool);
    let creds = repo.credentials(identifier).await?;
    let stored = creds.as_ref().map(|c| c.password_hash.clone());
    let valid = verify_or_dummy_async(req.password, stored).await?;
    let creds = match creds {
        Some(creds) if valid => creds,
        _ => {
            tracing::info!("user login rejected");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
    };
    if !creds.is_active {
        return Err(ApiError::forbidden("account is deactivated"));
    }

    let user = repo.get(creds.id).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        actor_id: user.id,
        actor_type: ActorKind::User,
        account: user,
    }))
}

/// POST /auth/staff/login
async fn staff_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse<Staff>>, ApiError> {
    let identifier = required("identifier", &req.identifier)?;
    required("password", &req.password)?;

    let repo = StaffRepo::new(&state.pool);
    let creds = repo.credentials(identifier).await?;
    let stored = creds.as_ref().map(|c| c.password_hash.clone());
    let valid = verify_or_dummy_async(req.password, stored).await?;
    let creds = match creds {
        Some(creds) if valid => creds,
        _ => return Err(ApiError::unauthorized(INVALID_CREDENTIALS)),
    };
    if !creds.is_active {
        return Err(ApiError::forbidden("account is deactivated"));
    }

    let staff = repo.get(creds.id).await?;
    tracing::info!(staff_id = %staff.id, "staff logged in");
    Ok(Json(LoginResponse {
        actor_id: staff.id,
        actor_type: ActorKind::Staff,
        account: staff,
    }))
}

/// POST /auth/admin/login - password and MPIN must both match
async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<LoginResponse<Admin>>, ApiError> {
    let username = required("username", &req.username)?;
    required("password", &req.password)?;
    required("mpin", &req.mpin)?;

    let repo = AdminRepo::new(&state.pool);
    let creds = repo.credentials_by_username(username).await?;
    let stored = creds.as_ref().map(|c| c.password_hash.clone());
    let password_ok = verify_or_dummy_async(req.password, stored).await?;
    let mpin_ok = match &creds {
        Some(creds) if password_ok => {
            verify_secret_async(req.mpin.trim().to_owned(), creds.mpin_hash.clone()).await?
        }
        _ => false,
    };
    let creds = match creds {
        Some(creds) if mpin_ok => creds,
        _ => {
            tracing::warn!("admin login rejected");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
    };

    let admin = repo.get(creds.id).await?;
    tracing::info!(admin_id = %admin.id, "admin logged in");
    Ok(Json(LoginResponse {
        actor_id: admin.id,
        actor_type: ActorKind::Admin,
        account: admin,
    }))
}

/// Auth routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/users/login", post(user_login))
        .route("/auth/staff/login", post(staff_login))
        .route("/auth/admin/login", post(admin_login))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::send;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn blank_identifier_is_rejected_before_lookup() {
        let (status, body) = send(
            "POST",
            "/auth/users/login",
            None,
            Some(json!({"identifier": "  ", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "identifier");
    }

    #[tokio::test]
    async fn admin_login_requires_mpin() {
        let (status, body) = send(
            "POST",
            "/auth/admin/login",
            None,
            Some(json!({"username": "root", "password": "secret", "mpin": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "mpin");
    }

    #[test]
    fn required_trims() {
        assert_eq!(required("identifier", " maria ").unwrap(), "maria");
        assert!(required("password", "").is_err());
    }
}
