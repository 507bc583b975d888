//! User endpoints - registration, profile, face data

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::page_of;
use crate::credentials::hash_secret_async;
use crate::db::{Event, EventRepo, NewUser, Patch, User, UserRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{
    optional_text, Email, FaceDescriptor, Paginated, Password, PersonName, UserRole, Username,
    ValidationError,
};

pub(crate) const MAX_PHONE_LEN: usize = 32;
pub(crate) const MAX_ADDRESS_LEN: usize = 255;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: String,
}

/// Only the fields present are changed; an empty string clears `phone` or
/// `address`.
#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct FaceRequest {
    pub descriptor: Vec<f32>,
}

#[derive(Serialize)]
pub struct FaceMatchResponse {
    pub user: User,
    pub distance: f32,
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(NewUserFields, Password), ValidationError> {
        let fields = NewUserFields {
            username: Username::new(&self.username)?,
            email: Email::new(&self.email)?,
            full_name: PersonName::new(&self.full_name)?,
            phone: optional_text("phone", self.phone.as_deref(), MAX_PHONE_LEN)?,
            address: optional_text("address", self.address.as_deref(), MAX_ADDRESS_LEN)?,
            role: UserRole::parse(&self.role)?,
        };
        Ok((fields, Password::new(&self.password)?))
    }
}

struct NewUserFields {
    username: Username,
    email: Email,
    full_name: PersonName,
    phone: Option<String>,
    address: Option<String>,
    role: UserRole,
}

impl UpdateUserRequest {
    /// Validate the request into a patch (password hashed).
    async fn into_patch(self) -> Result<Patch, ApiError> {
        let mut patch = Patch::new("users", "id");
        if let Some(name) = self.full_name {
            patch.set("full_name", PersonName::new(&name)?.into_string());
        }
        if let Some(email) = self.email {
            patch.set("email", Email::new(&email)?.as_str().to_owned());
        }
        if let Some(phone) = self.phone {
            patch.set("phone", optional_text("phone", Some(&phone), MAX_PHONE_LEN)?);
        }
        if let Some(address) = self.address {
            patch.set(
                "address",
                optional_text("address", Some(&address), MAX_ADDRESS_LEN)?,
            );
        }
        if let Some(password) = self.password {
            let password = Password::new(&password)?;
            patch.set(
                "password_hash",
                hash_secret_async(password.expose().to_owned()).await?,
            );
        }
        if patch.is_empty() {
            return Err(ValidationError::NothingToUpdate.into());
        }
        Ok(patch)
    }
}

/// POST /users - self-registration for volunteers, scholars and sponsors
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let (fields, password) = req.validate()?;
    let password_hash = hash_secret_async(password.expose().to_owned()).await?;

    let user = UserRepo::new(&state.pool)
        .register(NewUser {
            username: fields.username.as_str().to_owned(),
            email: fields.email.as_str().to_owned(),
            password_hash,
            full_name: fields.full_name.into_string(),
            phone: fields.phone,
            address: fields.address,
            role: fields.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<User>, ApiError> {
    actor.require_self_or_manager(id)?;
    let user = UserRepo::new(&state.pool).get(id).await?;
    Ok(Json(user))
}

/// PATCH /users/{id}
async fn update_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    actor.require_self_or_manager(id)?;
    let patch = req.into_patch().await?;
    let user = UserRepo::new(&state.pool).update(id, patch).await?;
    Ok(Json(user))
}

/// PUT /users/{id}/face - store the descriptor used for check-in
async fn set_face(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<FaceRequest>,
) -> Result<Json<User>, ApiError> {
    actor.require_self_or_manager(id)?;
    let descriptor = FaceDescriptor::new(req.descriptor)?;
    let user = UserRepo::new(&state.pool)
        .set_face_descriptor(id, descriptor)
        .await?;
    tracing::info!(user_id = %id, "face descriptor stored");
    Ok(Json(user))
}

/// POST /users/face/match - identify a volunteer at a staffed check-in desk
async fn match_face(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<FaceRequest>,
) -> Result<Json<FaceMatchResponse>, ApiError> {
    actor.require_manager()?;
    let probe = FaceDescriptor::new(req.descriptor)?;
    let (user, distance) = UserRepo::new(&state.pool).find_by_face(&probe).await?;
    Ok(Json(FaceMatchResponse { user, distance }))
}

/// GET /users/{id}/events - events the user joined
async fn user_events(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<Event>>, ApiError> {
    actor.require_self_or_manager(id)?;
    let page = page_of(query.page, query.per_page);
    let events = EventRepo::new(&state.pool).events_for_user(id, page).await?;
    Ok(Json(events))
}

/// User routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register))
        .route("/users/face/match", post(match_face))
        .route("/users/{id}", get(get_user).patch(update_user))
        .route("/users/{id}/face", put(set_face))
        .route("/users/{id}/events", get(user_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{send, staff, user};
    use serde_json::json;
    use uuid::Uuid;

    fn registration() -> serde_json::Value {
        json!({
            "username": "maria_s",
            "email": "Maria@Example.org",
            "password": "long enough secret",
            "full_name": "Maria Santos",
            "role": "volunteer"
        })
    }

    #[tokio::test]
    async fn register_rejects_unknown_role() {
        let mut body = registration();
        body["role"] = json!("admin");
        let (status, body) = send("POST", "/users", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "role");
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let mut body = registration();
        body["password"] = json!("short");
        let (status, body) = send("POST", "/users", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "password");
    }

    #[tokio::test]
    async fn profile_requires_identity() {
        let uri = format!("/users/{}", Uuid::new_v4());
        let (status, _) = send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn users_cannot_read_each_other() {
        let uri = format!("/users/{}", Uuid::new_v4());
        let (status, _) = send("GET", &uri, user(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let id = Uuid::new_v4();
        let uri = format!("/users/{}", id);
        let (status, body) = send("PATCH", &uri, Some((id, "user")), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_id_is_400() {
        let (status, body) = send("GET", "/users/not-a-uuid", staff(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "id");
    }

    #[tokio::test]
    async fn face_match_is_for_staff_desks() {
        let (status, _) = send(
            "POST",
            "/users/face/match",
            user(),
            Some(json!({"descriptor": [0.1, 0.2]})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            "POST",
            "/users/face/match",
            staff(),
            Some(json!({"descriptor": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "face_descriptor");
    }

    #[tokio::test]
    async fn update_builds_patch_for_present_fields() {
        let req = UpdateUserRequest {
            phone: Some("".into()),
            full_name: Some(" Ana Cruz ".into()),
            ..UpdateUserRequest::default()
        };
        let patch = req.into_patch().await.unwrap();
        let columns: Vec<_> = patch.columns().collect();
        assert_eq!(columns, vec!["full_name", "phone"]);
        assert_eq!(patch.get("phone"), Some(&crate::db::PatchValue::Text(None)));
    }
}
