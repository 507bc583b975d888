//! Community forum endpoints - posts, comments, likes, polls

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::page_of;
use crate::db::{
    Comment, ForumRepo, LikeState, NewPoll, NewPost, Patch, Poll, Post, PostDetail,
};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{optional_text, ActorKind, Body, Paginated, Title, ValidationError};

const MAX_CATEGORY_LEN: usize = 64;

#[derive(Deserialize)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub poll: Option<PollRequest>,
}

#[derive(Deserialize, Default)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct PostListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub option_id: Uuid,
}

impl CreatePostRequest {
    fn validate(self, actor: Actor) -> Result<NewPost, ValidationError> {
        let poll = self
            .poll
            .map(|p| NewPoll::new(&p.question, &p.options))
            .transpose()?;
        Ok(NewPost {
            author: actor.author(),
            title: Title::new(&self.title)?.into_string(),
            content: Body::new("content", &self.content)?.into_string(),
            category: optional_text("category", self.category.as_deref(), MAX_CATEGORY_LEN)?,
            poll,
        })
    }
}

impl UpdatePostRequest {
    fn into_patch(self) -> Result<Patch, ValidationError> {
        let mut patch = Patch::new("forum_posts", "id");
        if let Some(title) = self.title {
            patch.set("title", Title::new(&title)?.into_string());
        }
        if let Some(content) = self.content {
            patch.set("content", Body::new("content", &content)?.into_string());
        }
        if let Some(category) = self.category {
            patch.set(
                "category",
                optional_text("category", Some(&category), MAX_CATEGORY_LEN)?,
            );
        }
        if patch.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        Ok(patch)
    }
}

/// Admins moderate; everyone else may only touch their own content.
fn moderator(actor: &Actor) -> bool {
    actor.kind == ActorKind::Admin
}

/// GET /forum/posts
async fn list_posts(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    let page = page_of(query.page, query.per_page);
    let posts = ForumRepo::new(&state.pool)
        .list_posts(
            actor.author(),
            query.category.as_deref(),
            query.search.as_deref(),
            page,
        )
        .await?;
    Ok(Json(posts))
}

/// POST /forum/posts
async fn create_post(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostDetail>), ApiError> {
    let new = req.validate(actor)?;
    let post = ForumRepo::new(&state.pool).create_post(new).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /forum/posts/{id}
async fn get_post(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<PostDetail>, ApiError> {
    let post = ForumRepo::new(&state.pool)
        .get_post(id, actor.author())
        .await?;
    Ok(Json(post))
}

/// PATCH /forum/posts/{id} - author only
async fn update_post(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<PostDetail>, ApiError> {
    let patch = req.into_patch()?;
    let post = ForumRepo::new(&state.pool)
        .update_post(id, actor.author(), false, patch)
        .await?;
    Ok(Json(post))
}

/// DELETE /forum/posts/{id}
async fn delete_post(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    ForumRepo::new(&state.pool)
        .delete_post(id, actor.author(), moderator(&actor))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /forum/posts/{id}/comments
async fn add_comment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let content = Body::new("content", &req.content)?;
    let comment = ForumRepo::new(&state.pool)
        .add_comment(id, actor.author(), content.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /forum/comments/{id}
async fn delete_comment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<StatusCode, ApiError> {
    ForumRepo::new(&state.pool)
        .delete_comment(id, actor.author(), moderator(&actor))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /forum/posts/{id}/like - toggles
async fn toggle_like(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<LikeState>, ApiError> {
    let like = ForumRepo::new(&state.pool)
        .toggle_like(id, actor.author())
        .await?;
    Ok(Json(like))
}

/// GET /forum/polls/{id}
async fn get_poll(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Poll>, ApiError> {
    let poll = ForumRepo::new(&state.pool).poll(id, actor.author()).await?;
    Ok(Json(poll))
}

/// POST /forum/polls/{id}/vote
async fn vote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ForumRepo::new(&state.pool)
        .vote(id, actor.author(), req.option_id)
        .await?;
    Ok(Json(poll))
}

/// Forum routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/forum/posts", get(list_posts).post(create_post))
        .route(
            "/forum/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/forum/posts/{id}/comments", post(add_comment))
        .route("/forum/posts/{id}/like", post(toggle_like))
        .route("/forum/comments/{id}", delete(delete_comment))
        .route("/forum/polls/{id}", get(get_poll))
        .route("/forum/polls/{id}/vote", post(vote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, user};
    use serde_json::json;

    #[tokio::test]
    async fn forum_requires_identity() {
        let (status, _) = send("GET", "/forum/posts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn poll_needs_two_options() {
        let (status, body) = send(
            "POST",
            "/forum/posts",
            user(),
            Some(json!({
                "title": "Next outreach site?",
                "content": "Vote below.",
                "poll": {"question": "Where?", "options": ["Tondo"]}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "options");
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let uri = format!("/forum/posts/{}/comments", Uuid::new_v4());
        let (status, body) = send("POST", &uri, admin(), Some(json!({"content": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "content");
    }

    #[test]
    fn only_admins_moderate() {
        let staff = Actor {
            id: Uuid::new_v4(),
            kind: ActorKind::Staff,
        };
        let admin = Actor {
            id: Uuid::new_v4(),
            kind: ActorKind::Admin,
        };
        assert!(!moderator(&staff));
        assert!(moderator(&admin));
    }

    #[test]
    fn post_keeps_poll_options_in_order() {
        let req = CreatePostRequest {
            title: "Outreach".into(),
            content: "Pick a date".into(),
            category: Some("events".into()),
            poll: Some(PollRequest {
                question: "When?".into(),
                options: vec!["Saturday".into(), "Sunday".into()],
            }),
        };
        let actor = Actor {
            id: Uuid::nil(),
            kind: ActorKind::User,
        };
        let new = req.validate(actor).unwrap();
        let poll = new.poll.unwrap();
        assert_eq!(poll.options, vec!["Saturday", "Sunday"]);
        assert_eq!(new.author.kind, ActorKind::User);
    }

    #[test]
    fn empty_post_update_is_rejected() {
        assert_eq!(
            UpdatePostRequest::default().into_patch().unwrap_err(),
            ValidationError::NothingToUpdate
        );
    }
}
