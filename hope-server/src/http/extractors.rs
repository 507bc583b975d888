//! Custom Axum extractors
//!
//! Authentication happens upstream. The gateway forwards the verified
//! identity as `X-Actor-Id` and `X-Actor-Type`; handlers only authorize.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::ApiError;
use crate::db::{AuthorRef, Recipient};
use crate::models::{ActorKind, ValidationError};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_TYPE_HEADER: &str = "x-actor-type";

/// Caller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub kind: ActorKind,
}

impl Actor {
    /// Fail with 403 unless the caller is one of `kinds`.
    pub fn require(&self, kinds: &[ActorKind]) -> Result<(), ApiError> {
        if kinds.contains(&self.kind) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "{} accounts cannot perform this action",
                self.kind
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require(&[ActorKind::Admin])
    }

    /// Staff and admins run the foundation's back office.
    pub fn is_manager(&self) -> bool {
        matches!(self.kind, ActorKind::Admin | ActorKind::Staff)
    }

    pub fn require_manager(&self) -> Result<(), ApiError> {
        self.require(&[ActorKind::Admin, ActorKind::Staff])
    }

    /// Allow the user themselves, or any manager.
    pub fn require_self_or_manager(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.is_manager() || (self.kind == ActorKind::User && self.id == user_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("not allowed to access another user's data"))
        }
    }

    /// Fail with 403 unless the caller is the given user account.
    pub fn require_user(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.kind == ActorKind::User && self.id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden("only the account owner can do this"))
        }
    }

    pub fn author(&self) -> AuthorRef {
        AuthorRef {
            id: self.id,
            kind: self.kind,
        }
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            id: self.id,
            kind: self.kind,
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::unauthorized(format!("malformed {} header", name)))
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = Uuid::parse_str(header(parts, ACTOR_ID_HEADER)?)
            .map_err(|_| ApiError::unauthorized("actor id is not a valid UUID"))?;
        let kind = header(parts, ACTOR_TYPE_HEADER)?
            .parse::<ActorKind>()
            .map_err(|_| ApiError::unauthorized("unknown actor type"))?;

        Ok(Self { id, kind })
    }
}

/// Extract and validate a UUID from path
pub struct ValidUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidUuid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let uuid = Uuid::parse_str(&id).map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "invalid UUID format",
            })
        })?;

        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Actor, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_actor_headers() {
        let id = Uuid::new_v4();
        let actor = extract(&[
            (ACTOR_ID_HEADER, id.to_string().as_str()),
            (ACTOR_TYPE_HEADER, "Staff"),
        ])
        .await
        .unwrap();
        assert_eq!(actor.id, id);
        assert_eq!(actor.kind, ActorKind::Staff);
    }

    #[tokio::test]
    async fn missing_or_bad_headers_are_unauthorized() {
        assert!(matches!(
            extract(&[]).await,
            Err(ApiError::Unauthorized { .. })
        ));
        assert!(matches!(
            extract(&[(ACTOR_ID_HEADER, "nope"), (ACTOR_TYPE_HEADER, "user")]).await,
            Err(ApiError::Unauthorized { .. })
        ));
        assert!(matches!(
            extract(&[
                (ACTOR_ID_HEADER, Uuid::new_v4().to_string().as_str()),
                (ACTOR_TYPE_HEADER, "robot")
            ])
            .await,
            Err(ApiError::Unauthorized { .. })
        ));
    }

    #[test]
    fn role_checks() {
        let user_id = Uuid::new_v4();
        let user = Actor {
            id: user_id,
            kind: ActorKind::User,
        };
        let staff = Actor {
            id: Uuid::new_v4(),
            kind: ActorKind::Staff,
        };

        assert!(user.require_admin().is_err());
        assert!(staff.require_manager().is_ok());
        assert!(staff.require_admin().is_err());
        assert!(user.require_self_or_manager(user_id).is_ok());
        assert!(user.require_self_or_manager(Uuid::new_v4()).is_err());
        assert!(staff.require_self_or_manager(user_id).is_ok());
        assert!(staff.require_user(user_id).is_err());
    }
}
