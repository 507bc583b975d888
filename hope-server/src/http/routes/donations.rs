//! Sponsor donation endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::page_of;
use super::users::PageQuery;
use crate::db::{Decision, Donation, DonationFilter, DonationRepo, NewDonation};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{
    optional_text, ActorKind, AmountInput, Money, Paginated, ValidationError,
    VerificationDecision, VerificationStatus,
};

const MAX_REFERENCE_LEN: usize = 128;
const MAX_URL_LEN: usize = 2_048;
const MAX_MESSAGE_LEN: usize = 2_000;
pub(crate) const MAX_REASON_LEN: usize = 500;

#[derive(Deserialize)]
pub struct CreateDonationRequest {
    pub scholar_id: Uuid,
    pub amount: AmountInput,
    pub reference: Option<String>,
    pub proof_url: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct DonationListQuery {
    pub status: Option<String>,
    pub sponsor_id: Option<Uuid>,
    pub scholar_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Admin verdict on a pending donation or report card
#[derive(Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
    pub reason: Option<String>,
}

impl DecisionRequest {
    pub(crate) fn into_decision(self, admin_id: Uuid) -> Result<Decision, ValidationError> {
        Ok(Decision {
            decision: VerificationDecision::parse(&self.decision)?,
            admin_id,
            reason: optional_text("reason", self.reason.as_deref(), MAX_REASON_LEN)?,
        })
    }
}

impl CreateDonationRequest {
    fn validate(self, sponsor_id: Uuid) -> Result<NewDonation, ValidationError> {
        let amount = Money::from_input("amount", &self.amount)?;
        if amount.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "amount",
                min: 1,
                max: i64::MAX,
            });
        }
        Ok(NewDonation {
            sponsor_id,
            scholar_id: self.scholar_id,
            amount,
            reference: optional_text("reference", self.reference.as_deref(), MAX_REFERENCE_LEN)?,
            proof_url: optional_text("proof_url", self.proof_url.as_deref(), MAX_URL_LEN)?,
            message: optional_text("message", self.message.as_deref(), MAX_MESSAGE_LEN)?,
        })
    }
}

/// GET /donations
async fn list_donations(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<DonationListQuery>,
) -> Result<Json<Paginated<Donation>>, ApiError> {
    actor.require_manager()?;
    let filter = DonationFilter {
        status: query
            .status
            .as_deref()
            .map(VerificationStatus::parse)
            .transpose()?,
        sponsor_id: query.sponsor_id,
        scholar_id: query.scholar_id,
    };
    let page = page_of(query.page, query.per_page);
    let donations = DonationRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(donations))
}

/// POST /donations - a sponsor records a donation for review
async fn create_donation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateDonationRequest>,
) -> Result<(StatusCode, Json<Donation>), ApiError> {
    actor.require(&[ActorKind::User])?;
    let new = req.validate(actor.id)?;
    let donation = DonationRepo::new(&state.pool).create(new).await?;
    tracing::info!(
        donation_id = %donation.id,
        sponsor_id = %donation.sponsor_id,
        amount_cents = donation.amount_cents,
        "donation submitted"
    );
    Ok((StatusCode::CREATED, Json(donation)))
}

/// GET /donations/{id} - managers, or either party to the donation
async fn get_donation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Donation>, ApiError> {
    let donation = DonationRepo::new(&state.pool).get(id).await?;
    let party = actor.kind == ActorKind::User
        && (actor.id == donation.sponsor_id || actor.id == donation.scholar_id);
    if !party {
        actor.require_manager()?;
    }
    Ok(Json(donation))
}

/// POST /donations/{id}/decision
async fn decide_donation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<Donation>, ApiError> {
    actor.require_admin()?;
    let decision = req.into_decision(actor.id)?;
    let donation = DonationRepo::new(&state.pool).decide(id, decision).await?;
    Ok(Json(donation))
}

/// GET /sponsors/{id}/donations
async fn sponsor_donations(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<Donation>>, ApiError> {
    actor.require_self_or_manager(id)?;
    let page = page_of(query.page, query.per_page);
    let donations = DonationRepo::new(&state.pool)
        .list_for_sponsor(id, page)
        .await?;
    Ok(Json(donations))
}

/// Donation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donations", get(list_donations).post(create_donation))
        .route("/donations/{id}", get(get_donation))
        .route("/donations/{id}/decision", post(decide_donation))
        .route("/sponsors/{id}/donations", get(sponsor_donations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, staff, user};
    use serde_json::json;

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let (status, body) = send(
            "POST",
            "/donations",
            user(),
            Some(json!({"scholar_id": Uuid::new_v4(), "amount": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "amount");
    }

    #[tokio::test]
    async fn staff_cannot_donate() {
        let (status, _) = send(
            "POST",
            "/donations",
            staff(),
            Some(json!({"scholar_id": Uuid::new_v4(), "amount": "500"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn decisions_are_admin_only_and_validated() {
        let uri = format!("/donations/{}/decision", Uuid::new_v4());
        let (status, _) = send("POST", &uri, staff(), Some(json!({"decision": "verify"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send("POST", &uri, admin(), Some(json!({"decision": "approve"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "decision");
    }

    #[tokio::test]
    async fn sponsors_only_see_their_own_history() {
        let uri = format!("/sponsors/{}/donations", Uuid::new_v4());
        let (status, _) = send("GET", &uri, user(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn string_amounts_become_cents() {
        let req = CreateDonationRequest {
            scholar_id: Uuid::nil(),
            amount: AmountInput::Text("1,000.50".into()),
            reference: Some("  GCASH-1234 ".into()),
            proof_url: None,
            message: Some("".into()),
        };
        let new = req.validate(Uuid::nil()).unwrap();
        assert_eq!(new.amount.cents(), 100_050);
        assert_eq!(new.reference.as_deref(), Some("GCASH-1234"));
        assert_eq!(new.message, None);
    }
}
