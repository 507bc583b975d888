//! Report card review queue

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::donations::DecisionRequest;
use super::page_of;
use crate::db::{ReportCard, ReportCardRepo};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{Paginated, VerificationStatus};

#[derive(Deserialize, Default)]
pub struct ReportCardListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /report-cards
async fn list_report_cards(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ReportCardListQuery>,
) -> Result<Json<Paginated<ReportCard>>, ApiError> {
    actor.require_manager()?;
    let status = query
        .status
        .as_deref()
        .map(VerificationStatus::parse)
        .transpose()?;
    let page = page_of(query.page, query.per_page);
    let cards = ReportCardRepo::new(&state.pool).list(status, page).await?;
    Ok(Json(cards))
}

/// GET /report-cards/{id}
async fn get_report_card(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ReportCard>, ApiError> {
    let card = ReportCardRepo::new(&state.pool).get(id).await?;
    actor.require_self_or_manager(card.scholar_id)?;
    Ok(Json(card))
}

/// POST /report-cards/{id}/decision
async fn decide_report_card(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ReportCard>, ApiError> {
    actor.require_admin()?;
    let decision = req.into_decision(actor.id)?;
    let card = ReportCardRepo::new(&state.pool).decide(id, decision).await?;
    Ok(Json(card))
}

/// Report card routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/report-cards", get(list_report_cards))
        .route("/report-cards/{id}", get(get_report_card))
        .route("/report-cards/{id}/decision", post(decide_report_card))
}
