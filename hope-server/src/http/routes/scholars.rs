//! Scholar endpoints - profiles, sponsorship, report cards

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::page_of;
use super::users::PageQuery;
use crate::db::{
    Donation, DonationRepo, NewReportCard, NewScholar, Patch, ReportCard, ReportCardHistory,
    ReportCardRepo, ScholarFilter, ScholarProfile, ScholarRepo, UserPurge,
};
use crate::http::error::ApiError;
use crate::http::extractors::{Actor, ValidUuid};
use crate::http::server::AppState;
use crate::models::{
    optional_text, AmountInput, Money, Paginated, ScholarStatus, Title, ValidationError,
};

const MAX_SHORT_TEXT: usize = 64;
const MAX_URL_LEN: usize = 2_048;
const MAX_REMARKS_LEN: usize = 2_000;

#[derive(Deserialize)]
pub struct CreateScholarRequest {
    pub user_id: Uuid,
    pub school: String,
    pub course: Option<String>,
    pub year_level: Option<String>,
    pub amount_needed: Option<AmountInput>,
}

#[derive(Deserialize, Default)]
pub struct UpdateScholarRequest {
    pub school: Option<String>,
    pub course: Option<String>,
    pub year_level: Option<String>,
    pub amount_needed: Option<AmountInput>,
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ScholarListQuery {
    pub status: Option<String>,
    pub sponsor_id: Option<Uuid>,
    pub unsponsored: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct AssignSponsorRequest {
    pub sponsor_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct SubmitReportCardRequest {
    pub academic_year: String,
    pub term: String,
    pub file_url: String,
    pub gpa: Option<f64>,
    pub remarks: Option<String>,
}

fn required_short(field: &'static str, value: &str) -> Result<String, ValidationError> {
    optional_text(field, Some(value), MAX_SHORT_TEXT)?.ok_or(ValidationError::Empty { field })
}

fn gpa(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "gpa",
            min: 0,
            max: 100,
        });
    }
    Ok(value)
}

impl SubmitReportCardRequest {
    fn validate(self, scholar_id: Uuid) -> Result<NewReportCard, ValidationError> {
        let file_url = optional_text("file_url", Some(&self.file_url), MAX_URL_LEN)?
            .ok_or(ValidationError::Empty { field: "file_url" })?;
        Ok(NewReportCard {
            scholar_id,
            academic_year: required_short("academic_year", &self.academic_year)?,
            term: required_short("term", &self.term)?,
            file_url,
            gpa: self.gpa.map(gpa).transpose()?,
            remarks: optional_text("remarks", self.remarks.as_deref(), MAX_REMARKS_LEN)?,
        })
    }
}

impl UpdateScholarRequest {
    /// Status changes are a back-office decision; everything else the scholar
    /// may edit on their own profile.
    fn into_patch(self, manager: bool) -> Result<Patch, ApiError> {
        let mut patch = Patch::new("scholars", "user_id");
        if let Some(school) = self.school {
            patch.set("school", Title::for_field("school", &school)?.into_string());
        }
        if let Some(course) = self.course {
            patch.set(
                "course",
                optional_text("course", Some(&course), MAX_SHORT_TEXT * 2)?,
            );
        }
        if let Some(year_level) = self.year_level {
            patch.set(
                "year_level",
                optional_text("year_level", Some(&year_level), MAX_SHORT_TEXT)?,
            );
        }
        if let Some(amount) = self.amount_needed {
            let amount = Money::from_input("amount_needed", &amount)?;
            patch.set("amount_needed_cents", amount.cents());
        }
        if let Some(status) = self.status {
            if !manager {
                return Err(ApiError::forbidden("only staff can change scholar status"));
            }
            patch.set("status", ScholarStatus::parse(&status)?.as_str());
        }
        if patch.is_empty() {
            return Err(ValidationError::NothingToUpdate.into());
        }
        Ok(patch)
    }
}

/// GET /scholars
async fn list_scholars(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Query(query): Query<ScholarListQuery>,
) -> Result<Json<Paginated<ScholarProfile>>, ApiError> {
    let filter = ScholarFilter {
        status: query.status.as_deref().map(ScholarStatus::parse).transpose()?,
        sponsor_id: query.sponsor_id,
        unsponsored: query.unsponsored.unwrap_or(false),
        search: query.search,
    };
    let page = page_of(query.page, query.per_page);
    let scholars = ScholarRepo::new(&state.pool).list(&filter, page).await?;
    Ok(Json(scholars))
}

/// POST /scholars - a scholar completes their own profile, or staff do it
/// for them
async fn create_scholar(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateScholarRequest>,
) -> Result<(StatusCode, Json<ScholarProfile>), ApiError> {
    actor.require_self_or_manager(req.user_id)?;
    let school = Title::for_field("school", &req.school)?;
    let amount_needed = match &req.amount_needed {
        Some(amount) => Money::from_input("amount_needed", amount)?,
        None => Money::ZERO,
    };

    let profile = ScholarRepo::new(&state.pool)
        .create(NewScholar {
            user_id: req.user_id,
            school: school.into_string(),
            course: optional_text("course", req.course.as_deref(), MAX_SHORT_TEXT * 2)?,
            year_level: optional_text("year_level", req.year_level.as_deref(), MAX_SHORT_TEXT)?,
            amount_needed,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /scholars/{id}
async fn get_scholar(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ScholarProfile>, ApiError> {
    let profile = ScholarRepo::new(&state.pool).get(id).await?;
    Ok(Json(profile))
}

/// PATCH /scholars/{id}
async fn update_scholar(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<UpdateScholarRequest>,
) -> Result<Json<ScholarProfile>, ApiError> {
    actor.require_self_or_manager(id)?;
    let patch = req.into_patch(actor.is_manager())?;
    let profile = ScholarRepo::new(&state.pool).update(id, patch).await?;
    Ok(Json(profile))
}

/// DELETE /scholars/{id} - removes the scholar and their user account
async fn delete_scholar(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<UserPurge>, ApiError> {
    actor.require_admin()?;
    let purge = ScholarRepo::new(&state.pool).delete(id).await?;
    tracing::info!(scholar_id = %id, admin_id = %actor.id, "scholar removed");
    Ok(Json(purge))
}

/// PUT /scholars/{id}/sponsor
async fn assign_sponsor(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<AssignSponsorRequest>,
) -> Result<Json<ScholarProfile>, ApiError> {
    actor.require_manager()?;
    let profile = ScholarRepo::new(&state.pool)
        .assign_sponsor(id, req.sponsor_id)
        .await?;
    Ok(Json(profile))
}

/// GET /scholars/{id}/donations
async fn scholar_donations(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<Donation>>, ApiError> {
    actor.require_self_or_manager(id)?;
    let page = page_of(query.page, query.per_page);
    let donations = DonationRepo::new(&state.pool)
        .list_for_scholar(id, page)
        .await?;
    Ok(Json(donations))
}

/// GET /scholars/{id}/report-cards - the current card
async fn current_report_card(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<ReportCard>, ApiError> {
    actor.require_self_or_manager(id)?;
    let card = ReportCardRepo::new(&state.pool).current(id).await?;
    Ok(Json(card))
}

/// POST /scholars/{id}/report-cards - submit or renew
async fn submit_report_card(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
    Json(req): Json<SubmitReportCardRequest>,
) -> Result<(StatusCode, Json<ReportCard>), ApiError> {
    actor.require_user(id)?;
    let new = req.validate(id)?;
    let card = ReportCardRepo::new(&state.pool).submit(new).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /scholars/{id}/report-cards/history
async fn report_card_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    ValidUuid(id): ValidUuid,
) -> Result<Json<Vec<ReportCardHistory>>, ApiError> {
    actor.require_self_or_manager(id)?;
    let history = ReportCardRepo::new(&state.pool).history(id).await?;
    Ok(Json(history))
}

/// Scholar routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scholars", get(list_scholars).post(create_scholar))
        .route(
            "/scholars/{id}",
            get(get_scholar)
                .patch(update_scholar)
                .delete(delete_scholar),
        )
        .route("/scholars/{id}/sponsor", put(assign_sponsor))
        .route("/scholars/{id}/donations", get(scholar_donations))
        .route(
            "/scholars/{id}/report-cards",
            get(current_report_card).post(submit_report_card),
        )
        .route(
            "/scholars/{id}/report-cards/history",
            get(report_card_history),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::testing::{admin, send, staff, user};
    use serde_json::json;

    #[tokio::test]
    async fn cannot_create_profile_for_someone_else() {
        let (status, _) = send(
            "POST",
            "/scholars",
            user(),
            Some(json!({"user_id": Uuid::new_v4(), "school": "UP Diliman"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn amount_needed_is_validated() {
        let (status, body) = send(
            "POST",
            "/scholars",
            staff(),
            Some(json!({
                "user_id": Uuid::new_v4(),
                "school": "UP Diliman",
                "amount_needed": "12.345"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "amount_needed");
    }

    #[tokio::test]
    async fn only_admins_delete_scholars() {
        let uri = format!("/scholars/{}", Uuid::new_v4());
        let (status, _) = send("DELETE", &uri, staff(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sponsor_assignment_is_back_office() {
        let uri = format!("/scholars/{}/sponsor", Uuid::new_v4());
        let (status, _) = send("PUT", &uri, user(), Some(json!({"sponsor_id": null}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn report_cards_come_from_the_scholar() {
        let id = Uuid::new_v4();
        let uri = format!("/scholars/{}/report-cards", id);
        let card = json!({
            "academic_year": "2026-2027",
            "term": "1st semester",
            "file_url": "https://files.example.org/rc.pdf"
        });
        let (status, _) = send("POST", &uri, admin(), Some(card.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut bad = card;
        bad["gpa"] = json!(101.0);
        let (status, body) = send("POST", &uri, Some((id, "user")), Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "gpa");
    }

    #[test]
    fn scholars_cannot_change_their_own_status() {
        let req = UpdateScholarRequest {
            status: Some("graduated".into()),
            ..UpdateScholarRequest::default()
        };
        let err = req.into_patch(false).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let req = UpdateScholarRequest {
            status: Some("graduated".into()),
            amount_needed: Some(AmountInput::Text("25,000".into())),
            ..UpdateScholarRequest::default()
        };
        let patch = req.into_patch(true).unwrap();
        assert_eq!(
            patch.get("amount_needed_cents"),
            Some(&crate::db::PatchValue::BigInt(Some(2_500_000)))
        );
    }

    #[test]
    fn blank_term_is_rejected() {
        let req = SubmitReportCardRequest {
            academic_year: "2026-2027".into(),
            term: "  ".into(),
            file_url: "https://files.example.org/rc.pdf".into(),
            gpa: Some(1.75),
            remarks: None,
        };
        let err = req.validate(Uuid::nil()).unwrap_err();
        assert_eq!(err.field(), Some("term"));
    }
}
