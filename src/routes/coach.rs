use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{ApiResponse, coach::CoachReportView},
    error::AppError,
    routes::current_user::CurrentUser,
    services::coach_service,
    state::SharedState,
};

/// AI coaching report routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/coach/report", get(get_report).post(generate_report))
}

/// Regenerate the coaching report from the most recent touches.
#[utoipa::path(
    post,
    path = "/coach/report",
    tag = "coach",
    responses(
        (status = 200, description = "Fresh report", body = ApiResponse<CoachReportView>),
        (status = 400, description = "No recorded touches to analyze"),
        (status = 402, description = "Completion service quota exhausted"),
        (status = 429, description = "Completion service rate limit reached"),
        (status = 502, description = "Completion service failed or returned an unusable report"),
        (status = 503, description = "AI coaching is not configured")
    )
)]
pub async fn generate_report(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<CoachReportView>>, AppError> {
    let report = coach_service::generate_report(&state, user.id()).await?;
    Ok(Json(ApiResponse::new(report)))
}

/// Last generated coaching report.
#[utoipa::path(
    get,
    path = "/coach/report",
    tag = "coach",
    responses(
        (status = 200, description = "Cached report", body = ApiResponse<CoachReportView>),
        (status = 404, description = "No report generated yet")
    )
)]
pub async fn get_report(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<CoachReportView>>, AppError> {
    let report = coach_service::get_report(&state, user.id()).await?;
    Ok(Json(ApiResponse::new(report)))
}
