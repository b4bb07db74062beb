use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse,
        matches::{
            CreateMatchRequest, FinalizeMatchRequest, MatchListQuery, MatchSummary,
            UpdateTagsRequest,
        },
    },
    error::AppError,
    routes::current_user::CurrentUser,
    services::match_service,
    state::{SharedState, score::Tally},
};

/// Match history and match management routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route("/matches/{id}", get(get_match).delete(delete_match))
        .route("/matches/{id}/tags", put(update_tags))
        .route("/matches/{id}/score", put(finalize_match))
}

/// Start logging a new bout.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = ApiResponse<MatchSummary>),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    user: CurrentUser,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<MatchSummary>>), AppError> {
    let summary = match_service::create_match(&state, user.id(), payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(summary))))
}

/// Match history of the caller, newest first.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    params(MatchListQuery),
    responses(
        (status = 200, description = "Matches", body = ApiResponse<Vec<MatchSummary>>),
        (status = 400, description = "Malformed filter")
    )
)]
pub async fn list_matches(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(query): Query<MatchListQuery>,
) -> Result<Json<ApiResponse<Vec<MatchSummary>>>, AppError> {
    let matches = match_service::list_matches(&state, user.id(), query).await?;
    Ok(Json(ApiResponse::new(matches)))
}

/// One match with its displayed score.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match", body = ApiResponse<MatchSummary>),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MatchSummary>>, AppError> {
    let summary = match_service::get_match(&state, user.id(), id).await?;
    Ok(Json(ApiResponse::new(summary)))
}

/// Replace the descriptive tags of a match.
#[utoipa::path(
    put,
    path = "/matches/{id}/tags",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = UpdateTagsRequest,
    responses(
        (status = 200, description = "Tags replaced", body = ApiResponse<MatchSummary>),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn update_tags(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateTagsRequest>>,
) -> Result<Json<ApiResponse<MatchSummary>>, AppError> {
    let summary = match_service::update_tags(&state, user.id(), id, payload.tags).await?;
    Ok(Json(ApiResponse::new(summary)))
}

/// Record the final score of a match.
#[utoipa::path(
    put,
    path = "/matches/{id}/score",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = FinalizeMatchRequest,
    responses(
        (status = 200, description = "Match finalized", body = ApiResponse<MatchSummary>),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn finalize_match(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<FinalizeMatchRequest>>,
) -> Result<Json<ApiResponse<MatchSummary>>, AppError> {
    let score = Tally::new(payload.score_me, payload.score_opponent);
    let summary = match_service::finalize_match(&state, user.id(), id, score).await?;
    Ok(Json(ApiResponse::new(summary)))
}

/// Delete a match with all of its touches.
#[utoipa::path(
    delete,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 204, description = "Match deleted"),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn delete_match(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match_service::delete_match(&state, user.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
