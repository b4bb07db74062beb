use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse,
        points::{CreatePointRequest, PointView, UpdatePointRequest},
    },
    error::AppError,
    routes::current_user::CurrentUser,
    services::point_service,
    state::SharedState,
};

/// Point log routes of a match.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/matches/{id}/points",
            get(list_points).post(add_point),
        )
        .route("/matches/{id}/points/latest", delete(delete_latest_point))
        .route(
            "/matches/{id}/points/{point_id}",
            put(update_point).delete(delete_point),
        )
}

/// Append a classified touch.
#[utoipa::path(
    post,
    path = "/matches/{id}/points",
    tag = "points",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = CreatePointRequest,
    responses(
        (status = 201, description = "Point recorded", body = ApiResponse<PointView>),
        (status = 400, description = "Unknown situation or phrase, or inconsistent score snapshot"),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn add_point(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreatePointRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<PointView>>), AppError> {
    let point = point_service::add_point(&state, user.id(), id, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(point))))
}

/// Touches of a match in chronological order.
#[utoipa::path(
    get,
    path = "/matches/{id}/points",
    tag = "points",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Points", body = ApiResponse<Vec<PointView>>),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn list_points(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PointView>>>, AppError> {
    let points = point_service::list_points(&state, user.id(), id).await?;
    Ok(Json(ApiResponse::new(points)))
}

/// Undo the most recent touch.
#[utoipa::path(
    delete,
    path = "/matches/{id}/points/latest",
    tag = "points",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Removed point", body = ApiResponse<PointView>),
        (status = 404, description = "Unknown match or no point to undo")
    )
)]
pub async fn delete_latest_point(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PointView>>, AppError> {
    let point = point_service::delete_latest_point(&state, user.id(), id).await?;
    Ok(Json(ApiResponse::new(point)))
}

/// Reclassify a recorded touch.
#[utoipa::path(
    put,
    path = "/matches/{id}/points/{point_id}",
    tag = "points",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("point_id" = Uuid, Path, description = "Point identifier")
    ),
    request_body = UpdatePointRequest,
    responses(
        (status = 200, description = "Point updated", body = ApiResponse<PointView>),
        (status = 404, description = "Unknown match or point")
    )
)]
pub async fn update_point(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, point_id)): Path<(Uuid, Uuid)>,
    Valid(Json(payload)): Valid<Json<UpdatePointRequest>>,
) -> Result<Json<ApiResponse<PointView>>, AppError> {
    let point = point_service::update_point(&state, user.id(), id, point_id, payload).await?;
    Ok(Json(ApiResponse::new(point)))
}

/// Delete one touch.
#[utoipa::path(
    delete,
    path = "/matches/{id}/points/{point_id}",
    tag = "points",
    params(
        ("id" = Uuid, Path, description = "Match identifier"),
        ("point_id" = Uuid, Path, description = "Point identifier")
    ),
    responses(
        (status = 204, description = "Point deleted"),
        (status = 404, description = "Unknown match or point")
    )
)]
pub async fn delete_point(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, point_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    point_service::delete_point(&state, user.id(), id, point_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
