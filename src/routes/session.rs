use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use axum_valid::Valid;
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse,
        session::{
            ChoosePhraseRequest, ChooseSituationRequest, ConfirmRequest, EditNoteRequest,
            SessionSnapshot, TapRequest,
        },
    },
    error::AppError,
    routes::current_user::CurrentUser,
    services::{session_service, sse_service},
    state::SharedState,
};

type SnapshotResponse = Result<Json<ApiResponse<SessionSnapshot>>, AppError>;

fn respond(snapshot: SessionSnapshot) -> Json<ApiResponse<SessionSnapshot>> {
    Json(ApiResponse::new(snapshot))
}

/// Live match session routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/matches/{id}/session",
            get(get_session).post(open_session).delete(close_session),
        )
        .route("/matches/{id}/session/events", get(session_events))
        .route("/matches/{id}/session/tap", post(tap))
        .route("/matches/{id}/session/situation", post(choose_situation))
        .route("/matches/{id}/session/phrase", post(choose_phrase))
        .route("/matches/{id}/session/note", post(edit_note))
        .route("/matches/{id}/session/save", post(save))
        .route("/matches/{id}/session/cancel", post(cancel))
        .route("/matches/{id}/session/confirm-request", post(request_confirmation))
        .route("/matches/{id}/session/confirm", post(confirm))
        .route("/matches/{id}/session/dismiss", post(dismiss))
        .route("/matches/{id}/session/timer/toggle", post(toggle_timer))
        .route("/matches/{id}/session/timer/reset", post(reset_timer))
}

/// Open the live session of a match, or return the one already open.
#[utoipa::path(
    post,
    path = "/matches/{id}/session",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn open_session(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(session_service::open_session(&state, user.id(), id).await?))
}

/// Current state of an open session.
#[utoipa::path(
    get,
    path = "/matches/{id}/session",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 404, description = "No live session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(session_service::get_session(&state, user.id(), id).await?))
}

/// Leave the match view: drop any capture and stop the clock.
#[utoipa::path(
    delete,
    path = "/matches/{id}/session",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "No live session")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::close_session(&state, user.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Follow a live session: snapshots, clock ticks, indicator clears and the final close.
#[utoipa::path(
    get,
    path = "/matches/{id}/session/events",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "No live session")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (initial, receiver) = sse_service::subscribe_session(&state, user.id(), id).await?;
    info!(user_id = %user.id(), match_id = %id, "new session SSE connection");
    Ok(sse_service::to_sse_stream(initial, receiver, id))
}

/// Tap a lane: start classifying a touch for the fencer on it.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/tap",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = TapRequest,
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "Not idle")
    )
)]
pub async fn tap(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<TapRequest>>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::tap(&state, user.id(), id, payload.color).await?,
    ))
}

/// Choose the situation of the touch being classified.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/situation",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ChooseSituationRequest,
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "No touch is being classified")
    )
)]
pub async fn choose_situation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ChooseSituationRequest>>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::choose_situation(&state, user.id(), id, payload.situation).await?,
    ))
}

/// Choose the phrase of the touch being classified.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/phrase",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ChoosePhraseRequest,
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 400, description = "Phrase not valid for the chosen situation"),
        (status = 409, description = "No situation chosen yet")
    )
)]
pub async fn choose_phrase(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ChoosePhraseRequest>>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::choose_phrase(&state, user.id(), id, payload.phrase).await?,
    ))
}

/// Replace the note of the touch being classified.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/note",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = EditNoteRequest,
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "No phrase chosen yet")
    )
)]
pub async fn edit_note(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<EditNoteRequest>>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::edit_note(&state, user.id(), id, payload.note).await?,
    ))
}

/// Persist the classified touch and count it.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/save",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 400, description = "Classification incomplete"),
        (status = 409, description = "Nothing to save or a save is already in flight"),
        (status = 503, description = "Storage unavailable; the capture is kept")
    )
)]
pub async fn save(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::save_capture(&state, user.id(), id).await?,
    ))
}

/// Drop the touch being classified.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/cancel",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "No touch is being classified")
    )
)]
pub async fn cancel(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::cancel_capture(&state, user.id(), id).await?,
    ))
}

/// Ask for confirmation of undo, end or abandon.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/confirm-request",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "Not idle")
    )
)]
pub async fn request_confirmation(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ConfirmRequest>>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::request_confirmation(&state, user.id(), id, payload.action.into())
            .await?,
    ))
}

/// Carry out the action awaiting confirmation.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/confirm",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 404, description = "No point to undo"),
        (status = 409, description = "Nothing to confirm")
    )
)]
pub async fn confirm(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(session_service::confirm(&state, user.id(), id).await?))
}

/// Withdraw a confirmation request.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/dismiss",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 409, description = "Nothing to dismiss")
    )
)]
pub async fn dismiss(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::dismiss_confirmation(&state, user.id(), id).await?,
    ))
}

/// Start or pause the bout clock.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/timer/toggle",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>)
    )
)]
pub async fn toggle_timer(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::toggle_timer(&state, user.id(), id).await?,
    ))
}

/// Stop the bout clock and restore a full period.
#[utoipa::path(
    post,
    path = "/matches/{id}/session/timer/reset",
    tag = "session",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = ApiResponse<SessionSnapshot>)
    )
)]
pub async fn reset_timer(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> SnapshotResponse {
    Ok(respond(
        session_service::reset_timer(&state, user.id(), id).await?,
    ))
}
