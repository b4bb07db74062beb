use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the sabre logger backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::taxonomy::taxonomy,
        crate::routes::auth::login,
        crate::routes::auth::callback,
        crate::routes::auth::sign_out,
        crate::routes::auth::me,
        crate::routes::matches::create_match,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::update_tags,
        crate::routes::matches::finalize_match,
        crate::routes::matches::delete_match,
        crate::routes::points::add_point,
        crate::routes::points::list_points,
        crate::routes::points::delete_latest_point,
        crate::routes::points::update_point,
        crate::routes::points::delete_point,
        crate::routes::session::open_session,
        crate::routes::session::get_session,
        crate::routes::session::close_session,
        crate::routes::session::session_events,
        crate::routes::session::tap,
        crate::routes::session::choose_situation,
        crate::routes::session::choose_phrase,
        crate::routes::session::edit_note,
        crate::routes::session::save,
        crate::routes::session::cancel,
        crate::routes::session::request_confirmation,
        crate::routes::session::confirm,
        crate::routes::session::dismiss,
        crate::routes::session::toggle_timer,
        crate::routes::session::reset_timer,
        crate::routes::coach::generate_report,
        crate::routes::coach::get_report,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::taxonomy::TaxonomyResponse,
            crate::dto::auth::UserView,
            crate::dto::matches::MatchSummary,
            crate::dto::points::PointView,
            crate::dto::session::SessionSnapshot,
            crate::dto::sse::IndicatorClearedEvent,
            crate::dto::sse::SessionClosedEvent,
            crate::dto::coach::CoachReportView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "taxonomy", description = "Situations, phrases and suggested match tags"),
        (name = "auth", description = "OAuth sign-in through the identity provider"),
        (name = "matches", description = "Match history and final scores"),
        (name = "points", description = "Recorded touches of a match"),
        (name = "session", description = "Live match session and its event stream"),
        (name = "coach", description = "AI coaching report"),
    )
)]
pub struct ApiDoc;
