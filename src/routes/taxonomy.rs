use axum::{Json, Router, routing::get};

use crate::{
    dto::{ApiResponse, taxonomy::TaxonomyResponse},
    state::SharedState,
};

/// Static vocabulary routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/taxonomy", get(taxonomy))
}

/// Situations with their phrases, and suggested match tags by category.
#[utoipa::path(
    get,
    path = "/taxonomy",
    tag = "taxonomy",
    responses((status = 200, description = "Classification vocabulary", body = ApiResponse<TaxonomyResponse>))
)]
pub async fn taxonomy() -> Json<ApiResponse<TaxonomyResponse>> {
    Json(ApiResponse::new(TaxonomyResponse::build()))
}
