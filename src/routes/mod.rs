use axum::Router;

use crate::state::SharedState;

pub mod auth;
pub mod coach;
pub mod current_user;
pub mod docs;
pub mod health;
pub mod matches;
pub mod points;
pub mod session;
pub mod taxonomy;

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(taxonomy::router())
        .merge(auth::router())
        .merge(matches::router())
        .merge(points::router())
        .merge(session::router())
        .merge(coach::router())
        .merge(docs::router())
        .with_state(state)
}
