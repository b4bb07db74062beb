use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the match store and report whether the service runs in degraded mode.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "match store health check failed");
            }
        }
        Err(_) => warn!("match store unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
