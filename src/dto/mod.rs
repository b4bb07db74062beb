use std::time::SystemTime;

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;

pub mod auth;
pub mod coach;
pub mod health;
pub mod matches;
pub mod points;
pub mod session;
pub mod sse;
pub mod taxonomy;
pub mod validation;

/// Envelope of every successful JSON response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` in the response envelope.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
