use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{fencing::Scorer, timer::Countdown};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast once per second while the bout clock runs, and on every toggle or reset.
pub struct TimerTickEvent(pub Countdown);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the "last scored" indicator clears itself.
pub struct IndicatorClearedEvent {
    /// Side the indicator was showing.
    pub scorer: Scorer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Why a live session stopped.
pub enum SessionCloseReason {
    /// The match was finalized.
    Ended,
    /// The match was left without finalization.
    Abandoned,
    /// The client closed the session.
    Closed,
    /// The match was deleted.
    Deleted,
}

#[derive(Debug, Serialize, ToSchema)]
/// Last event of a session stream.
pub struct SessionClosedEvent {
    /// Reason the session stopped.
    pub reason: SessionCloseReason,
}
