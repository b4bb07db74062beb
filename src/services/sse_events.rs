use serde::Serialize;
use tracing::{trace, warn};

use crate::{
    dto::{
        session::SessionSnapshot,
        sse::{
            IndicatorClearedEvent, ServerEvent, SessionCloseReason, SessionClosedEvent,
            TimerTickEvent,
        },
    },
    state::{SseHub, fencing::Scorer, timer::Countdown},
};

pub(crate) const EVENT_SESSION_SNAPSHOT: &str = "session.snapshot";
pub(crate) const EVENT_TIMER_TICK: &str = "timer.tick";
pub(crate) const EVENT_INDICATOR_CLEARED: &str = "indicator.cleared";
pub(crate) const EVENT_SESSION_CLOSED: &str = "session.closed";

/// Broadcast the full state of a live session to its subscribers.
pub fn broadcast_session_snapshot(hub: &SseHub, snapshot: &SessionSnapshot) {
    send_event(hub, EVENT_SESSION_SNAPSHOT, snapshot);
}

/// Broadcast the bout clock after a tick, a toggle or a reset.
pub fn broadcast_timer_tick(hub: &SseHub, countdown: Countdown) {
    send_event(hub, EVENT_TIMER_TICK, &TimerTickEvent(countdown));
}

/// Broadcast that the "last scored" indicator went out.
pub fn broadcast_indicator_cleared(hub: &SseHub, scorer: Scorer) {
    send_event(hub, EVENT_INDICATOR_CLEARED, &IndicatorClearedEvent { scorer });
}

/// Broadcast the final event of a session stream.
pub fn broadcast_session_closed(hub: &SseHub, reason: SessionCloseReason) {
    send_event(hub, EVENT_SESSION_CLOSED, &SessionClosedEvent { reason });
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(payload) => {
            let listeners = hub.broadcast(payload);
            trace!(event, listeners, "session event sent");
        }
        Err(err) => warn!(event, error = %err, "failed to serialize session SSE payload"),
    }
}
