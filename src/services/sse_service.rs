use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{session::SessionSnapshot, sse::ServerEvent},
    error::ServiceError,
    services::{session_service, sse_events::{EVENT_SESSION_CLOSED, EVENT_SESSION_SNAPSHOT}},
    state::SharedState,
};

/// Subscribe to the event stream of an owned live session.
///
/// The receiver is primed with the current snapshot so a client renders immediately after
/// connecting.
pub async fn subscribe_session(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<(ServerEvent, broadcast::Receiver<ServerEvent>), ServiceError> {
    let session = session_service::live_session(state, owner_id, match_id)?;
    let receiver = session.subscribe();
    let snapshot = SessionSnapshot::from(session.view().await);
    let initial = ServerEvent::json(Some(EVENT_SESSION_SNAPSHOT.to_string()), &snapshot)
        .map_err(|err| ServiceError::InvalidState(format!("failed to encode snapshot: {err}")))?;
    Ok((initial, receiver))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Serve a session's events as SSE. The stream ends after `session.closed`, when
/// the hub goes away, or when the client disconnects.
pub fn to_sse_stream(
    initial: ServerEvent,
    mut receiver: broadcast::Receiver<ServerEvent>,
    match_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut next = Some(initial);
        while let Some(payload) = next.take() {
            let last = payload.event.as_deref() == Some(EVENT_SESSION_CLOSED);
            if tx.send(Ok(to_event(payload))).await.is_err() || last {
                break;
            }

            next = tokio::select! {
                _ = tx.closed() => None,
                received = next_event(&mut receiver, match_id) => received,
            };
        }

        info!(%match_id, "session SSE stream finished");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn next_event(
    receiver: &mut broadcast::Receiver<ServerEvent>,
    match_id: Uuid,
) -> Option<ServerEvent> {
    loop {
        match receiver.recv().await {
            Ok(payload) => return Some(payload),
            Err(RecvError::Closed) => return None,
            Err(RecvError::Lagged(skipped)) => {
                debug!(%match_id, skipped, "session SSE listener lagging");
            }
        }
    }
}
