use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Per-session fan-out of [`ServerEvent`]s. Slow listeners lag and skip events
/// rather than hold up the session.
#[derive(Clone)]
pub struct SseHub {
    events: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub keeping up to `capacity` undelivered events per listener.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: broadcast::Sender::new(capacity),
        }
    }

    /// Listen to events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Hand `event` to every open stream; returns how many received it.
    /// Zero is normal while no browser tab follows the session.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_listener() {
        let hub = SseHub::new(4);
        let event = |name: &str, data: &str| ServerEvent {
            event: Some(name.to_owned()),
            data: data.to_owned(),
        };
        assert_eq!(hub.broadcast(event("ping", "0")), 0);

        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.broadcast(event("ping", "1")), 2);

        assert_eq!(first.recv().await.unwrap().data, "1");
        assert_eq!(second.recv().await.unwrap().event.as_deref(), Some("ping"));
    }
}
