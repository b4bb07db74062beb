//! One live match: the session machine, the running score, the bout clock and the
//! "last scored" indicator, plus the background tasks feeding the clock and clearing the
//! indicator.

use std::{
    future::Future,
    sync::{Arc, Mutex as StdMutex, MutexGuard},
    time::Duration,
};

use tokio::{
    sync::{Mutex, RwLock, broadcast},
    task::JoinHandle,
    time::{self, Instant, timeout},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::SessionSettings,
    dao::models::MatchEntity,
    dto::sse::{ServerEvent, SessionCloseReason},
    error::ServiceError,
    services::sse_events,
    state::{
        SseHub,
        fencing::{FencerColor, Scorer},
        score::Tally,
        session_machine::{
            AbortError, ApplyError, Capture, Plan, PlanError, PlanId, SessionEvent,
            SessionMachine, SessionPhase,
        },
        timer::{Countdown, TICK_INTERVAL, TickOutcome},
    },
};

const SESSION_EVENT_CAPACITY: usize = 32;

/// Point-in-time copy of everything a client renders for a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub match_id: Uuid,
    pub opponent_name: String,
    pub my_color: FencerColor,
    pub phase: SessionPhase,
    /// Number of applied transitions.
    pub version: usize,
    /// Whether a persistence-backed transition is in flight.
    pub pending: bool,
    pub score: Tally,
    pub countdown: Countdown,
    /// Side shown by the "last scored" indicator.
    pub last_scored: Option<Scorer>,
}

#[derive(Debug, Default)]
struct Indicator {
    last: Option<Scorer>,
    generation: u64,
}

/// Server-hosted controller of one live match owned by one user.
pub struct LiveSession {
    match_id: Uuid,
    owner_id: String,
    opponent_name: String,
    my_color: FencerColor,
    machine: RwLock<SessionMachine>,
    score: RwLock<Tally>,
    clock: Arc<Mutex<Countdown>>,
    indicator: Arc<Mutex<Indicator>>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
    indicator_task: StdMutex<Option<JoinHandle<()>>>,
    hub: SseHub,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
    indicator_clear_after: Duration,
}

impl LiveSession {
    /// Open a session for `entity`, seeding the running score with `score`.
    pub fn new(
        entity: &MatchEntity,
        score: Tally,
        settings: SessionSettings,
        transition_timeout: Option<Duration>,
    ) -> Self {
        Self {
            match_id: entity.id,
            owner_id: entity.owner_id.clone(),
            opponent_name: entity.opponent_name.clone(),
            my_color: entity.my_color,
            machine: RwLock::new(SessionMachine::new()),
            score: RwLock::new(score),
            clock: Arc::new(Mutex::new(Countdown::default())),
            indicator: Arc::new(Mutex::new(Indicator::default())),
            ticker: StdMutex::new(None),
            indicator_task: StdMutex::new(None),
            hub: SseHub::new(SESSION_EVENT_CAPACITY),
            transition_gate: Mutex::new(()),
            transition_timeout,
            indicator_clear_after: settings.indicator_clear_after,
        }
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn my_color(&self) -> FencerColor {
        self.my_color
    }

    /// Broadcast hub of this session's event stream.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.hub.subscribe()
    }

    /// Current running score.
    pub async fn score(&self) -> Tally {
        *self.score.read().await
    }

    /// Current session phase.
    pub async fn phase(&self) -> SessionPhase {
        self.machine.read().await.phase()
    }

    /// Touch being classified, if any.
    pub async fn capture(&self) -> Option<Capture> {
        self.machine.read().await.capture().cloned()
    }

    /// Copy everything a client needs to render the session.
    pub async fn view(&self) -> SessionView {
        let snapshot = self.machine.read().await.snapshot();
        let score = *self.score.read().await;
        let countdown = *self.clock.lock().await;
        let last_scored = self.indicator.lock().await.last;

        SessionView {
            match_id: self.match_id,
            opponent_name: self.opponent_name.clone(),
            my_color: self.my_color,
            phase: snapshot.phase,
            version: snapshot.version,
            pending: snapshot.pending.is_some(),
            score,
            countdown,
            last_scored,
        }
    }

    /// Apply an event that needs no persistence.
    pub async fn fire(&self, event: SessionEvent) -> Result<SessionPhase, ServiceError> {
        let mut machine = self.machine.write().await;
        Ok(machine.fire(event)?)
    }

    /// Run `work` between planning and applying `event`.
    ///
    /// Only one persistence-backed transition may be in flight; a concurrent submission is
    /// rejected instead of queued. The plan is aborted when the work fails or times out, which
    /// leaves the phase exactly as it was.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: SessionEvent,
        work: F,
    ) -> Result<(T, SessionPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self
            .transition_gate
            .try_lock()
            .map_err(|_| ServiceError::from(PlanError::AlreadyPending))?;
        let Plan { id: plan_id, .. } = self.plan_transition(event.clone()).await?;

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            match_id = %self.match_id,
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        match_id = %self.match_id,
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }

    async fn plan_transition(&self, event: SessionEvent) -> Result<Plan, PlanError> {
        self.machine.write().await.plan(event)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        self.machine.write().await.apply(plan_id)
    }

    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        self.machine.write().await.abort(plan_id)
    }

    /// Adopt the score read back from the point log after `scorer`'s touch was
    /// persisted, and light the indicator for that side.
    pub async fn record_touch(&self, scorer: Scorer, score: Tally) {
        *self.score.write().await = score;
        self.light_indicator(scorer).await;
    }

    /// Replace the running score after the point log changed outside the session.
    pub async fn set_score(&self, score: Tally) {
        *self.score.write().await = score;
    }

    /// Adopt the score left after the latest touch was deleted and switch the
    /// indicator off.
    pub async fn revert_touch(&self, score: Tally) {
        *self.score.write().await = score;
        {
            let mut indicator = self.indicator.lock().await;
            indicator.last = None;
            indicator.generation += 1;
        }
        replace_task(&self.indicator_task, None);
    }

    async fn light_indicator(&self, scorer: Scorer) {
        let generation = {
            let mut indicator = self.indicator.lock().await;
            indicator.last = Some(scorer);
            indicator.generation += 1;
            indicator.generation
        };

        let handle = spawn_indicator_clear(
            Arc::clone(&self.indicator),
            self.hub.clone(),
            generation,
            self.indicator_clear_after,
        );
        replace_task(&self.indicator_task, Some(handle));
    }

    /// Current state of the bout clock.
    pub async fn countdown(&self) -> Countdown {
        *self.clock.lock().await
    }

    /// Start or pause the bout clock.
    pub async fn toggle_timer(&self) -> Countdown {
        let mut clock = self.clock.lock().await;
        let running = clock.toggle();
        let next = running.then(|| spawn_ticker(Arc::clone(&self.clock), self.hub.clone()));
        replace_task(&self.ticker, next);
        *clock
    }

    /// Pause the bout clock and put a full period back on it.
    pub async fn reset_timer(&self) -> Countdown {
        let mut clock = self.clock.lock().await;
        clock.reset();
        replace_task(&self.ticker, None);
        *clock
    }

    /// Stop the clock and the indicator task and tell subscribers the stream is over.
    pub async fn close(&self, reason: SessionCloseReason) {
        self.clock.lock().await.pause();
        self.stop_tasks();
        sse_events::broadcast_session_closed(&self.hub, reason);
        debug!(match_id = %self.match_id, reason = ?reason, "live session closed");
    }

    fn stop_tasks(&self) {
        replace_task(&self.ticker, None);
        replace_task(&self.indicator_task, None);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

fn lock_slot(slot: &StdMutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Install `next` in `slot`, aborting the task it replaces.
fn replace_task(slot: &StdMutex<Option<JoinHandle<()>>>, next: Option<JoinHandle<()>>) {
    let previous = std::mem::replace(&mut *lock_slot(slot), next);
    if let Some(handle) = previous {
        handle.abort();
    }
}

fn spawn_ticker(clock: Arc<Mutex<Countdown>>, hub: SseHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        loop {
            interval.tick().await;
            let (outcome, countdown) = {
                let mut clock = clock.lock().await;
                let outcome = clock.tick();
                (outcome, *clock)
            };

            match outcome {
                TickOutcome::Suppressed => break,
                TickOutcome::Elapsed => sse_events::broadcast_timer_tick(&hub, countdown),
                TickOutcome::Expired => {
                    sse_events::broadcast_timer_tick(&hub, countdown);
                    debug!("bout clock expired");
                    break;
                }
            }
        }
    })
}

fn spawn_indicator_clear(
    indicator: Arc<Mutex<Indicator>>,
    hub: SseHub,
    generation: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(delay).await;
        let cleared = {
            let mut indicator = indicator.lock().await;
            if indicator.generation != generation {
                None
            } else {
                indicator.last.take()
            }
        };
        if let Some(scorer) = cleared {
            sse_events::broadcast_indicator_cleared(&hub, scorer);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::{session_machine::ConfirmAction, timer::PERIOD_SECONDS};

    fn session(indicator_ms: u64) -> LiveSession {
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            owner_id: "user-1".into(),
            opponent_name: "Dubois".into(),
            my_color: FencerColor::Red,
            score_me: 0,
            score_opponent: 0,
            finalized: false,
            tags: Vec::new(),
            created_at: SystemTime::now(),
        };
        let settings = SessionSettings {
            indicator_clear_after: Duration::from_millis(indicator_ms),
        };
        LiveSession::new(&entity, Tally::default(), settings, Some(Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn running_clock_ticks_once_per_second() {
        let session = session(3000);
        assert!(session.toggle_timer().await.running);

        time::sleep(Duration::from_millis(3500)).await;
        let countdown = session.countdown().await;
        assert_eq!(countdown.remaining_seconds, PERIOD_SECONDS - 3);
        assert!(countdown.running);

        assert!(!session.toggle_timer().await.running);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            session.countdown().await.remaining_seconds,
            PERIOD_SECONDS - 3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_stops_the_clock() {
        let session = session(3000);
        session.toggle_timer().await;
        time::sleep(Duration::from_millis(2500)).await;

        let countdown = session.reset_timer().await;
        assert_eq!(countdown, Countdown::default());
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(session.countdown().await, Countdown::default());
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_clears_after_delay() {
        let session = session(3000);
        let mut events = session.subscribe();

        session.record_touch(Scorer::Me, Tally::new(1, 0)).await;
        assert_eq!(session.view().await.last_scored, Some(Scorer::Me));

        time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(session.view().await.last_scored, None);
        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("indicator.cleared"));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_touch_keeps_indicator_alive() {
        let session = session(3000);
        session.record_touch(Scorer::Me, Tally::new(1, 0)).await;
        time::sleep(Duration::from_millis(2000)).await;
        session.record_touch(Scorer::Opponent, Tally::new(1, 1)).await;
        time::sleep(Duration::from_millis(2000)).await;

        let view = session.view().await;
        assert_eq!(view.last_scored, Some(Scorer::Opponent));
        assert_eq!(view.score, Tally::new(1, 1));
    }

    #[tokio::test]
    async fn failed_work_leaves_phase_untouched() {
        let session = session(3000);
        session.fire(SessionEvent::Tap(Scorer::Me)).await.unwrap();
        session.fire(SessionEvent::Cancel).await.unwrap();

        let result: Result<((), SessionPhase), ServiceError> = session
            .run_transition(
                SessionEvent::RequestConfirm(ConfirmAction::Undo),
                || async { Err(ServiceError::NotFound("point".into())) },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert!(!session.view().await.pending);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out_and_aborts() {
        let session = session(3000);
        let result = session
            .run_transition(SessionEvent::Tap(Scorer::Me), || async {
                time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));
        assert_eq!(session.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn close_announces_reason() {
        let session = session(3000);
        let mut events = session.subscribe();
        session.toggle_timer().await;

        session.close(SessionCloseReason::Closed).await;
        assert!(!session.countdown().await.running);
        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("session.closed"));
        assert_eq!(event.data, r#"{"reason":"closed"}"#);
    }
}
