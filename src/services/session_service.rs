//! Live match sessions: score taps, classification capture, confirmations and the bout clock.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::match_store::MatchStore,
    dto::{session::SessionSnapshot, sse::SessionCloseReason},
    error::ServiceError,
    services::{
        match_service::{load_owned_match, write_final_score},
        point_service::{NewPoint, normalize_note, record_point, remove_latest_point},
        sse_events,
    },
    state::{
        LiveSession, SharedState,
        fencing::{FencerColor, Scorer},
        score::{Tally, tally},
        session_machine::{ConfirmAction, SessionEvent, SessionPhase},
        taxonomy::{Phrase, Situation},
    },
};

/// Live session of an owned match; other users' sessions are reported as missing.
pub fn live_session(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<Arc<LiveSession>, ServiceError> {
    state
        .sessions()
        .get(&match_id)
        .filter(|session| session.owner_id() == owner_id)
        .map(|session| Arc::clone(&session))
        .ok_or_else(|| ServiceError::NotFound(format!("no live session for match `{match_id}`")))
}

/// Broadcast the current snapshot of `session` and return it.
pub(crate) async fn publish(session: &LiveSession) -> SessionSnapshot {
    let snapshot = SessionSnapshot::from(session.view().await);
    sse_events::broadcast_session_snapshot(session.hub(), &snapshot);
    snapshot
}

/// Open the live session of an owned match, or return the one already open.
///
/// A new session starts idle with the score tallied from the recorded touches.
pub async fn open_session(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    if let Ok(session) = live_session(state, owner_id, match_id) {
        return Ok(SessionSnapshot::from(session.view().await));
    }

    let store = state.require_match_store().await?;
    let entity = load_owned_match(store.as_ref(), owner_id, match_id).await?;
    let points = store.list_points(owner_id, match_id).await?;
    let score = tally(points.iter().map(|point| point.scorer));

    let session = Arc::clone(&state.sessions().entry(match_id).or_insert_with(|| {
        Arc::new(LiveSession::new(
            &entity,
            score,
            state.config().session,
            state.transition_timeout(),
        ))
    }));
    info!(owner_id, %match_id, score_me = score.me, score_opponent = score.opponent, "live session opened");

    Ok(SessionSnapshot::from(session.view().await))
}

/// Snapshot of an open session.
pub async fn get_session(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    Ok(SessionSnapshot::from(session.view().await))
}

/// Close a session, discarding any capture in progress.
pub async fn close_session(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<(), ServiceError> {
    let (_, session) = state
        .sessions()
        .remove_if(&match_id, |_, session| session.owner_id() == owner_id)
        .ok_or_else(|| ServiceError::NotFound(format!("no live session for match `{match_id}`")))?;
    session.close(SessionCloseReason::Closed).await;
    info!(owner_id, %match_id, "live session closed by client");
    Ok(())
}

/// A lane was tapped: open the classification of a new touch for the matching fencer.
pub async fn tap(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    color: FencerColor,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    let scorer = Scorer::from_tap(session.my_color(), color);
    session.fire(SessionEvent::Tap(scorer)).await?;
    Ok(publish(&session).await)
}

/// Choose the situation of the touch being classified.
pub async fn choose_situation(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    situation: Situation,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::ChooseSituation(situation)).await
}

/// Choose the phrase of the touch being classified.
pub async fn choose_phrase(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    phrase: Phrase,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::ChoosePhrase(phrase)).await
}

/// Replace the note of the touch being classified.
pub async fn edit_note(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    note: String,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::EditNote(note)).await
}

/// Drop the touch being classified.
pub async fn cancel_capture(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::Cancel).await
}

/// Ask for confirmation before undo, end or abandon.
pub async fn request_confirmation(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    action: ConfirmAction,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::RequestConfirm(action)).await
}

/// Withdraw a confirmation request.
pub async fn dismiss_confirmation(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    fire(state, owner_id, match_id, SessionEvent::Dismiss).await
}

/// Persist the classified touch, then count it.
///
/// On failure the capture stays open with every selection intact so the save can be retried.
pub async fn save_capture(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    let capture = session
        .capture()
        .await
        .ok_or_else(|| ServiceError::InvalidState("no touch is being classified".into()))?;
    let (situation, phrase) = capture
        .classification()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let state_handle = Arc::clone(state);
    let owner = owner_id.to_owned();

    // The snapshot and the resulting score are read from the point log inside the gate,
    // so a concurrent REST change to the same match is never counted twice.
    let ((point, score), _) = session
        .run_transition(SessionEvent::Save, || async move {
            let store = state_handle.require_match_store().await?;
            let entity = load_owned_match(store.as_ref(), &owner, match_id).await?;
            let before = logged_score(store.as_ref(), &owner, match_id).await?;
            let new_point = NewPoint {
                scorer: capture.scorer,
                situation,
                phrase,
                note: normalize_note(Some(&capture.note)),
                snapshot: before,
            };
            let point = record_point(store.as_ref(), &entity, new_point).await?;
            let after = logged_score(store.as_ref(), &owner, match_id).await?;
            Ok((point, after))
        })
        .await?;

    session.record_touch(point.scorer, score).await;
    Ok(publish(&session).await)
}

/// Carry out the action awaiting confirmation.
///
/// Undo and end persist first and only then touch the running score or the phase. When that
/// persistence fails the request is dismissed, leaving the session idle with its score intact.
pub async fn confirm(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    let SessionPhase::Confirming(action) = session.phase().await else {
        return Err(ServiceError::InvalidState("nothing to confirm".into()));
    };

    let state_handle = Arc::clone(state);
    let owner = owner_id.to_owned();

    match action {
        ConfirmAction::Undo => {
            let result = session
                .run_transition(SessionEvent::Confirm, || async move {
                    let store = state_handle.require_match_store().await?;
                    remove_latest_point(store.as_ref(), &owner, match_id).await?;
                    logged_score(store.as_ref(), &owner, match_id).await
                })
                .await;
            match result {
                Ok((score, _)) => {
                    session.revert_touch(score).await;
                    Ok(publish(&session).await)
                }
                Err(err) => Err(dismiss_after_failure(&session, err).await),
            }
        }
        ConfirmAction::End => {
            let score = session.score().await;
            let result = session
                .run_transition(SessionEvent::Confirm, || async move {
                    let store = state_handle.require_match_store().await?;
                    let entity = load_owned_match(store.as_ref(), &owner, match_id).await?;
                    write_final_score(store.as_ref(), entity, score).await
                })
                .await;
            match result {
                Ok(_) => Ok(finish(state, &session, SessionCloseReason::Ended).await),
                Err(err) => Err(dismiss_after_failure(&session, err).await),
            }
        }
        ConfirmAction::Abandon => {
            session.fire(SessionEvent::Confirm).await?;
            info!(owner_id, %match_id, "match abandoned without finalization");
            Ok(finish(state, &session, SessionCloseReason::Abandoned).await)
        }
    }
}

/// Start or pause the bout clock.
pub async fn toggle_timer(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    let countdown = session.toggle_timer().await;
    sse_events::broadcast_timer_tick(session.hub(), countdown);
    Ok(publish(&session).await)
}

/// Pause the bout clock and restore a full period.
pub async fn reset_timer(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    let countdown = session.reset_timer().await;
    sse_events::broadcast_timer_tick(session.hub(), countdown);
    Ok(publish(&session).await)
}

/// Tally of the touches currently stored for a match.
async fn logged_score(
    store: &dyn MatchStore,
    owner_id: &str,
    match_id: Uuid,
) -> Result<Tally, ServiceError> {
    let points = store.list_points(owner_id, match_id).await?;
    Ok(tally(points.iter().map(|point| point.scorer)))
}

async fn fire(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    event: SessionEvent,
) -> Result<SessionSnapshot, ServiceError> {
    let session = live_session(state, owner_id, match_id)?;
    session.fire(event).await?;
    Ok(publish(&session).await)
}

/// Publish the terminal snapshot, then unregister and close the session.
async fn finish(
    state: &SharedState,
    session: &Arc<LiveSession>,
    reason: SessionCloseReason,
) -> SessionSnapshot {
    let snapshot = publish(session).await;
    state
        .sessions()
        .remove_if(&session.match_id(), |_, current| Arc::ptr_eq(current, session));
    session.close(reason).await;
    snapshot
}

/// Return to idle after a failed confirmation, unless the failure was a conflicting submission
/// that still owns the pending transition.
async fn dismiss_after_failure(session: &LiveSession, err: ServiceError) -> ServiceError {
    if matches!(err, ServiceError::InvalidState(_)) {
        return err;
    }

    warn!(match_id = %session.match_id(), error = %err, "confirmed action failed; dismissing");
    match session.fire(SessionEvent::Dismiss).await {
        Ok(_) => {
            publish(session).await;
        }
        Err(dismiss_err) => {
            warn!(match_id = %session.match_id(), error = %dismiss_err, "failed to dismiss confirmation");
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::{MatchStore, memory::MemoryMatchStore},
            models::{MatchEntity, PointEntity},
        },
        state::{AppState, score::Tally},
    };

    async fn state_with_match() -> (SharedState, Uuid) {
        let state = AppState::new(AppConfig::default(), None, None);
        let store = MemoryMatchStore::new();
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            owner_id: "user-1".into(),
            opponent_name: "Dubois".into(),
            my_color: FencerColor::Red,
            score_me: 0,
            score_opponent: 0,
            finalized: false,
            tags: Vec::new(),
            created_at: std::time::SystemTime::now(),
        };
        let match_id = entity.id;
        store.save_match(entity).await.unwrap();
        state.set_match_store(Arc::new(store)).await;
        (state, match_id)
    }

    async fn score_touch(state: &SharedState, match_id: Uuid, color: FencerColor) {
        tap(state, "user-1", match_id, color).await.unwrap();
        choose_situation(state, "user-1", match_id, Situation::FourMetre)
            .await
            .unwrap();
        choose_phrase(state, "user-1", match_id, Phrase::CounterAttack)
            .await
            .unwrap();
        save_capture(state, "user-1", match_id).await.unwrap();
    }

    #[tokio::test]
    async fn saved_touch_is_counted_and_persisted() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();

        score_touch(&state, match_id, FencerColor::Red).await;
        score_touch(&state, match_id, FencerColor::Green).await;

        let snapshot = get_session(&state, "user-1", match_id).await.unwrap();
        assert_eq!(snapshot.score, Tally::new(1, 1));
        assert_eq!(snapshot.last_scored, Some(Scorer::Opponent));

        let store = state.match_store().await.unwrap();
        let points = store.list_points("user-1", match_id).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].score_me_at_time, 1);
        assert_eq!(points[1].score_opponent_at_time, 0);
    }

    #[tokio::test]
    async fn saved_touch_takes_its_score_from_the_point_log() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();

        // A touch stored behind the session's back, as a racing REST call would leave it.
        let store = state.match_store().await.unwrap();
        store
            .save_point(PointEntity {
                id: Uuid::new_v4(),
                match_id,
                owner_id: "user-1".into(),
                scorer: Scorer::Me,
                situation: Situation::FourMetre,
                phrase: Phrase::DirectAttack,
                note: None,
                score_me_at_time: 0,
                score_opponent_at_time: 0,
                created_at: std::time::SystemTime::now(),
            })
            .await
            .unwrap();

        score_touch(&state, match_id, FencerColor::Red).await;

        let snapshot = get_session(&state, "user-1", match_id).await.unwrap();
        assert_eq!(snapshot.score, Tally::new(2, 0));
        let points = store.list_points("user-1", match_id).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].score_me_at_time, 1);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_capture() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();
        tap(&state, "user-1", match_id, FencerColor::Red).await.unwrap();
        choose_situation(&state, "user-1", match_id, Situation::FourMetre)
            .await
            .unwrap();
        choose_phrase(&state, "user-1", match_id, Phrase::PointInLine)
            .await
            .unwrap();
        edit_note(&state, "user-1", match_id, "kept".into())
            .await
            .unwrap();

        state.update_degraded(true);
        assert!(matches!(
            save_capture(&state, "user-1", match_id).await,
            Err(ServiceError::Degraded)
        ));

        let session = live_session(&state, "user-1", match_id).unwrap();
        let capture = session.capture().await.unwrap();
        assert_eq!(capture.phrase, Some(Phrase::PointInLine));
        assert_eq!(capture.note, "kept");
        assert_eq!(session.score().await, Tally::default());
    }

    #[tokio::test]
    async fn undo_reverts_latest_touch() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();
        score_touch(&state, match_id, FencerColor::Red).await;
        score_touch(&state, match_id, FencerColor::Green).await;

        request_confirmation(&state, "user-1", match_id, ConfirmAction::Undo)
            .await
            .unwrap();
        let snapshot = confirm(&state, "user-1", match_id).await.unwrap();
        assert_eq!(snapshot.score, Tally::new(1, 0));
        assert_eq!(snapshot.last_scored, None);
    }

    #[tokio::test]
    async fn undo_without_points_returns_to_idle() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();
        request_confirmation(&state, "user-1", match_id, ConfirmAction::Undo)
            .await
            .unwrap();

        assert!(matches!(
            confirm(&state, "user-1", match_id).await,
            Err(ServiceError::NotFound(_))
        ));
        let session = live_session(&state, "user-1", match_id).unwrap();
        assert_eq!(session.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn ending_finalizes_and_closes() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();
        score_touch(&state, match_id, FencerColor::Red).await;

        request_confirmation(&state, "user-1", match_id, ConfirmAction::End)
            .await
            .unwrap();
        let snapshot = confirm(&state, "user-1", match_id).await.unwrap();
        assert_eq!(
            snapshot.phase,
            crate::dto::session::SessionPhaseName::Ended
        );
        assert!(live_session(&state, "user-1", match_id).is_err());

        let store = state.match_store().await.unwrap();
        let entity = store.find_match("user-1", match_id).await.unwrap().unwrap();
        assert!(entity.finalized);
        assert_eq!(entity.stored_score(), Tally::new(1, 0));
    }

    #[tokio::test]
    async fn abandoning_keeps_match_unfinalized() {
        let (state, match_id) = state_with_match().await;
        open_session(&state, "user-1", match_id).await.unwrap();
        request_confirmation(&state, "user-1", match_id, ConfirmAction::Abandon)
            .await
            .unwrap();
        confirm(&state, "user-1", match_id).await.unwrap();

        let store = state.match_store().await.unwrap();
        let entity = store.find_match("user-1", match_id).await.unwrap().unwrap();
        assert!(!entity.finalized);
        assert!(live_session(&state, "user-1", match_id).is_err());
    }

    #[tokio::test]
    async fn sessions_are_private() {
        let (state, match_id) = state_with_match().await;
        assert!(matches!(
            open_session(&state, "user-2", match_id).await,
            Err(ServiceError::NotFound(_))
        ));
        open_session(&state, "user-1", match_id).await.unwrap();
        assert!(matches!(
            tap(&state, "user-2", match_id, FencerColor::Red).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
