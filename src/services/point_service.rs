use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        match_store::{MatchStore, latest_of},
        models::{MatchEntity, PointEntity},
    },
    dto::points::{CreatePointRequest, PointView, UpdatePointRequest},
    error::ServiceError,
    services::{match_service::load_owned_match, session_service},
    state::{
        SharedState,
        fencing::Scorer,
        score::{Tally, tally},
        taxonomy::{Phrase, Situation, classify},
    },
};

const TIMESTAMP_STEP: Duration = Duration::from_millis(1);

/// Classified touch about to be appended to a match.
#[derive(Debug, Clone)]
pub(crate) struct NewPoint {
    pub scorer: Scorer,
    pub situation: Situation,
    pub phrase: Phrase,
    pub note: Option<String>,
    pub snapshot: Tally,
}

/// Append a classified touch to an owned match.
pub async fn add_point(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    request: CreatePointRequest,
) -> Result<PointView, ServiceError> {
    let (situation, phrase) =
        classify(&request.situation, &request.phrase).map_err(ServiceError::InvalidInput)?;
    let new_point = NewPoint {
        scorer: request.scorer,
        situation,
        phrase,
        note: normalize_note(request.note.as_deref()),
        snapshot: request.snapshot(),
    };

    let store = state.require_match_store().await?;
    let entity = load_owned_match(store.as_ref(), owner_id, match_id).await?;
    let point = record_point(store.as_ref(), &entity, new_point).await?;

    resync_live_score(state, store.as_ref(), owner_id, match_id).await;
    Ok(point.into())
}

/// Points of an owned match in chronological order.
pub async fn list_points(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<Vec<PointView>, ServiceError> {
    let store = state.require_match_store().await?;
    load_owned_match(store.as_ref(), owner_id, match_id).await?;
    let points = store.list_points(owner_id, match_id).await?;
    Ok(points.into_iter().map(PointView::from).collect())
}

/// Remove the most recent touch of an owned match and return it.
pub async fn delete_latest_point(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<PointView, ServiceError> {
    let store = state.require_match_store().await?;
    let point = remove_latest_point(store.as_ref(), owner_id, match_id).await?;
    resync_live_score(state, store.as_ref(), owner_id, match_id).await;
    Ok(point.into())
}

/// Reclassify a recorded touch. Scorer and score snapshots stay untouched.
pub async fn update_point(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    point_id: Uuid,
    request: UpdatePointRequest,
) -> Result<PointView, ServiceError> {
    let (situation, phrase) =
        classify(&request.situation, &request.phrase).map_err(ServiceError::InvalidInput)?;

    let store = state.require_match_store().await?;
    load_owned_match(store.as_ref(), owner_id, match_id).await?;
    let mut point = store
        .find_point(owner_id, match_id, point_id)
        .await?
        .ok_or_else(|| point_not_found(point_id))?;

    point.situation = situation;
    point.phrase = phrase;
    point.note = normalize_note(request.note.as_deref());
    store.save_point(point.clone()).await?;
    info!(owner_id, %match_id, %point_id, "point updated");

    Ok(point.into())
}

/// Delete one touch of an owned match.
pub async fn delete_point(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    point_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    load_owned_match(store.as_ref(), owner_id, match_id).await?;
    if !store.delete_point(owner_id, match_id, point_id).await? {
        return Err(point_not_found(point_id));
    }
    info!(owner_id, %match_id, %point_id, "point deleted");

    resync_live_score(state, store.as_ref(), owner_id, match_id).await;
    Ok(())
}

/// Validate the snapshot of `new_point` against the log of `entity` and persist it.
pub(crate) async fn record_point(
    store: &dyn MatchStore,
    entity: &MatchEntity,
    new_point: NewPoint,
) -> Result<PointEntity, ServiceError> {
    let points = store.list_points(&entity.owner_id, entity.id).await?;
    let current = tally(points.iter().map(|point| point.scorer));
    if !current.admits_snapshot(new_point.snapshot) {
        return Err(ServiceError::InvalidInput(format!(
            "score snapshot {}-{} exceeds the recorded score {}-{}",
            new_point.snapshot.me, new_point.snapshot.opponent, current.me, current.opponent
        )));
    }
    let latest = latest_of(&points);
    let previous = latest.map(PointEntity::snapshot).unwrap_or_default();
    if !new_point.snapshot.follows(previous) {
        return Err(ServiceError::InvalidInput(format!(
            "score snapshot {}-{} is behind the previous touch at {}-{}",
            new_point.snapshot.me, new_point.snapshot.opponent, previous.me, previous.opponent
        )));
    }

    let point = PointEntity {
        id: Uuid::new_v4(),
        match_id: entity.id,
        owner_id: entity.owner_id.clone(),
        scorer: new_point.scorer,
        situation: new_point.situation,
        phrase: new_point.phrase,
        note: new_point.note,
        score_me_at_time: new_point.snapshot.me,
        score_opponent_at_time: new_point.snapshot.opponent,
        created_at: next_timestamp(latest),
    };

    store.save_point(point.clone()).await.inspect_err(|err| {
        warn!(match_id = %entity.id, error = %err, "failed to save point");
    })?;
    info!(
        match_id = %entity.id,
        point_id = %point.id,
        scorer = %point.scorer,
        situation = %point.situation,
        phrase = %point.phrase,
        "point recorded"
    );
    Ok(point)
}

/// Delete the latest touch of an owned match.
pub(crate) async fn remove_latest_point(
    store: &dyn MatchStore,
    owner_id: &str,
    match_id: Uuid,
) -> Result<PointEntity, ServiceError> {
    load_owned_match(store, owner_id, match_id).await?;
    let point = store
        .latest_point(owner_id, match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no point to undo".into()))?;

    if !store.delete_point(owner_id, match_id, point.id).await? {
        return Err(point_not_found(point.id));
    }
    info!(owner_id, %match_id, point_id = %point.id, scorer = %point.scorer, "latest point undone");
    Ok(point)
}

/// Trim a note, treating blank text as no note.
pub(crate) fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|note| !note.is_empty())
        .map(str::to_owned)
}

/// Creation time of a new point, strictly after the current latest one. Stores keep
/// millisecond precision, so the step is one millisecond.
fn next_timestamp(latest: Option<&PointEntity>) -> SystemTime {
    let now = SystemTime::now();
    match latest {
        Some(latest) if latest.created_at + TIMESTAMP_STEP > now => {
            latest.created_at + TIMESTAMP_STEP
        }
        _ => now,
    }
}

fn point_not_found(point_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("point `{point_id}` not found"))
}

/// Bring an open live session back in line with the point log after a change made outside it.
async fn resync_live_score(
    state: &SharedState,
    store: &dyn MatchStore,
    owner_id: &str,
    match_id: Uuid,
) {
    let Some(session) = state
        .sessions()
        .get(&match_id)
        .filter(|session| session.owner_id() == owner_id)
        .map(|session| session.clone())
    else {
        return;
    };

    match store.list_points(owner_id, match_id).await {
        Ok(points) => {
            session
                .set_score(tally(points.iter().map(|point| point.scorer)))
                .await;
            session_service::publish(&session).await;
        }
        Err(err) => warn!(%match_id, error = %err, "failed to resync live session score"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_notes_become_absent() {
        assert_eq!(normalize_note(None), None);
        assert_eq!(normalize_note(Some("   ")), None);
        assert_eq!(
            normalize_note(Some("  late parry ")),
            Some("late parry".into())
        );
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let future = SystemTime::now() + Duration::from_secs(60);
        let latest = PointEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            owner_id: "user-1".into(),
            scorer: Scorer::Me,
            situation: Situation::FourMetre,
            phrase: Phrase::DirectAttack,
            note: None,
            score_me_at_time: 0,
            score_opponent_at_time: 0,
            created_at: future,
        };
        assert_eq!(next_timestamp(Some(&latest)), future + TIMESTAMP_STEP);
        assert!(next_timestamp(None) <= SystemTime::now());

        let same_instant = PointEntity {
            created_at: SystemTime::now(),
            ..latest
        };
        assert!(next_timestamp(Some(&same_instant)) > same_instant.created_at);
    }
}
