use std::{sync::Arc, time::SystemTime};

use futures::future::try_join_all;
use time::{Date, OffsetDateTime, macros::format_description};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{match_store::MatchStore, models::MatchEntity},
    dto::{
        matches::{CreateMatchRequest, MatchListQuery, MatchSummary},
        sse::SessionCloseReason,
    },
    error::ServiceError,
    state::{
        SharedState,
        score::{Tally, displayed_score, tally},
        taxonomy::normalize_tags,
    },
};

/// Start logging a new bout for `owner_id`.
pub async fn create_match(
    state: &SharedState,
    owner_id: &str,
    request: CreateMatchRequest,
) -> Result<MatchSummary, ServiceError> {
    let opponent_name = request.opponent_name.trim();
    if opponent_name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "opponent name must not be empty".into(),
        ));
    }

    let entity = MatchEntity {
        id: Uuid::new_v4(),
        owner_id: owner_id.to_owned(),
        opponent_name: opponent_name.to_owned(),
        my_color: request.my_color,
        score_me: 0,
        score_opponent: 0,
        finalized: false,
        tags: normalize_tags(&request.tags),
        created_at: SystemTime::now(),
    };

    let store = state.require_match_store().await?;
    store.save_match(entity.clone()).await.inspect_err(|err| {
        warn!(owner_id, match_id = %entity.id, error = %err, "failed to save new match");
    })?;
    info!(owner_id, match_id = %entity.id, color = %entity.my_color, "match created");

    Ok(MatchSummary::new(entity, Tally::default(), 0))
}

/// Match history of `owner_id`, newest first, narrowed by the optional filters.
pub async fn list_matches(
    state: &SharedState,
    owner_id: &str,
    query: MatchListQuery,
) -> Result<Vec<MatchSummary>, ServiceError> {
    let filter = MatchFilter::parse(&query)?;
    let store = state.require_match_store().await?;

    let matches = store
        .list_matches(owner_id)
        .await?
        .into_iter()
        .filter(|entity| filter.accepts(entity))
        .map(|entity| summarize(Arc::clone(&store), entity));

    try_join_all(matches).await
}

/// One owned match with its displayed score.
pub async fn get_match(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let entity = load_owned_match(store.as_ref(), owner_id, match_id).await?;
    summarize(store, entity).await
}

/// Replace the tag set of a match.
pub async fn update_tags(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    tags: Vec<String>,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let mut entity = load_owned_match(store.as_ref(), owner_id, match_id).await?;
    entity.tags = normalize_tags(&tags);
    store.save_match(entity.clone()).await?;
    summarize(store, entity).await
}

/// Record an explicit final score.
pub async fn finalize_match(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
    score: Tally,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let entity = load_owned_match(store.as_ref(), owner_id, match_id).await?;
    let entity = write_final_score(store.as_ref(), entity, score).await?;
    summarize(store, entity).await
}

/// Delete a match with all of its points and close its live session.
pub async fn delete_match(
    state: &SharedState,
    owner_id: &str,
    match_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    if !store.delete_match(owner_id, match_id).await? {
        return Err(match_not_found(match_id));
    }
    info!(owner_id, %match_id, "match deleted");

    let removed = state
        .sessions()
        .remove_if(&match_id, |_, session| session.owner_id() == owner_id);
    if let Some((_, session)) = removed {
        session.close(SessionCloseReason::Deleted).await;
    }
    Ok(())
}

/// Load a match owned by `owner_id`; someone else's match is reported as missing.
pub(crate) async fn load_owned_match(
    store: &dyn MatchStore,
    owner_id: &str,
    match_id: Uuid,
) -> Result<MatchEntity, ServiceError> {
    store
        .find_match(owner_id, match_id)
        .await?
        .ok_or_else(|| match_not_found(match_id))
}

/// Persist `score` as the final score of `entity`.
pub(crate) async fn write_final_score(
    store: &dyn MatchStore,
    mut entity: MatchEntity,
    score: Tally,
) -> Result<MatchEntity, ServiceError> {
    entity.score_me = score.me;
    entity.score_opponent = score.opponent;
    entity.finalized = true;
    store.save_match(entity.clone()).await.inspect_err(|err| {
        warn!(match_id = %entity.id, error = %err, "failed to finalize match");
    })?;
    info!(
        match_id = %entity.id,
        score_me = score.me,
        score_opponent = score.opponent,
        "match finalized"
    );
    Ok(entity)
}

pub(crate) fn match_not_found(match_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("match `{match_id}` not found"))
}

async fn summarize(
    store: Arc<dyn MatchStore>,
    entity: MatchEntity,
) -> Result<MatchSummary, ServiceError> {
    let points = store.list_points(&entity.owner_id, entity.id).await?;
    let derived = tally(points.iter().map(|point| point.scorer));
    let score = displayed_score(entity.finalized, entity.stored_score(), derived);
    Ok(MatchSummary::new(entity, score, points.len()))
}

#[derive(Debug, Default)]
struct MatchFilter {
    tags: Vec<String>,
    from: Option<Date>,
    to: Option<Date>,
}

impl MatchFilter {
    fn parse(query: &MatchListQuery) -> Result<Self, ServiceError> {
        let tags = query
            .tags
            .as_deref()
            .map(|tags| normalize_tags(tags.split(',')))
            .unwrap_or_default();
        let from = query.from.as_deref().map(parse_day).transpose()?;
        let to = query.to.as_deref().map(parse_day).transpose()?;

        if matches!((from, to), (Some(from), Some(to)) if from > to) {
            return Err(ServiceError::InvalidInput(
                "`from` must not be after `to`".into(),
            ));
        }

        Ok(Self { tags, from, to })
    }

    fn accepts(&self, entity: &MatchEntity) -> bool {
        let day = OffsetDateTime::from(entity.created_at).date();
        self.tags.iter().all(|tag| entity.tags.contains(tag))
            && self.from.is_none_or(|from| day >= from)
            && self.to.is_none_or(|to| day <= to)
    }
}

fn parse_day(value: &str) -> Result<Date, ServiceError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| {
            ServiceError::InvalidInput(format!("invalid date `{value}`, expected YYYY-MM-DD"))
        })
}
