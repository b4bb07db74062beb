//! Process-local store used for `STORAGE_BACKEND=memory` and tests.

use std::{cmp::Reverse, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{CoachReportEntity, MatchEntity, PointEntity},
    storage::StorageResult,
};

/// [`MatchStore`] keeping everything in concurrent hash maps.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    matches: DashMap<Uuid, MatchEntity>,
    points: DashMap<Uuid, PointEntity>,
    reports: DashMap<String, CoachReportEntity>,
}

impl MemoryMatchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_match(&self, owner_id: &str, id: Uuid) -> Option<MatchEntity> {
        self.inner
            .matches
            .get(&id)
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
    }

    fn points_of(&self, owner_id: &str, match_id: Uuid) -> Vec<PointEntity> {
        let mut points: Vec<PointEntity> = self
            .inner
            .points
            .iter()
            .filter(|entry| entry.match_id == match_id && entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect();
        points.sort_by_key(PointEntity::order_key);
        points
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let found = self.owned_match(owner_id, id);
        Box::pin(async move { Ok(found) })
    }

    fn list_matches(&self, owner_id: &str) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let mut matches: Vec<MatchEntity> = self
            .inner
            .matches
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect();
        matches.sort_by_key(|entity| Reverse((entity.created_at, entity.id)));
        Box::pin(async move { Ok(matches) })
    }

    fn delete_match(&self, owner_id: &str, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            if store.owned_match(&owner_id, id).is_none() {
                return Ok(false);
            }
            store
                .inner
                .points
                .retain(|_, point| !(point.match_id == id && point.owner_id == owner_id));
            Ok(store.inner.matches.remove(&id).is_some())
        })
    }

    fn save_point(&self, point: PointEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.points.insert(point.id, point);
            Ok(())
        })
    }

    fn list_points(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>> {
        let points = self.points_of(owner_id, match_id);
        Box::pin(async move { Ok(points) })
    }

    fn find_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PointEntity>>> {
        let found = self
            .inner
            .points
            .get(&point_id)
            .filter(|entry| entry.match_id == match_id && entry.owner_id == owner_id)
            .map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn delete_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self
            .inner
            .points
            .remove_if(&point_id, |_, point| {
                point.match_id == match_id && point.owner_id == owner_id
            })
            .is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn recent_points(
        &self,
        owner_id: &str,
        match_ids: Vec<Uuid>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>> {
        let mut points: Vec<PointEntity> = self
            .inner
            .points
            .iter()
            .filter(|entry| entry.owner_id == owner_id && match_ids.contains(&entry.match_id))
            .map(|entry| entry.clone())
            .collect();
        points.sort_by_key(|point| Reverse(point.order_key()));
        points.truncate(limit);
        Box::pin(async move { Ok(points) })
    }

    fn save_report(&self, report: CoachReportEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .reports
                .insert(report.owner_id.clone(), report);
            Ok(())
        })
    }

    fn find_report(
        &self,
        owner_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CoachReportEntity>>> {
        let found = self
            .inner
            .reports
            .get(owner_id)
            .map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::{
        fencing::{FencerColor, Scorer},
        taxonomy::{Phrase, Situation},
    };

    fn sample_match(owner: &str) -> MatchEntity {
        MatchEntity {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            opponent_name: "Dubois".into(),
            my_color: FencerColor::Red,
            score_me: 0,
            score_opponent: 0,
            finalized: false,
            tags: Vec::new(),
            created_at: SystemTime::now(),
        }
    }

    fn sample_point(entity: &MatchEntity, offset_secs: u64) -> PointEntity {
        PointEntity {
            id: Uuid::new_v4(),
            match_id: entity.id,
            owner_id: entity.owner_id.clone(),
            scorer: Scorer::Me,
            situation: Situation::FourMetre,
            phrase: Phrase::DirectAttack,
            note: None,
            score_me_at_time: 0,
            score_opponent_at_time: 0,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 + offset_secs),
        }
    }

    #[tokio::test]
    async fn records_of_other_owners_are_invisible() {
        let store = MemoryMatchStore::new();
        let entity = sample_match("alice");
        let point = sample_point(&entity, 0);
        store.save_match(entity.clone()).await.unwrap();
        store.save_point(point.clone()).await.unwrap();

        assert!(store.find_match("bob", entity.id).await.unwrap().is_none());
        assert!(store.list_matches("bob").await.unwrap().is_empty());
        assert!(
            store
                .find_point("bob", entity.id, point.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete_point("bob", entity.id, point.id).await.unwrap());
        assert!(!store.delete_match("bob", entity.id).await.unwrap());
        assert_eq!(store.list_points("alice", entity.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_match_cascades_to_points() {
        let store = MemoryMatchStore::new();
        let entity = sample_match("alice");
        store.save_match(entity.clone()).await.unwrap();
        store.save_point(sample_point(&entity, 0)).await.unwrap();
        store.save_point(sample_point(&entity, 1)).await.unwrap();

        assert!(store.delete_match("alice", entity.id).await.unwrap());
        assert!(store.list_points("alice", entity.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn points_are_chronological_and_latest_is_newest() {
        let store = MemoryMatchStore::new();
        let entity = sample_match("alice");
        store.save_match(entity.clone()).await.unwrap();
        let late = sample_point(&entity, 5);
        let early = sample_point(&entity, 1);
        store.save_point(late.clone()).await.unwrap();
        store.save_point(early.clone()).await.unwrap();

        let listed = store.list_points("alice", entity.id).await.unwrap();
        assert_eq!(listed, vec![early, late.clone()]);
        assert_eq!(
            store.latest_point("alice", entity.id).await.unwrap(),
            Some(late)
        );
    }

    #[tokio::test]
    async fn recent_points_are_capped_newest_first() {
        let store = MemoryMatchStore::new();
        let entity = sample_match("alice");
        store.save_match(entity.clone()).await.unwrap();
        for offset in 0..5 {
            store.save_point(sample_point(&entity, offset)).await.unwrap();
        }

        let recent = store
            .recent_points("alice", vec![entity.id], 3)
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].created_at > recent[2].created_at);
    }
}
