#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{CoachReportEntity, MatchEntity, PointEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for matches, points and coaching reports.
///
/// Every lookup is scoped by the owner id: a record owned by someone else is reported exactly
/// like a missing one.
pub trait MatchStore: Send + Sync {
    /// Insert or replace a match.
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load one match owned by `owner_id`.
    fn find_match(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// All matches of `owner_id`, newest first.
    fn list_matches(&self, owner_id: &str) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Delete a match and all of its points. Returns whether the match existed.
    fn delete_match(&self, owner_id: &str, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert or replace a point.
    fn save_point(&self, point: PointEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Points of a match in chronological order.
    fn list_points(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>>;
    /// Load one point of a match.
    fn find_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PointEntity>>>;
    /// Delete one point of a match. Returns whether the point existed.
    fn delete_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Latest point of a match (see [`latest_of`]).
    fn latest_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PointEntity>>> {
        let points = self.list_points(owner_id, match_id);
        Box::pin(async move { Ok(latest_of(&points.await?).cloned()) })
    }
    /// Most recent points across the given matches, newest first, at most `limit`.
    fn recent_points(
        &self,
        owner_id: &str,
        match_ids: Vec<Uuid>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>>;
    /// Insert or replace the coaching report of its owner.
    fn save_report(&self, report: CoachReportEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load the coaching report of `owner_id`.
    fn find_report(
        &self,
        owner_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CoachReportEntity>>>;
    /// Check that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Latest point of a chronological list: maximum creation time, ties broken by id.
pub fn latest_of(points: &[PointEntity]) -> Option<&PointEntity> {
    points.iter().max_by_key(|point| point.order_key())
}
