use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoMatchDocument, MongoPointDocument, MongoReportDocument, owned_id,
        owned_match_points, owned_point,
    },
};
use crate::dao::{
    match_store::MatchStore,
    models::{CoachReportEntity, MatchEntity, PointEntity},
    storage::StorageResult,
};

const MATCH_COLLECTION_NAME: &str = "matches";
const POINT_COLLECTION_NAME: &str = "points";
const REPORT_COLLECTION_NAME: &str = "coach_reports";

/// [`MatchStore`] backed by MongoDB.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            open_database(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            open_database(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let matches = self.matches().await;
        let index = IndexModel::builder()
            .keys(doc! {"owner_id": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_owner_created_idx".to_owned()))
                    .build(),
            )
            .build();
        matches
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "owner_id,created_at",
                source,
            })?;

        let points = self.points().await;
        let index = IndexModel::builder()
            .keys(doc! {"owner_id": 1, "match_id": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("point_match_created_idx".to_owned()))
                    .build(),
            )
            .build();
        points
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POINT_COLLECTION_NAME,
                index: "owner_id,match_id,created_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn matches(&self) -> Collection<MongoMatchDocument> {
        self.database()
            .await
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn points(&self) -> Collection<MongoPointDocument> {
        self.database()
            .await
            .collection::<MongoPointDocument>(POINT_COLLECTION_NAME)
    }

    async fn reports(&self) -> Collection<MongoReportDocument> {
        self.database()
            .await
            .collection::<MongoReportDocument>(REPORT_COLLECTION_NAME)
    }

    async fn save_match(&self, entity: MatchEntity) -> MongoResult<()> {
        let id = entity.id;
        let owner_id = entity.owner_id.clone();
        let document: MongoMatchDocument = entity.into();
        self.matches()
            .await
            .replace_one(owned_id(&owner_id, id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;
        Ok(())
    }

    async fn find_match(&self, owner_id: &str, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .matches()
            .await
            .find_one(owned_id(owner_id, id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;
        document.map(MatchEntity::try_from).transpose()
    }

    async fn list_matches(&self, owner_id: &str) -> MongoResult<Vec<MatchEntity>> {
        let documents: Vec<MongoMatchDocument> = self
            .matches()
            .await
            .find(doc! {"owner_id": owner_id})
            .sort(doc! {"created_at": -1, "_id": -1})
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        documents.into_iter().map(MatchEntity::try_from).collect()
    }

    /// Points go first: a failure part way leaves the match in place and the delete retryable.
    async fn delete_match(&self, owner_id: &str, id: Uuid) -> MongoResult<bool> {
        self.points()
            .await
            .delete_many(owned_match_points(owner_id, id))
            .await
            .map_err(|source| MongoDaoError::DeleteMatch { id, source })?;

        let result = self
            .matches()
            .await
            .delete_one(owned_id(owner_id, id))
            .await
            .map_err(|source| MongoDaoError::DeleteMatch { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_point(&self, point: PointEntity) -> MongoResult<()> {
        let id = point.id;
        let filter = owned_point(&point.owner_id, point.match_id, id);
        let document: MongoPointDocument = point.into();
        self.points()
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePoint { id, source })?;
        Ok(())
    }

    async fn list_points(&self, owner_id: &str, match_id: Uuid) -> MongoResult<Vec<PointEntity>> {
        let documents: Vec<MongoPointDocument> = self
            .points()
            .await
            .find(owned_match_points(owner_id, match_id))
            .sort(doc! {"created_at": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::LoadPoints { match_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadPoints { match_id, source })?;

        documents.into_iter().map(PointEntity::try_from).collect()
    }

    async fn latest_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> MongoResult<Option<PointEntity>> {
        let document = self
            .points()
            .await
            .find_one(owned_match_points(owner_id, match_id))
            .sort(doc! {"created_at": -1, "_id": -1})
            .await
            .map_err(|source| MongoDaoError::LoadPoints { match_id, source })?;
        document.map(PointEntity::try_from).transpose()
    }

    async fn find_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> MongoResult<Option<PointEntity>> {
        let document = self
            .points()
            .await
            .find_one(owned_point(owner_id, match_id, point_id))
            .await
            .map_err(|source| MongoDaoError::LoadPoints { match_id, source })?;
        document.map(PointEntity::try_from).transpose()
    }

    async fn delete_point(&self, owner_id: &str, match_id: Uuid, point_id: Uuid) -> MongoResult<bool> {
        let result = self
            .points()
            .await
            .delete_one(owned_point(owner_id, match_id, point_id))
            .await
            .map_err(|source| MongoDaoError::DeletePoint {
                id: point_id,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn recent_points(
        &self,
        owner_id: &str,
        match_ids: Vec<Uuid>,
        limit: usize,
    ) -> MongoResult<Vec<PointEntity>> {
        let match_ids: Vec<String> = match_ids.iter().map(Uuid::to_string).collect();
        let documents: Vec<MongoPointDocument> = self
            .points()
            .await
            .find(doc! {"owner_id": owner_id, "match_id": {"$in": match_ids}})
            .sort(doc! {"created_at": -1, "_id": -1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::RecentPoints { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::RecentPoints { source })?;

        documents.into_iter().map(PointEntity::try_from).collect()
    }

    async fn save_report(&self, report: CoachReportEntity) -> MongoResult<()> {
        let filter = doc! {"_id": report.owner_id.clone()};
        let document: MongoReportDocument = report.into();
        self.reports()
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveReport { source })?;
        Ok(())
    }

    async fn find_report(&self, owner_id: &str) -> MongoResult<Option<CoachReportEntity>> {
        let document = self
            .reports()
            .await
            .find_one(doc! {"_id": owner_id})
            .await
            .map_err(|source| MongoDaoError::LoadReport { source })?;
        Ok(document.map(Into::into))
    }
}

impl MatchStore for MongoMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move { store.find_match(&owner_id, id).await.map_err(Into::into) })
    }

    fn list_matches(&self, owner_id: &str) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move { store.list_matches(&owner_id).await.map_err(Into::into) })
    }

    fn delete_match(&self, owner_id: &str, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move { store.delete_match(&owner_id, id).await.map_err(Into::into) })
    }

    fn save_point(&self, point: PointEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_point(point).await.map_err(Into::into) })
    }

    fn list_points(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            store
                .list_points(&owner_id, match_id)
                .await
                .map_err(Into::into)
        })
    }

    fn find_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PointEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            store
                .find_point(&owner_id, match_id, point_id)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
        point_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            store
                .delete_point(&owner_id, match_id, point_id)
                .await
                .map_err(Into::into)
        })
    }

    fn latest_point(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PointEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            store
                .latest_point(&owner_id, match_id)
                .await
                .map_err(Into::into)
        })
    }

    fn recent_points(
        &self,
        owner_id: &str,
        match_ids: Vec<Uuid>,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<PointEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            store
                .recent_points(&owner_id, match_ids, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn save_report(&self, report: CoachReportEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_report(report).await.map_err(Into::into) })
    }

    fn find_report(
        &self,
        owner_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CoachReportEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move { store.find_report(&owner_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
