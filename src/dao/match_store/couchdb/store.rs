use std::{cmp::Reverse, sync::Arc};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{CoachReportEntity, MatchEntity, PointEntity},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, BulkDocsResult, CouchMatchDocument, CouchPointDocument,
        CouchReportDocument, DeletedDocument, END_SUFFIX, MATCH_PREFIX, match_doc_id,
        match_points_prefix, point_doc_id, report_doc_id,
    },
};

/// [`MatchStore`] backed by a CouchDB database over its HTTP API.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchMatchStore {
    /// Build the HTTP client and make sure the configured database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder().build().map_err(CouchError::Client)?;
        let credentials = config
            .username
            .zip(config.password)
            .map(|(user, password)| (Arc::<str>::from(user), Arc::<str>::from(password)));

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth: credentials,
        };
        store.ensure_database().await?;
        Ok(store)
    }

    /// Request against the database root when `path` is empty, a document or
    /// a `_` endpoint otherwise.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = if path.is_empty() {
            format!("{}/{}", self.base_url, self.database)
        } else {
            format!("{}/{}/{}", self.base_url, self.database, path)
        };
        let builder = self.client.request(method, url);
        match &self.auth {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn send(
        &self,
        target: &str,
        builder: reqwest::RequestBuilder,
    ) -> CouchResult<reqwest::Response> {
        builder.send().await.map_err(|source| CouchError::Transport {
            target: target.to_owned(),
            source,
        })
    }

    async fn decode<T: DeserializeOwned>(
        target: &str,
        response: reqwest::Response,
    ) -> CouchResult<T> {
        response.json::<T>().await.map_err(|source| CouchError::Body {
            target: target.to_owned(),
            source,
        })
    }

    fn unexpected(target: &str, status: StatusCode) -> CouchError {
        CouchError::Status {
            target: target.to_owned(),
            status,
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let name = self.database.to_string();
        let probe = self.send(&name, self.request(Method::GET, "")).await?;
        match probe.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.send(&name, self.request(Method::PUT, "")).await?;
                // 412 means another instance created it first.
                match created.status() {
                    status if status.is_success() => Ok(()),
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(Self::unexpected(&name, status)),
                }
            }
            status => Err(Self::unexpected(&name, status)),
        }
    }

    async fn get_document<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let response = self.send(doc_id, self.request(Method::GET, doc_id)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::decode(doc_id, response).await.map(Some),
            status => Err(Self::unexpected(doc_id, status)),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let builder = self.request(Method::PUT, doc_id).json(document);
        let status = self.send(doc_id, builder).await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::unexpected(doc_id, status))
        }
    }

    /// Every document whose id starts with `prefix`, via a `_all_docs` key range.
    async fn list_documents<T: DeserializeOwned>(&self, prefix: &str) -> CouchResult<Vec<T>> {
        const ALL_DOCS: &str = "_all_docs";
        let range = [
            ("include_docs", "true".to_owned()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let builder = self.request(Method::GET, ALL_DOCS).query(&range);
        let response = self.send(ALL_DOCS, builder).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected(ALL_DOCS, response.status()));
        }

        let listing: AllDocsResponse = Self::decode(ALL_DOCS, response).await?;
        let mut documents = Vec::with_capacity(listing.rows.len());
        for doc in listing.rows.into_iter().filter_map(|row| row.doc) {
            let parsed = from_value(doc).map_err(|source| CouchError::Document {
                target: prefix.to_owned(),
                source,
            })?;
            documents.push(parsed);
        }
        Ok(documents)
    }

    async fn delete_documents(&self, tombstones: Vec<DeletedDocument>) -> CouchResult<()> {
        const BULK_DOCS: &str = "_bulk_docs";
        if tombstones.is_empty() {
            return Ok(());
        }

        let builder = self
            .request(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs: tombstones });
        let response = self.send(BULK_DOCS, builder).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected(BULK_DOCS, response.status()));
        }

        let outcomes: Vec<BulkDocsResult> = Self::decode(BULK_DOCS, response).await?;
        match outcomes.iter().filter(|outcome| outcome.error.is_some()).count() {
            0 => Ok(()),
            failed => Err(CouchError::BulkRejected { failed }),
        }
    }

    async fn owned_match_document(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> CouchResult<Option<CouchMatchDocument>> {
        let doc = self
            .get_document::<CouchMatchDocument>(&match_doc_id(id))
            .await?;
        Ok(doc.filter(|doc| doc.body.owner_id == owner_id))
    }

    async fn owned_point_documents(
        &self,
        owner_id: &str,
        match_id: Uuid,
    ) -> CouchResult<Vec<CouchPointDocument>> {
        let docs = self
            .list_documents::<CouchPointDocument>(&match_points_prefix(match_id))
            .await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.body.owner_id == owner_id)
            .collect())
    }

    async fn owned_points(&self, owner_id: &str, match_id: Uuid) -> CouchResult<Vec<PointEntity>> {
        let mut points = self
            .owned_point_documents(owner_id, match_id)
            .await?
            .into_iter()
            .map(PointEntity::try_from)
            .collect::<CouchResult<Vec<_>>>()?;
        points.sort_by_key(PointEntity::order_key);
        Ok(points)
    }
}

impl MatchStore for CouchMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = match_doc_id(entity.id);
            let rev = store
                .get_document::<CouchMatchDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchMatchDocument::from((entity, rev));
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn find_match(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            let doc = store.owned_match_document(&owner_id, id).await?;
            Ok(doc.map(MatchEntity::try_from).transpose()?)
        })
    }

    fn list_matches(&self, owner_id: &str) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchMatchDocument>(MATCH_PREFIX)
                .await?;
            let mut matches = docs
                .into_iter()
                .filter(|doc| doc.body.owner_id == owner_id)
                .map(MatchEntity::try_from)
                .collect::<CouchResult<Vec<_>>>()?;
            matches.sort_by_key(|entity| Reverse((entity.created_at, entity.id)));
            Ok(matches)
        })
    }

    fn delete_match(&self, owner_id: &str, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let owner_id = owner_id.to_owned();
        Box::pin(async move {
            let Some(doc) = store.owned_match_document(&owner_id, id).await? else {
                return Ok(false);
            };

            let mut doomed: Vec<DeletedDocument> = store
                .owned_point_documents(&owner_id, id)
                .await?
                .into_iter()
                .filter_map(|point| {
                    point.rev.map(|rev| DeletedDocument {
                        id: point.id,
                        rev,
                        deleted: true,
                    })
                })
                .collect();
            if let Some(rev) = doc.rev {
                doomed.push(DeletedDocument {
                    id: doc.id,
                    rev,
                    deleted: true,
                });
            }

            store.delete_documents(doomed).await?;
            Ok(true)
        })
    }

    fn save_point(&self, point: PointEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = point_doc_id(point.match_id, point.id);
            let rev = store
                .get_document::<CouchPointDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchPointDocument::from((point, rev));
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
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
                .owned_points(&owner_id, match_id)
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
            let doc = store
                .get_document::<CouchPointDocument>(&point_doc_id(match_id, point_id))
                .await?
                .filter(|doc| doc.body.owner_id == owner_id);
            Ok(doc.map(PointEntity::try_from).transpose()?)
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
            let doc = store
                .get_document::<CouchPointDocument>(&point_doc_id(match_id, point_id))
                .await?
                .filter(|doc| doc.body.owner_id == owner_id);
            let Some(CouchPointDocument { id, rev: Some(rev), .. }) = doc else {
                return Ok(false);
            };

            store
                .delete_documents(vec![DeletedDocument {
                    id,
                    rev,
                    deleted: true,
                }])
                .await?;
            Ok(true)
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
            let mut points = Vec::new();
            for match_id in match_ids {
                points.extend(store.owned_points(&owner_id, match_id).await?);
            }
            points.sort_by_key(|point| Reverse(point.order_key()));
            points.truncate(limit);
            Ok(points)
        })
    }

    fn save_report(&self, report: CoachReportEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = report_doc_id(&report.owner_id);
            let rev = store
                .get_document::<CouchReportDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchReportDocument {
                id: doc_id.clone(),
                rev,
                report,
            };
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn find_report(
        &self,
        owner_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CoachReportEntity>>> {
        let store = self.clone();
        let doc_id = report_doc_id(owner_id);
        Box::pin(async move {
            let doc = store.get_document::<CouchReportDocument>(&doc_id).await?;
            Ok(doc.map(|doc| doc.report))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let name = store.database.to_string();
            let status = store
                .send(&name, store.request(Method::HEAD, ""))
                .await?
                .status();
            if status.is_success() {
                Ok(())
            } else {
                Err(Self::unexpected(&name, status).into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
