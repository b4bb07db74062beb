use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::CouchError;
use crate::{
    dao::models::{CoachReportEntity, MatchEntity, PointEntity},
    state::{
        fencing::{FencerColor, Scorer},
        taxonomy::{Phrase, Situation},
    },
};

pub const MATCH_PREFIX: &str = "match::";
pub const POINT_PREFIX: &str = "point::";
pub const REPORT_PREFIX: &str = "report::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Minimal view used to delete documents in bulk.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<T> {
    pub docs: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDocsResult {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: MatchBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBody {
    pub owner_id: String,
    pub opponent_name: String,
    pub my_color: FencerColor,
    pub score_me: u32,
    pub score_opponent: u32,
    #[serde(default)]
    pub finalized: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: SystemTime,
}

impl From<(MatchEntity, Option<String>)> for CouchMatchDocument {
    fn from((value, rev): (MatchEntity, Option<String>)) -> Self {
        Self {
            id: match_doc_id(value.id),
            rev,
            body: MatchBody {
                owner_id: value.owner_id,
                opponent_name: value.opponent_name,
                my_color: value.my_color,
                score_me: value.score_me,
                score_opponent: value.score_opponent,
                finalized: value.finalized,
                tags: value.tags,
                created_at: value.created_at,
            },
        }
    }
}

impl TryFrom<CouchMatchDocument> for MatchEntity {
    type Error = CouchError;

    fn try_from(doc: CouchMatchDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: extract_uuid(&doc.id)?,
            owner_id: doc.body.owner_id,
            opponent_name: doc.body.opponent_name,
            my_color: doc.body.my_color,
            score_me: doc.body.score_me,
            score_opponent: doc.body.score_opponent,
            finalized: doc.body.finalized,
            tags: doc.body.tags,
            created_at: doc.body.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPointDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: PointBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointBody {
    pub match_id: Uuid,
    pub owner_id: String,
    pub scorer: Scorer,
    pub situation: Situation,
    pub phrase: Phrase,
    pub note: Option<String>,
    pub score_me_at_time: u32,
    pub score_opponent_at_time: u32,
    pub created_at: SystemTime,
}

impl From<(PointEntity, Option<String>)> for CouchPointDocument {
    fn from((value, rev): (PointEntity, Option<String>)) -> Self {
        Self {
            id: point_doc_id(value.match_id, value.id),
            rev,
            body: PointBody {
                match_id: value.match_id,
                owner_id: value.owner_id,
                scorer: value.scorer,
                situation: value.situation,
                phrase: value.phrase,
                note: value.note,
                score_me_at_time: value.score_me_at_time,
                score_opponent_at_time: value.score_opponent_at_time,
                created_at: value.created_at,
            },
        }
    }
}

impl TryFrom<CouchPointDocument> for PointEntity {
    type Error = CouchError;

    fn try_from(doc: CouchPointDocument) -> Result<Self, Self::Error> {
        let (_, point_id) = doc
            .id
            .rsplit_once("::")
            .ok_or_else(|| CouchError::MalformedId {
                doc_id: doc.id.clone(),
                kind: "missing separator",
            })?;
        let id = Uuid::parse_str(point_id).map_err(|_| CouchError::MalformedId {
            doc_id: doc.id.clone(),
            kind: "invalid UUID",
        })?;

        Ok(Self {
            id,
            match_id: doc.body.match_id,
            owner_id: doc.body.owner_id,
            scorer: doc.body.scorer,
            situation: doc.body.situation,
            phrase: doc.body.phrase,
            note: doc.body.note,
            score_me_at_time: doc.body.score_me_at_time,
            score_opponent_at_time: doc.body.score_opponent_at_time,
            created_at: doc.body.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchReportDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub report: CoachReportEntity,
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{}{}", MATCH_PREFIX, id)
}

/// Points are grouped under their match so a prefix scan lists one match's log.
pub fn point_doc_id(match_id: Uuid, point_id: Uuid) -> String {
    format!("{}{}::{}", POINT_PREFIX, match_id, point_id)
}

pub fn match_points_prefix(match_id: Uuid) -> String {
    format!("{}{}::", POINT_PREFIX, match_id)
}

pub fn report_doc_id(owner_id: &str) -> String {
    format!("{}{}", REPORT_PREFIX, owner_id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchError::MalformedId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchError::MalformedId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_round_trip_through_documents() {
        let match_id = Uuid::new_v4();
        let entity = PointEntity {
            id: Uuid::new_v4(),
            match_id,
            owner_id: "alice".into(),
            scorer: Scorer::Opponent,
            situation: Situation::DefenceAfterFourMetre,
            phrase: Phrase::StopCut,
            note: Some("too slow".into()),
            score_me_at_time: 2,
            score_opponent_at_time: 1,
            created_at: SystemTime::UNIX_EPOCH,
        };

        let document = CouchPointDocument::from((entity.clone(), None));
        assert!(document.id.starts_with(&match_points_prefix(match_id)));
        assert_eq!(PointEntity::try_from(document).unwrap(), entity);
    }

    #[test]
    fn malformed_match_id_is_rejected() {
        let err = extract_uuid("match::not-a-uuid").unwrap_err();
        assert!(matches!(
            err,
            CouchError::MalformedId {
                kind: "invalid UUID",
                ..
            }
        ));
        assert!(extract_uuid("nonsense").is_err());
    }
}
