use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{CoachReportEntity, MatchEntity, PointEntity},
    state::{
        fencing::{FencerColor, Scorer},
        taxonomy::{Phrase, Situation},
    },
};

/// Identifiers are stored as hyphenated strings so that lexical and UUID orderings agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    owner_id: String,
    opponent_name: String,
    my_color: FencerColor,
    score_me: u32,
    score_opponent: u32,
    #[serde(default)]
    finalized: bool,
    #[serde(default)]
    tags: Vec<String>,
    created_at: DateTime,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id.to_string(),
            owner_id: value.owner_id,
            opponent_name: value.opponent_name,
            my_color: value.my_color,
            score_me: value.score_me,
            score_opponent: value.score_opponent,
            finalized: value.finalized,
            tags: value.tags,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            owner_id: value.owner_id,
            opponent_name: value.opponent_name,
            my_color: value.my_color,
            score_me: value.score_me,
            score_opponent: value.score_opponent,
            finalized: value.finalized,
            tags: value.tags,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPointDocument {
    #[serde(rename = "_id")]
    id: String,
    match_id: String,
    owner_id: String,
    scorer: Scorer,
    situation: Situation,
    phrase: Phrase,
    note: Option<String>,
    score_me_at_time: u32,
    score_opponent_at_time: u32,
    created_at: DateTime,
}

impl From<PointEntity> for MongoPointDocument {
    fn from(value: PointEntity) -> Self {
        Self {
            id: value.id.to_string(),
            match_id: value.match_id.to_string(),
            owner_id: value.owner_id,
            scorer: value.scorer,
            situation: value.situation,
            phrase: value.phrase,
            note: value.note,
            score_me_at_time: value.score_me_at_time,
            score_opponent_at_time: value.score_opponent_at_time,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoPointDocument> for PointEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPointDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            match_id: parse_id(&value.match_id)?,
            owner_id: value.owner_id,
            scorer: value.scorer,
            situation: value.situation,
            phrase: value.phrase,
            note: value.note,
            score_me_at_time: value.score_me_at_time,
            score_opponent_at_time: value.score_opponent_at_time,
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Coaching reports are keyed by their owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoReportDocument {
    #[serde(rename = "_id")]
    owner_id: String,
    summary: String,
    detail: String,
    action_plan: String,
    point_count: u32,
    match_count: u32,
    generated_at: DateTime,
}

impl From<CoachReportEntity> for MongoReportDocument {
    fn from(value: CoachReportEntity) -> Self {
        Self {
            owner_id: value.owner_id,
            summary: value.summary,
            detail: value.detail,
            action_plan: value.action_plan,
            point_count: value.point_count,
            match_count: value.match_count,
            generated_at: DateTime::from_system_time(value.generated_at),
        }
    }
}

impl From<MongoReportDocument> for CoachReportEntity {
    fn from(value: MongoReportDocument) -> Self {
        Self {
            owner_id: value.owner_id,
            summary: value.summary,
            detail: value.detail,
            action_plan: value.action_plan,
            point_count: value.point_count,
            match_count: value.match_count,
            generated_at: value.generated_at.to_system_time(),
        }
    }
}

fn parse_id(raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::MalformedId { id: raw.to_owned() })
}

/// Filter selecting one owned document.
pub fn owned_id(owner_id: &str, id: Uuid) -> Document {
    doc! {"_id": id.to_string(), "owner_id": owner_id}
}

/// Filter selecting one owned point of a match.
pub fn owned_point(owner_id: &str, match_id: Uuid, point_id: Uuid) -> Document {
    doc! {
        "_id": point_id.to_string(),
        "match_id": match_id.to_string(),
        "owner_id": owner_id,
    }
}

/// Filter selecting every owned point of a match.
pub fn owned_match_points(owner_id: &str, match_id: Uuid) -> Document {
    doc! {"match_id": match_id.to_string(), "owner_id": owner_id}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_filter_stays_inside_the_owner() {
        let match_id = Uuid::new_v4();
        let filter = owned_match_points("alice", match_id);

        assert_eq!(filter.get_str("owner_id").unwrap(), "alice");
        assert_eq!(
            filter.get_str("match_id").unwrap(),
            match_id.to_string().as_str()
        );
        assert_eq!(filter.len(), 2);
    }
}
