use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::PointEntity,
    dto::{format_system_time, validation::validate_not_blank},
    state::{
        fencing::Scorer,
        score::Tally,
        taxonomy::{Phrase, Situation},
    },
};

/// A classified touch to append to a match.
///
/// Situation and phrase are free strings here so that an unknown or mismatched pair is
/// reported as a validation failure.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePointRequest {
    pub scorer: Scorer,
    #[validate(custom(function = "validate_not_blank"))]
    pub situation: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub phrase: String,
    /// Score of the logging user before this touch.
    pub score_me_at_time: u32,
    /// Score of the opponent before this touch.
    pub score_opponent_at_time: u32,
    /// Optional note; blank notes are stored as absent.
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

impl CreatePointRequest {
    /// Score snapshot carried by the request.
    pub fn snapshot(&self) -> Tally {
        Tally::new(self.score_me_at_time, self.score_opponent_at_time)
    }
}

/// Editable fields of a recorded touch. Scorer and snapshots are frozen.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdatePointRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub situation: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub phrase: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// Recorded touch.
#[derive(Debug, Serialize, ToSchema)]
pub struct PointView {
    pub id: Uuid,
    pub match_id: Uuid,
    pub scorer: Scorer,
    pub situation: Situation,
    pub phrase: Phrase,
    pub note: Option<String>,
    pub score_me_at_time: u32,
    pub score_opponent_at_time: u32,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<PointEntity> for PointView {
    fn from(point: PointEntity) -> Self {
        Self {
            id: point.id,
            match_id: point.match_id,
            scorer: point.scorer,
            situation: point.situation,
            phrase: point.phrase,
            note: point.note,
            score_me_at_time: point.score_me_at_time,
            score_opponent_at_time: point.score_opponent_at_time,
            created_at: format_system_time(point.created_at),
        }
    }
}
