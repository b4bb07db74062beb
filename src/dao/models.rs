use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    fencing::{FencerColor, Scorer},
    score::Tally,
    taxonomy::{Phrase, Situation},
};

/// One fencing bout owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Identifier of the owning user.
    pub owner_id: String,
    /// Opponent display name, never blank.
    pub opponent_name: String,
    /// Lane of the logging user. Immutable once set.
    pub my_color: FencerColor,
    /// Final score of the logging user, meaningful once `finalized`.
    pub score_me: u32,
    /// Final score of the opponent, meaningful once `finalized`.
    pub score_opponent: u32,
    /// Whether the final score was explicitly recorded.
    #[serde(default)]
    pub finalized: bool,
    /// Descriptive tags in user order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl MatchEntity {
    /// Stored final score.
    pub fn stored_score(&self) -> Tally {
        Tally::new(self.score_me, self.score_opponent)
    }
}

/// One scored touch within a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointEntity {
    /// Primary key of the point.
    pub id: Uuid,
    /// Match the point belongs to.
    pub match_id: Uuid,
    /// Identifier of the owning user.
    pub owner_id: String,
    /// Who scored.
    pub scorer: Scorer,
    /// Engagement phase.
    pub situation: Situation,
    /// Tactical action, valid for `situation`.
    pub phrase: Phrase,
    /// Optional trimmed note.
    pub note: Option<String>,
    /// Score of the logging user before this touch was recorded.
    pub score_me_at_time: u32,
    /// Score of the opponent before this touch was recorded.
    pub score_opponent_at_time: u32,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl PointEntity {
    /// Chronological ordering key. Equal timestamps fall back to the id.
    pub fn order_key(&self) -> (SystemTime, Uuid) {
        (self.created_at, self.id)
    }

    /// Score before this touch was counted.
    pub fn snapshot(&self) -> Tally {
        Tally::new(self.score_me_at_time, self.score_opponent_at_time)
    }
}

/// Last coaching report generated for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachReportEntity {
    /// Identifier of the owning user; one report per user.
    pub owner_id: String,
    /// Short overall assessment.
    pub summary: String,
    /// Detailed analysis.
    pub detail: String,
    /// Concrete next steps.
    pub action_plan: String,
    /// Number of points the report was derived from.
    pub point_count: u32,
    /// Number of matches the points were drawn from.
    pub match_count: u32,
    /// Generation timestamp.
    pub generated_at: SystemTime,
}
