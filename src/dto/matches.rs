use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::MatchEntity,
    dto::{
        format_system_time,
        validation::{validate_not_blank, validate_tags},
    },
    state::{fencing::FencerColor, score::Tally},
};

/// Payload used to start logging a new bout.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    /// Opponent display name; surrounding whitespace is trimmed.
    #[validate(custom(function = "validate_not_blank"), length(max = 100))]
    pub opponent_name: String,
    /// Lane of the logging user. Cannot be changed afterwards.
    pub my_color: FencerColor,
    /// Optional initial descriptive tags.
    #[serde(default)]
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,
}

/// Replacement tag set of a match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateTagsRequest {
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,
}

/// Explicit final score of a match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct FinalizeMatchRequest {
    #[validate(range(max = 999))]
    pub score_me: u32,
    #[validate(range(max = 999))]
    pub score_opponent: u32,
}

/// Filters of the match history.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MatchListQuery {
    /// Comma separated tags; a match must carry all of them.
    pub tags: Option<String>,
    /// First creation day included, `YYYY-MM-DD` (UTC).
    pub from: Option<String>,
    /// Last creation day included, `YYYY-MM-DD` (UTC).
    pub to: Option<String>,
}

/// Match as shown in the history and on the match page.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchSummary {
    pub id: Uuid,
    pub opponent_name: String,
    pub my_color: FencerColor,
    /// Stored final score once finalized, otherwise the tally of the recorded touches.
    pub score: Tally,
    pub finalized: bool,
    pub tags: Vec<String>,
    /// Number of recorded touches.
    pub point_count: usize,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl MatchSummary {
    /// Build the summary of `entity` showing `score`.
    pub fn new(entity: MatchEntity, score: Tally, point_count: usize) -> Self {
        Self {
            id: entity.id,
            opponent_name: entity.opponent_name,
            my_color: entity.my_color,
            score,
            finalized: entity.finalized,
            tags: entity.tags,
            point_count,
            created_at: format_system_time(entity.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_rejects_blank_opponent() {
        let request: CreateMatchRequest =
            serde_json::from_str(r#"{"opponent_name":"  ","my_color":"red"}"#).unwrap();
        assert!(request.validate().is_err());

        let request: CreateMatchRequest =
            serde_json::from_str(r#"{"opponent_name":"Dubois","my_color":"green"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(request.tags.is_empty());
    }

    #[test]
    fn unknown_color_fails_to_parse() {
        assert!(
            serde_json::from_str::<CreateMatchRequest>(
                r#"{"opponent_name":"Dubois","my_color":"blue"}"#
            )
            .is_err()
        );
    }
}
