//! AI coaching report: gathers recent touches, asks the completion service for a summary and
//! keeps the last report per user.

use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    dao::models::{CoachReportEntity, MatchEntity, PointEntity},
    dto::{coach::CoachReportView, format_system_time},
    error::ServiceError,
    services::completion::{CompletionError, CompletionRequest},
    state::{
        SharedState,
        fencing::Scorer,
        taxonomy::{Phrase, Situation},
    },
};

const SYSTEM_PROMPT: &str = "You are an experienced sabre fencing coach. You receive a JSON array \
of touches recorded by one fencer across recent bouts. Each touch names the bout, the opponent, \
the date, who scored (`me` is the fencer you coach), the situation relative to the 4 m line, the \
tactical phrase and an optional note. Identify the patterns behind touches scored and conceded. \
Answer with a JSON object with exactly three string fields: `summary` (two or three sentences), \
`detail` (the recurring patterns, with counts where useful) and `action_plan` (concrete drills \
and tactical adjustments for the next training sessions).";

/// One touch as sent to the completion service.
#[derive(Debug, Serialize)]
struct PointContext<'a> {
    match_id: String,
    opponent_name: &'a str,
    match_date: String,
    scorer: Scorer,
    situation: Situation,
    phrase: Phrase,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

/// Shape the completion must have.
#[derive(Debug, Deserialize)]
struct CompletionReport {
    summary: String,
    detail: String,
    action_plan: String,
}

/// Generate a fresh report from the caller's recent touches and keep it as their cached report.
pub async fn generate_report(
    state: &SharedState,
    owner_id: &str,
) -> Result<CoachReportView, ServiceError> {
    let settings = &state.config().coach;
    let store = state.require_match_store().await?;

    let matches: Vec<MatchEntity> = store
        .list_matches(owner_id)
        .await?
        .into_iter()
        .take(settings.max_matches)
        .collect();
    let match_ids = matches.iter().map(|entity| entity.id).collect();
    let points = store
        .recent_points(owner_id, match_ids, settings.max_points)
        .await?;

    if points.is_empty() {
        return Err(ServiceError::InvalidInput("no data to analyze".into()));
    }

    let expose_details = state.config().exposes_details();
    let completion = state
        .completion()
        .ok_or(ServiceError::Completion {
            source: CompletionError::NotConfigured,
            expose_details,
        })?;

    let context = build_context(&matches, &points);
    let match_count = context
        .iter()
        .map(|point| point.match_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    let user = serde_json::to_string(&context).map_err(|err| ServiceError::Completion {
        source: CompletionError::ResponseShape {
            reason: format!("failed to encode touches: {err}"),
            raw: None,
        },
        expose_details,
    })?;

    let request = CompletionRequest {
        model: settings.model.clone(),
        temperature: settings.temperature,
        system: SYSTEM_PROMPT.to_owned(),
        user,
    };
    let raw = completion
        .complete_json(request)
        .await
        .map_err(|source| {
            warn!(owner_id, error = %source, "coaching completion failed");
            ServiceError::Completion {
                source,
                expose_details,
            }
        })?;
    let parsed = parse_report(&raw).map_err(|source| {
        warn!(owner_id, error = %source, "coaching completion has an unusable shape");
        ServiceError::Completion {
            source,
            expose_details,
        }
    })?;

    let report = CoachReportEntity {
        owner_id: owner_id.to_owned(),
        summary: parsed.summary,
        detail: parsed.detail,
        action_plan: parsed.action_plan,
        point_count: u32::try_from(context.len()).unwrap_or(u32::MAX),
        match_count: u32::try_from(match_count).unwrap_or(u32::MAX),
        generated_at: SystemTime::now(),
    };
    store.save_report(report.clone()).await.inspect_err(|err| {
        warn!(owner_id, error = %err, "failed to store coaching report");
    })?;
    info!(
        owner_id,
        point_count = report.point_count,
        match_count = report.match_count,
        "coaching report generated"
    );

    Ok(report.into())
}

/// Last generated report of the caller.
pub async fn get_report(
    state: &SharedState,
    owner_id: &str,
) -> Result<CoachReportView, ServiceError> {
    let store = state.require_match_store().await?;
    store
        .find_report(owner_id)
        .await?
        .map(CoachReportView::from)
        .ok_or_else(|| ServiceError::NotFound("no coaching report generated yet".into()))
}

fn build_context<'a>(matches: &'a [MatchEntity], points: &'a [PointEntity]) -> Vec<PointContext<'a>> {
    let by_id: HashMap<_, _> = matches.iter().map(|entity| (entity.id, entity)).collect();
    points
        .iter()
        .filter_map(|point| {
            let entity = by_id.get(&point.match_id)?;
            Some(PointContext {
                match_id: point.match_id.to_string(),
                opponent_name: &entity.opponent_name,
                match_date: format_system_time(entity.created_at),
                scorer: point.scorer,
                situation: point.situation,
                phrase: point.phrase,
                note: point.note.as_deref(),
            })
        })
        .collect()
}

/// Validate the completion text: a JSON object carrying non-empty `summary`, `detail` and
/// `action_plan` strings.
fn parse_report(raw: &str) -> Result<CompletionReport, CompletionError> {
    let shape_error = |reason: String| CompletionError::ResponseShape {
        reason,
        raw: Some(raw.to_owned()),
    };

    if raw.trim().is_empty() {
        return Err(CompletionError::ResponseShape {
            reason: "completion is empty".into(),
            raw: None,
        });
    }

    let report: CompletionReport = serde_json::from_str(raw.trim())
        .map_err(|err| shape_error(format!("completion is not a report object: {err}")))?;

    for (field, value) in [
        ("summary", &report.summary),
        ("detail", &report.detail),
        ("action_plan", &report.action_plan),
    ] {
        if value.trim().is_empty() {
            return Err(shape_error(format!("field `{field}` is empty")));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::fencing::FencerColor;

    #[test]
    fn accepts_complete_report() {
        let report = parse_report(
            r#"{"summary":"Solid","detail":"Wins at 4m","action_plan":"Drill parries"}"#,
        )
        .unwrap();
        assert_eq!(report.summary, "Solid");
        assert_eq!(report.action_plan, "Drill parries");
    }

    #[test]
    fn rejects_empty_or_non_json_completions() {
        assert!(matches!(
            parse_report("  "),
            Err(CompletionError::ResponseShape { raw: None, .. })
        ));
        assert!(matches!(
            parse_report("Here is your report"),
            Err(CompletionError::ResponseShape { raw: Some(_), .. })
        ));
        assert!(matches!(
            parse_report(r#"["summary"]"#),
            Err(CompletionError::ResponseShape { .. })
        ));
    }

    #[test]
    fn rejects_missing_or_blank_fields() {
        match parse_report(r#"{"summary":"a","detail":"b"}"#) {
            Err(CompletionError::ResponseShape { reason, .. }) => {
                assert!(reason.contains("action_plan"))
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse_report(r#"{"summary":"a","detail":" ","action_plan":"c"}"#) {
            Err(CompletionError::ResponseShape { reason, .. }) => {
                assert!(reason.contains("detail"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn context_carries_match_details() {
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            owner_id: "user-1".into(),
            opponent_name: "Dubois".into(),
            my_color: FencerColor::Green,
            score_me: 0,
            score_opponent: 0,
            finalized: false,
            tags: Vec::new(),
            created_at: SystemTime::UNIX_EPOCH,
        };
        let point = PointEntity {
            id: Uuid::new_v4(),
            match_id: entity.id,
            owner_id: "user-1".into(),
            scorer: Scorer::Opponent,
            situation: Situation::DefenceAfterFourMetre,
            phrase: Phrase::StopCut,
            note: None,
            score_me_at_time: 0,
            score_opponent_at_time: 0,
            created_at: SystemTime::UNIX_EPOCH,
        };
        let matches = [entity];
        let points = [point];

        let context = build_context(&matches, &points);
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value[0]["opponent_name"], "Dubois");
        assert_eq!(value[0]["match_date"], "1970-01-01T00:00:00Z");
        assert_eq!(value[0]["scorer"], "opponent");
        assert_eq!(value[0]["phrase"], "stop_cut");
        assert!(value[0].get("note").is_none());
    }
}
