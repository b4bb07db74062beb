use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::state::{
    fencing::{FencerColor, Scorer},
    score::Tally,
    session::SessionView,
    session_machine::{Capture, CaptureStep, ConfirmAction, SessionPhase, TerminalKind},
    taxonomy::{Phrase, Situation},
    timer::Countdown,
};

/// Coarse phase name used by clients to pick the screen to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhaseName {
    Idle,
    Classifying,
    Confirming,
    Ended,
    Abandoned,
}

/// Step of the classification capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStepName {
    Situation,
    Phrase,
    Note,
}

impl From<CaptureStep> for CaptureStepName {
    fn from(step: CaptureStep) -> Self {
        match step {
            CaptureStep::Situation => CaptureStepName::Situation,
            CaptureStep::Phrase => CaptureStepName::Phrase,
            CaptureStep::Note => CaptureStepName::Note,
        }
    }
}

/// Destructive actions awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmActionDto {
    /// Delete the latest touch.
    Undo,
    /// Finalize the match with the running score.
    End,
    /// Leave the match without finalizing.
    Abandon,
}

impl From<ConfirmAction> for ConfirmActionDto {
    fn from(action: ConfirmAction) -> Self {
        match action {
            ConfirmAction::Undo => ConfirmActionDto::Undo,
            ConfirmAction::End => ConfirmActionDto::End,
            ConfirmAction::Abandon => ConfirmActionDto::Abandon,
        }
    }
}

impl From<ConfirmActionDto> for ConfirmAction {
    fn from(action: ConfirmActionDto) -> Self {
        match action {
            ConfirmActionDto::Undo => ConfirmAction::Undo,
            ConfirmActionDto::End => ConfirmAction::End,
            ConfirmActionDto::Abandon => ConfirmAction::Abandon,
        }
    }
}

/// Selections gathered so far for the touch being classified.
#[derive(Debug, Serialize, ToSchema)]
pub struct CaptureView {
    pub scorer: Scorer,
    /// Lane of the scorer, derived from the match's color.
    pub scorer_color: FencerColor,
    pub step: CaptureStepName,
    pub situation: Option<Situation>,
    pub phrase: Option<Phrase>,
    pub note: String,
    /// Phrases selectable for the chosen situation; empty until one is chosen.
    pub available_phrases: Vec<Phrase>,
}

impl CaptureView {
    fn from_capture(capture: &Capture, my_color: FencerColor) -> Self {
        Self {
            scorer: capture.scorer,
            scorer_color: capture.scorer.color(my_color),
            step: capture.step.into(),
            situation: capture.situation,
            phrase: capture.phrase,
            note: capture.note.clone(),
            available_phrases: capture.available_phrases().to_vec(),
        }
    }
}

/// Full state of a live match session, also broadcast as `session.snapshot`.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub match_id: Uuid,
    pub opponent_name: String,
    pub my_color: FencerColor,
    pub phase: SessionPhaseName,
    pub capture: Option<CaptureView>,
    pub confirming: Option<ConfirmActionDto>,
    /// Running score, only updated once the store confirmed a mutation.
    pub score: Tally,
    pub timer: Countdown,
    pub last_scored: Option<Scorer>,
    pub version: usize,
    /// Whether a save, undo or finalization is in flight.
    pub pending: bool,
}

impl From<SessionView> for SessionSnapshot {
    fn from(view: SessionView) -> Self {
        let (phase, capture, confirming) = match &view.phase {
            SessionPhase::Idle => (SessionPhaseName::Idle, None, None),
            SessionPhase::Classifying(capture) => (
                SessionPhaseName::Classifying,
                Some(CaptureView::from_capture(capture, view.my_color)),
                None,
            ),
            SessionPhase::Confirming(action) => {
                (SessionPhaseName::Confirming, None, Some((*action).into()))
            }
            SessionPhase::Terminal(TerminalKind::Ended) => (SessionPhaseName::Ended, None, None),
            SessionPhase::Terminal(TerminalKind::Abandoned) => {
                (SessionPhaseName::Abandoned, None, None)
            }
        };

        Self {
            match_id: view.match_id,
            opponent_name: view.opponent_name,
            my_color: view.my_color,
            phase,
            capture,
            confirming,
            score: view.score,
            timer: view.countdown,
            last_scored: view.last_scored,
            version: view.version,
            pending: view.pending,
        }
    }
}

/// Tap on one lane of the scoring screen.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TapRequest {
    /// Lane that was tapped; the scorer is derived from the match's color.
    pub color: FencerColor,
}

/// Situation chosen during classification.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChooseSituationRequest {
    pub situation: Situation,
}

/// Phrase chosen during classification.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChoosePhraseRequest {
    pub phrase: Phrase,
}

/// Note typed during classification.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EditNoteRequest {
    #[validate(length(max = 2000))]
    pub note: String,
}

/// Request confirmation for a destructive action.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ConfirmRequest {
    pub action: ConfirmActionDto,
}
