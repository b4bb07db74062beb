use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::state::{
    fencing::Scorer,
    taxonomy::{Phrase, Situation},
};

/// High-level phases of a live match session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a score tap or a confirmation request.
    Idle,
    /// A touch was tapped and is being classified before it is saved.
    Classifying(Capture),
    /// A destructive action waits for the user's confirmation.
    Confirming(ConfirmAction),
    /// The session is over; no further events are accepted.
    Terminal(TerminalKind),
}

/// Step of the classification capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaptureStep {
    /// Waiting for the situation.
    Situation,
    /// Waiting for the phrase.
    Phrase,
    /// Waiting for the optional note and the save.
    Note,
}

/// Selections gathered for the touch being classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Who scored, fixed by the tap.
    pub scorer: Scorer,
    /// Current capture step.
    pub step: CaptureStep,
    /// Chosen situation.
    pub situation: Option<Situation>,
    /// Chosen phrase, always valid for `situation`.
    pub phrase: Option<Phrase>,
    /// Free text note as typed so far.
    pub note: String,
}

impl Capture {
    fn new(scorer: Scorer) -> Self {
        Self {
            scorer,
            step: CaptureStep::Situation,
            situation: None,
            phrase: None,
            note: String::new(),
        }
    }

    /// Phrases selectable for the currently chosen situation.
    pub fn available_phrases(&self) -> &'static [Phrase] {
        self.situation.map(Situation::phrases).unwrap_or(&[])
    }

    /// Situation and phrase, once both are chosen.
    pub fn classification(&self) -> Result<(Situation, Phrase), CaptureError> {
        let situation = self.situation.ok_or(CaptureError::MissingSituation)?;
        let phrase = self.phrase.ok_or(CaptureError::MissingPhrase)?;
        Ok((situation, phrase))
    }
}

/// Actions that need an explicit confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Delete the latest recorded touch.
    Undo,
    /// Finalize the match with the current score.
    End,
    /// Leave the match without finalizing it.
    Abandon,
}

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// The match was finalized.
    Ended,
    /// The match was left without finalization.
    Abandoned,
}

/// Events that can be applied to the session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A lane was tapped; the scorer is already resolved.
    Tap(Scorer),
    /// Choose (or change) the situation.
    ChooseSituation(Situation),
    /// Choose the phrase.
    ChoosePhrase(Phrase),
    /// Replace the note text.
    EditNote(String),
    /// Persist the captured touch.
    Save,
    /// Drop the capture.
    Cancel,
    /// Ask for confirmation of a destructive action.
    RequestConfirm(ConfirmAction),
    /// Withdraw a confirmation request.
    Dismiss,
    /// Confirm the pending request.
    Confirm,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Reasons a capture cannot move forward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No situation chosen yet.
    #[error("situation is required")]
    MissingSituation,
    /// No phrase chosen yet.
    #[error("phrase is required")]
    MissingPhrase,
    /// The phrase is outside the chosen situation's vocabulary.
    #[error("phrase `{phrase}` is not valid for situation `{situation}`")]
    PhraseNotAllowed {
        /// Chosen situation.
        situation: Situation,
        /// Rejected phrase.
        phrase: Phrase,
    },
}

/// Errors that can occur when planning a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
    /// The capture is incomplete or inconsistent.
    Capture(CaptureError),
}

/// Errors that can occur when applying a planned session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Session phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// Session version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A planned transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the session is currently in.
    pub from: SessionPhase,
    /// Phase the session will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase.
    pub phase: SessionPhase,
    /// Version number (increments on each transition).
    pub version: usize,
    /// Target phase of the pending plan, if any.
    pub pending: Option<SessionPhase>,
}

/// Explicit state machine for one live match: score taps, classification capture,
/// confirmations and termination.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    phase: SessionPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl SessionMachine {
    /// Create a new machine in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.clone()
    }

    /// Current capture, if classifying.
    pub fn capture(&self) -> Option<&Capture> {
        match &self.phase {
            SessionPhase::Classifying(capture) => Some(capture),
            _ => None,
        }
    }

    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Terminal(_))
    }

    /// Whether a plan waits to be applied or aborted.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Create a snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self.compute_transition(event.clone())?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition and return the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase.clone())
    }

    /// Drop a planned transition, leaving the phase untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Apply an event that needs no external work in one step.
    pub fn fire(&mut self, event: SessionEvent) -> Result<SessionPhase, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        self.phase = self.compute_transition(event)?;
        self.version += 1;

        Ok(self.phase.clone())
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, PlanError> {
        let next = match (self.phase.clone(), event) {
            (SessionPhase::Idle, SessionEvent::Tap(scorer)) => {
                SessionPhase::Classifying(Capture::new(scorer))
            }
            (SessionPhase::Classifying(mut capture), SessionEvent::ChooseSituation(situation)) => {
                capture.situation = Some(situation);
                if capture.phrase.is_some_and(|phrase| !situation.allows(phrase)) {
                    capture.phrase = None;
                }
                capture.step = if capture.phrase.is_some() {
                    capture.step.max(CaptureStep::Phrase)
                } else {
                    CaptureStep::Phrase
                };
                SessionPhase::Classifying(capture)
            }
            (SessionPhase::Classifying(mut capture), SessionEvent::ChoosePhrase(phrase))
                if capture.step >= CaptureStep::Phrase =>
            {
                let situation = capture
                    .situation
                    .ok_or(PlanError::Capture(CaptureError::MissingSituation))?;
                if !situation.allows(phrase) {
                    return Err(PlanError::Capture(CaptureError::PhraseNotAllowed {
                        situation,
                        phrase,
                    }));
                }
                capture.phrase = Some(phrase);
                capture.step = CaptureStep::Note;
                SessionPhase::Classifying(capture)
            }
            (SessionPhase::Classifying(mut capture), SessionEvent::EditNote(note))
                if capture.step == CaptureStep::Note =>
            {
                capture.note = note;
                SessionPhase::Classifying(capture)
            }
            (SessionPhase::Classifying(capture), SessionEvent::Save)
                if capture.step == CaptureStep::Note =>
            {
                capture.classification().map_err(PlanError::Capture)?;
                SessionPhase::Idle
            }
            (SessionPhase::Classifying(_), SessionEvent::Cancel) => SessionPhase::Idle,
            (SessionPhase::Idle, SessionEvent::RequestConfirm(action)) => {
                SessionPhase::Confirming(action)
            }
            (SessionPhase::Confirming(_), SessionEvent::Dismiss) => SessionPhase::Idle,
            (SessionPhase::Confirming(ConfirmAction::Undo), SessionEvent::Confirm) => {
                SessionPhase::Idle
            }
            (SessionPhase::Confirming(ConfirmAction::End), SessionEvent::Confirm) => {
                SessionPhase::Terminal(TerminalKind::Ended)
            }
            (SessionPhase::Confirming(ConfirmAction::Abandon), SessionEvent::Confirm) => {
                SessionPhase::Terminal(TerminalKind::Abandoned)
            }
            (from, event) => {
                return Err(PlanError::InvalidTransition(InvalidTransition { from, event }));
            }
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(sm: &mut SessionMachine, event: SessionEvent) -> SessionPhase {
        sm.fire(event).unwrap()
    }

    fn capture(sm: &SessionMachine) -> Capture {
        sm.capture().cloned().unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = SessionMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Idle);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn capture_walks_situation_phrase_note_then_save() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        assert_eq!(capture(&sm).step, CaptureStep::Situation);
        assert!(capture(&sm).available_phrases().is_empty());

        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));
        assert_eq!(capture(&sm).step, CaptureStep::Phrase);
        assert_eq!(
            capture(&sm).available_phrases(),
            Situation::FourMetre.phrases()
        );

        fire(&mut sm, SessionEvent::ChoosePhrase(Phrase::DirectAttack));
        assert_eq!(capture(&sm).step, CaptureStep::Note);

        fire(&mut sm, SessionEvent::EditNote("late parry".into()));
        assert_eq!(capture(&sm).note, "late parry");

        assert_eq!(fire(&mut sm, SessionEvent::Save), SessionPhase::Idle);
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn changing_situation_clears_phrase_outside_new_vocabulary() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Opponent));
        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));
        fire(&mut sm, SessionEvent::ChoosePhrase(Phrase::PointInLine));

        fire(
            &mut sm,
            SessionEvent::ChooseSituation(Situation::AttackAfterFourMetre),
        );
        let current = capture(&sm);
        assert_eq!(current.phrase, None);
        assert_eq!(current.step, CaptureStep::Phrase);
        assert_eq!(current.scorer, Scorer::Opponent);
    }

    #[test]
    fn changing_situation_keeps_phrase_shared_by_both_vocabularies() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));
        fire(&mut sm, SessionEvent::ChoosePhrase(Phrase::CounterAttack));

        fire(
            &mut sm,
            SessionEvent::ChooseSituation(Situation::DefenceAfterFourMetre),
        );
        let current = capture(&sm);
        assert_eq!(current.phrase, Some(Phrase::CounterAttack));
        assert_eq!(current.step, CaptureStep::Note);
    }

    #[test]
    fn phrase_outside_situation_is_rejected() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));

        let err = sm.plan(SessionEvent::ChoosePhrase(Phrase::StopCut)).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Capture(CaptureError::PhraseNotAllowed { .. })
        ));
        assert!(!sm.has_pending());
        assert_eq!(capture(&sm).phrase, None);
    }

    #[test]
    fn save_requires_note_step() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        let err = sm.plan(SessionEvent::Save).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
    }

    #[test]
    fn cancel_discards_capture_from_any_step() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));
        assert_eq!(fire(&mut sm, SessionEvent::Cancel), SessionPhase::Idle);

        fire(&mut sm, SessionEvent::Tap(Scorer::Opponent));
        let current = capture(&sm);
        assert_eq!(current.situation, None);
        assert_eq!(current.scorer, Scorer::Opponent);
    }

    #[test]
    fn tap_during_capture_is_invalid() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        let err = sm.plan(SessionEvent::Tap(Scorer::Opponent)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
        assert_eq!(capture(&sm).scorer, Scorer::Me);
    }

    #[test]
    fn aborted_save_keeps_capture_intact() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        fire(&mut sm, SessionEvent::ChooseSituation(Situation::FourMetre));
        fire(&mut sm, SessionEvent::ChoosePhrase(Phrase::ParryRiposte));
        let before = capture(&sm);

        let plan = sm.plan(SessionEvent::Save).unwrap();
        assert_eq!(
            sm.plan(SessionEvent::Cancel).unwrap_err(),
            PlanError::AlreadyPending
        );
        sm.abort(plan.id).unwrap();

        assert_eq!(capture(&sm), before);
        assert!(!sm.has_pending());
    }

    #[test]
    fn confirmations_lead_to_expected_phases() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::RequestConfirm(ConfirmAction::Undo));
        assert_eq!(fire(&mut sm, SessionEvent::Confirm), SessionPhase::Idle);

        fire(&mut sm, SessionEvent::RequestConfirm(ConfirmAction::End));
        assert_eq!(fire(&mut sm, SessionEvent::Dismiss), SessionPhase::Idle);

        fire(&mut sm, SessionEvent::RequestConfirm(ConfirmAction::Abandon));
        assert_eq!(
            fire(&mut sm, SessionEvent::Confirm),
            SessionPhase::Terminal(TerminalKind::Abandoned)
        );
        assert!(sm.is_terminal());
        assert!(sm.plan(SessionEvent::Tap(Scorer::Me)).is_err());
    }

    #[test]
    fn end_confirmation_terminates() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::RequestConfirm(ConfirmAction::End));
        assert_eq!(
            fire(&mut sm, SessionEvent::Confirm),
            SessionPhase::Terminal(TerminalKind::Ended)
        );
    }

    #[test]
    fn confirmation_request_not_allowed_during_capture() {
        let mut sm = SessionMachine::new();
        fire(&mut sm, SessionEvent::Tap(Scorer::Me));
        assert!(
            sm.plan(SessionEvent::RequestConfirm(ConfirmAction::Undo))
                .is_err()
        );
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = SessionMachine::new();
        let plan = sm.plan(SessionEvent::Tap(Scorer::Me)).unwrap();
        let other = Uuid::new_v4();
        assert_eq!(
            sm.apply(other),
            Err(ApplyError::IdMismatch {
                expected: plan.id,
                got: other
            })
        );
        assert!(sm.has_pending());
        assert!(sm.apply(plan.id).is_ok());
        assert!(!sm.has_pending());
    }
}
