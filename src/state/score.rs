//! Score aggregation over a match's point log.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::fencing::Scorer;

/// Touch count per fencer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tally {
    /// Touches scored by the logging user.
    pub me: u32,
    /// Touches scored by the opponent.
    pub opponent: u32,
}

impl Tally {
    /// Build a tally from explicit values.
    pub fn new(me: u32, opponent: u32) -> Self {
        Self { me, opponent }
    }

    /// Count one more touch for `scorer`.
    pub fn increment(&mut self, scorer: Scorer) {
        match scorer {
            Scorer::Me => self.me += 1,
            Scorer::Opponent => self.opponent += 1,
        }
    }

    /// Total number of touches.
    pub fn total(&self) -> u32 {
        self.me + self.opponent
    }

    /// Whether a recorded snapshot is reachable from this tally (never ahead of it).
    pub fn admits_snapshot(&self, snapshot: Tally) -> bool {
        snapshot.me <= self.me && snapshot.opponent <= self.opponent
    }

    /// Whether this snapshot can follow `earlier` in a match: neither side goes down.
    pub fn follows(&self, earlier: Tally) -> bool {
        self.me >= earlier.me && self.opponent >= earlier.opponent
    }
}

/// Count touches per scorer.
pub fn tally<I>(scorers: I) -> Tally
where
    I: IntoIterator<Item = Scorer>,
{
    scorers.into_iter().fold(Tally::default(), |mut acc, scorer| {
        acc.increment(scorer);
        acc
    })
}

/// Score shown for a match: the stored result once finalized, the live tally otherwise.
pub fn displayed_score(finalized: bool, stored: Tally, derived: Tally) -> Tally {
    if finalized { stored } else { derived }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_side() {
        let result = tally([Scorer::Me, Scorer::Opponent, Scorer::Me, Scorer::Me]);
        assert_eq!(result, Tally::new(3, 1));
        assert_eq!(result.total(), 4);
    }

    #[test]
    fn empty_log_is_nil_all() {
        assert_eq!(tally(std::iter::empty()), Tally::default());
    }

    #[test]
    fn finalized_score_wins_over_tally() {
        let stored = Tally::new(5, 3);
        let derived = Tally::new(6, 3);
        assert_eq!(displayed_score(true, stored, derived), stored);
        assert_eq!(displayed_score(false, stored, derived), derived);
        assert_eq!(
            displayed_score(true, Tally::default(), derived),
            Tally::default()
        );
    }

    #[test]
    fn snapshot_may_not_run_ahead_of_tally() {
        let current = Tally::new(2, 1);
        assert!(current.admits_snapshot(Tally::new(2, 1)));
        assert!(current.admits_snapshot(Tally::new(0, 0)));
        assert!(!current.admits_snapshot(Tally::new(3, 1)));
        assert!(!current.admits_snapshot(Tally::new(2, 2)));
    }

    #[test]
    fn snapshots_never_go_down() {
        let earlier = Tally::new(1, 2);
        assert!(Tally::new(1, 2).follows(earlier));
        assert!(Tally::new(2, 2).follows(earlier));
        assert!(!Tally::new(0, 2).follows(earlier));
        assert!(!Tally::new(3, 1).follows(earlier));
    }
}
