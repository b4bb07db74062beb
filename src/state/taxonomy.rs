//! Closed vocabularies used to classify touches and describe matches.

use std::{fmt, str::FromStr};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Phase of the engagement (relative to the 4 m line) at which a touch occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    /// Action fought out at the 4 m line itself.
    FourMetre,
    /// Attack launched after crossing the 4 m line.
    AttackAfterFourMetre,
    /// Defence after the opponent crossed the 4 m line.
    DefenceAfterFourMetre,
}

/// Tactical action that produced a touch. Valid values depend on the [`Situation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phrase {
    /// Simple attack without preparation.
    DirectAttack,
    /// Attack into the opponent's preparation.
    AttackOnPreparation,
    /// Counter-attack into the opponent's attack.
    CounterAttack,
    /// Parry followed by riposte.
    ParryRiposte,
    /// Point in line established before the attack.
    PointInLine,
    /// Attack preceded by a beat on the blade.
    BeatAttack,
    /// Attack with one or more feints.
    FeintAttack,
    /// Renewed attack without withdrawing the arm.
    Remise,
    /// Prepared second action after a drawn first action.
    SecondIntention,
    /// Stop cut to the arm.
    StopCut,
    /// Pulling distance to make the attack fall short.
    DistancePull,
    /// Counter-riposte after a parried riposte.
    CounterRiposte,
}

const ALL_SITUATIONS: [Situation; 3] = [
    Situation::FourMetre,
    Situation::AttackAfterFourMetre,
    Situation::DefenceAfterFourMetre,
];

const FOUR_METRE_PHRASES: &[Phrase] = &[
    Phrase::DirectAttack,
    Phrase::AttackOnPreparation,
    Phrase::CounterAttack,
    Phrase::ParryRiposte,
    Phrase::PointInLine,
];

const ATTACK_AFTER_FOUR_METRE_PHRASES: &[Phrase] = &[
    Phrase::DirectAttack,
    Phrase::BeatAttack,
    Phrase::FeintAttack,
    Phrase::Remise,
    Phrase::SecondIntention,
];

const DEFENCE_AFTER_FOUR_METRE_PHRASES: &[Phrase] = &[
    Phrase::ParryRiposte,
    Phrase::CounterAttack,
    Phrase::StopCut,
    Phrase::DistancePull,
    Phrase::CounterRiposte,
];

impl Situation {
    /// Every situation in display order.
    pub fn all() -> &'static [Situation] {
        &ALL_SITUATIONS
    }

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Situation::FourMetre => "four_metre",
            Situation::AttackAfterFourMetre => "attack_after_four_metre",
            Situation::DefenceAfterFourMetre => "defence_after_four_metre",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Situation::FourMetre => "4m",
            Situation::AttackAfterFourMetre => "Attack after 4m",
            Situation::DefenceAfterFourMetre => "Defence after 4m",
        }
    }

    /// Phrases that may be recorded for this situation, in display order.
    pub fn phrases(self) -> &'static [Phrase] {
        match self {
            Situation::FourMetre => FOUR_METRE_PHRASES,
            Situation::AttackAfterFourMetre => ATTACK_AFTER_FOUR_METRE_PHRASES,
            Situation::DefenceAfterFourMetre => DEFENCE_AFTER_FOUR_METRE_PHRASES,
        }
    }

    /// Whether `phrase` belongs to this situation's vocabulary.
    pub fn allows(self, phrase: Phrase) -> bool {
        self.phrases().contains(&phrase)
    }
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Situation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        ALL_SITUATIONS
            .iter()
            .copied()
            .find(|situation| situation.as_str() == value)
            .ok_or_else(|| format!("unknown situation `{value}`"))
    }
}

const ALL_PHRASES: [Phrase; 12] = [
    Phrase::DirectAttack,
    Phrase::AttackOnPreparation,
    Phrase::CounterAttack,
    Phrase::ParryRiposte,
    Phrase::PointInLine,
    Phrase::BeatAttack,
    Phrase::FeintAttack,
    Phrase::Remise,
    Phrase::SecondIntention,
    Phrase::StopCut,
    Phrase::DistancePull,
    Phrase::CounterRiposte,
];

impl Phrase {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Phrase::DirectAttack => "direct_attack",
            Phrase::AttackOnPreparation => "attack_on_preparation",
            Phrase::CounterAttack => "counter_attack",
            Phrase::ParryRiposte => "parry_riposte",
            Phrase::PointInLine => "point_in_line",
            Phrase::BeatAttack => "beat_attack",
            Phrase::FeintAttack => "feint_attack",
            Phrase::Remise => "remise",
            Phrase::SecondIntention => "second_intention",
            Phrase::StopCut => "stop_cut",
            Phrase::DistancePull => "distance_pull",
            Phrase::CounterRiposte => "counter_riposte",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Phrase::DirectAttack => "Direct attack",
            Phrase::AttackOnPreparation => "Attack on preparation",
            Phrase::CounterAttack => "Counter-attack",
            Phrase::ParryRiposte => "Parry-riposte",
            Phrase::PointInLine => "Point in line",
            Phrase::BeatAttack => "Beat attack",
            Phrase::FeintAttack => "Feint attack",
            Phrase::Remise => "Remise",
            Phrase::SecondIntention => "Second intention",
            Phrase::StopCut => "Stop cut",
            Phrase::DistancePull => "Distance pull",
            Phrase::CounterRiposte => "Counter-riposte",
        }
    }
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phrase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err("phrase must not be blank".into());
        }
        ALL_PHRASES
            .iter()
            .copied()
            .find(|phrase| phrase.as_str() == value)
            .ok_or_else(|| format!("unknown phrase `{value}`"))
    }
}

/// Parse a situation/phrase pair and check that the phrase belongs to the situation.
pub fn classify(situation: &str, phrase: &str) -> Result<(Situation, Phrase), String> {
    let situation: Situation = situation.parse()?;
    let phrase: Phrase = phrase.parse()?;
    if !situation.allows(phrase) {
        return Err(format!(
            "phrase `{phrase}` is not valid for situation `{situation}`"
        ));
    }
    Ok((situation, phrase))
}

const OPPONENT_PROFILE_TAGS: &[&str] = &[
    "Right-handed",
    "Left-handed",
    "Tall",
    "Standard height",
    "Speed type",
    "Power type",
];

const MATCH_TYPE_TAGS: &[&str] = &[
    "Practice",
    "Tournament (student league)",
    "Tournament (national/public universities)",
    "Tournament (JFE)",
];

const SELF_ASSESSMENT_TAGS: &[&str] = &["Should have won but lost", "Beat a stronger opponent"];

const TACTICAL_NOTE_TAGS: &[&str] = &[
    "Pressing forward",
    "Defensive",
    "Reading the opponent",
    "Committed action",
];

/// Suggested descriptive match tags, keyed by category label in display order.
pub fn match_tag_categories() -> IndexMap<&'static str, &'static [&'static str]> {
    IndexMap::from([
        ("Opponent profile", OPPONENT_PROFILE_TAGS),
        ("Match type", MATCH_TYPE_TAGS),
        ("Self assessment", SELF_ASSESSMENT_TAGS),
        ("Tactical note", TACTICAL_NOTE_TAGS),
    ])
}

/// Normalise a user-provided tag list: trim entries, drop blanks and duplicates, keep order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = IndexSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() {
            seen.insert(tag.to_string());
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_situation_has_five_phrases() {
        for situation in Situation::all() {
            assert_eq!(situation.phrases().len(), 5, "{situation}");
        }
    }

    #[test]
    fn phrases_round_trip_through_wire_names() {
        for phrase in ALL_PHRASES {
            assert_eq!(phrase.as_str().parse::<Phrase>(), Ok(phrase));
        }
        for situation in Situation::all() {
            assert_eq!(situation.as_str().parse::<Situation>(), Ok(*situation));
        }
    }

    #[test]
    fn classify_rejects_phrase_from_other_situation() {
        assert!(classify("four_metre", "direct_attack").is_ok());
        let err = classify("four_metre", "stop_cut").unwrap_err();
        assert!(err.contains("not valid"));
        assert!(classify("defence_after_four_metre", "stop_cut").is_ok());
    }

    #[test]
    fn classify_rejects_blank_or_unknown_values() {
        assert!(classify("four_metre", "   ").is_err());
        assert!(classify("nowhere", "direct_attack").is_err());
        assert!(classify("four_metre", "lunge").is_err());
    }

    #[test]
    fn normalize_tags_trims_and_dedupes_in_order() {
        let tags = normalize_tags(["  Tall ", "", "Practice", "Tall", "   "]);
        assert_eq!(tags, vec!["Tall".to_string(), "Practice".to_string()]);
    }

    #[test]
    fn tag_categories_keep_display_order() {
        let categories = match_tag_categories();
        let keys: Vec<_> = categories.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                "Opponent profile",
                "Match type",
                "Self assessment",
                "Tactical note"
            ]
        );
    }
}
