use serde::Serialize;
use utoipa::ToSchema;

use crate::state::taxonomy::{Phrase, Situation, match_tag_categories};

/// Phrase entry with its display label.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhraseEntry {
    pub id: Phrase,
    pub label: &'static str,
}

/// Situation entry with the phrases valid under it, in display order.
#[derive(Debug, Serialize, ToSchema)]
pub struct SituationEntry {
    pub id: Situation,
    pub label: &'static str,
    pub phrases: Vec<PhraseEntry>,
}

/// Suggested match tags of one category.
#[derive(Debug, Serialize, ToSchema)]
pub struct TagCategory {
    pub name: &'static str,
    pub tags: Vec<&'static str>,
}

/// Closed vocabularies used by the capture screen and the match tag editor.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaxonomyResponse {
    pub situations: Vec<SituationEntry>,
    pub tag_categories: Vec<TagCategory>,
}

impl TaxonomyResponse {
    /// Build the response from the static vocabularies.
    pub fn build() -> Self {
        let situations = Situation::all()
            .iter()
            .map(|situation| SituationEntry {
                id: *situation,
                label: situation.label(),
                phrases: situation
                    .phrases()
                    .iter()
                    .map(|phrase| PhraseEntry {
                        id: *phrase,
                        label: phrase.label(),
                    })
                    .collect(),
            })
            .collect();

        let tag_categories = match_tag_categories()
            .into_iter()
            .map(|(name, tags)| TagCategory {
                name,
                tags: tags.to_vec(),
            })
            .collect();

        Self {
            situations,
            tag_categories,
        }
    }
}
