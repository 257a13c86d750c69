//! Keyword heuristics pre-filling a clue from its French text.
//!
//! Only a suggestion: the operator confirms or corrects it before the clue
//! is submitted.

use regex::Regex;
use tracing::debug;

use crate::clue::{RelationKind, Target};
use crate::error::{ChoucasError, ChoucasResult};
use crate::reference::{RefCategory, ReferenceCatalog};

const SEES: &str = r"\bvoi(?:t|r|ent)\b";
const HEARS: &str = r"\bentend";
const SUN_OR_SHADOW: &str = r"\b(?:ombre|soleil)";

/// Checked in order; the first match wins.
const CATEGORY_RULES: [(&str, RefCategory); 10] = [
    (r"sentier|chemin", RefCategory::Pathway),
    (r"route", RefCategory::Road),
    (r"piste", RefCategory::Piste),
    (r"\blac\b|plan d'eau|\bétang|\bplan\b.*\beau\b", RefCategory::Lake),
    (r"r[ée]servoir", RefCategory::Reservoir),
    (r"\beau\b|rivière|ruisseau", RefCategory::River),
    (r"c[aâ]ble|\bremont", RefCategory::SkiLift),
    (r"[ée]lectri|\bligne", RefCategory::PowerLine),
    (r"sommet|\bpic\b", RefCategory::Peak),
    (r"\bcol\b", RefCategory::Col),
];

fn compile(pattern: &str) -> ChoucasResult<Regex> {
    Regex::new(pattern).map_err(|e| ChoucasError::internal(format!("invalid pattern '{pattern}': {e}")))
}

/// Relation and target inferred from a clue text.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub relation: RelationKind,
    pub category: Option<RefCategory>,
    /// Target resolved against the reference catalog.
    pub target: Option<Target>,
}

#[derive(Debug, Clone)]
pub struct ClueAssistant {
    sees: Regex,
    hears: Regex,
    sun_or_shadow: Regex,
    categories: Vec<(Regex, RefCategory)>,
}

impl ClueAssistant {
    /// # Errors
    ///
    /// Returns an internal error if a built-in pattern fails to compile.
    pub fn new() -> ChoucasResult<Self> {
        Ok(Self {
            sees: compile(SEES)?,
            hears: compile(HEARS)?,
            sun_or_shadow: compile(SUN_OR_SHADOW)?,
            categories: CATEGORY_RULES
                .iter()
                .map(|(pattern, category)| Ok((compile(pattern)?, *category)))
                .collect::<ChoucasResult<_>>()?,
        })
    }

    #[must_use]
    pub fn relation(&self, text: &str) -> RelationKind {
        let text = text.to_lowercase();
        if self.sees.is_match(&text) {
            RelationKind::Sees
        } else if self.hears.is_match(&text) {
            RelationKind::Hears
        } else if self.sun_or_shadow.is_match(&text) {
            RelationKind::SunOrShadow
        } else {
            RelationKind::ImmediateProximity
        }
    }

    /// Category named in `text`. Sun/shadow clues have no target category.
    #[must_use]
    pub fn category(&self, text: &str, relation: RelationKind) -> Option<RefCategory> {
        if relation == RelationKind::SunOrShadow {
            return None;
        }
        let text = text.to_lowercase();
        self.categories
            .iter()
            .find(|(re, _)| re.is_match(&text))
            .map(|(_, category)| *category)
    }

    #[must_use]
    pub fn suggest(&self, text: &str, catalog: &ReferenceCatalog) -> Suggestion {
        let relation = self.relation(text);
        let category = self.category(text, relation);
        let target = match (relation, category) {
            (RelationKind::SunOrShadow, _) => Some(Target::Feature { feature: None }),
            (_, Some(category)) => Some(Target::category(category, catalog.features(category).to_vec())),
            (_, None) => None,
        };
        debug!(?relation, ?category, "clue text suggestion");
        Suggestion {
            relation,
            category,
            target,
        }
    }
}
