//! Clue list diffing and edit comparison.
//!
//! The list diff drives incremental projection updates: only added, removed and
//! hidden clues are touched. The edit comparison decides whether an edited
//! clue's zone has to be derived again or the cached one can be reused.

use std::collections::HashSet;

use tracing::debug;

use crate::clue::{Clue, ClueId, RelationKind};

/// Result of diffing a new clue list against the rendered set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClueDiff {
    /// In new-list order.
    pub added: Vec<ClueId>,
    /// In previous rendering order.
    pub removed: Vec<ClueId>,
    /// Untrusted or invisible clues of the new list.
    pub hidden: Vec<ClueId>,
}

impl ClueDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.hidden.is_empty()
    }
}

/// Tracks the identifiers currently rendered by the projections.
#[derive(Debug, Clone, Default)]
pub struct ClueDiffEngine {
    rendered: Vec<ClueId>,
}

impl ClueDiffEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `clues` against the rendered set, then makes it the rendered set.
    pub fn apply(&mut self, clues: &[Clue]) -> ClueDiff {
        let previous: HashSet<&ClueId> = self.rendered.iter().collect();
        let next: HashSet<&ClueId> = clues.iter().map(|c| &c.clue_id).collect();

        let added = clues
            .iter()
            .filter(|c| !previous.contains(&c.clue_id))
            .map(|c| c.clue_id.clone())
            .collect();
        let removed = self
            .rendered
            .iter()
            .filter(|id| !next.contains(id))
            .cloned()
            .collect();
        let hidden = clues
            .iter()
            .filter(|c| c.is_hidden())
            .map(|c| c.clue_id.clone())
            .collect();

        self.rendered = clues.iter().map(|c| c.clue_id.clone()).collect();
        let diff = ClueDiff { added, removed, hidden };
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            hidden = diff.hidden.len(),
            "clue list diffed"
        );
        diff
    }

    #[must_use]
    pub fn rendered(&self) -> &[ClueId] {
        &self.rendered
    }

    pub fn reset(&mut self) {
        self.rendered.clear();
    }
}

/// What to do with an edited clue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditDecision {
    pub has_existing: bool,
    pub need_to_compute_zone: bool,
    /// Only meaningful when no recomputation is needed.
    pub keep_id: bool,
}

impl EditDecision {
    const fn recompute(has_existing: bool) -> Self {
        Self {
            has_existing,
            need_to_compute_zone: true,
            keep_id: false,
        }
    }

    const fn reuse(keep_id: bool) -> Self {
        Self {
            has_existing: true,
            need_to_compute_zone: false,
            keep_id,
        }
    }
}

/// Compares an existing clue with its candidate replacement.
#[must_use]
pub fn compare(existing: Option<&Clue>, candidate: &Clue) -> EditDecision {
    let Some(existing) = existing else {
        return EditDecision::recompute(false);
    };
    if existing.corresponding_zone.is_none() {
        return EditDecision::recompute(true);
    }

    let kind = candidate.spatial_relation_type;
    if existing.text() != candidate.text()
        || existing.target != candidate.target
        || existing.spatial_relation_type != kind
    {
        return EditDecision::recompute(true);
    }

    let old = &existing.spatial_relation_service_options;
    let new = &candidate.spatial_relation_service_options;
    let time_changed = existing.instant_or_duration != candidate.instant_or_duration;
    match kind {
        RelationKind::ImmediateProximity
            if old.distance_to_object != new.distance_to_object || old.uncertainty != new.uncertainty =>
        {
            return EditDecision::recompute(true);
        }
        RelationKind::SunOrShadow if old.type_zone != new.type_zone || time_changed => {
            return EditDecision::recompute(true);
        }
        _ => {}
    }

    #[allow(clippy::float_cmp)]
    let belief_changed = existing.belief != candidate.belief;
    if belief_changed || existing.colors != candidate.colors || time_changed {
        return EditDecision::reuse(!time_changed);
    }

    if old == new {
        EditDecision::reuse(true)
    } else {
        EditDecision::recompute(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clue::{ClueZone, ColorPair, RelationParams, Target, ZoneType};
    use crate::geometry;
    use crate::time::TimeDescriptor;
    use chrono::{TimeZone, Utc};

    fn base() -> Clue {
        let at = Utc.with_ymd_and_hms(2019, 6, 21, 14, 0, 0).unwrap();
        let pt = geometry::feature(geojson::Geometry::new(geojson::Value::Point(vec![5.0, 5.0])), None);
        let mut clue = Clue::builder()
            .relation(RelationKind::ImmediateProximity)
            .target(Target::feature(pt))
            .params(RelationParams::proximity(0.0, 2.0))
            .text("près du lac")
            .timestamp(at)
            .time(TimeDescriptor::now(at))
            .build()
            .unwrap();
        clue.corresponding_zone = Some(ClueZone::new(vec![]));
        clue
    }

    fn with_belief(belief: f64) -> Clue {
        let mut c = base();
        c.belief = belief;
        c
    }

    #[test]
    fn test_diff_added_removed_hidden() {
        let mut engine = ClueDiffEngine::new();
        let a = base();
        let mut b = base();
        b.clue_id = ClueId::from("clue_b");
        b.visible = false;

        let first = engine.apply(&[a.clone(), b.clone()]);
        assert_eq!(first.added, vec![a.clue_id.clone(), b.clue_id.clone()]);
        assert!(first.removed.is_empty());
        assert_eq!(first.hidden, vec![b.clue_id.clone()]);

        let mut c = with_belief(0.0);
        c.clue_id = ClueId::from("clue_c");
        let second = engine.apply(&[b.clone(), c.clone()]);
        assert_eq!(second.added, vec![c.clue_id.clone()]);
        assert_eq!(second.removed, vec![a.clue_id]);
        assert_eq!(second.hidden, vec![b.clue_id.clone(), c.clue_id.clone()]);
        assert_eq!(engine.rendered(), &[b.clue_id, c.clue_id]);
    }

    #[test]
    fn test_diff_same_list_is_empty() {
        let mut engine = ClueDiffEngine::new();
        let list = vec![base()];
        engine.apply(&list);
        assert!(engine.apply(&list).is_empty());
    }

    #[test]
    fn test_compare_without_existing() {
        let d = compare(None, &base());
        assert!(!d.has_existing);
        assert!(d.need_to_compute_zone);
    }

    #[test]
    fn test_compare_without_cached_zone() {
        let mut existing = base();
        existing.corresponding_zone = None;
        assert!(compare(Some(&existing), &base()).need_to_compute_zone);
    }

    #[test]
    fn test_identical_resubmission_keeps_id() {
        let c = base();
        let d = compare(Some(&c), &c.clone());
        assert_eq!(
            d,
            EditDecision {
                has_existing: true,
                need_to_compute_zone: false,
                keep_id: true
            }
        );
    }

    #[test]
    fn test_text_change_recomputes() {
        let mut candidate = base();
        candidate.clue_natural_language = None;
        assert!(compare(Some(&base()), &candidate).need_to_compute_zone);
    }

    #[test]
    fn test_distance_change_recomputes() {
        let mut candidate = base();
        candidate.spatial_relation_service_options = RelationParams::proximity(0.0, 3.0);
        assert!(compare(Some(&base()), &candidate).need_to_compute_zone);
    }

    #[test]
    fn test_belief_or_color_change_reuses_zone() {
        let d = compare(Some(&base()), &with_belief(0.0));
        assert!(!d.need_to_compute_zone);
        assert!(d.keep_id);

        let mut recolored = base();
        recolored.colors = ColorPair::from_hex("#00ff00").unwrap();
        let d = compare(Some(&base()), &recolored);
        assert!(!d.need_to_compute_zone);
        assert!(d.keep_id);
    }

    #[test]
    fn test_time_change_on_proximity_reuses_zone_with_new_id() {
        let mut candidate = base();
        candidate.instant_or_duration = TimeDescriptor::hours_ago(candidate.timestamp, 2).unwrap();
        let d = compare(Some(&base()), &candidate);
        assert!(!d.need_to_compute_zone);
        assert!(!d.keep_id);
    }

    #[test]
    fn test_sun_or_shadow_time_change_recomputes() {
        let mut existing = base();
        existing.spatial_relation_type = RelationKind::SunOrShadow;
        existing.target = None;
        existing.spatial_relation_service_options = RelationParams::sun_or_shadow(ZoneType::Sun);

        let mut shadow = existing.clone();
        shadow.spatial_relation_service_options = RelationParams::sun_or_shadow(ZoneType::Shadow);
        assert!(compare(Some(&existing), &shadow).need_to_compute_zone);

        let mut later = existing.clone();
        later.instant_or_duration = TimeDescriptor::hours_ago(later.timestamp, 1).unwrap();
        assert!(compare(Some(&existing), &later).need_to_compute_zone);

        assert!(!compare(Some(&existing), &existing.clone()).need_to_compute_zone);
    }

    #[test]
    fn test_unused_parameter_change_recomputes() {
        let mut existing = base();
        existing.spatial_relation_type = RelationKind::Sees;
        let mut candidate = existing.clone();
        candidate.spatial_relation_service_options = RelationParams::proximity(10.0, 2.0);
        assert!(compare(Some(&existing), &candidate).need_to_compute_zone);
    }
}
