//! Per-field reactions and the follow-up effects they emit.
//!
//! A reaction runs synchronously before its field is committed. It may read
//! the other, already committed, fields through the state view, and it never
//! writes directly: cascades are returned as [`Effect`]s that the session
//! applies in order once the current write is committed.

use std::collections::HashMap;
use std::fmt;

use crate::boundary::SearchBoundary;
use crate::clue;
use crate::diff::{ClueDiff, ClueDiffEngine};
use crate::error::ChoucasResult;
use crate::state::{AppState, BaseLayer, Field, FieldValue, ProbableZone, Viewport};
use crate::validation;

/// The write a reaction is asked about.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    pub new: &'a FieldValue,
    pub old: &'a FieldValue,
}

/// Incremental update for the projections (map, globe, legend).
#[derive(Debug, Clone, PartialEq)]
pub enum RenderUpdate {
    Viewport(Viewport),
    BaseLayer(BaseLayer),
    Boundary(Option<SearchBoundary>),
    Clues(ClueDiff),
    ProbableZone(Option<ProbableZone>),
}

/// Follow-up work emitted by a reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A cascade write, applied after the current one.
    Write(FieldValue),
    Render(RenderUpdate),
    /// Recompute the probable zone from the committed clue list.
    Aggregate,
    FetchReferenceFeatures(SearchBoundary),
    ClearReferenceFeatures,
}

/// Reaction attached to one store field.
pub trait Reaction: Send {
    /// # Errors
    ///
    /// An error aborts the write: nothing is committed.
    fn react(&mut self, change: Change<'_>, view: &AppState) -> ChoucasResult<Vec<Effect>>;
}

impl<F> Reaction for F
where
    F: FnMut(Change<'_>, &AppState) -> ChoucasResult<Vec<Effect>> + Send,
{
    fn react(&mut self, change: Change<'_>, view: &AppState) -> ChoucasResult<Vec<Effect>> {
        self(change, view)
    }
}

/// A consumer of [`RenderUpdate`]s.
pub trait Projection: Send {
    fn apply(&mut self, update: &RenderUpdate, state: &AppState);
}

/// Reactions keyed by field, populated at initialization.
#[derive(Default)]
pub struct ReactionRegistry {
    handlers: HashMap<Field, Box<dyn Reaction>>,
}

impl fmt::Debug for ReactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<Field> = self.handlers.keys().copied().collect();
        fields.sort();
        f.debug_struct("ReactionRegistry").field("fields", &fields).finish()
    }
}

impl ReactionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard reaction of every field.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Field::Viewport, Box::new(viewport_reaction));
        registry.register(Field::BaseLayer, Box::new(base_layer_reaction));
        registry.register(Field::SearchBoundary, Box::new(boundary_reaction));
        registry.register(Field::Victim, Box::new(victim_reaction));
        registry.register(Field::Clues, Box::new(CluesReaction::default()));
        registry.register(Field::ProbableZone, Box::new(probable_zone_reaction));
        registry
    }

    /// Registers a reaction, returning the one it replaces.
    pub fn register(&mut self, field: Field, reaction: Box<dyn Reaction>) -> Option<Box<dyn Reaction>> {
        self.handlers.insert(field, reaction)
    }

    pub fn get_mut(&mut self, field: Field) -> Option<&mut (dyn Reaction + 'static)> {
        self.handlers.get_mut(&field).map(|r| r.as_mut())
    }
}

#[allow(clippy::unnecessary_wraps)]
fn viewport_reaction(change: Change<'_>, _view: &AppState) -> ChoucasResult<Vec<Effect>> {
    match change.new {
        FieldValue::Viewport(v) => Ok(vec![Effect::Render(RenderUpdate::Viewport(*v))]),
        _ => Ok(Vec::new()),
    }
}

#[allow(clippy::unnecessary_wraps)]
fn base_layer_reaction(change: Change<'_>, _view: &AppState) -> ChoucasResult<Vec<Effect>> {
    match change.new {
        FieldValue::BaseLayer(l) => Ok(vec![Effect::Render(RenderUpdate::BaseLayer(*l))]),
        _ => Ok(Vec::new()),
    }
}

/// Replacing or clearing the boundary drops the reference features; clearing
/// it also drops every clue.
#[allow(clippy::unnecessary_wraps)]
fn boundary_reaction(change: Change<'_>, view: &AppState) -> ChoucasResult<Vec<Effect>> {
    let (FieldValue::SearchBoundary(new), FieldValue::SearchBoundary(old)) = (change.new, change.old) else {
        return Ok(Vec::new());
    };
    if new == old {
        return Ok(Vec::new());
    }

    let mut effects = Vec::new();
    if old.is_some() {
        effects.push(Effect::ClearReferenceFeatures);
    }
    match new {
        None => {
            if !view.clues.is_empty() {
                effects.push(Effect::Write(FieldValue::Clues(Vec::new())));
            }
        }
        Some(isa) => {
            validation::report(validation::check_boundary(isa));
            effects.push(Effect::FetchReferenceFeatures(isa.clone()));
        }
    }
    effects.push(Effect::Render(RenderUpdate::Boundary(new.clone())));
    Ok(effects)
}

#[allow(clippy::unnecessary_wraps)]
fn victim_reaction(change: Change<'_>, _view: &AppState) -> ChoucasResult<Vec<Effect>> {
    if let FieldValue::Victim(Some(victim)) = change.new {
        validation::report(validation::check_victim(victim));
    }
    Ok(Vec::new())
}

#[allow(clippy::unnecessary_wraps)]
fn probable_zone_reaction(change: Change<'_>, _view: &AppState) -> ChoucasResult<Vec<Effect>> {
    let FieldValue::ProbableZone(zone) = change.new else {
        return Ok(Vec::new());
    };
    if let Some(zone) = zone {
        validation::report(validation::check_probable_zone(zone));
    }
    Ok(vec![Effect::Render(RenderUpdate::ProbableZone(zone.clone()))])
}

/// Diffs every new clue list against what the projections show, then asks
/// for a fresh aggregation.
#[derive(Debug, Default)]
pub struct CluesReaction {
    engine: ClueDiffEngine,
}

impl Reaction for CluesReaction {
    fn react(&mut self, change: Change<'_>, _view: &AppState) -> ChoucasResult<Vec<Effect>> {
        let FieldValue::Clues(clues) = change.new else {
            return Ok(Vec::new());
        };

        clue::ensure_unique_ids(clues)?;

        let diff = self.engine.apply(clues);
        for id in &diff.added {
            if let Some(clue) = clues.iter().find(|c| &c.clue_id == id) {
                validation::report(validation::check_clue(clue));
            }
        }
        Ok(vec![Effect::Render(RenderUpdate::Clues(diff)), Effect::Aggregate])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clue::{Clue, RelationKind};
    use crate::error::{ChoucasError, ValidationError};

    fn hears() -> Clue {
        Clue::builder().relation(RelationKind::Hears).build().unwrap()
    }

    #[test]
    fn test_clearing_boundary_cascades_to_clues() {
        let isa = SearchBoundary::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap();
        let mut view = AppState::new();
        view.boundary = Some(isa.clone());
        view.clues = vec![hears()];

        let new = FieldValue::SearchBoundary(None);
        let old = FieldValue::SearchBoundary(Some(isa));
        let effects = boundary_reaction(Change { new: &new, old: &old }, &view).unwrap();
        assert_eq!(effects[0], Effect::ClearReferenceFeatures);
        assert_eq!(effects[1], Effect::Write(FieldValue::Clues(Vec::new())));
    }

    #[test]
    fn test_setting_boundary_fetches_features() {
        let isa = SearchBoundary::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap();
        let new = FieldValue::SearchBoundary(Some(isa.clone()));
        let old = FieldValue::SearchBoundary(None);
        let effects = boundary_reaction(Change { new: &new, old: &old }, &AppState::new()).unwrap();
        assert!(effects.contains(&Effect::FetchReferenceFeatures(isa)));
        assert!(!effects.contains(&Effect::ClearReferenceFeatures));
    }

    #[test]
    fn test_unchanged_boundary_is_a_no_op() {
        let isa = SearchBoundary::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap();
        let value = FieldValue::SearchBoundary(Some(isa));
        let effects = boundary_reaction(Change { new: &value, old: &value }, &AppState::new()).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_clues_reaction_rejects_duplicates() {
        let clue = hears();
        let new = FieldValue::Clues(vec![clue.clone(), clue.clone()]);
        let old = FieldValue::Clues(Vec::new());
        let mut reaction = CluesReaction::default();
        let err = reaction.react(Change { new: &new, old: &old }, &AppState::new()).unwrap_err();
        assert!(matches!(
            err,
            ChoucasError::Validation(ValidationError::DuplicateClueId { ref id }) if *id == clue.clue_id
        ));
    }

    #[test]
    fn test_clues_reaction_requests_aggregation() {
        let clue = hears();
        let id = clue.clue_id.clone();
        let new = FieldValue::Clues(vec![clue]);
        let old = FieldValue::Clues(Vec::new());
        let mut reaction = CluesReaction::default();
        let effects = reaction.react(Change { new: &new, old: &old }, &AppState::new()).unwrap();
        let Effect::Render(RenderUpdate::Clues(diff)) = &effects[0] else {
            panic!("expected a clue render update");
        };
        assert_eq!(diff.added, vec![id]);
        assert_eq!(effects[1], Effect::Aggregate);
    }
}
