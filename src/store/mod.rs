//! The observable state container.
//!
//! Every write goes through [`Store::set`], the single interception point:
//! 1. the prior state is snapshotted into the diagnostic trace,
//! 2. the field's reaction runs against (new, old),
//! 3. the value is committed,
//! 4. unless the store is restoring, the permalink is regenerated and pushed.
//!
//! Effects returned by reactions are queued FIFO; the session drains them.

pub mod reaction;
pub mod trace;

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use crate::clue::{Clue, ClueId};
use crate::config::StoreConfig;
use crate::error::{ChoucasError, ChoucasResult};
use crate::permalink::{History, HistoryEntry, MemoryHistory, Permalink, Snapshot};
use crate::state::{AppState, Field, FieldValue};

pub use reaction::{Change, CluesReaction, Effect, Projection, Reaction, ReactionRegistry, RenderUpdate};
pub use trace::{TraceEntry, TraceRing};

/// Whether committed writes regenerate the permalink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionMode {
    #[default]
    Normal,
    /// Replaying a history entry: reactions run, permalinks are not pushed.
    Restoring,
}

#[derive(Debug)]
pub struct Store {
    state: AppState,
    reactions: ReactionRegistry,
    trace: TraceRing,
    mode: TransactionMode,
    history: Box<dyn History>,
    effects: VecDeque<Effect>,
    clue_versions: HashMap<ClueId, u64>,
    next_version: u64,
    boundary_generation: u64,
}

impl Store {
    /// Store with the standard reactions and an in-memory history.
    #[must_use]
    pub fn new(cfg: &StoreConfig) -> Self {
        Self::with_parts(cfg, AppState::new(), ReactionRegistry::standard(), Box::new(MemoryHistory::new()))
    }

    #[must_use]
    pub fn with_parts(
        cfg: &StoreConfig,
        state: AppState,
        reactions: ReactionRegistry,
        history: Box<dyn History>,
    ) -> Self {
        let mut store = Self {
            state,
            reactions,
            trace: TraceRing::new(cfg.trace_capacity),
            mode: TransactionMode::Normal,
            history,
            effects: VecDeque::new(),
            clue_versions: HashMap::new(),
            next_version: 0,
            boundary_generation: 0,
        };
        let clues = store.state.clues.clone();
        store.bump_versions(&[], &clues);
        store
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    pub fn register(&mut self, field: Field, reaction: Box<dyn Reaction>) -> Option<Box<dyn Reaction>> {
        self.reactions.register(field, reaction)
    }

    #[must_use]
    pub const fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TransactionMode) {
        debug!(?mode, "store transaction mode");
        self.mode = mode;
    }

    /// Writes one field.
    ///
    /// # Errors
    ///
    /// Returns the reaction's error, in which case nothing was committed, or an
    /// internal error if the state cannot be snapshotted.
    pub fn set(&mut self, value: FieldValue) -> ChoucasResult<()> {
        let field = value.field();
        info!(field = %field, mode = ?self.mode, "state change requested");

        self.trace
            .record(field, &self.state)
            .map_err(|e| ChoucasError::internal(format!("state snapshot failed: {e}")))?;

        let old = self.state.get(field);
        let effects = match self.reactions.get_mut(field) {
            Some(reaction) => reaction.react(Change { new: &value, old: &old }, &self.state)?,
            None => Vec::new(),
        };

        let new_clues = match &value {
            FieldValue::Clues(clues) => Some(clues.clone()),
            _ => None,
        };
        self.state.replace(value);
        match (field, old, new_clues) {
            (Field::Clues, FieldValue::Clues(old), Some(new)) => self.bump_versions(&old, &new),
            (Field::SearchBoundary, _, _) => self.boundary_generation += 1,
            _ => {}
        }
        self.effects.extend(effects);

        if self.mode == TransactionMode::Normal {
            self.push_permalink()?;
        }
        Ok(())
    }

    fn bump_versions(&mut self, old: &[Clue], new: &[Clue]) {
        for clue in new {
            let unchanged = old
                .iter()
                .find(|c| c.clue_id == clue.clue_id)
                .is_some_and(|c| c == clue);
            if !unchanged || !self.clue_versions.contains_key(&clue.clue_id) {
                self.next_version += 1;
                self.clue_versions.insert(clue.clue_id.clone(), self.next_version);
            }
        }
        self.clue_versions
            .retain(|id, _| new.iter().any(|c| &c.clue_id == id));
    }

    fn push_permalink(&mut self) -> ChoucasResult<()> {
        let snapshot = Snapshot::capture(&self.state);
        let fragment = Permalink::of(&snapshot)?.to_string();
        if self.history.current().map(|e| e.fragment.as_str()) != Some(fragment.as_str()) {
            debug!(%fragment, "permalink pushed");
            self.history.push(HistoryEntry { fragment, snapshot });
        }
        Ok(())
    }

    /// Next queued effect, oldest first.
    pub fn next_effect(&mut self) -> Option<Effect> {
        self.effects.pop_front()
    }

    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }

    /// Version of a live clue; changes whenever the clue is rewritten.
    #[must_use]
    pub fn clue_version(&self, id: &ClueId) -> Option<u64> {
        self.clue_versions.get(id).copied()
    }

    /// Incremented on every boundary write.
    #[must_use]
    pub const fn boundary_generation(&self) -> u64 {
        self.boundary_generation
    }

    #[must_use]
    pub const fn trace(&self) -> &TraceRing {
        &self.trace
    }

    #[must_use]
    pub fn history(&self) -> &dyn History {
        self.history.as_ref()
    }

    pub fn history_mut(&mut self) -> &mut dyn History {
        self.history.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clue::RelationKind;
    use crate::error::ExecutionError;
    use crate::state::{BaseLayer, Viewport};

    fn hears() -> Clue {
        Clue::builder().relation(RelationKind::Hears).build().unwrap()
    }

    #[test]
    fn test_write_commits_and_pushes_permalink() {
        let mut store = Store::new(&StoreConfig::default());
        store.set(FieldValue::BaseLayer(BaseLayer::Osm)).unwrap();
        assert_eq!(store.state().base_layer, BaseLayer::Osm);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.trace().len(), 1);
        assert!(store.history().current().unwrap().fragment.starts_with("#map=10.8/5.78/45.15/"));
    }

    #[test]
    fn test_same_fragment_is_not_pushed_twice() {
        let mut store = Store::new(&StoreConfig::default());
        store.set(FieldValue::BaseLayer(BaseLayer::Osm)).unwrap();
        store.set(FieldValue::BaseLayer(BaseLayer::Osm)).unwrap();
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn test_restoring_mode_suppresses_permalink() {
        let mut store = Store::new(&StoreConfig::default());
        store.set_mode(TransactionMode::Restoring);
        store
            .set(FieldValue::Viewport(Viewport {
                zoom: 12.0,
                center: [6.0, 45.0],
            }))
            .unwrap();
        assert!(store.history().is_empty());
        assert_eq!(store.next_effect(), Some(Effect::Render(RenderUpdate::Viewport(store.state().viewport))));
    }

    #[test]
    fn test_failing_reaction_leaves_state_untouched() {
        let mut store = Store::new(&StoreConfig::default());
        store.register(
            Field::BaseLayer,
            Box::new(|_: Change<'_>, _: &AppState| -> ChoucasResult<Vec<Effect>> {
                Err(ExecutionError::MissingBoundary.into())
            }),
        );
        let err = store.set(FieldValue::BaseLayer(BaseLayer::Humanitarian)).unwrap_err();
        assert!(err.is_execution());
        assert_eq!(store.state().base_layer, BaseLayer::OpenTopoMap);
        assert!(store.history().is_empty());
        assert_eq!(store.pending_effects(), 0);
    }

    #[test]
    fn test_reaction_sees_old_and_new_before_commit() {
        let mut store = Store::new(&StoreConfig::default());
        store.register(
            Field::BaseLayer,
            Box::new(|change: Change<'_>, view: &AppState| -> ChoucasResult<Vec<Effect>> {
                assert_eq!(change.old, &FieldValue::BaseLayer(BaseLayer::OpenTopoMap));
                assert_eq!(change.new, &FieldValue::BaseLayer(BaseLayer::Osm));
                assert_eq!(view.base_layer, BaseLayer::OpenTopoMap);
                Ok(Vec::new())
            }),
        );
        store.set(FieldValue::BaseLayer(BaseLayer::Osm)).unwrap();
    }

    #[test]
    fn test_clue_versions_follow_rewrites() {
        let mut store = Store::new(&StoreConfig::default());
        let a = hears();
        let b = hears();
        store.set(FieldValue::Clues(vec![a.clone(), b.clone()])).unwrap();
        let va = store.clue_version(&a.clue_id).unwrap();
        let vb = store.clue_version(&b.clue_id).unwrap();

        let mut a2 = a.clone();
        a2.visible = false;
        store.set(FieldValue::Clues(vec![a2, b.clone()])).unwrap();
        assert_ne!(store.clue_version(&a.clue_id), Some(va));
        assert_eq!(store.clue_version(&b.clue_id), Some(vb));

        store.set(FieldValue::Clues(vec![b.clone()])).unwrap();
        assert_eq!(store.clue_version(&a.clue_id), None);
    }

    #[test]
    fn test_effects_are_fifo() {
        let mut store = Store::new(&StoreConfig::default());
        store.set(FieldValue::Clues(vec![hears()])).unwrap();
        assert!(matches!(store.next_effect(), Some(Effect::Render(RenderUpdate::Clues(_)))));
        assert_eq!(store.next_effect(), Some(Effect::Aggregate));
        assert_eq!(store.next_effect(), None);
    }
}
