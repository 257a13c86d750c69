//! Investigation session: the orchestration layer over the store.
//!
//! The session owns the store and the remote service, and applies the effects
//! reactions emit. Writes, render updates and reference-feature clearing are
//! applied synchronously in FIFO order; aggregation and reference-feature loading
//! need the service and are run once the synchronous effects are exhausted.
//!
//! Clue derivations are split into three steps so callers can keep several in
//! flight: [`Session::begin_derivation`] captures a ticket, the request runs
//! detached from the session, and [`Session::complete_derivation`] commits the
//! outcome only if the ticket is still live.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use geojson::{FeatureCollection, JsonObject};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::aggregate::{self, AggregationOutcome, AggregationRequest, Aggregator};
use crate::assist::{ClueAssistant, Suggestion};
use crate::boundary::SearchBoundary;
use crate::clue::{Clue, ClueId, ClueZone, Target};
use crate::config::SessionConfig;
use crate::derivation::{self, DerivationOutcome, DerivationRequest, DerivationSettings, DerivationTicket};
use crate::diff;
use crate::document::{ClueNote, ExportDocument};
use crate::error::{ChoucasError, ChoucasResult, ExecutionError, ValidationError};
use crate::feed::OperatorFeed;
use crate::geometry;
use crate::permalink::{History, MemoryHistory, Permalink, Snapshot};
use crate::reference::{self, FragmentCensus, RefCategory, ReferenceCatalog};
use crate::service::{ClueAnnotation, GeocodeQuery, GeometryService};
use crate::state::{AppState, BaseLayer, FieldValue, Viewport};
use crate::store::{Effect, Projection, ReactionRegistry, Store, TransactionMode};
use crate::victim::Victim;

const LOAD_REFERENCES: &str = "Loading reference features...";
const REDUCE_BOUNDARY: &str = "Clipping clue zones to the new search area...";

/// What became of a derivation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied(ClueId),
    /// The ticket went stale while the request was in flight.
    Discarded(ClueId),
}

impl Completion {
    #[must_use]
    pub const fn clue_id(&self) -> &ClueId {
        match self {
            Self::Applied(id) | Self::Discarded(id) => id,
        }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    service: Arc<dyn GeometryService>,
    config: SessionConfig,
    history: Option<Box<dyn History>>,
    fragment: Option<String>,
    projections: Vec<Box<dyn Projection>>,
}

impl SessionBuilder {
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn history(mut self, history: Box<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    /// Seeds the viewport from a permalink fragment.
    #[must_use]
    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    #[must_use]
    pub fn projection(mut self, projection: Box<dyn Projection>) -> Self {
        self.projections.push(projection);
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidFragment` if the seeding fragment does not parse.
    pub fn build(self) -> ChoucasResult<Session> {
        let mut state = AppState::new();
        if let Some(fragment) = &self.fragment {
            state.viewport = Permalink::parse(fragment)?.viewport();
            debug!(%fragment, "viewport seeded from permalink");
        }
        let history = self.history.unwrap_or_else(|| Box::new(MemoryHistory::new()));
        let store = Store::with_parts(&self.config.store, state, ReactionRegistry::standard(), history);

        Ok(Session {
            store,
            service: self.service,
            settings: DerivationSettings::from(&self.config.service),
            aggregator: Aggregator::new(),
            catalog: ReferenceCatalog::new(),
            assistant: ClueAssistant::new()?,
            feed: OperatorFeed::new(&self.config.feed),
            projections: self.projections,
            deferred: VecDeque::new(),
            notes: Vec::new(),
        })
    }
}

pub struct Session {
    store: Store,
    service: Arc<dyn GeometryService>,
    settings: DerivationSettings,
    aggregator: Aggregator,
    catalog: ReferenceCatalog,
    assistant: ClueAssistant,
    feed: OperatorFeed,
    projections: Vec<Box<dyn Projection>>,
    /// Effects that need the service, run after the synchronous ones.
    deferred: VecDeque<Effect>,
    notes: Vec<ClueNote>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("service", &self.service)
            .field("catalog", &self.catalog.len())
            .field("projections", &self.projections.len())
            .field("notes", &self.notes.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn builder(service: Arc<dyn GeometryService>) -> SessionBuilder {
        SessionBuilder {
            service,
            config: SessionConfig::default(),
            history: None,
            fragment: None,
            projections: Vec::new(),
        }
    }

    /// Session with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::build`].
    pub fn new(service: Arc<dyn GeometryService>) -> ChoucasResult<Self> {
        Self::builder(service).build()
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        self.store.state()
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn feed(&self) -> &OperatorFeed {
        &self.feed
    }

    #[must_use]
    pub const fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn history(&self) -> &dyn History {
        self.store.history()
    }

    #[must_use]
    pub fn notes(&self) -> &[ClueNote] {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: Vec<ClueNote>) {
        self.notes = notes;
    }

    pub fn add_projection(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    // ---- writes ----

    /// Writes one field and applies every effect it cascades into.
    ///
    /// # Errors
    ///
    /// Returns the first reaction or service error met along the cascade.
    pub async fn write(&mut self, value: FieldValue) -> ChoucasResult<()> {
        self.store.set(value)?;
        self.settle().await
    }

    /// # Errors
    ///
    /// See [`Session::write`].
    pub async fn set_viewport(&mut self, viewport: Viewport) -> ChoucasResult<()> {
        self.write(FieldValue::Viewport(viewport)).await
    }

    /// # Errors
    ///
    /// See [`Session::write`].
    pub async fn set_base_layer(&mut self, layer: BaseLayer) -> ChoucasResult<()> {
        self.write(FieldValue::BaseLayer(layer)).await
    }

    /// # Errors
    ///
    /// See [`Session::write`].
    pub async fn set_victim(&mut self, victim: Option<Victim>) -> ChoucasResult<()> {
        self.write(FieldValue::Victim(victim)).await
    }

    /// Sets, replaces or clears the search boundary. Clearing it drops every clue.
    ///
    /// # Errors
    ///
    /// See [`Session::write`].
    pub async fn set_boundary(&mut self, boundary: Option<SearchBoundary>) -> ChoucasResult<()> {
        self.write(FieldValue::SearchBoundary(boundary)).await
    }

    fn drain(&mut self) -> ChoucasResult<()> {
        while let Some(effect) = self.store.next_effect() {
            match effect {
                Effect::Write(value) => self.store.set(value)?,
                Effect::Render(update) => {
                    let state = self.store.state();
                    for projection in &mut self.projections {
                        projection.apply(&update, state);
                    }
                }
                Effect::ClearReferenceFeatures => {
                    debug!(count = self.catalog.len(), "reference features cleared");
                    self.catalog.clear();
                }
                Effect::Aggregate | Effect::FetchReferenceFeatures(_) => self.deferred.push_back(effect),
            }
        }
        Ok(())
    }

    async fn settle(&mut self) -> ChoucasResult<()> {
        loop {
            self.drain()?;
            let Some(effect) = self.deferred.pop_front() else {
                return Ok(());
            };
            match effect {
                Effect::Aggregate => {
                    let request = self.begin_aggregation();
                    let outcome = request.run(Arc::clone(&self.service)).await;
                    self.apply_aggregation(outcome)?;
                }
                Effect::FetchReferenceFeatures(isa) => self.load_reference_features(&isa).await,
                _ => {}
            }
        }
    }

    async fn load_reference_features(&mut self, isa: &SearchBoundary) {
        let current = self.state().boundary.as_ref().map(|b| &b.isa_id);
        if current != Some(&isa.isa_id) {
            debug!(isa_id = %isa.isa_id, "boundary replaced before its features were loaded");
            return;
        }
        let _busy = self.feed.busy(LOAD_REFERENCES);
        match ReferenceCatalog::fetch(self.service.as_ref(), &isa.geometry, &RefCategory::ALL).await {
            Ok(catalog) => {
                info!(isa_id = %isa.isa_id, features = catalog.len(), "reference catalog loaded");
                self.catalog = catalog;
            }
            Err(e) => self.feed.error(format!("Reference features unavailable: {e}")),
        }
    }

    // ---- clues ----

    /// Adds a clue, deriving its zone.
    ///
    /// # Errors
    ///
    /// Returns the derivation or commit error; the clue list is then unchanged.
    pub async fn add_clue(&mut self, candidate: Clue) -> ChoucasResult<Completion> {
        self.submit(None, candidate).await
    }

    /// Replaces clue `id` with `candidate`, reusing the cached zone when the
    /// edit does not affect it.
    ///
    /// # Errors
    ///
    /// `ClueNotFound` if `id` is not live, otherwise see [`Session::add_clue`].
    pub async fn edit_clue(&mut self, id: &ClueId, candidate: Clue) -> ChoucasResult<Completion> {
        self.submit(Some(id), candidate).await
    }

    /// # Errors
    ///
    /// `ClueNotFound` if `id` is not live, or the validation error of `belief`.
    pub async fn set_belief(&mut self, id: &ClueId, belief: f64) -> ChoucasResult<Completion> {
        let mut candidate = self.live_clue(id)?.clone();
        candidate.belief = belief;
        self.submit(Some(id), candidate).await
    }

    /// Shows or hides a clue without touching its belief.
    ///
    /// # Errors
    ///
    /// `ClueNotFound` if `id` is not live.
    pub async fn set_visible(&mut self, id: &ClueId, visible: bool) -> ChoucasResult<()> {
        self.live_clue(id)?;
        let clues = self
            .state()
            .clues
            .iter()
            .cloned()
            .map(|mut c| {
                if &c.clue_id == id {
                    c.visible = visible;
                }
                c
            })
            .collect();
        self.write(FieldValue::Clues(clues)).await
    }

    /// # Errors
    ///
    /// `ClueNotFound` if `id` is not live.
    pub async fn remove_clue(&mut self, id: &ClueId) -> ChoucasResult<()> {
        self.live_clue(id)?;
        let clues = self.state().clues.iter().filter(|c| &c.clue_id != id).cloned().collect();
        info!(clue_id = %id, "clue removed");
        self.write(FieldValue::Clues(clues)).await
    }

    fn live_clue(&self, id: &ClueId) -> Result<&Clue, ExecutionError> {
        self.state().clue(id).ok_or_else(|| ExecutionError::ClueNotFound { id: id.clone() })
    }

    async fn submit(&mut self, replaces: Option<&ClueId>, mut candidate: Clue) -> ChoucasResult<Completion> {
        let existing = match replaces {
            Some(id) => Some(self.live_clue(id)?.clone()),
            None => None,
        };
        if let Err(e) = candidate.validate() {
            self.feed.error(format!("Invalid clue: {e}"));
            return Err(e.into());
        }

        let decision = diff::compare(existing.as_ref(), &candidate);
        debug!(?decision, clue_id = %candidate.clue_id, "clue submitted");
        if let (Some(existing), false) = (&existing, decision.need_to_compute_zone) {
            candidate.corresponding_zone.clone_from(&existing.corresponding_zone);
            if decision.keep_id {
                candidate.clue_id = existing.clue_id.clone();
            }
            let id = candidate.clue_id.clone();
            let clues = replaced(&self.state().clues, &existing.clue_id, candidate);
            self.write(FieldValue::Clues(clues)).await?;
            return Ok(Completion::Applied(id));
        }

        let request = self.begin_derivation(replaces, candidate)?;
        let outcome = request.run(Arc::clone(&self.service)).await;
        self.complete_derivation(outcome).await
    }

    /// Captures everything a derivation needs, under a ticket.
    ///
    /// # Errors
    ///
    /// `MissingBoundary`, `DuplicateClueId` when the candidate's id belongs to
    /// another live clue, `ClueNotFound` for an unknown edited clue, or the
    /// candidate's precheck error. Failures are reported on the operator feed.
    pub fn begin_derivation(&self, replaces: Option<&ClueId>, candidate: Clue) -> ChoucasResult<DerivationRequest> {
        let action = derivation::action(&candidate);
        let request = self.derivation_request(replaces, candidate);
        match request {
            Ok(request) => Ok(request.with_busy(self.feed.busy(action))),
            Err(e) => {
                self.feed.error(failure_message(action, &e));
                Err(e)
            }
        }
    }

    fn derivation_request(&self, replaces: Option<&ClueId>, candidate: Clue) -> ChoucasResult<DerivationRequest> {
        let boundary = self.state().boundary.clone().ok_or(ExecutionError::MissingBoundary)?;
        if replaces != Some(&candidate.clue_id) && self.state().clue(&candidate.clue_id).is_some() {
            return Err(ValidationError::DuplicateClueId {
                id: candidate.clue_id,
            }
            .into());
        }
        let replaces = match replaces {
            Some(id) => {
                let version = self
                    .store
                    .clue_version(id)
                    .ok_or_else(|| ExecutionError::ClueNotFound { id: id.clone() })?;
                Some((id.clone(), version))
            }
            None => None,
        };
        let ticket = DerivationTicket {
            clue_id: candidate.clue_id.clone(),
            replaces,
            boundary_generation: self.store.boundary_generation(),
        };
        DerivationRequest::new(ticket, candidate, boundary, self.settings)
    }

    fn is_live(&self, ticket: &DerivationTicket) -> bool {
        if ticket.boundary_generation != self.store.boundary_generation() {
            return false;
        }
        match &ticket.replaces {
            Some((id, version)) => self.store.clue_version(id) == Some(*version),
            None => self.store.clue_version(&ticket.clue_id).is_none(),
        }
    }

    /// Commits a derivation outcome if its ticket is still live.
    ///
    /// Stale outcomes are discarded whether they succeeded or not.
    ///
    /// # Errors
    ///
    /// The derivation error (reported on the feed, clue list unchanged) or the
    /// commit error.
    pub async fn complete_derivation(&mut self, mut outcome: DerivationOutcome) -> ChoucasResult<Completion> {
        outcome.release();
        let DerivationOutcome {
            ticket,
            mut candidate,
            result,
            ..
        } = outcome;

        if !self.is_live(&ticket) {
            warn!(clue_id = %ticket.clue_id, "stale derivation result discarded");
            return Ok(Completion::Discarded(ticket.clue_id));
        }

        let features = match result {
            Ok(features) => features,
            Err(e) => {
                self.feed.error(failure_message(derivation::action(&candidate), &e));
                return Err(e);
            }
        };
        candidate.corresponding_zone = Some(ClueZone::new(features));
        let id = candidate.clue_id.clone();
        let clues = match &ticket.replaces {
            Some((old, _)) => replaced(&self.state().clues, old, candidate),
            None => {
                let mut clues = self.state().clues.clone();
                clues.push(candidate);
                clues
            }
        };
        self.write(FieldValue::Clues(clues)).await?;
        info!(clue_id = %id, "clue zone committed");
        Ok(Completion::Applied(id))
    }

    // ---- aggregation ----

    /// Captures the qualifying zones under a new aggregation ticket.
    pub fn begin_aggregation(&mut self) -> AggregationRequest {
        let request = self.aggregator.begin(&self.store.state().clues);
        if request.needs_service() {
            request.with_busy(self.feed.busy(aggregate::ACTION))
        } else {
            request
        }
    }

    fn apply_aggregation(&mut self, mut outcome: AggregationOutcome) -> ChoucasResult<bool> {
        outcome.release();
        if !self.aggregator.is_latest(outcome.ticket) {
            debug!(ticket = ?outcome.ticket, "superseded aggregation result dropped");
            return Ok(false);
        }
        let zone = outcome.result.unwrap_or_else(|e| {
            self.feed.error(failure_message(aggregate::ACTION, &e));
            None
        });
        self.store.set(FieldValue::ProbableZone(zone))?;
        Ok(true)
    }

    /// Commits the probable zone if `outcome` answers the latest issued request.
    ///
    /// # Errors
    ///
    /// Returns the commit error. A failed aggregation clears the zone and is
    /// reported on the feed.
    pub async fn complete_aggregation(&mut self, outcome: AggregationOutcome) -> ChoucasResult<bool> {
        let applied = self.apply_aggregation(outcome)?;
        self.settle().await?;
        Ok(applied)
    }

    // ---- history ----

    /// Replays a snapshot without pushing permalinks.
    ///
    /// # Errors
    ///
    /// Returns the first failing write; the store is back in normal mode either way.
    pub async fn restore(&mut self, snapshot: Snapshot) -> ChoucasResult<()> {
        self.store.set_mode(TransactionMode::Restoring);
        let result = self.replay(snapshot).await;
        self.store.set_mode(TransactionMode::Normal);
        result
    }

    async fn replay(&mut self, snapshot: Snapshot) -> ChoucasResult<()> {
        self.write(FieldValue::Viewport(snapshot.map)).await?;
        self.write(FieldValue::SearchBoundary(snapshot.initial_search_area)).await?;
        self.write(FieldValue::Victim(snapshot.victim)).await?;
        self.write(FieldValue::BaseLayer(snapshot.current_base_map)).await?;
        self.write(FieldValue::Clues(snapshot.clues)).await
    }

    /// Steps back in history. Returns false at the oldest entry.
    ///
    /// # Errors
    ///
    /// See [`Session::restore`].
    pub async fn back(&mut self) -> ChoucasResult<bool> {
        let Some(entry) = self.store.history_mut().back().cloned() else {
            return Ok(false);
        };
        self.restore(entry.snapshot).await?;
        Ok(true)
    }

    /// Steps forward in history. Returns false at the newest entry.
    ///
    /// # Errors
    ///
    /// See [`Session::restore`].
    pub async fn forward(&mut self) -> ChoucasResult<bool> {
        let Some(entry) = self.store.history_mut().forward().cloned() else {
            return Ok(false);
        };
        self.restore(entry.snapshot).await?;
        Ok(true)
    }

    // ---- documents ----

    #[must_use]
    pub fn export(&self) -> ExportDocument {
        ExportDocument::from_state(self.state(), &self.notes)
    }

    /// Parses and loads an export document.
    ///
    /// # Errors
    ///
    /// A malformed or foreign document is rejected before anything is written.
    pub async fn import(&mut self, text: &str) -> ChoucasResult<()> {
        let doc = match ExportDocument::parse(text) {
            Ok(doc) => doc,
            Err(e) => {
                self.feed.error(format!("Import failed: {e}"));
                return Err(e.into());
            }
        };
        self.load(doc).await
    }

    /// Applies a document. An invalid clue list is rejected before anything is
    /// written.
    ///
    /// # Errors
    ///
    /// The document's validation error, or the first failing write.
    pub async fn load(&mut self, doc: ExportDocument) -> ChoucasResult<()> {
        if let Err(e) = doc.validate() {
            self.feed.error(format!("Import failed: {e}"));
            return Err(e.into());
        }
        let clues = doc.clues.len();
        self.write(FieldValue::SearchBoundary(doc.initial_search_area)).await?;
        self.write(FieldValue::Viewport(doc.map)).await?;
        self.write(FieldValue::Victim(doc.victim)).await?;
        self.write(FieldValue::BaseLayer(doc.current_base_map)).await?;
        self.write(FieldValue::Clues(doc.clues)).await?;
        self.notes = doc.notes_for_clues;
        info!(clues, notes = self.notes.len(), "document imported");
        Ok(())
    }

    // ---- boundary reduction and census ----

    /// Shrinks the search boundary and re-clips every clue zone to it.
    ///
    /// Each clue gets a fresh identifier.
    ///
    /// # Errors
    ///
    /// `MissingBoundary`, `BoundaryNotContained` when the current boundary does
    /// not contain `reduced`, or a service error.
    pub async fn reduce_boundary(&mut self, reduced: SearchBoundary) -> ChoucasResult<()> {
        let current = self.state().boundary.clone().ok_or(ExecutionError::MissingBoundary)?;
        let contained = self
            .service
            .contains(&[current.geometry], &[reduced.geometry.clone()])
            .await?
            .get(0, 0);
        if !contained {
            let err: ChoucasError = ExecutionError::BoundaryNotContained.into();
            self.feed.error(err.to_string());
            return Err(err);
        }

        let busy = self.feed.busy(REDUCE_BOUNDARY);
        let mut clues = self.state().clues.clone();
        for clue in &mut clues {
            clue.clue_id = ClueId::new();
            let Some(zone) = &clue.corresponding_zone else {
                continue;
            };
            let mut geoms: Vec<_> = zone.features.iter().filter_map(|ft| ft.geometry.clone()).collect();
            geoms.push(reduced.geometry.clone());
            let clipped = self.service.intersection(&geoms).await?;
            let mut properties = JsonObject::new();
            properties.insert("clue_id".to_string(), JsonValue::String(clue.clue_id.to_string()));
            clue.corresponding_zone = Some(ClueZone::new(vec![geometry::feature(clipped, Some(properties))]));
        }
        drop(busy);

        info!(isa_id = %reduced.isa_id, clues = clues.len(), "search boundary reduced");
        self.write(FieldValue::SearchBoundary(Some(reduced))).await?;
        self.write(FieldValue::Clues(clues)).await
    }

    /// Reference features inside each polygon of the probable zone.
    ///
    /// With `exclude_used`, categories already targeted by a clue are skipped.
    /// Empty when there is no probable zone.
    ///
    /// # Errors
    ///
    /// Returns the `intersects` service error.
    pub async fn census(&self, exclude_used: bool) -> ChoucasResult<Vec<FragmentCensus>> {
        let Some(zone) = &self.state().probable_zone else {
            return Ok(Vec::new());
        };
        let excluded: Vec<RefCategory> = if exclude_used {
            self.state()
                .clues
                .iter()
                .filter_map(|c| c.target.as_ref().and_then(Target::ref_category))
                .collect()
        } else {
            Vec::new()
        };
        reference::census(self.service.as_ref(), &zone.geometry, &self.catalog, &excluded).await
    }

    // ---- assistance ----

    /// Relation and target suggested by the clue text.
    #[must_use]
    pub fn suggest(&self, text: &str) -> Suggestion {
        self.assistant.suggest(text, &self.catalog)
    }

    /// Looks up a place name, biased toward the viewport center.
    ///
    /// # Errors
    ///
    /// Returns the geocoder's service error.
    pub async fn geocode(&self, place_name: &str) -> ChoucasResult<FeatureCollection> {
        let mut query = GeocodeQuery::new(place_name);
        query.geo_bias = Some(self.state().viewport.center);
        Ok(self.service.geocode(&query).await?)
    }

    /// # Errors
    ///
    /// Returns the parser's service error.
    pub async fn annotate(&self, text: &str) -> ChoucasResult<ClueAnnotation> {
        Ok(self.service.parse_clue(text).await?)
    }
}

fn replaced(clues: &[Clue], old: &ClueId, clue: Clue) -> Vec<Clue> {
    let mut out = clues.to_vec();
    match out.iter().position(|c| &c.clue_id == old) {
        Some(i) => out[i] = clue,
        None => out.push(clue),
    }
    out
}

fn failure_message(action: &str, err: &ChoucasError) -> String {
    format!("{} failed: {err}", action.trim_end_matches('.'))
}
