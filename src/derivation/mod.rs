//! Geometry derivation: clue -> zone (ZLC).
//!
//! Each relation kind maps to a short chain of remote calls that always ends
//! by clipping the raw result to the search boundary:
//!
//! - proximity: `buffer(targets)` then `intersection`,
//! - sees: local centroids, `viewshed`, zero-distance `buffer`, `intersection`,
//! - sun/shadow: one `sun` call per timestamp, zero-distance `buffer`, `intersection`.
//!
//! Requests are split in three steps so several can be in flight at once:
//! the session captures a [`DerivationTicket`] synchronously, [`DerivationRequest::run`]
//! owns everything it needs across the await points, and the session checks
//! the ticket again before committing the outcome.

use std::sync::Arc;

use futures::future::try_join_all;
use geojson::{Feature, Geometry, JsonObject};
use serde_json::Value as JsonValue;
use tracing::{error, info};

use crate::boundary::SearchBoundary;
use crate::clue::{Clue, ClueId, RelationKind, ZoneType};
use crate::config::ServiceConfig;
use crate::error::{ChoucasResult, ExecutionError, ServiceError, ValidationError};
use crate::feed::BusyGuard;
use crate::geometry::{self, Region};
use crate::service::{GeometryService, SunRequest};

/// Tuning of the raster-based derivations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationSettings {
    pub region_padding: f64,
    pub viewshed_height1: f64,
    pub viewshed_height2: f64,
    pub normalize_uncertainty: f64,
}

impl Default for DerivationSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for DerivationSettings {
    fn from(cfg: &ServiceConfig) -> Self {
        Self {
            region_padding: cfg.region_padding,
            viewshed_height1: cfg.viewshed_height1,
            viewshed_height2: cfg.viewshed_height2,
            normalize_uncertainty: cfg.normalize_uncertainty,
        }
    }
}

/// Human-readable description shown while a derivation is running.
#[must_use]
pub fn action(clue: &Clue) -> &'static str {
    match clue.spatial_relation_type {
        RelationKind::ImmediateProximity => "Computing buffer zone...",
        RelationKind::Sees => "Computing visibility zone...",
        RelationKind::SunOrShadow => match clue.spatial_relation_service_options.type_zone {
            Some(ZoneType::Sun) => "Computing sunlit zone at the given time...",
            _ => "Computing shaded zone at the given time...",
        },
        RelationKind::Hears => "Computing hearing zone...",
    }
}

fn target_geometries(clue: &Clue) -> Result<Vec<Geometry>, ExecutionError> {
    let geoms = clue.target.as_ref().map(|t| t.geometries()).unwrap_or_default();
    if geoms.is_empty() {
        return Err(ExecutionError::MissingTarget {
            id: clue.clue_id.clone(),
        });
    }
    Ok(geoms)
}

fn usable_geometries(features: Vec<Feature>) -> Vec<Geometry> {
    features
        .into_iter()
        .filter_map(|ft| ft.geometry)
        .filter(|g| !geometry::is_empty(g))
        .collect()
}

fn required_param(value: Option<f64>, field: &str) -> Result<f64, ValidationError> {
    value.ok_or_else(|| ValidationError::MissingField {
        field: field.to_string(),
    })
}

/// Checks that a derivation can be attempted at all.
///
/// # Errors
///
/// Returns `UnsupportedRelation` for relations without a derivation path,
/// `MissingTarget` when the relation needs one, or the clue's validation error.
pub fn precheck(clue: &Clue) -> ChoucasResult<()> {
    if clue.spatial_relation_type == RelationKind::Hears {
        return Err(ExecutionError::UnsupportedRelation {
            kind: clue.spatial_relation_type,
        }
        .into());
    }
    clue.validate()?;
    if clue.spatial_relation_type.requires_target() {
        target_geometries(clue)?;
    }
    Ok(())
}

/// Derives the zone of `clue`, clipped to `boundary`.
///
/// The result holds one feature tagged with the clue id.
///
/// # Errors
///
/// Fails on unsupported relations, missing targets, service errors, and when
/// no usable geometry survives a step.
pub async fn derive(
    service: &dyn GeometryService,
    clue: &Clue,
    boundary: &SearchBoundary,
    settings: &DerivationSettings,
) -> ChoucasResult<Vec<Feature>> {
    precheck(clue)?;
    let region = Region::padded(boundary.bbox, settings.region_padding);
    let params = &clue.spatial_relation_service_options;

    let raw = match clue.spatial_relation_type {
        RelationKind::ImmediateProximity => {
            let geoms = target_geometries(clue)?;
            let distance = required_param(params.distance_to_object, "distance_to_object")?;
            let uncertainty = required_param(params.uncertainty, "uncertainty")?;
            service.buffer(&geoms, distance, uncertainty).await?
        }
        RelationKind::Sees => {
            let centroids = target_geometries(clue)?
                .iter()
                .map(geometry::centroid)
                .collect::<Result<Vec<_>, _>>()?;
            let viewshed = service
                .viewshed(&centroids, settings.viewshed_height1, settings.viewshed_height2, region)
                .await?;
            let cells = usable_geometries(viewshed.features);
            if cells.is_empty() {
                return Err(ServiceError::EmptyResult {
                    endpoint: "viewshed".to_string(),
                }
                .into());
            }
            service.buffer(&cells, 0.0, settings.normalize_uncertainty).await?
        }
        RelationKind::SunOrShadow => {
            let sun = params.type_zone == Some(ZoneType::Sun);
            let calls = clue
                .instant_or_duration
                .value
                .iter()
                .map(|t| service.sun(SunRequest::at(*t, sun), region));
            let cells: Vec<Geometry> = try_join_all(calls)
                .await?
                .into_iter()
                .flat_map(|fc| usable_geometries(fc.features))
                .collect();
            if cells.is_empty() {
                return Err(ServiceError::EmptyResult {
                    endpoint: "sun".to_string(),
                }
                .into());
            }
            service.buffer(&cells, 0.0, settings.normalize_uncertainty).await?
        }
        RelationKind::Hears => {
            return Err(ExecutionError::UnsupportedRelation {
                kind: RelationKind::Hears,
            }
            .into())
        }
    };

    let clipped = service.intersection(&[raw, boundary.geometry.clone()]).await?;
    if geometry::is_empty(&clipped) {
        return Err(ServiceError::EmptyResult {
            endpoint: "intersection".to_string(),
        }
        .into());
    }

    let mut properties = JsonObject::new();
    properties.insert("clue_id".to_string(), JsonValue::String(clue.clue_id.to_string()));
    Ok(vec![geometry::feature(clipped, Some(properties))])
}

/// What a derivation request was issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationTicket {
    /// Identifier the candidate will be committed under.
    pub clue_id: ClueId,
    /// The clue being edited and its version when the request was issued.
    pub replaces: Option<(ClueId, u64)>,
    pub boundary_generation: u64,
}

/// A derivation ready to run, detached from the session.
#[derive(Debug)]
pub struct DerivationRequest {
    ticket: DerivationTicket,
    candidate: Clue,
    boundary: SearchBoundary,
    settings: DerivationSettings,
    busy: Option<BusyGuard>,
}

impl DerivationRequest {
    /// # Errors
    ///
    /// Fails fast when the candidate cannot be derived (see [`precheck`]).
    pub fn new(
        ticket: DerivationTicket,
        candidate: Clue,
        boundary: SearchBoundary,
        settings: DerivationSettings,
    ) -> ChoucasResult<Self> {
        precheck(&candidate)?;
        Ok(Self {
            ticket,
            candidate,
            boundary,
            settings,
            busy: None,
        })
    }

    /// Keeps the busy indicator up until the outcome is consumed.
    #[must_use]
    pub fn with_busy(mut self, busy: BusyGuard) -> Self {
        self.busy = Some(busy);
        self
    }

    #[must_use]
    pub const fn ticket(&self) -> &DerivationTicket {
        &self.ticket
    }

    #[must_use]
    pub fn action(&self) -> &'static str {
        action(&self.candidate)
    }

    pub async fn run(self, service: Arc<dyn GeometryService>) -> DerivationOutcome {
        info!(clue_id = %self.candidate.clue_id, relation = %self.candidate.spatial_relation_type, "derivation started");
        let result = derive(service.as_ref(), &self.candidate, &self.boundary, &self.settings).await;
        if let Err(e) = &result {
            error!(clue_id = %self.candidate.clue_id, error = %e, "derivation failed");
        }
        DerivationOutcome {
            ticket: self.ticket,
            candidate: self.candidate,
            result,
            busy: self.busy,
        }
    }
}

/// Result of a derivation, still to be checked against the live state.
#[derive(Debug)]
pub struct DerivationOutcome {
    pub ticket: DerivationTicket,
    pub candidate: Clue,
    pub result: ChoucasResult<Vec<Feature>>,
    busy: Option<BusyGuard>,
}

impl DerivationOutcome {
    /// Clears the busy indicator now rather than when the outcome is dropped.
    pub fn release(&mut self) {
        self.busy = None;
    }
}
