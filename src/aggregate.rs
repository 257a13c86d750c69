//! Aggregation of clue zones into the probable-location zone (ZLP).
//!
//! The zone is always recomputed from scratch with a single `intersection`
//! call over every qualifying clue's zone. Each request gets a monotonically
//! increasing ticket and only the latest issued one may be committed, so
//! out-of-order completions cannot overwrite a newer result.

use std::sync::Arc;

use geojson::Geometry;
use tracing::{debug, info};

use crate::clue::{Clue, ClueId};
use crate::error::ChoucasResult;
use crate::feed::BusyGuard;
use crate::geometry;
use crate::service::GeometryService;
use crate::state::ProbableZone;

/// Busy message shown while the zone is computed.
pub const ACTION: &str = "Computing the probable location zone...";

/// Issue order of an aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregationTicket(u64);

/// Hands out tickets and remembers the latest one.
#[derive(Debug, Default)]
pub struct Aggregator {
    issued: u64,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the qualifying zones of `clues` under a new ticket.
    pub fn begin(&mut self, clues: &[Clue]) -> AggregationRequest {
        self.issued += 1;
        let (clue_ids, geometries) = qualifying_zones(clues);
        debug!(ticket = self.issued, qualifying = clue_ids.len(), "aggregation issued");
        AggregationRequest {
            ticket: AggregationTicket(self.issued),
            clue_ids,
            geometries,
            busy: None,
        }
    }

    #[must_use]
    pub fn is_latest(&self, ticket: AggregationTicket) -> bool {
        ticket.0 == self.issued
    }

    #[must_use]
    pub const fn latest(&self) -> Option<AggregationTicket> {
        if self.issued == 0 {
            None
        } else {
            Some(AggregationTicket(self.issued))
        }
    }
}

/// Ids and first zone geometry of trusted clues anchored to now.
#[must_use]
pub fn qualifying_zones(clues: &[Clue]) -> (Vec<ClueId>, Vec<Geometry>) {
    clues
        .iter()
        .filter(|c| c.qualifies_for_aggregation())
        .filter_map(|c| {
            let geom = c.corresponding_zone.as_ref()?.first_geometry()?;
            Some((c.clue_id.clone(), geom.clone()))
        })
        .unzip()
}

/// Intersection of the given zones, or `None` with fewer than two zones or
/// an empty intersection.
///
/// # Errors
///
/// Returns the service error of the `intersection` call.
pub async fn aggregate(
    service: &dyn GeometryService,
    clue_ids: Vec<ClueId>,
    geometries: &[Geometry],
) -> ChoucasResult<Option<ProbableZone>> {
    if geometries.len() < 2 {
        return Ok(None);
    }
    let intersection = service.intersection(geometries).await?;
    if geometry::is_empty(&intersection) {
        info!(clues = clue_ids.len(), "probable zone is empty");
        return Ok(None);
    }
    Ok(Some(ProbableZone::new(intersection, clue_ids)))
}

#[derive(Debug)]
pub struct AggregationRequest {
    ticket: AggregationTicket,
    clue_ids: Vec<ClueId>,
    geometries: Vec<Geometry>,
    busy: Option<BusyGuard>,
}

impl AggregationRequest {
    #[must_use]
    pub const fn ticket(&self) -> AggregationTicket {
        self.ticket
    }

    /// True when the request will call the service.
    #[must_use]
    pub fn needs_service(&self) -> bool {
        self.geometries.len() >= 2
    }

    #[must_use]
    pub fn with_busy(mut self, busy: BusyGuard) -> Self {
        self.busy = Some(busy);
        self
    }

    pub async fn run(self, service: Arc<dyn GeometryService>) -> AggregationOutcome {
        let result = aggregate(service.as_ref(), self.clue_ids, &self.geometries).await;
        AggregationOutcome {
            ticket: self.ticket,
            result,
            busy: self.busy,
        }
    }
}

#[derive(Debug)]
pub struct AggregationOutcome {
    pub ticket: AggregationTicket,
    pub result: ChoucasResult<Option<ProbableZone>>,
    busy: Option<BusyGuard>,
}

impl AggregationOutcome {
    pub fn release(&mut self) {
        self.busy = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clue::{ClueZone, RelationKind};
    use crate::time::TimeDescriptor;
    use chrono::Utc;

    fn zoned(belief: f64, time: TimeDescriptor) -> Clue {
        let mut clue = Clue::builder()
            .relation(RelationKind::Hears)
            .belief(belief)
            .time(time)
            .build()
            .unwrap();
        clue.corresponding_zone = Some(ClueZone::new(vec![geometry::feature(
            geometry::bbox_polygon([0.0, 0.0, 1.0, 1.0]),
            None,
        )]));
        clue
    }

    #[test]
    fn test_only_trusted_now_clues_qualify() {
        let now = Utc::now();
        let trusted = zoned(1.0, TimeDescriptor::now(now));
        let distrusted = zoned(0.0, TimeDescriptor::now(now));
        let past = zoned(1.0, TimeDescriptor::hours_ago(now, 3).unwrap());
        let since = zoned(1.0, TimeDescriptor::since_hours_ago(now, 3).unwrap());
        let mut unzoned = zoned(1.0, TimeDescriptor::now(now));
        unzoned.corresponding_zone = None;

        let (ids, geoms) = qualifying_zones(&[trusted.clone(), distrusted, past, since.clone(), unzoned]);
        assert_eq!(ids, vec![trusted.clue_id, since.clue_id]);
        assert_eq!(geoms.len(), 2);
    }

    #[test]
    fn test_tickets_are_monotonic() {
        let mut aggregator = Aggregator::new();
        assert!(aggregator.latest().is_none());
        let first = aggregator.begin(&[]);
        let second = aggregator.begin(&[]);
        assert!(first.ticket() < second.ticket());
        assert!(!aggregator.is_latest(first.ticket()));
        assert!(aggregator.is_latest(second.ticket()));
        assert!(!second.needs_service());
    }
}
