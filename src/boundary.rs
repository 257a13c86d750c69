//! The search boundary (ISA, initial search area).

use std::fmt;

use geojson::{Geometry, Value};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geometry;

/// Identifier of a search boundary (`isa_<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryId(String);

impl BoundaryId {
    #[must_use]
    pub fn new() -> Self {
        Self(format!("isa_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for BoundaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Polygon every derived zone is clipped to.
///
/// A boundary is never edited in place: replacing it means committing a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBoundary {
    pub isa_id: BoundaryId,

    /// `[xmin, ymin, xmax, ymax]`.
    pub bbox: [f64; 4],

    pub geometry: Geometry,
}

impl SearchBoundary {
    /// Boundary covering a rectangular extent.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidBoundary` for degenerate or non-finite boxes.
    pub fn from_bbox(bbox: [f64; 4]) -> Result<Self, ValidationError> {
        let [xmin, ymin, xmax, ymax] = bbox;
        if !bbox.iter().all(|v| v.is_finite()) || xmin >= xmax || ymin >= ymax {
            return Err(ValidationError::InvalidBoundary {
                reason: format!("degenerate extent {bbox:?}"),
            });
        }
        Ok(Self {
            isa_id: BoundaryId::new(),
            bbox,
            geometry: geometry::bbox_polygon(bbox),
        })
    }

    /// Boundary from a drawn polygon; only the exterior ring is kept.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidBoundary` if the geometry is not a polygon
    /// with a closed exterior ring of at least four positions.
    pub fn from_polygon(polygon: &Geometry) -> Result<Self, ValidationError> {
        let Value::Polygon(rings) = &polygon.value else {
            return Err(ValidationError::InvalidBoundary {
                reason: "geometry is not a Polygon".to_string(),
            });
        };
        let exterior = rings.first().cloned().unwrap_or_default();
        if exterior.len() < 4 || exterior.first() != exterior.last() {
            return Err(ValidationError::InvalidBoundary {
                reason: "exterior ring must be closed and have at least 4 positions".to_string(),
            });
        }
        let geometry = Geometry::new(Value::Polygon(vec![exterior]));
        let bbox = geometry::extent(&geometry).map_err(|e| ValidationError::InvalidBoundary {
            reason: e.to_string(),
        })?;
        Ok(Self {
            isa_id: BoundaryId::new(),
            bbox,
            geometry,
        })
    }

    /// Area in squared map units (planar).
    #[must_use]
    pub fn planar_area(&self) -> f64 {
        use geo::Area;
        geometry::to_geo(&self.geometry).map_or(0.0, |g| g.unsigned_area())
    }
}
