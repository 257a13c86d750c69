//! GeoJSON helpers shared by the derivation pipeline, the aggregator and the
//! reference catalog.
//!
//! The heavy geometric work (buffers, intersections, viewsheds) belongs to the
//! remote service. Only cheap local computations live here: centroids, extents,
//! emptiness checks and polygon splitting.

use std::fmt;

use geo::{BoundingRect, Centroid};
use geojson::{Feature, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// Wraps a geometry into a feature.
#[must_use]
pub fn feature(geometry: Geometry, properties: Option<JsonObject>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties,
        foreign_members: None,
    }
}

/// Converts a GeoJSON geometry into a `geo` geometry.
///
/// # Errors
///
/// Returns `ExecutionError::Geometry` if the GeoJSON value is not convertible.
pub fn to_geo(geometry: &Geometry) -> Result<geo::Geometry<f64>, ExecutionError> {
    geo::Geometry::<f64>::try_from(geometry.clone()).map_err(|e| ExecutionError::Geometry {
        message: e.to_string(),
    })
}

#[must_use]
pub fn from_geo(geometry: &geo::Geometry<f64>) -> Geometry {
    Geometry::new(Value::from(geometry))
}

/// Centroid of a geometry as `[x, y]`.
///
/// # Errors
///
/// Returns `ExecutionError::Geometry` for empty or unconvertible geometries.
pub fn centroid(geometry: &Geometry) -> Result<[f64; 2], ExecutionError> {
    let point = to_geo(geometry)?.centroid().ok_or_else(|| ExecutionError::Geometry {
        message: "cannot compute the centroid of an empty geometry".to_string(),
    })?;
    Ok([point.x(), point.y()])
}

/// True when a geometry carries no coordinates at all.
#[must_use]
pub fn is_empty(geometry: &Geometry) -> bool {
    match &geometry.value {
        Value::GeometryCollection(members) => members.iter().all(is_empty),
        Value::Polygon(rings) => rings.iter().all(Vec::is_empty),
        Value::MultiPolygon(polygons) => polygons.iter().flatten().all(Vec::is_empty),
        Value::LineString(line) => line.is_empty(),
        Value::MultiLineString(lines) => lines.iter().all(Vec::is_empty),
        Value::MultiPoint(points) => points.is_empty(),
        Value::Point(position) => position.is_empty(),
    }
}

/// Splits polygonal geometries into single polygons; other types are dropped.
#[must_use]
pub fn polygons(geometry: &Geometry) -> Vec<Geometry> {
    match &geometry.value {
        Value::Polygon(_) => vec![geometry.clone()],
        Value::MultiPolygon(parts) => parts
            .iter()
            .map(|rings| Geometry::new(Value::Polygon(rings.clone())))
            .collect(),
        Value::GeometryCollection(members) => members.iter().flat_map(polygons).collect(),
        _ => Vec::new(),
    }
}

/// Closed rectangular ring polygon for a `[xmin, ymin, xmax, ymax]` box.
#[must_use]
pub fn bbox_polygon(bbox: [f64; 4]) -> Geometry {
    let [xmin, ymin, xmax, ymax] = bbox;
    Geometry::new(Value::Polygon(vec![vec![
        vec![xmin, ymin],
        vec![xmax, ymin],
        vec![xmax, ymax],
        vec![xmin, ymax],
        vec![xmin, ymin],
    ]]))
}

/// Extent `[xmin, ymin, xmax, ymax]` of a geometry.
///
/// # Errors
///
/// Returns `ExecutionError::Geometry` for empty or unconvertible geometries.
pub fn extent(geometry: &Geometry) -> Result<[f64; 4], ExecutionError> {
    let rect = to_geo(geometry)?.bounding_rect().ok_or_else(|| ExecutionError::Geometry {
        message: "cannot compute the extent of an empty geometry".to_string(),
    })?;
    Ok([rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

/// Computation region sent to the raster services (viewshed, sun).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Region {
    /// Region covering `bbox` grown by `padding` on every side.
    #[must_use]
    pub fn padded(bbox: [f64; 4], padding: f64) -> Self {
        let [xmin, ymin, xmax, ymax] = bbox;
        Self {
            xmin: xmin - padding,
            xmax: xmax + padding,
            ymin: ymin - padding,
            ymax: ymax + padding,
        }
    }
}

/// Query-string form `xmin,xmax,ymin,ymax`, the order the raster services expect.
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.xmin, self.xmax, self.ymin, self.ymax)
    }
}
