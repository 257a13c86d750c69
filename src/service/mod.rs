//! Remote services: geometric operations, reference features, geocoding and
//! clue parsing.
//!
//! The derivation pipeline, the aggregator and the reference catalog only see
//! the [`GeometryService`] trait. [`HttpGeometryService`] is the production
//! implementation; tests plug in an in-process one.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use geojson::{FeatureCollection, Geometry};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::geometry::Region;
use crate::reference::RefCategory;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpGeometryService;

/// Dense result of a binary predicate: `get(i, j)` tells whether `geoms1[i]`
/// relates to `geoms2[j]`.
///
/// On the wire the matrix is an object keyed by stringified indices,
/// `{"0": {"0": true, "1": false}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, BTreeMap<String, bool>>")]
pub struct BooleanMatrix {
    rows: Vec<Vec<bool>>,
}

impl BooleanMatrix {
    #[must_use]
    pub fn new(rows: Vec<Vec<bool>>) -> Self {
        Self { rows }
    }

    /// Missing cells read as `false`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> bool {
        self.rows.get(i).and_then(|row| row.get(j)).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// True when the matrix has at least one cell and every cell is true.
    #[must_use]
    pub fn all(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|row| !row.is_empty() && row.iter().all(|v| *v))
    }
}

impl TryFrom<BTreeMap<String, BTreeMap<String, bool>>> for BooleanMatrix {
    type Error = String;

    fn try_from(raw: BTreeMap<String, BTreeMap<String, bool>>) -> Result<Self, Self::Error> {
        // A dense answer has as many entries as the largest index allows.
        let height = raw.len();
        let width = raw.values().map(BTreeMap::len).max().unwrap_or(0);
        let index = |k: &str, bound: usize| match k.parse::<usize>() {
            Ok(n) if n < bound => Ok(n),
            Ok(_) => Err(format!("matrix index {k} out of range (bound {bound})")),
            Err(_) => Err(format!("'{k}' is not a matrix index")),
        };
        let mut rows: Vec<Vec<bool>> = Vec::new();
        for (i, cols) in &raw {
            let i = index(i, height)?;
            if rows.len() <= i {
                rows.resize_with(i + 1, Vec::new);
            }
            for (j, v) in cols {
                let j = index(j, width)?;
                let row = &mut rows[i];
                if row.len() <= j {
                    row.resize(j + 1, false);
                }
                row[j] = *v;
            }
        }
        Ok(Self { rows })
    }
}

/// One sun/shadow computation at a given UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SunRequest {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Sunlit zone when true, shadowed zone otherwise.
    pub sun: bool,
}

impl SunRequest {
    #[must_use]
    pub fn at(instant: DateTime<Utc>, sun: bool) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
            sun,
        }
    }
}

/// Place-name lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeQuery {
    pub place_name: String,
    pub osm_key: Option<String>,
    pub osm_value: Option<String>,
    /// `[lon, lat]` to favor nearby results.
    pub geo_bias: Option<[f64; 2]>,
}

impl GeocodeQuery {
    #[must_use]
    pub fn new(place_name: impl Into<String>) -> Self {
        Self {
            place_name: place_name.into(),
            ..Self::default()
        }
    }

    /// The `osm_tag` filter: `key`, `key:value` or `:value`.
    #[must_use]
    pub fn osm_tag(&self) -> Option<String> {
        match (self.osm_key.as_deref(), self.osm_value.as_deref()) {
            (Some(k), None) => Some(k.to_string()),
            (Some(k), Some(v)) => Some(format!("{k}:{v}")),
            (None, Some(v)) => Some(format!(":{v}")),
            (None, None) => None,
        }
    }
}

/// Linguistic annotation of a clue text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClueAnnotation {
    /// `(token, part of speech, lemma)`.
    #[serde(default)]
    pub part_of_speech: Vec<(String, String, String)>,
    /// `(text, label)`.
    #[serde(default)]
    pub named_entities: Vec<(String, String)>,
}

/// Remote geometric operations.
///
/// Geometries are GeoJSON, in the coordinate system of the search boundary.
#[async_trait]
pub trait GeometryService: Send + Sync + fmt::Debug {
    /// Buffer of `geoms` at `distance` with `uncertainty`, merged into one geometry.
    async fn buffer(&self, geoms: &[Geometry], distance: f64, uncertainty: f64) -> Result<Geometry, ServiceError>;

    /// Intersection of all inputs.
    async fn intersection(&self, geoms: &[Geometry]) -> Result<Geometry, ServiceError>;

    async fn contains(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError>;

    async fn intersects(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError>;

    /// Cells visible from `coordinates` (`[x, y]`) over `region`.
    async fn viewshed(
        &self,
        coordinates: &[[f64; 2]],
        height1: f64,
        height2: f64,
        region: Region,
    ) -> Result<FeatureCollection, ServiceError>;

    async fn sun(&self, request: SunRequest, region: Region) -> Result<FeatureCollection, ServiceError>;

    /// Reference features of `category` inside `geometry`.
    async fn features(&self, category: RefCategory, geometry: &Geometry) -> Result<FeatureCollection, ServiceError>;

    async fn geocode(&self, _query: &GeocodeQuery) -> Result<FeatureCollection, ServiceError> {
        Err(ServiceError::Unavailable {
            endpoint: "geocode".to_string(),
        })
    }

    async fn parse_clue(&self, _text: &str) -> Result<ClueAnnotation, ServiceError> {
        Err(ServiceError::Unavailable {
            endpoint: "parse-clue".to_string(),
        })
    }
}
