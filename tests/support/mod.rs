//! In-process geometry service for integration tests.
//!
//! Buffers are polygonal circles, intersections and unions go through `geo`
//! boolean operations. Raster services answer fixed squares.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use geo::{Area, BooleanOps, Contains, Intersects, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, Geometry};

use choucalerte::geometry::{self, Region};
use choucalerte::{BooleanMatrix, GeometryService, RefCategory, SearchBoundary, ServiceError, SunRequest};

const CIRCLE_SEGMENTS: usize = 64;

#[derive(Debug, Default)]
pub struct FakeGeometryService {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    references: Mutex<HashMap<RefCategory, Vec<Feature>>>,
}

impl FakeGeometryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `endpoint` fail until [`Self::recover`].
    pub fn fail(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.failing.lock().unwrap().remove(endpoint);
    }

    pub fn with_references(self, category: RefCategory, features: Vec<Feature>) -> Self {
        self.references.lock().unwrap().insert(category, features);
        self
    }

    /// Number of calls made to `endpoint` so far.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|e| **e == endpoint).count()
    }

    fn enter(&self, endpoint: &'static str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(endpoint);
        if self.failing.lock().unwrap().contains(endpoint) {
            return Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

fn bad_input(endpoint: &str, message: impl ToString) -> ServiceError {
    ServiceError::Decode {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    }
}

fn polygons_of(g: &geo::Geometry<f64>) -> Vec<Polygon<f64>> {
    match g {
        geo::Geometry::Polygon(p) => vec![p.clone()],
        geo::Geometry::MultiPolygon(mp) => mp.0.clone(),
        geo::Geometry::Rect(r) => vec![r.to_polygon()],
        geo::Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(polygons_of).collect(),
        _ => Vec::new(),
    }
}

fn to_multi(endpoint: &str, g: &Geometry) -> Result<MultiPolygon<f64>, ServiceError> {
    let g = geometry::to_geo(g).map_err(|e| bad_input(endpoint, e))?;
    Ok(MultiPolygon::new(polygons_of(&g)))
}

fn to_geojson(mp: MultiPolygon<f64>) -> Geometry {
    if mp.0.is_empty() {
        return Geometry::new(geojson::Value::GeometryCollection(Vec::new()));
    }
    geometry::from_geo(&geo::Geometry::MultiPolygon(mp))
}

pub fn circle(center: (f64, f64), radius: f64) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = (0..=CIRCLE_SEGMENTS)
        .map(|i| {
            let theta = std::f64::consts::TAU * (i % CIRCLE_SEGMENTS) as f64 / CIRCLE_SEGMENTS as f64;
            (center.0 + radius * theta.cos(), center.1 + radius * theta.sin())
        })
        .collect();
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Area of a polygonal GeoJSON geometry.
pub fn area(g: &Geometry) -> f64 {
    to_multi("area", g).map(|mp| mp.unsigned_area()).unwrap_or(0.0)
}

pub fn point_feature(x: f64, y: f64) -> Feature {
    geometry::feature(Geometry::new(geojson::Value::Point(vec![x, y])), None)
}

pub fn unit_boundary() -> SearchBoundary {
    SearchBoundary::from_bbox([0.0, 0.0, 10.0, 10.0]).unwrap()
}

fn collection(geoms: Vec<Geometry>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: geoms.into_iter().map(|g| geometry::feature(g, None)).collect(),
        foreign_members: None,
    }
}

fn matrix(
    endpoint: &str,
    geoms1: &[Geometry],
    geoms2: &[Geometry],
    test: impl Fn(&geo::Geometry<f64>, &geo::Geometry<f64>) -> bool,
) -> Result<BooleanMatrix, ServiceError> {
    let convert = |gs: &[Geometry]| {
        gs.iter()
            .map(|g| geometry::to_geo(g).map_err(|e| bad_input(endpoint, e)))
            .collect::<Result<Vec<_>, _>>()
    };
    let (a, b) = (convert(geoms1)?, convert(geoms2)?);
    Ok(BooleanMatrix::new(
        a.iter().map(|x| b.iter().map(|y| test(x, y)).collect()).collect(),
    ))
}

#[async_trait]
impl GeometryService for FakeGeometryService {
    async fn buffer(&self, geoms: &[Geometry], distance: f64, uncertainty: f64) -> Result<Geometry, ServiceError> {
        self.enter("buffer")?;
        let radius = distance + uncertainty;
        let mut merged = MultiPolygon::new(Vec::new());
        for g in geoms {
            let g = geometry::to_geo(g).map_err(|e| bad_input("buffer", e))?;
            let parts = match &g {
                geo::Geometry::Point(p) => vec![circle((p.x(), p.y()), radius)],
                geo::Geometry::MultiPoint(mp) => mp.0.iter().map(|p| circle((p.x(), p.y()), radius)).collect(),
                other => polygons_of(other),
            };
            merged = merged.union(&MultiPolygon::new(parts));
        }
        Ok(to_geojson(merged))
    }

    async fn intersection(&self, geoms: &[Geometry]) -> Result<Geometry, ServiceError> {
        self.enter("intersection")?;
        let Some((first, rest)) = geoms.split_first() else {
            return Ok(to_geojson(MultiPolygon::new(Vec::new())));
        };
        let mut acc = to_multi("intersection", first)?;
        for g in rest {
            acc = acc.intersection(&to_multi("intersection", g)?);
        }
        Ok(to_geojson(acc))
    }

    async fn contains(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError> {
        self.enter("contains")?;
        matrix("contains", geoms1, geoms2, |a, b| {
            let (outer, inner) = (polygons_of(a), polygons_of(b));
            !inner.is_empty() && inner.iter().all(|p| outer.iter().any(|o| o.contains(p)))
        })
    }

    async fn intersects(&self, geoms1: &[Geometry], geoms2: &[Geometry]) -> Result<BooleanMatrix, ServiceError> {
        self.enter("intersects")?;
        matrix("intersects", geoms1, geoms2, |a, b| a.intersects(b))
    }

    /// A 6x6 square around each observer.
    async fn viewshed(
        &self,
        coordinates: &[[f64; 2]],
        _height1: f64,
        _height2: f64,
        _region: Region,
    ) -> Result<FeatureCollection, ServiceError> {
        self.enter("viewshed")?;
        Ok(collection(
            coordinates
                .iter()
                .map(|[x, y]| geometry::bbox_polygon([x - 3.0, y - 3.0, x + 3.0, y + 3.0]))
                .collect(),
        ))
    }

    /// Before noon the east half of the region is shaded, after noon the west
    /// half. The other half is sunlit.
    async fn sun(&self, request: SunRequest, region: Region) -> Result<FeatureCollection, ServiceError> {
        self.enter("sun")?;
        let mid = (region.xmin + region.xmax) / 2.0;
        let west = [region.xmin, region.ymin, mid, region.ymax];
        let east = [mid, region.ymin, region.xmax, region.ymax];
        let (sunlit, shaded) = if request.hour < 12 { (west, east) } else { (east, west) };
        let half = if request.sun { sunlit } else { shaded };
        Ok(collection(vec![geometry::bbox_polygon(half)]))
    }

    async fn features(&self, category: RefCategory, _geometry: &Geometry) -> Result<FeatureCollection, ServiceError> {
        self.enter("features")?;
        let features = self.references.lock().unwrap().get(&category).cloned().unwrap_or_default();
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}
