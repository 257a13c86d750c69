//! Reference features: the geographic objects a clue can target.
//!
//! The catalog is filled once per search boundary, one `features/{category}`
//! request per category, and cleared whenever the boundary goes away.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use geojson::{Feature, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::error::{ChoucasResult, ServiceError};
use crate::geometry;
use crate::service::GeometryService;

/// Category of reference feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefCategory {
    Pathway,
    Road,
    Village,
    City,
    Town,
    River,
    Piste,
    Lake,
    Reservoir,
    Col,
    Peak,
    PowerLine,
    SkiLift,
}

impl RefCategory {
    /// Feature property carrying the category name.
    pub const PROPERTY: &'static str = "CHOUCAS_CLASS";

    pub const ALL: [Self; 13] = [
        Self::Pathway,
        Self::Road,
        Self::Village,
        Self::City,
        Self::Town,
        Self::River,
        Self::Piste,
        Self::Lake,
        Self::Reservoir,
        Self::Col,
        Self::Peak,
        Self::PowerLine,
        Self::SkiLift,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pathway => "PATHWAY",
            Self::Road => "ROAD",
            Self::Village => "VILLAGE",
            Self::City => "CITY",
            Self::Town => "TOWN",
            Self::River => "RIVER",
            Self::Piste => "PISTE",
            Self::Lake => "LAKE",
            Self::Reservoir => "RESERVOIR",
            Self::Col => "COL",
            Self::Peak => "PEAK",
            Self::PowerLine => "POWERLINE",
            Self::SkiLift => "SKILIFT",
        }
    }
}

impl fmt::Display for RefCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown reference category '{s}'"))
    }
}

/// Stamps the category on a fetched feature and fills `osm_id` from `id` when absent.
pub fn tag_feature(category: RefCategory, feature: &mut Feature) {
    let properties = feature.properties.get_or_insert_with(Default::default);
    properties.insert(
        RefCategory::PROPERTY.to_string(),
        JsonValue::String(category.as_str().to_string()),
    );
    let has_osm_id = properties.get("osm_id").is_some_and(|v| !v.is_null());
    if !has_osm_id {
        if let Some(id) = properties.get("id").cloned() {
            properties.insert("osm_id".to_string(), id);
        }
    }
}

/// Reference features of the current search boundary, by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceCatalog {
    layers: BTreeMap<RefCategory, Vec<Feature>>,
}

impl ReferenceCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every category inside `boundary`.
    ///
    /// Requests run concurrently. A category whose request fails is skipped and
    /// logged; the call fails only when every category failed.
    ///
    /// # Errors
    ///
    /// Returns the last `ServiceError` when no category could be fetched.
    pub async fn fetch(
        service: &dyn GeometryService,
        boundary: &Geometry,
        categories: &[RefCategory],
    ) -> ChoucasResult<Self> {
        let requests = categories.iter().map(|&category| async move {
            (category, service.features(category, boundary).await)
        });

        let mut catalog = Self::new();
        let mut last_error: Option<ServiceError> = None;
        for (category, result) in join_all(requests).await {
            match result {
                Ok(collection) => {
                    let mut features = collection.features;
                    for ft in &mut features {
                        tag_feature(category, ft);
                    }
                    info!(category = %category, count = features.len(), "reference features loaded");
                    catalog.insert(category, features);
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "reference features unavailable");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if catalog.layers.is_empty() && !categories.is_empty() => Err(e.into()),
            _ => Ok(catalog),
        }
    }

    pub fn insert(&mut self, category: RefCategory, features: Vec<Feature>) {
        self.layers.insert(category, features);
    }

    #[must_use]
    pub fn features(&self, category: RefCategory) -> &[Feature] {
        self.layers.get(&category).map_or(&[], Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = RefCategory> + '_ {
        self.layers.keys().copied()
    }

    /// Total number of features across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Features of all categories except `excluded`, in category order.
    #[must_use]
    pub fn candidates(&self, excluded: &[RefCategory]) -> Vec<(RefCategory, &Feature)> {
        self.layers
            .iter()
            .filter(|(c, _)| !excluded.contains(c))
            .flat_map(|(c, fts)| fts.iter().map(move |ft| (*c, ft)))
            .filter(|(_, ft)| ft.geometry.is_some())
            .collect()
    }

    /// Finds a feature by its `osm_id` in a category.
    #[must_use]
    pub fn find(&self, category: RefCategory, osm_id: &JsonValue) -> Option<&Feature> {
        self.features(category)
            .iter()
            .find(|ft| ft.property("osm_id") == Some(osm_id))
    }
}

/// Reference features crossing one polygon of the probable zone.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentCensus {
    pub geometry: Geometry,
    pub features: Vec<Feature>,
    pub category_count: BTreeMap<RefCategory, usize>,
}

/// Census of the reference features inside the probable zone, one entry per polygon.
///
/// # Errors
///
/// Returns a `ServiceError` if the `intersects` request fails.
pub async fn census(
    service: &dyn GeometryService,
    zone: &Geometry,
    catalog: &ReferenceCatalog,
    excluded: &[RefCategory],
) -> ChoucasResult<Vec<FragmentCensus>> {
    let fragments = geometry::polygons(zone);
    let candidates = catalog.candidates(excluded);
    if fragments.is_empty() || candidates.is_empty() {
        return Ok(fragments
            .into_iter()
            .map(|geometry| FragmentCensus {
                geometry,
                features: Vec::new(),
                category_count: BTreeMap::new(),
            })
            .collect());
    }

    let geoms: Vec<Geometry> = candidates
        .iter()
        .filter_map(|(_, ft)| ft.geometry.clone())
        .collect();
    let matrix = service.intersects(&fragments, &geoms).await?;

    let out = fragments
        .into_iter()
        .enumerate()
        .map(|(i, geometry)| {
            let mut features = Vec::new();
            let mut category_count = BTreeMap::new();
            for (j, (category, ft)) in candidates.iter().enumerate() {
                if matrix.get(i, j) {
                    features.push((*ft).clone());
                    *category_count.entry(*category).or_insert(0) += 1;
                }
            }
            FragmentCensus {
                geometry,
                features,
                category_count,
            }
        })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{JsonObject, Value};
    use serde_json::json;

    fn feature_with(props: JsonValue) -> Feature {
        let properties: JsonObject = props.as_object().cloned().unwrap_or_default();
        geometry::feature(Geometry::new(Value::Point(vec![1.0, 1.0])), Some(properties))
    }

    #[test]
    fn test_category_names() {
        assert_eq!(serde_json::to_value(RefCategory::PowerLine).unwrap(), "POWERLINE");
        assert_eq!("skilift".parse::<RefCategory>().unwrap(), RefCategory::SkiLift);
        assert!("GLACIER".parse::<RefCategory>().is_err());
        assert_eq!(RefCategory::ALL.len(), 13);
    }

    #[test]
    fn test_tag_feature_fills_osm_id() {
        let mut ft = feature_with(json!({"id": 42, "name": "Lac Blanc"}));
        tag_feature(RefCategory::Lake, &mut ft);
        assert_eq!(ft.property("CHOUCAS_CLASS"), Some(&json!("LAKE")));
        assert_eq!(ft.property("osm_id"), Some(&json!(42)));

        let mut ft = feature_with(json!({"id": 42, "osm_id": 7}));
        tag_feature(RefCategory::Lake, &mut ft);
        assert_eq!(ft.property("osm_id"), Some(&json!(7)));
    }

    #[test]
    fn test_candidates_skip_excluded_categories() {
        let mut catalog = ReferenceCatalog::new();
        catalog.insert(RefCategory::Peak, vec![feature_with(json!({"osm_id": 1}))]);
        catalog.insert(
            RefCategory::Lake,
            vec![feature_with(json!({"osm_id": 2})), feature_with(json!({"osm_id": 3}))],
        );
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.candidates(&[]).len(), 3);
        let only_peaks = catalog.candidates(&[RefCategory::Lake]);
        assert_eq!(only_peaks.len(), 1);
        assert_eq!(only_peaks[0].0, RefCategory::Peak);
        assert!(catalog.find(RefCategory::Lake, &json!(3)).is_some());

        catalog.clear();
        assert!(catalog.is_empty());
    }
}
