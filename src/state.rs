//! Application state: the fields the store routes every write through.

use std::fmt;
use std::str::FromStr;

use geojson::Geometry;
use serde::{Deserialize, Serialize};

use crate::boundary::SearchBoundary;
use crate::clue::{Clue, ClueId};
use crate::victim::Victim;

/// Map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub center: [f64; 2],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 10.8,
            center: [5.78, 45.15],
        }
    }
}

/// Background tile layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseLayer {
    #[default]
    #[serde(rename = "OTM")]
    OpenTopoMap,
    #[serde(rename = "OSMFR")]
    OsmFrance,
    #[serde(rename = "OSM")]
    Osm,
    #[serde(rename = "HUM")]
    Humanitarian,
    #[serde(rename = "WMFLABSHB")]
    Hikebike,
}

impl BaseLayer {
    pub const ALL: [Self; 5] = [
        Self::OpenTopoMap,
        Self::OsmFrance,
        Self::Osm,
        Self::Humanitarian,
        Self::Hikebike,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::OpenTopoMap => "OTM",
            Self::OsmFrance => "OSMFR",
            Self::Osm => "OSM",
            Self::Humanitarian => "HUM",
            Self::Hikebike => "WMFLABSHB",
        }
    }

    #[must_use]
    pub const fn tile_url(self) -> &'static str {
        match self {
            Self::OpenTopoMap => "https://{a-c}.tile.opentopomap.org/{z}/{x}/{y}.png",
            Self::OsmFrance => "https://{a-c}.tile.openstreetmap.fr/osmfr/{z}/{x}/{y}.png",
            Self::Osm => "https://{a-c}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            Self::Humanitarian => "https://{a-c}.tile.openstreetmap.fr/hot/{z}/{x}/{y}.png",
            Self::Hikebike => "https://tiles.wmflabs.org/hikebike/{z}/{x}/{y}.png",
        }
    }
}

impl fmt::Display for BaseLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BaseLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.code() == s)
            .ok_or_else(|| format!("unknown base layer '{s}'"))
    }
}

/// Aggregate probable-location zone (ZLP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbableZone {
    pub zlp_id: String,
    pub geometry: Geometry,
    pub clue_ids: Vec<ClueId>,
}

impl ProbableZone {
    #[must_use]
    pub fn new(geometry: Geometry, clue_ids: Vec<ClueId>) -> Self {
        Self {
            zlp_id: format!("zlp_{}", uuid::Uuid::new_v4()),
            geometry,
            clue_ids,
        }
    }
}

/// Canonical state of an investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    #[serde(rename = "map")]
    pub viewport: Viewport,
    #[serde(rename = "currentBaseMap")]
    pub base_layer: BaseLayer,
    #[serde(rename = "initial_search_area")]
    pub boundary: Option<SearchBoundary>,
    pub victim: Option<Victim>,
    pub clues: Vec<Clue>,
    #[serde(rename = "ZLP")]
    pub probable_zone: Option<ProbableZone>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn clue(&self, id: &ClueId) -> Option<&Clue> {
        self.clues.iter().find(|c| &c.clue_id == id)
    }

    #[must_use]
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Viewport => FieldValue::Viewport(self.viewport),
            Field::BaseLayer => FieldValue::BaseLayer(self.base_layer),
            Field::SearchBoundary => FieldValue::SearchBoundary(self.boundary.clone()),
            Field::Victim => FieldValue::Victim(self.victim.clone()),
            Field::Clues => FieldValue::Clues(self.clues.clone()),
            Field::ProbableZone => FieldValue::ProbableZone(self.probable_zone.clone()),
        }
    }

    /// Replaces one field, returning the previous value.
    pub fn replace(&mut self, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::Viewport(v) => FieldValue::Viewport(std::mem::replace(&mut self.viewport, v)),
            FieldValue::BaseLayer(v) => FieldValue::BaseLayer(std::mem::replace(&mut self.base_layer, v)),
            FieldValue::SearchBoundary(v) => FieldValue::SearchBoundary(std::mem::replace(&mut self.boundary, v)),
            FieldValue::Victim(v) => FieldValue::Victim(std::mem::replace(&mut self.victim, v)),
            FieldValue::Clues(v) => FieldValue::Clues(std::mem::replace(&mut self.clues, v)),
            FieldValue::ProbableZone(v) => FieldValue::ProbableZone(std::mem::replace(&mut self.probable_zone, v)),
        }
    }
}

/// Named store fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Viewport,
    BaseLayer,
    SearchBoundary,
    Victim,
    Clues,
    ProbableZone,
}

impl Field {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewport => "map",
            Self::BaseLayer => "currentBaseMap",
            Self::SearchBoundary => "initial_search_area",
            Self::Victim => "victim",
            Self::Clues => "clues",
            Self::ProbableZone => "ZLP",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value for one store field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Viewport(Viewport),
    BaseLayer(BaseLayer),
    SearchBoundary(Option<SearchBoundary>),
    Victim(Option<Victim>),
    Clues(Vec<Clue>),
    ProbableZone(Option<ProbableZone>),
}

impl FieldValue {
    #[must_use]
    pub const fn field(&self) -> Field {
        match self {
            Self::Viewport(_) => Field::Viewport,
            Self::BaseLayer(_) => Field::BaseLayer,
            Self::SearchBoundary(_) => Field::SearchBoundary,
            Self::Victim(_) => Field::Victim,
            Self::Clues(_) => Field::Clues,
            Self::ProbableZone(_) => Field::ProbableZone,
        }
    }
}
