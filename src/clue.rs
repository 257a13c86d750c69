//! Clue types: the operator-entered testimonial facts.
//!
//! A clue relates the missing person to a reference feature (or a whole category
//! of them) through a spatial relation, at a given time. Its derived zone (ZLC) is
//! cached on the clue and stays valid as long as the relation kind, target,
//! relation parameters and time descriptor are unchanged.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geojson::{Feature, Geometry};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::reference::RefCategory;
use crate::time::TimeDescriptor;

/// Identifier of a clue (`clue_<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClueId(String);

impl ClueId {
    /// Creates a new random clue ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("clue_{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClueId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ClueId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ClueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Spatial relation between the victim and the clue target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "Voir")]
    Sees,
    #[serde(rename = "Proximité immédiate")]
    ImmediateProximity,
    #[serde(rename = "Ombre / Soleil")]
    SunOrShadow,
    #[serde(rename = "Entendre")]
    Hears,
}

impl RelationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sees => "Voir",
            Self::ImmediateProximity => "Proximité immédiate",
            Self::SunOrShadow => "Ombre / Soleil",
            Self::Hears => "Entendre",
        }
    }

    /// Whether the relation needs a target feature to be derived.
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(self, Self::Sees | Self::ImmediateProximity)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the clue relates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Target {
    /// A single reference feature (or a clicked point).
    #[serde(rename = "ESR")]
    Feature {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature: Option<Feature>,
    },

    /// Every reference feature of a category.
    #[serde(rename = "ESC")]
    Category {
        category: RefCategory,
        #[serde(default)]
        features: Vec<Feature>,
    },
}

impl Target {
    /// Targets a single feature.
    #[must_use]
    pub fn feature(feature: Feature) -> Self {
        Self::Feature {
            feature: Some(feature),
        }
    }

    /// Targets a whole category with its cached features.
    #[must_use]
    pub fn category(category: RefCategory, features: Vec<Feature>) -> Self {
        Self::Category { category, features }
    }

    /// Geometries the relation is computed against.
    #[must_use]
    pub fn geometries(&self) -> Vec<Geometry> {
        match self {
            Self::Feature { feature } => feature
                .iter()
                .filter_map(|ft| ft.geometry.clone())
                .collect(),
            Self::Category { features, .. } => features
                .iter()
                .filter_map(|ft| ft.geometry.clone())
                .collect(),
        }
    }

    /// Reference category of the target, if known.
    #[must_use]
    pub fn ref_category(&self) -> Option<RefCategory> {
        match self {
            Self::Category { category, .. } => Some(*category),
            Self::Feature { feature } => feature
                .as_ref()
                .and_then(|ft| ft.property(RefCategory::PROPERTY))
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Kind of zone for the sun/shadow relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneType {
    #[serde(rename = "soleil")]
    Sun,
    #[serde(rename = "ombre")]
    Shadow,
}

/// Relation-specific parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationParams {
    /// Distance to the target, in meters (proximity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_to_object: Option<f64>,

    /// Uncertainty around the distance, in meters (proximity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_zone: Option<ZoneType>,
}

impl RelationParams {
    #[must_use]
    pub const fn proximity(distance_to_object: f64, uncertainty: f64) -> Self {
        Self {
            distance_to_object: Some(distance_to_object),
            uncertainty: Some(uncertainty),
            type_zone: None,
        }
    }

    #[must_use]
    pub const fn sun_or_shadow(type_zone: ZoneType) -> Self {
        Self {
            distance_to_object: None,
            uncertainty: None,
            type_zone: Some(type_zone),
        }
    }
}

/// Fill and stroke colors of the clue layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorPair {
    pub fill: String,
    pub stroke: String,
}

impl ColorPair {
    /// Builds the translucent fill / opaque stroke pair from a `#rrggbb` color.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidParameter` if `hex` is not `#rrggbb`.
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidParameter {
            field: "colors".to_string(),
            reason: format!("'{hex}' is not a #rrggbb color"),
        };
        let digits = hex.strip_prefix('#').filter(|d| d.len() == 6 && d.is_ascii()).ok_or_else(invalid)?;
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);
        Ok(Self {
            fill: format!("rgba({r},{g},{b},0.15)"),
            stroke: format!("rgb({r},{g},{b})"),
        })
    }
}

impl Default for ColorPair {
    fn default() -> Self {
        Self {
            fill: "rgba(255,69,0,0.15)".to_string(),
            stroke: "rgb(255,69,0)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum ZoneTag {
    #[default]
    #[serde(rename = "ZLC")]
    Zlc,
}

/// Cached zone derived from a clue.
///
/// Features are shared: reusing a zone across edits keeps the same allocation,
/// which is what [`ClueZone::same_as`] checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClueZone {
    pub features: Arc<Vec<Feature>>,

    #[serde(rename = "type", default)]
    tag: ZoneTag,
}

impl ClueZone {
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: Arc::new(features),
            tag: ZoneTag::Zlc,
        }
    }

    /// Geometry used for aggregation.
    #[must_use]
    pub fn first_geometry(&self) -> Option<&Geometry> {
        self.features.first().and_then(|ft| ft.geometry.as_ref())
    }

    /// True when both zones share the same feature allocation.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.features, &other.features)
    }
}

fn default_site() -> String {
    "Victime".to_string()
}

/// An operator-entered clue and its cached zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub clue_id: ClueId,

    /// Trust in the clue, 0 or 1.
    pub belief: f64,

    /// Display flag, independent of belief.
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clue_natural_language: Option<String>,

    pub spatial_relation_type: RelationKind,

    #[serde(default)]
    pub target: Option<Target>,

    #[serde(default)]
    pub spatial_relation_service_options: RelationParams,

    pub instant_or_duration: TimeDescriptor,

    #[serde(default)]
    pub colors: ColorPair,

    /// When the clue was entered.
    pub timestamp: DateTime<Utc>,

    #[serde(default = "default_site")]
    pub site: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corresponding_zone: Option<ClueZone>,
}

impl Clue {
    pub fn builder() -> ClueBuilder {
        ClueBuilder::new()
    }

    /// Natural-language text, empty when absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.clue_natural_language.as_deref().unwrap_or("")
    }

    pub fn is_trusted(&self) -> bool {
        self.belief >= 1.0
    }

    /// Hidden clues are kept in the list but not drawn.
    pub fn is_hidden(&self) -> bool {
        !self.is_trusted() || !self.visible
    }

    /// Trusted and anchored to the present moment.
    pub fn qualifies_for_aggregation(&self) -> bool {
        self.is_trusted() && self.instant_or_duration.is_anchored_now()
    }

    /// Validates the clue's semantic description.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_belief(self.belief)?;
        self.instant_or_duration.validate()?;
        let params = &self.spatial_relation_service_options;
        match self.spatial_relation_type {
            RelationKind::ImmediateProximity => {
                let distance = params.distance_to_object.ok_or_else(|| missing("distance_to_object"))?;
                let uncertainty = params.uncertainty.ok_or_else(|| missing("uncertainty"))?;
                for (field, v) in [("distance_to_object", distance), ("uncertainty", uncertainty)] {
                    if !v.is_finite() || v < 0.0 {
                        return Err(ValidationError::InvalidParameter {
                            field: field.to_string(),
                            reason: format!("{v} is not a non-negative distance"),
                        });
                    }
                }
            }
            RelationKind::SunOrShadow => {
                if params.type_zone.is_none() {
                    return Err(missing("type_zone"));
                }
            }
            RelationKind::Sees | RelationKind::Hears => {}
        }
        if self.spatial_relation_type.requires_target() && self.target.is_none() {
            return Err(missing("target"));
        }
        Ok(())
    }
}

/// Checks that no two clues share an identifier.
///
/// # Errors
///
/// Returns `ValidationError::DuplicateClueId` naming the first repeated id.
pub fn ensure_unique_ids(clues: &[Clue]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(clues.len());
    match clues.iter().find(|c| !seen.insert(&c.clue_id)) {
        Some(dup) => Err(ValidationError::DuplicateClueId {
            id: dup.clue_id.clone(),
        }),
        None => Ok(()),
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

fn validate_belief(belief: f64) -> Result<(), ValidationError> {
    if belief == 0.0 || belief == 1.0 {
        Ok(())
    } else {
        Err(ValidationError::BeliefOutOfRange { value: belief })
    }
}

/// Builder for creating Clue instances.
#[derive(Debug, Default)]
pub struct ClueBuilder {
    clue_id: Option<ClueId>,
    belief: Option<f64>,
    visible: Option<bool>,
    text: Option<String>,
    relation: Option<RelationKind>,
    target: Option<Target>,
    params: RelationParams,
    time: Option<TimeDescriptor>,
    colors: Option<ColorPair>,
    timestamp: Option<DateTime<Utc>>,
}

impl ClueBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: ClueId) -> Self {
        self.clue_id = Some(id);
        self
    }

    #[must_use]
    pub fn belief(mut self, belief: f64) -> Self {
        self.belief = Some(belief);
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationKind) -> Self {
        self.relation = Some(relation);
        self
    }

    #[must_use]
    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn params(mut self, params: RelationParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn time(mut self, time: TimeDescriptor) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn colors(mut self, colors: ColorPair) -> Self {
        self.colors = Some(colors);
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builds the clue without a derived zone.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or a parameter
    /// does not fit the relation kind.
    pub fn build(self) -> Result<Clue, ValidationError> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let clue = Clue {
            clue_id: self.clue_id.unwrap_or_default(),
            belief: self.belief.unwrap_or(1.0),
            visible: self.visible.unwrap_or(true),
            clue_natural_language: self.text,
            spatial_relation_type: self.relation.ok_or_else(|| missing("spatial_relation_type"))?,
            target: self.target,
            spatial_relation_service_options: self.params,
            instant_or_duration: self
                .time
                .unwrap_or_else(|| TimeDescriptor::now(timestamp)),
            colors: self.colors.unwrap_or_default(),
            timestamp,
            site: default_site(),
            corresponding_zone: None,
        };
        clue.validate()?;
        Ok(clue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Value;

    fn point(x: f64, y: f64) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![x, y]))),
            id: None,
            properties: None,
            foreign_members: None,
        }
    }

    #[test]
    fn test_builder_defaults() {
        let clue = Clue::builder()
            .relation(RelationKind::ImmediateProximity)
            .target(Target::feature(point(5.0, 5.0)))
            .params(RelationParams::proximity(0.0, 2.0))
            .build()
            .unwrap();
        assert!(clue.clue_id.as_str().starts_with("clue_"));
        assert!(clue.visible);
        assert!(clue.qualifies_for_aggregation());
        assert!(clue.corresponding_zone.is_none());
    }

    #[test]
    fn test_builder_rejects_fractional_belief() {
        let err = Clue::builder()
            .relation(RelationKind::Hears)
            .belief(0.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::BeliefOutOfRange { .. }));
    }

    #[test]
    fn test_proximity_requires_parameters_and_target() {
        let err = Clue::builder()
            .relation(RelationKind::ImmediateProximity)
            .target(Target::feature(point(0.0, 0.0)))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "distance_to_object"));

        let err = Clue::builder()
            .relation(RelationKind::Sees)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "target"));
    }

    #[test]
    fn test_hidden_when_untrusted_or_invisible() {
        let mut clue = Clue::builder().relation(RelationKind::Hears).build().unwrap();
        assert!(!clue.is_hidden());
        clue.visible = false;
        assert!(clue.is_hidden());
        clue.visible = true;
        clue.belief = 0.0;
        assert!(clue.is_hidden());
        assert!(!clue.qualifies_for_aggregation());
    }

    #[test]
    fn test_relation_wire_names() {
        let json = serde_json::to_string(&RelationKind::SunOrShadow).unwrap();
        assert_eq!(json, "\"Ombre / Soleil\"");
        let kind: RelationKind = serde_json::from_str("\"Proximité immédiate\"").unwrap();
        assert_eq!(kind, RelationKind::ImmediateProximity);
    }

    #[test]
    fn test_target_category_wire_format() {
        let target = Target::category(RefCategory::Peak, vec![point(1.0, 2.0)]);
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "ESC");
        assert_eq!(json["category"], "PEAK");
        let back: Target = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
        assert_eq!(back.geometries().len(), 1);
    }

    #[test]
    fn test_colors_from_hex() {
        let colors = ColorPair::from_hex("#4169E1").unwrap();
        assert_eq!(colors.fill, "rgba(65,105,225,0.15)");
        assert_eq!(colors.stroke, "rgb(65,105,225)");
        assert!(ColorPair::from_hex("blue").is_err());
    }

    #[test]
    fn test_zone_identity() {
        let zone = ClueZone::new(vec![point(0.0, 0.0)]);
        let shared = zone.clone();
        let rebuilt = ClueZone::new(vec![point(0.0, 0.0)]);
        assert!(zone.same_as(&shared));
        assert!(!zone.same_as(&rebuilt));
        assert_eq!(zone, rebuilt);
        assert_eq!(serde_json::to_value(&zone).unwrap()["type"], "ZLC");
    }
}
