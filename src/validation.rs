//! Schema checks on the objects the reactions see.
//!
//! These checks never gate a transition: violations are logged and returned
//! so callers (and tests) can inspect them.

use std::fmt;

use geojson::Value;
use tracing::warn;

use crate::boundary::SearchBoundary;
use crate::clue::Clue;
use crate::state::ProbableZone;
use crate::victim::Victim;

/// Conservative upper bound for free-form clue text.
pub const MAX_TEXT_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub object: &'static str,
    pub id: Option<String>,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {}: {}", self.object, id, self.message),
            None => write!(f, "{}: {}", self.object, self.message),
        }
    }
}

fn violation(object: &'static str, id: Option<String>, message: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        object,
        id,
        message: message.into(),
    }
}

fn is_polygonal(value: &Value) -> bool {
    match value {
        Value::Polygon(_) | Value::MultiPolygon(_) => true,
        Value::GeometryCollection(members) => members.iter().all(|g| is_polygonal(&g.value)),
        _ => false,
    }
}

#[must_use]
pub fn check_boundary(isa: &SearchBoundary) -> Vec<SchemaViolation> {
    let id = Some(isa.isa_id.to_string());
    let mut out = Vec::new();
    if !isa.isa_id.to_string().starts_with("isa_") {
        out.push(violation("isa", id.clone(), "identifier must start with 'isa_'"));
    }
    let [xmin, ymin, xmax, ymax] = isa.bbox;
    if !(xmin < xmax && ymin < ymax) {
        out.push(violation("isa", id.clone(), "bbox is not ordered as [xmin, ymin, xmax, ymax]"));
    }
    match &isa.geometry.value {
        Value::Polygon(rings) => {
            let closed = rings.first().is_some_and(|r| r.len() >= 4 && r.first() == r.last());
            if !closed {
                out.push(violation("isa", id, "exterior ring is not closed"));
            }
        }
        _ => out.push(violation("isa", id, "geometry must be a Polygon")),
    }
    out
}

#[must_use]
pub fn check_clue(clue: &Clue) -> Vec<SchemaViolation> {
    let id = Some(clue.clue_id.to_string());
    let mut out = Vec::new();
    if !clue.clue_id.as_str().starts_with("clue_") {
        out.push(violation("clue", id.clone(), "identifier must start with 'clue_'"));
    }
    if let Err(e) = clue.validate() {
        out.push(violation("clue", id.clone(), e.to_string()));
    }
    if clue.text().len() > MAX_TEXT_LEN {
        out.push(violation("clue", id.clone(), "natural-language text is too long"));
    }
    if let Some(zone) = &clue.corresponding_zone {
        if zone.features.is_empty() {
            out.push(violation("clue", id.clone(), "derived zone has no feature"));
        }
        let bad = zone
            .features
            .iter()
            .filter(|ft| !ft.geometry.as_ref().is_some_and(|g| is_polygonal(&g.value)))
            .count();
        if bad > 0 {
            out.push(violation("clue", id, format!("{bad} derived feature(s) are not polygonal")));
        }
    }
    out
}

#[must_use]
pub fn check_victim(victim: &Victim) -> Vec<SchemaViolation> {
    victim
        .unknown_activities()
        .into_iter()
        .map(|a| violation("victim", victim.victim_id.clone(), format!("unknown activity '{a}'")))
        .collect()
}

#[must_use]
pub fn check_probable_zone(zone: &ProbableZone) -> Vec<SchemaViolation> {
    let id = Some(zone.zlp_id.clone());
    let mut out = Vec::new();
    if !zone.zlp_id.starts_with("zlp_") {
        out.push(violation("zlp", id.clone(), "identifier must start with 'zlp_'"));
    }
    if zone.clue_ids.len() < 2 {
        out.push(violation("zlp", id.clone(), "needs at least two contributing clues"));
    }
    if !is_polygonal(&zone.geometry.value) {
        out.push(violation("zlp", id, "geometry is not polygonal"));
    }
    out
}

/// Logs every violation at `warn` and hands them back.
pub fn report(violations: Vec<SchemaViolation>) -> Vec<SchemaViolation> {
    for v in &violations {
        warn!(object = v.object, id = v.id.as_deref().unwrap_or("-"), "schema violation: {}", v.message);
    }
    violations
}
