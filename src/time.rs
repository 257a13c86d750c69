//! Temporal descriptors attached to clues.
//!
//! A clue happens either at an instant or over an interval. The operator usually
//! expresses it relatively ("two hours ago", "since three hours"), but the
//! descriptor always stores the resolved absolute UTC timestamps so that derived
//! zones (sun/shadow) and aggregation do not depend on when they are evaluated.

use std::fmt;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How the time of a clue was expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeKind {
    /// Right now.
    #[serde(rename = "instant-now")]
    InstantNow,
    /// A single instant some hours ago.
    #[serde(rename = "instant-past")]
    InstantPast,
    /// From some hours ago until now.
    #[serde(rename = "duration-instant-to-now")]
    DurationInstantToNow,
    /// Between two past instants.
    #[serde(rename = "duration-instant-to-instant")]
    DurationInstantToInstant,
}

impl TimeKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstantNow => "instant-now",
            Self::InstantPast => "instant-past",
            Self::DurationInstantToNow => "duration-instant-to-now",
            Self::DurationInstantToInstant => "duration-instant-to-instant",
        }
    }

    /// True when the kind is anchored to the present moment.
    #[must_use]
    pub fn is_anchored_now(self) -> bool {
        self.as_str().ends_with("now")
    }

    /// Number of resolved timestamps this kind carries.
    #[must_use]
    pub const fn timestamp_count(self) -> usize {
        match self {
            Self::InstantNow | Self::InstantPast => 1,
            Self::DurationInstantToNow | Self::DurationInstantToInstant => 2,
        }
    }
}

impl fmt::Display for TimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An instant or an interval, with its resolved timestamps.
///
/// # Examples
///
/// ```
/// use choucalerte::TimeDescriptor;
/// use chrono::Utc;
///
/// let now = Utc::now();
/// let d = TimeDescriptor::since_hours_ago(now, 3).unwrap();
/// assert!(d.is_anchored_now());
/// assert_eq!(d.value.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeDescriptor {
    #[serde(rename = "type")]
    pub kind: TimeKind,

    /// Resolved timestamps, oldest first for intervals.
    pub value: Vec<DateTime<Utc>>,
}

/// `reference` moved `h` hours into the past, if representable.
fn before(reference: DateTime<Utc>, h: u32, kind: TimeKind) -> Result<DateTime<Utc>, ValidationError> {
    reference
        .checked_sub_signed(Duration::hours(i64::from(h)))
        .ok_or_else(|| ValidationError::InvalidTimeDescriptor {
            kind: kind.to_string(),
            expected: kind.timestamp_count(),
            actual: 0,
        })
}

impl TimeDescriptor {
    /// The present instant, resolved against `reference`.
    #[must_use]
    pub fn now(reference: DateTime<Utc>) -> Self {
        Self {
            kind: TimeKind::InstantNow,
            value: vec![reference.trunc_subsecs(0)],
        }
    }

    /// An instant `hours_ago` hours before `reference`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeDescriptor` if the instant falls
    /// outside the representable range.
    pub fn hours_ago(reference: DateTime<Utc>, hours_ago: u32) -> Result<Self, ValidationError> {
        let kind = TimeKind::InstantPast;
        Ok(Self {
            kind,
            value: vec![before(reference.trunc_subsecs(0), hours_ago, kind)?],
        })
    }

    /// The interval from `hours_ago` hours before `reference` until `reference`.
    ///
    /// # Errors
    ///
    /// See [`TimeDescriptor::hours_ago`].
    pub fn since_hours_ago(reference: DateTime<Utc>, hours_ago: u32) -> Result<Self, ValidationError> {
        let kind = TimeKind::DurationInstantToNow;
        let reference = reference.trunc_subsecs(0);
        Ok(Self {
            kind,
            value: vec![before(reference, hours_ago, kind)?, reference],
        })
    }

    /// The interval between two past instants, expressed in hours before `reference`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeDescriptor` if `from_hours_ago` is not
    /// strictly further in the past than `to_hours_ago`, or if either instant is
    /// out of range.
    pub fn between_hours_ago(
        reference: DateTime<Utc>,
        from_hours_ago: u32,
        to_hours_ago: u32,
    ) -> Result<Self, ValidationError> {
        if from_hours_ago <= to_hours_ago {
            return Err(ValidationError::InvalidTimeDescriptor {
                kind: TimeKind::DurationInstantToInstant.to_string(),
                expected: 2,
                actual: 0,
            });
        }
        let kind = TimeKind::DurationInstantToInstant;
        let reference = reference.trunc_subsecs(0);
        Ok(Self {
            kind,
            value: vec![
                before(reference, from_hours_ago, kind)?,
                before(reference, to_hours_ago, kind)?,
            ],
        })
    }

    pub fn is_anchored_now(&self) -> bool {
        self.kind.is_anchored_now()
    }

    /// Checks that the number of timestamps matches the kind.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeDescriptor` on mismatch or when an
    /// interval ends before it starts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let expected = self.kind.timestamp_count();
        let ordered = self.value.windows(2).all(|w| w[0] <= w[1]);
        if self.value.len() != expected || !ordered {
            return Err(ValidationError::InvalidTimeDescriptor {
                kind: self.kind.to_string(),
                expected,
                actual: self.value.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TimeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamps: Vec<String> = self.value.iter().map(DateTime::to_rfc3339).collect();
        write!(f, "{} [{}]", self.kind, stamps.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 21, 14, 30, 12).unwrap()
    }

    #[test]
    fn test_now_kinds_are_anchored() {
        assert!(TimeKind::InstantNow.is_anchored_now());
        assert!(TimeKind::DurationInstantToNow.is_anchored_now());
        assert!(!TimeKind::InstantPast.is_anchored_now());
        assert!(!TimeKind::DurationInstantToInstant.is_anchored_now());
    }

    #[test]
    fn test_relative_inputs_resolve_to_absolute() {
        let d = TimeDescriptor::hours_ago(reference(), 2).unwrap();
        assert_eq!(d.value, vec![Utc.with_ymd_and_hms(2019, 6, 21, 12, 30, 12).unwrap()]);

        let d = TimeDescriptor::since_hours_ago(reference(), 3).unwrap();
        assert_eq!(d.value[0], Utc.with_ymd_and_hms(2019, 6, 21, 11, 30, 12).unwrap());
        assert_eq!(d.value[1], reference());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_between_requires_ordered_bounds() {
        assert!(TimeDescriptor::between_hours_ago(reference(), 1, 4).is_err());
        let d = TimeDescriptor::between_hours_ago(reference(), 4, 1).unwrap();
        assert!(d.value[0] < d.value[1]);
    }

    #[test]
    fn test_out_of_range_offsets_are_rejected() {
        assert!(matches!(
            TimeDescriptor::hours_ago(reference(), u32::MAX),
            Err(ValidationError::InvalidTimeDescriptor { .. })
        ));
        assert!(TimeDescriptor::since_hours_ago(reference(), u32::MAX).is_err());
        assert!(TimeDescriptor::between_hours_ago(reference(), u32::MAX, 1).is_err());
    }

    #[test]
    fn test_subseconds_are_truncated() {
        let with_millis = reference() + Duration::milliseconds(742);
        assert_eq!(TimeDescriptor::now(with_millis).value[0], reference());
    }

    #[test]
    fn test_wire_format() {
        let d = TimeDescriptor::now(reference());
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "instant-now");
        let back: TimeDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_validate_rejects_wrong_arity() {
        let d = TimeDescriptor {
            kind: TimeKind::DurationInstantToNow,
            value: vec![reference()],
        };
        assert!(matches!(
            d.validate(),
            Err(ValidationError::InvalidTimeDescriptor { expected: 2, actual: 1, .. })
        ));
    }
}
