//! Bounded ring of prior-state snapshots, for diagnostic replay.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::state::{AppState, Field};

/// The full state as it was just before a write to `field`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub field: Field,
    pub prior: JsonValue,
}

#[derive(Debug, Clone)]
pub struct TraceRing {
    capacity: usize,
    entries: VecDeque<TraceEntry>,
}

impl TraceRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Snapshots `state`, evicting the oldest entry when full.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if the state cannot be encoded.
    pub fn record(&mut self, field: Field, state: &AppState) -> serde_json::Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let prior = serde_json::to_value(state)?;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TraceEntry {
            at: Utc::now(),
            field,
            prior,
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = TraceRing::new(2);
        let state = AppState::new();
        ring.record(Field::Viewport, &state).unwrap();
        ring.record(Field::Clues, &state).unwrap();
        ring.record(Field::Victim, &state).unwrap();
        let fields: Vec<Field> = ring.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec![Field::Clues, Field::Victim]);
        assert_eq!(ring.last().unwrap().prior["map"]["zoom"], 10.8);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut ring = TraceRing::new(0);
        ring.record(Field::Viewport, &AppState::new()).unwrap();
        assert!(ring.is_empty());
    }
}
