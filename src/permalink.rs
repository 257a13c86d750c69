//! Permalink codec and navigation history.
//!
//! A permalink is the fragment `#map=<zoom>/<x>/<y>/<fingerprint>`. The
//! fingerprint only forces a new fragment (and a new history entry) when the
//! state changed while the viewport did not; restoring always reads the
//! snapshot stored with the entry, never the fragment text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::boundary::SearchBoundary;
use crate::clue::Clue;
use crate::error::{ChoucasError, ChoucasResult, ValidationError};
use crate::state::{AppState, BaseLayer, Viewport};
use crate::victim::Victim;

/// Everything a history entry needs to restore the investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub map: Viewport,
    pub victim: Option<Victim>,
    pub clues: Vec<Clue>,
    pub initial_search_area: Option<SearchBoundary>,
    #[serde(rename = "currentBaseMap")]
    pub current_base_map: BaseLayer,
}

impl Snapshot {
    #[must_use]
    pub fn capture(state: &AppState) -> Self {
        Self {
            map: state.viewport,
            victim: state.victim.clone(),
            clues: state.clues.clone(),
            initial_search_area: state.boundary.clone(),
            current_base_map: state.base_layer,
        }
    }

    /// 128-bit blake3 digest of the serialized snapshot, as 32 hex characters.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the snapshot cannot be serialized.
    pub fn fingerprint(&self) -> ChoucasResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ChoucasError::internal(format!("snapshot serialization failed: {e}")))?;
        let digest = blake3::hash(&json);
        Ok(digest.to_hex().as_str()[..32].to_string())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// A parsed or generated permalink.
#[derive(Debug, Clone, PartialEq)]
pub struct Permalink {
    pub zoom: f64,
    pub center: [f64; 2],
    pub fingerprint: String,
}

impl Permalink {
    /// Permalink of a snapshot; the center is rounded to two decimals.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the snapshot cannot be fingerprinted.
    pub fn of(snapshot: &Snapshot) -> ChoucasResult<Self> {
        Ok(Self {
            zoom: snapshot.map.zoom,
            center: [round2(snapshot.map.center[0]), round2(snapshot.map.center[1])],
            fingerprint: snapshot.fingerprint()?,
        })
    }

    /// Parses `#map=<zoom>/<x>/<y>/<fingerprint>` (the leading `#` is optional).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidFragment` if the fragment is not of that form.
    pub fn parse(fragment: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFragment {
            fragment: fragment.to_string(),
        };
        let body = fragment.strip_prefix('#').unwrap_or(fragment);
        let body = body.strip_prefix("map=").ok_or_else(invalid)?;
        let parts: Vec<&str> = body.split('/').collect();
        let &[zoom, x, y, fingerprint] = parts.as_slice() else {
            return Err(invalid());
        };
        let number = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(invalid);
        if fingerprint.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            zoom: number(zoom)?,
            center: [number(x)?, number(y)?],
            fingerprint: fingerprint.to_string(),
        })
    }

    /// Viewport used to seed the state at startup.
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        Viewport {
            zoom: self.zoom,
            center: self.center,
        }
    }
}

impl fmt::Display for Permalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#map={}/{}/{}/{}",
            self.zoom, self.center[0], self.center[1], self.fingerprint
        )
    }
}

/// A history entry: the fragment and the snapshot it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub fragment: String,
    pub snapshot: Snapshot,
}

/// Back/forward navigation stack.
pub trait History: Send + fmt::Debug {
    /// Pushes after the current entry, discarding any forward entries.
    fn push(&mut self, entry: HistoryEntry);

    fn current(&self) -> Option<&HistoryEntry>;

    /// Moves one entry back and returns it.
    fn back(&mut self) -> Option<&HistoryEntry>;

    /// Moves one entry forward and returns it.
    fn forward(&mut self) -> Option<&HistoryEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`History`].
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
}

impl MemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl History for MemoryHistory {
    fn push(&mut self, entry: HistoryEntry) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push(entry);
        self.cursor = Some(self.entries.len() - 1);
    }

    fn current(&self) -> Option<&HistoryEntry> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    fn back(&mut self) -> Option<&HistoryEntry> {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                self.entries.get(c - 1)
            }
            _ => None,
        }
    }

    fn forward(&mut self) -> Option<&HistoryEntry> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.entries.len() {
            self.cursor = Some(next);
            self.entries.get(next)
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
