//! Export / import document.
//!
//! The document is a JSON object tagged with `"type": "choucalerte"` that
//! carries everything needed to resume an investigation, plus the free-form
//! notes attached to clues.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::boundary::SearchBoundary;
use crate::clue::{self, Clue};
use crate::error::{ChoucasError, ChoucasResult, ValidationError};
use crate::state::{AppState, BaseLayer, Viewport};
use crate::victim::Victim;

/// Type tag every export document carries.
pub const DOCUMENT_TYPE: &str = "choucalerte";

/// A free-form note attached to a clue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClueNote {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub map: Viewport,
    #[serde(default)]
    pub victim: Option<Victim>,
    #[serde(default)]
    pub initial_search_area: Option<SearchBoundary>,
    #[serde(rename = "currentBaseMap", default)]
    pub current_base_map: BaseLayer,
    #[serde(default)]
    pub clues: Vec<Clue>,
    #[serde(default)]
    pub notes_for_clues: Vec<ClueNote>,
}

impl ExportDocument {
    #[must_use]
    pub fn from_state(state: &AppState, notes: &[ClueNote]) -> Self {
        Self {
            doc_type: DOCUMENT_TYPE.to_string(),
            map: state.viewport,
            victim: state.victim.clone(),
            initial_search_area: state.boundary.clone(),
            current_base_map: state.base_layer,
            clues: state.clues.clone(),
            notes_for_clues: notes.to_vec(),
        }
    }

    /// Parses and checks the type tag.
    ///
    /// # Errors
    ///
    /// `MalformedDocument` when the text is not JSON or does not fit the
    /// document shape, `WrongDocumentType` when the tag is missing or is not
    /// [`DOCUMENT_TYPE`].
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let malformed = |e: serde_json::Error| ValidationError::MalformedDocument { message: e.to_string() };
        let value: JsonValue = serde_json::from_str(text).map_err(malformed)?;
        match value.get("type").and_then(JsonValue::as_str) {
            Some(DOCUMENT_TYPE) => {}
            found => {
                return Err(ValidationError::WrongDocumentType {
                    expected: DOCUMENT_TYPE,
                    found: found.unwrap_or("<missing>").to_string(),
                })
            }
        }
        serde_json::from_value(value).map_err(malformed)
    }

    /// Checks the clue list, so a document is either loaded whole or not at all.
    ///
    /// # Errors
    ///
    /// `DuplicateClueId`, or the first invalid clue's error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        clue::ensure_unique_ids(&self.clues)?;
        self.clues.iter().try_for_each(Clue::validate)
    }

    /// # Errors
    ///
    /// Returns an internal error if serialization fails.
    pub fn to_json(&self) -> ChoucasResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ChoucasError::internal(format!("document serialization failed: {e}")))
    }

    /// # Errors
    ///
    /// Returns an internal error on I/O failure.
    pub fn write_to(&self, path: &Path) -> ChoucasResult<()> {
        let json = self.to_json()?;
        fs::write(path, json)
            .map_err(|e| ChoucasError::internal(format!("cannot write {}: {e}", path.display())))?;
        info!(path = %path.display(), clues = self.clues.len(), "document exported");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an internal error on I/O failure, or the parse error.
    pub fn read_from(path: &Path) -> ChoucasResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ChoucasError::internal(format!("cannot read {}: {e}", path.display())))?;
        Ok(Self::parse(&text)?)
    }
}
