use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::error::RelayError;
use crate::models::message::ControlSelection;

/// Operator choices that survive a consumer context reload.
///
/// Serialized as camelCase JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSelection {
    pub source_id: Option<String>,
    pub source_title: Option<String>,
    pub selected_renderer: Option<String>,
    pub request_timestamp: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedSelection {
    /// The control selection to re-apply, if a source is still selected.
    pub fn selection(&self) -> Option<ControlSelection> {
        let source_id = self.source_id.clone()?;
        Some(ControlSelection {
            source_id,
            selected_renderer: self.selected_renderer.clone().unwrap_or_default(),
            request_timestamp: self
                .request_timestamp
                .or(self.updated_at)
                .unwrap_or_else(Utc::now),
        })
    }
}

/// JSON file holding the current source selection and renderer.
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. A missing file is an empty selection.
    pub fn load(&self) -> Result<PersistedSelection, RelayError> {
        if !self.path.exists() {
            return Ok(PersistedSelection::default());
        }
        let json = fs::read_to_string(&self.path)
            .map_err(|e| RelayError::StorageError(format!("failed to read selection: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| RelayError::StorageError(format!("failed to parse selection: {}", e)))
    }

    /// Write the state via a temporary file so a crash never leaves half a file.
    pub fn save(&self, state: &PersistedSelection) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RelayError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let mut state = state.clone();
        state.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| RelayError::StorageError(format!("failed to serialize selection: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| RelayError::StorageError(format!("failed to write selection: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| RelayError::StorageError(format!("failed to replace selection: {}", e)))?;
        Ok(())
    }

    pub fn save_selection(&self, selection: &ControlSelection, source_title: Option<&str>) -> Result<(), RelayError> {
        let state = PersistedSelection {
            source_id: Some(selection.source_id.clone()),
            source_title: source_title.map(str::to_string),
            selected_renderer: Some(selection.selected_renderer.clone()),
            request_timestamp: Some(selection.request_timestamp),
            updated_at: None,
        };
        self.save(&state)
    }

    pub fn update_title(&self, title: &str) -> Result<(), RelayError> {
        let mut state = self.load()?;
        if state.source_id.is_none() {
            return Ok(());
        }
        state.source_title = Some(title.to_string());
        self.save(&state)
    }

    /// Forget the source but keep the renderer choice.
    pub fn clear_source(&self) -> Result<(), RelayError> {
        let mut state = self.load()?;
        state.source_id = None;
        state.source_title = None;
        state.request_timestamp = None;
        self.save(&state)
    }
}
