//! Run configuration.
//!
//! One reconciliation run is driven entirely by a [`RunConfig`] read once at
//! process start. Endpoints, board and column ids, the status vocabulary and
//! the field mapping all live here rather than in module scope, so the
//! engine can be exercised with any configuration in tests.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::engine::TargetSchema;
use crate::error::{Result, SyncError};
use crate::model::{FieldMapping, StatusLookup};

/// Everything a run needs to know besides credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// GraphQL endpoint of the board service.
    pub board_url: String,
    /// Base URL of the business suite.
    pub suite_url: String,
    /// Database name inside the business suite.
    pub suite_db: String,
    /// Model the run operates on, e.g. an applicant or employee model.
    pub suite_model: String,
    /// Numeric id of the board holding the items to reconcile.
    pub board_id: u64,

    /// Column id carrying the status text on the board.
    #[serde(default = "default_status_column")]
    pub status_column_id: String,
    /// Display-name field on the suite side; doubles as the join key.
    #[serde(default = "default_name_field")]
    pub target_name_field: String,
    /// Pipeline stage field on the suite side.
    #[serde(default = "default_stage_field")]
    pub target_stage_field: String,
    /// Mandatory record-title field the suite requires.
    #[serde(default = "default_title_field")]
    pub target_title_field: String,
    /// Constant written into the title field on every create or update.
    #[serde(default = "default_title_value")]
    pub target_title_value: String,
    /// Display-name field read from suite records in the onward direction.
    #[serde(default = "default_source_name_field")]
    pub source_name_field: String,

    /// Status label → stage id lookup. Labels not listed here are skipped.
    #[serde(default)]
    pub status_to_stage: StatusLookup,
    /// Board column id → suite field pairs. Applied as written in the
    /// board→suite direction and reversed for the onward direction.
    #[serde(default)]
    pub field_mapping: FieldMapping,
}

impl RunConfig {
    /// Loads and validates a configuration file. A malformed mapping or
    /// lookup fails here, before any run starts, since it would otherwise
    /// corrupt every decision in the run.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::MissingConfig(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the mapping shapes in both directions of use.
    pub fn validate(&self) -> Result<()> {
        self.field_mapping.validate()?;
        self.field_mapping.reversed()?;
        self.status_to_stage.validate()?;
        Ok(())
    }

    /// Field names the engine writes into suite payloads.
    pub fn target_schema(&self) -> TargetSchema {
        TargetSchema {
            name_field: self.target_name_field.clone(),
            stage_field: self.target_stage_field.clone(),
            title_field: self.target_title_field.clone(),
            title_value: self.target_title_value.clone(),
        }
    }
}

fn default_status_column() -> String {
    "status".to_string()
}

fn default_name_field() -> String {
    "partner_name".to_string()
}

fn default_stage_field() -> String {
    "stage_id".to_string()
}

fn default_title_field() -> String {
    "name".to_string()
}

fn default_title_value() -> String {
    "Updated Status!".to_string()
}

fn default_source_name_field() -> String {
    "name".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("temporary directory");
        let path = dir.path().join("boardsync.json");
        let mut file = fs::File::create(&path).expect("config file created");
        file.write_all(contents.as_bytes()).expect("config written");
        (dir, path)
    }

    #[test]
    fn loads_config_with_defaults() {
        let (_dir, path) = write_config(
            r#"{
                "board_url": "https://boards.example.com/v2",
                "suite_url": "https://suite.example.com",
                "suite_db": "acme",
                "suite_model": "hr.applicant",
                "board_id": 42,
                "status_to_stage": { "New": 1, "First Interview": 3 }
            }"#,
        );

        let config = RunConfig::load(&path).expect("config loaded");
        assert_eq!(config.board_id, 42);
        assert_eq!(config.status_column_id, "status");
        assert_eq!(config.target_name_field, "partner_name");
        assert_eq!(config.status_to_stage.stage_for("New"), Some(1));
        assert!(config.field_mapping.is_empty());
    }

    #[test]
    fn missing_file_is_reported_as_such() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let absent = dir.path().join("nope.json");
        assert!(matches!(
            RunConfig::load(&absent),
            Err(SyncError::MissingConfig(_))
        ));
    }

    #[test]
    fn zero_stage_id_fails_fast() {
        let (_dir, path) = write_config(
            r#"{
                "board_url": "u", "suite_url": "u", "suite_db": "d",
                "suite_model": "m", "board_id": 1,
                "status_to_stage": { "New": 0 }
            }"#,
        );
        assert!(matches!(
            RunConfig::load(&path),
            Err(SyncError::InvalidLookup(_))
        ));
    }

    #[test]
    fn duplicate_mapping_key_fails_fast() {
        let (_dir, path) = write_config(
            r#"{
                "board_url": "u", "suite_url": "u", "suite_db": "d",
                "suite_model": "m", "board_id": 1,
                "field_mapping": [["email", "work_email"], ["email", "other"]]
            }"#,
        );
        assert!(matches!(
            RunConfig::load(&path),
            Err(SyncError::InvalidMapping(_))
        ));
    }

    #[test]
    fn duplicate_destination_fails_the_reversed_direction() {
        let (_dir, path) = write_config(
            r#"{
                "board_url": "u", "suite_url": "u", "suite_db": "d",
                "suite_model": "m", "board_id": 1,
                "field_mapping": [["email", "work_email"], ["mail", "work_email"]]
            }"#,
        );
        assert!(matches!(
            RunConfig::load(&path),
            Err(SyncError::InvalidMapping(_))
        ));
    }
}
