//! Reconciliation flows.
//!
//! Each flow is one run: fetch a fresh snapshot, plan decisions through the
//! engine, apply them, report counts. Nothing is cached across runs and no
//! flow retries; a transport failure aborts the fetch phase of the current
//! flow only.

use std::collections::BTreeSet;

use tracing::{info, instrument, warn};

use crate::board::BoardClient;
use crate::config::RunConfig;
use crate::engine;
use crate::error::Result;
use crate::model::{SyncDecision, TargetRecord};
use crate::suite::{SuiteClient, SuiteSession};

/// Counts reported by a flow: how many decisions were planned and how many
/// applied without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub planned: usize,
    pub applied: usize,
}

/// Mirrors board items with the given name into the suite when no record of
/// that name exists there yet.
#[instrument(level = "info", skip_all, fields(board_id = config.board_id, name = name_filter))]
pub fn create_missing(
    config: &RunConfig,
    board: &BoardClient,
    suite: &SuiteClient,
    session: &SuiteSession,
    name_filter: &str,
) -> Result<RunReport> {
    let items = board.items_with_names(config.board_id)?;
    info!(item_count = items.len(), "fetched board snapshot");

    let records = suite.search_read(session, &[config.target_name_field.clone()])?;
    let existing: BTreeSet<String> = records
        .iter()
        .filter_map(|record| {
            record
                .text_field(&config.target_name_field)
                .map(str::to_string)
        })
        .collect();

    let decisions = engine::plan_create_missing(
        &items,
        &existing,
        &config.target_schema(),
        |item| item.name == name_filter,
    );
    let applied = apply_to_suite(&decisions, suite, session);
    info!(planned = decisions.len(), applied, "create-missing finished");
    Ok(RunReport {
        planned: decisions.len(),
        applied,
    })
}

/// Upserts suite records from the board's status column, treating the board
/// as the source of truth for the pipeline stage.
#[instrument(level = "info", skip_all, fields(board_id = config.board_id))]
pub fn sync_status(
    config: &RunConfig,
    board: &BoardClient,
    suite: &SuiteClient,
    session: &SuiteSession,
) -> Result<RunReport> {
    let items = board.items_with_column(config.board_id, &config.status_column_id)?;
    info!(item_count = items.len(), "fetched board snapshot");

    let decisions = engine::plan_upsert_by_status(
        &items,
        &config.status_column_id,
        &config.status_to_stage,
        &config.field_mapping,
        &config.target_schema(),
        |name| suite.ids_by_field(session, &config.target_name_field, name),
    )?;
    let applied = apply_to_suite(&decisions, suite, session);
    info!(planned = decisions.len(), applied, "status sync finished");
    Ok(RunReport {
        planned: decisions.len(),
        applied,
    })
}

/// Mirrors suite records onto a freshly created board, projecting fields
/// through the reversed mapping. Create-only: re-running duplicates items.
#[instrument(level = "info", skip_all, fields(board_name = %board_name))]
pub fn export_records(
    config: &RunConfig,
    board: &BoardClient,
    suite: &SuiteClient,
    session: &SuiteSession,
    board_name: &str,
) -> Result<RunReport> {
    let onward_mapping = config.field_mapping.reversed()?;
    let mut fetch_fields = onward_mapping.source_fields();
    if !fetch_fields.contains(&config.source_name_field) {
        fetch_fields.push(config.source_name_field.clone());
    }

    let records = suite.search_read(session, &fetch_fields)?;
    info!(record_count = records.len(), "fetched suite snapshot");

    let drafts =
        engine::plan_mirror_fields_onward(&records, &config.source_name_field, &onward_mapping);
    let board_id = board.create_board(board_name)?;
    info!(board_id, "created destination board");

    let mut applied = 0usize;
    for draft in &drafts {
        let outcome = if draft.column_values.is_empty() {
            board.create_item(board_id, &draft.name).map(|_| ())
        } else {
            let values = serde_json::Value::Object(draft.column_values.clone());
            board
                .create_item_with_values(board_id, &draft.name, &values)
                .map(|_| ())
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(error) => warn!(%error, item = %draft.name, "item creation failed, continuing"),
        }
    }
    info!(planned = drafts.len(), applied, "export finished");
    Ok(RunReport {
        planned: drafts.len(),
        applied,
    })
}

/// Reads the requested fields of every suite record matching the name.
#[instrument(level = "info", skip_all, fields(name = %name))]
pub fn inspect_records(
    config: &RunConfig,
    suite: &SuiteClient,
    session: &SuiteSession,
    name: &str,
    fields: &[String],
) -> Result<Vec<TargetRecord>> {
    let ids = suite.ids_by_field(session, &config.target_name_field, name)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    suite.read(session, &ids, fields)
}

/// Deletes the listed board items and, when asked, every record of the
/// configured suite model. Best-effort on the board side.
#[instrument(level = "info", skip_all, fields(item_count = board_items.len(), purge_target = purge_target))]
pub fn purge(
    board: &BoardClient,
    suite: &SuiteClient,
    session: &SuiteSession,
    board_items: &[u64],
    purge_target: bool,
) -> Result<usize> {
    let mut deleted = 0usize;
    for &item_id in board_items {
        match board.delete_item(item_id) {
            Ok(()) => {
                info!(item_id, "deleted board item");
                deleted += 1;
            }
            Err(error) => warn!(%error, item_id, "board item deletion failed, continuing"),
        }
    }
    if purge_target {
        let ids = suite.all_ids(session)?;
        if !ids.is_empty() {
            suite.unlink(session, &ids)?;
            info!(record_count = ids.len(), "unlinked suite records");
            deleted += ids.len();
        }
    }
    Ok(deleted)
}

/// Applies suite-directed decisions in order, creating or updating records.
fn apply_to_suite(
    decisions: &[SyncDecision],
    suite: &SuiteClient,
    session: &SuiteSession,
) -> usize {
    engine::apply_decisions(decisions, |decision| match decision {
        SyncDecision::Create { fields } => {
            let id = suite.create(session, fields)?;
            info!(id, "created suite record");
            Ok(())
        }
        SyncDecision::Update { target_id, fields } => {
            suite.write(session, *target_id, fields)?;
            info!(target_id, "updated suite record");
            Ok(())
        }
    })
}
