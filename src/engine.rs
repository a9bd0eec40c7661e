//! Reconciliation engine.
//!
//! Transforms a snapshot of board items plus a join/lookup strategy into a
//! list of [`SyncDecision`]s, then applies them. The engine owns no state
//! and performs no I/O of its own: existing-record lookups and decision
//! application are injected as closures, so every planning rule is testable
//! without a network.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{FieldMapping, FieldSet, RemoteItem, StatusLookup, SyncDecision, TargetRecord};

/// Status text substituted when an item's status column carries no value.
/// The sentinel goes through the regular lookup, so it is only acted on
/// when the operator maps it explicitly.
pub const STATUS_NOT_FOUND: &str = "Status not found";

/// Field names the engine writes into business-suite payloads.
#[derive(Debug, Clone)]
pub struct TargetSchema {
    /// Display-name field, also the join key for existing-record lookups.
    pub name_field: String,
    /// Pipeline stage field.
    pub stage_field: String,
    /// Mandatory record-title field the suite requires on every record.
    pub title_field: String,
    /// Constant written into the title field.
    pub title_value: String,
}

/// Payload for one board item planned by the mirror-onward flow.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    /// Display name of the item to create.
    pub name: String,
    /// Column id → value projected through the field mapping.
    pub column_values: FieldSet,
}

/// Plans a `Create` for every item that satisfies `filter` and is not yet
/// present on the target, joined by display name.
///
/// The target store enforces no uniqueness on the join key, so names are
/// deduplicated within the run: the same name never produces two creates in
/// one pass. Running again after the creates landed produces nothing, which
/// is what makes the operation idempotent.
pub fn plan_create_missing<F>(
    items: &[RemoteItem],
    existing_names: &BTreeSet<String>,
    schema: &TargetSchema,
    filter: F,
) -> Vec<SyncDecision>
where
    F: Fn(&RemoteItem) -> bool,
{
    let mut planned_names = BTreeSet::new();
    let mut decisions = Vec::new();
    for item in items {
        if !filter(item) {
            continue;
        }
        if existing_names.contains(&item.name) || !planned_names.insert(item.name.clone()) {
            continue;
        }
        let mut fields = FieldSet::new();
        fields.insert(
            schema.name_field.clone(),
            Value::String(item.name.clone()),
        );
        fields.insert(
            schema.title_field.clone(),
            Value::String(schema.title_value.clone()),
        );
        decisions.push(SyncDecision::Create { fields });
    }
    decisions
}

/// Plans create-or-update decisions from the items' status column.
///
/// Per item: the status text is read from `status_column_id` (absent values
/// become [`STATUS_NOT_FOUND`]); a label missing from the lookup skips the
/// item with a log line, never a failure; otherwise the existing records are
/// resolved by exact display-name match. Zero matches plan one `Create`;
/// `k` matches fan out to `k` `Update`s carrying the same payload, because
/// the target enforces no uniqueness on the join key.
pub fn plan_upsert_by_status<L>(
    items: &[RemoteItem],
    status_column_id: &str,
    lookup: &StatusLookup,
    mapping: &FieldMapping,
    schema: &TargetSchema,
    mut lookup_existing: L,
) -> Result<Vec<SyncDecision>>
where
    L: FnMut(&str) -> Result<Vec<i64>>,
{
    let mut decisions = Vec::new();
    let mut skipped = 0usize;
    for item in items {
        let status_text = item.column_text(status_column_id).unwrap_or(STATUS_NOT_FOUND);
        let Some(stage_id) = lookup.stage_for(status_text) else {
            info!(item = %item.name, status = status_text, "no stage for status, skipping");
            skipped += 1;
            continue;
        };

        let mut fields = FieldSet::new();
        fields.insert(
            schema.name_field.clone(),
            Value::String(item.name.clone()),
        );
        fields.insert(
            schema.title_field.clone(),
            Value::String(schema.title_value.clone()),
        );
        fields.insert(schema.stage_field.clone(), Value::from(stage_id));
        for (source, dest) in mapping.iter() {
            if let Some(text) = item.column_text(source) {
                fields.insert(dest.to_string(), Value::String(text.to_string()));
            }
        }

        let matches = lookup_existing(&item.name)?;
        if matches.is_empty() {
            decisions.push(SyncDecision::Create { fields });
        } else {
            for target_id in matches {
                decisions.push(SyncDecision::Update {
                    target_id,
                    fields: fields.clone(),
                });
            }
        }
    }
    if skipped > 0 {
        info!(skipped, "items without a mapped status were skipped");
    }
    Ok(decisions)
}

/// Projects business-suite records into board item drafts through the field
/// mapping (source key → column id).
///
/// This direction always creates and never updates: no existing-item lookup
/// is performed, so re-running the flow duplicates the items. Asymmetric on
/// purpose with respect to [`plan_upsert_by_status`].
pub fn plan_mirror_fields_onward(
    records: &[TargetRecord],
    source_name_field: &str,
    mapping: &FieldMapping,
) -> Vec<ItemDraft> {
    let mut drafts = Vec::new();
    for record in records {
        let Some(name) = record.text_field(source_name_field) else {
            warn!(record = record.id, "record has no usable display name, skipping");
            continue;
        };
        let mut column_values = FieldSet::new();
        for (source, dest) in mapping.iter() {
            if let Some(value) = record.fields.get(source) {
                column_values.insert(dest.to_string(), value.clone());
            }
        }
        drafts.push(ItemDraft {
            name: name.to_string(),
            column_values,
        });
    }
    drafts
}

/// Applies decisions in list order through the injected closure.
///
/// Best-effort batch semantics: a failing decision is logged and counted
/// but does not abort the remaining ones. Returns the number of decisions
/// that applied successfully.
pub fn apply_decisions<A>(decisions: &[SyncDecision], mut apply: A) -> usize
where
    A: FnMut(&SyncDecision) -> Result<()>,
{
    let mut applied = 0usize;
    for decision in decisions {
        match apply(decision) {
            Ok(()) => applied += 1,
            Err(error) => warn!(%error, ?decision, "decision failed, continuing"),
        }
    }
    applied
}
