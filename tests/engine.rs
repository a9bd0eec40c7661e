use std::collections::{BTreeMap, BTreeSet};

use boardsync::engine::{self, TargetSchema};
use boardsync::model::{FieldMapping, RemoteItem, StatusLookup, SyncDecision, TargetRecord};
use serde_json::Value;

fn schema() -> TargetSchema {
    TargetSchema {
        name_field: "partner_name".to_string(),
        stage_field: "stage_id".to_string(),
        title_field: "name".to_string(),
        title_value: "Updated Status!".to_string(),
    }
}

fn lookup(pairs: &[(&str, u32)]) -> StatusLookup {
    StatusLookup::new(
        pairs
            .iter()
            .map(|(label, stage)| (label.to_string(), *stage))
            .collect(),
    )
    .expect("valid lookup")
}

fn item_with_status(name: &str, status: &str) -> RemoteItem {
    let mut item = RemoteItem::new("1", name);
    item.fields.insert("status".to_string(), status.to_string());
    item
}

fn no_matches(_name: &str) -> boardsync::Result<Vec<i64>> {
    Ok(Vec::new())
}

#[test]
fn empty_snapshot_plans_nothing() {
    let decisions = engine::plan_upsert_by_status(
        &[],
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        no_matches,
    )
    .expect("planned");
    assert!(decisions.is_empty());
}

#[test]
fn unmapped_status_is_an_idempotent_skip() {
    let items = vec![item_with_status("X", "Unknown")];
    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        no_matches,
    )
    .expect("planned");
    assert!(decisions.is_empty());
}

#[test]
fn unmatched_item_plans_one_create_with_its_stage() {
    let items = vec![item_with_status("Chaves", "New")];
    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        no_matches,
    )
    .expect("planned");

    assert_eq!(decisions.len(), 1);
    let SyncDecision::Create { fields } = &decisions[0] else {
        panic!("expected a create");
    };
    assert_eq!(fields.get("partner_name"), Some(&Value::from("Chaves")));
    assert_eq!(fields.get("stage_id"), Some(&Value::from(1)));
    assert_eq!(fields.get("name"), Some(&Value::from("Updated Status!")));
}

#[test]
fn ambiguous_names_fan_out_to_every_match() {
    let items = vec![item_with_status("Dana", "First Interview")];
    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("First Interview", 3)]),
        &FieldMapping::empty(),
        &schema(),
        |_name| Ok(vec![41, 42]),
    )
    .expect("planned");

    assert_eq!(decisions.len(), 2);
    let ids: Vec<i64> = decisions
        .iter()
        .map(|decision| match decision {
            SyncDecision::Update { target_id, .. } => *target_id,
            SyncDecision::Create { .. } => panic!("expected updates"),
        })
        .collect();
    assert_eq!(ids, vec![41, 42]);
    assert_eq!(decisions[0].fields(), decisions[1].fields());
    assert_eq!(
        decisions[0].fields().get("stage_id"),
        Some(&Value::from(3))
    );
}

#[test]
fn missing_status_column_uses_the_sentinel_label() {
    // Sentinel not mapped: skip.
    let items = vec![RemoteItem::new("1", "Blank")];
    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        no_matches,
    )
    .expect("planned");
    assert!(decisions.is_empty());

    // Sentinel mapped explicitly: acted on like any other label.
    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[(engine::STATUS_NOT_FOUND, 9)]),
        &FieldMapping::empty(),
        &schema(),
        no_matches,
    )
    .expect("planned");
    assert_eq!(decisions.len(), 1);
    assert_eq!(
        decisions[0].fields().get("stage_id"),
        Some(&Value::from(9))
    );
}

#[test]
fn mapped_columns_are_copied_into_the_payload() {
    let mapping = FieldMapping::new(vec![("email".to_string(), "work_email".to_string())])
        .expect("valid mapping");
    let mut item = item_with_status("Sam", "New");
    item.fields
        .insert("email".to_string(), "sam@example.com".to_string());

    let decisions = engine::plan_upsert_by_status(
        &[item],
        "status",
        &lookup(&[("New", 1)]),
        &mapping,
        &schema(),
        no_matches,
    )
    .expect("planned");
    assert_eq!(
        decisions[0].fields().get("work_email"),
        Some(&Value::from("sam@example.com"))
    );
}

#[test]
fn lookup_failure_aborts_planning() {
    let items = vec![item_with_status("Sam", "New")];
    let result = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        |_name| {
            Err(boardsync::SyncError::SuiteFault {
                code: 1,
                message: "down".to_string(),
            })
        },
    );
    assert!(result.is_err());
}

#[test]
fn create_missing_skips_present_names_and_dedupes() {
    let items = vec![
        RemoteItem::new("1", "Chaves"),
        RemoteItem::new("2", "Chaves"),
        RemoteItem::new("3", "Dana"),
        RemoteItem::new("4", "Other"),
    ];
    let existing: BTreeSet<String> = ["Dana".to_string()].into();

    let decisions = engine::plan_create_missing(&items, &existing, &schema(), |item| {
        item.name == "Chaves" || item.name == "Dana"
    });

    // Dana already mirrored, the duplicate Chaves deduped within the run.
    assert_eq!(decisions.len(), 1);
    assert_eq!(
        decisions[0].fields().get("partner_name"),
        Some(&Value::from("Chaves"))
    );
}

#[test]
fn create_missing_is_idempotent_once_creates_are_reflected() {
    let items = vec![RemoteItem::new("1", "Chaves")];
    let mut existing = BTreeSet::new();

    let first = engine::plan_create_missing(&items, &existing, &schema(), |_| true);
    assert_eq!(first.len(), 1);

    existing.insert("Chaves".to_string());
    let second = engine::plan_create_missing(&items, &existing, &schema(), |_| true);
    assert!(second.is_empty());
}

#[test]
fn mirror_onward_projects_fields_and_always_creates() {
    let mapping = FieldMapping::new(vec![
        ("work_email".to_string(), "email_col".to_string()),
        ("department_id".to_string(), "dept_col".to_string()),
    ])
    .expect("valid mapping");

    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), Value::from("Andy"));
    fields.insert("work_email".to_string(), Value::from("andy@example.com"));
    let records = vec![
        TargetRecord { id: 7, fields },
        // No usable display name: skipped.
        TargetRecord {
            id: 8,
            fields: serde_json::Map::new(),
        },
    ];

    let drafts = engine::plan_mirror_fields_onward(&records, "name", &mapping);
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].name, "Andy");
    assert_eq!(
        drafts[0].column_values.get("email_col"),
        Some(&Value::from("andy@example.com"))
    );
    assert_eq!(drafts[0].column_values.get("dept_col"), None);
}

#[test]
fn apply_keeps_going_past_failures() {
    let decisions = vec![
        SyncDecision::Create {
            fields: serde_json::Map::new(),
        },
        SyncDecision::Update {
            target_id: 9,
            fields: serde_json::Map::new(),
        },
        SyncDecision::Create {
            fields: serde_json::Map::new(),
        },
    ];

    let mut seen = Vec::new();
    let applied = engine::apply_decisions(&decisions, |decision| {
        seen.push(decision.clone());
        match decision {
            SyncDecision::Update { .. } => Err(boardsync::SyncError::SuiteFault {
                code: 3,
                message: "rejected".to_string(),
            }),
            SyncDecision::Create { .. } => Ok(()),
        }
    });

    // All three attempted, in order; only the failing one not counted.
    assert_eq!(seen.len(), 3);
    assert_eq!(applied, 2);
}

#[test]
fn decisions_preserve_snapshot_order() {
    let items = vec![
        item_with_status("A", "New"),
        item_with_status("B", "New"),
        item_with_status("C", "New"),
    ];
    let mut matches = BTreeMap::new();
    matches.insert("B".to_string(), vec![5i64]);

    let decisions = engine::plan_upsert_by_status(
        &items,
        "status",
        &lookup(&[("New", 1)]),
        &FieldMapping::empty(),
        &schema(),
        |name| Ok(matches.get(name).cloned().unwrap_or_default()),
    )
    .expect("planned");

    let names: Vec<String> = decisions
        .iter()
        .map(|decision| {
            decision.fields()["partner_name"]
                .as_str()
                .expect("name is text")
                .to_string()
        })
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(matches!(decisions[1], SyncDecision::Update { target_id: 5, .. }));
}
