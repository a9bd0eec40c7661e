use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Field payload attached to a planned create or update. Keys are field
/// names in the destination store; values keep their JSON type.
pub type FieldSet = Map<String, Value>;

/// A record fetched from the board service. Identity is the item id; the
/// `name` doubles as the join key towards the business suite, which is
/// fragile when names collide (see [`SyncDecision::Update`] fan-out).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Item identifier assigned by the board service.
    pub id: String,
    /// Display name of the item.
    pub name: String,
    /// Column id → rendered column text. Columns without a value are absent.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl RemoteItem {
    /// Creates an item with no column values.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Returns the rendered text of the given column, if the column carried
    /// a value.
    pub fn column_text(&self, column_id: &str) -> Option<&str> {
        self.fields.get(column_id).map(String::as_str)
    }
}

/// A record held by the business suite, identified by the integer primary
/// key that system assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Primary key in the business suite.
    pub id: i64,
    /// Field name → value as returned by the suite.
    #[serde(default)]
    pub fields: FieldSet,
}

impl TargetRecord {
    /// Returns a field rendered as text, if present and textual.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Ordered mapping from source field names to destination field names.
///
/// The order of the pairs is preserved so payloads are built the way the
/// operator wrote the mapping down. An empty mapping is legal and simply
/// produces records with no optional fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    pairs: Vec<(String, String)>,
}

impl FieldMapping {
    /// Builds a mapping from source → destination pairs, rejecting duplicate
    /// source keys up front.
    pub fn new(pairs: Vec<(String, String)>) -> Result<Self> {
        let mapping = Self { pairs };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Mapping with no pairs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Checks that every source key appears exactly once. Duplicate keys in
    /// the applied direction would silently overwrite each other, so they
    /// fail before any run starts.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeMap::new();
        for (source, dest) in &self.pairs {
            if source.is_empty() || dest.is_empty() {
                return Err(SyncError::InvalidMapping(
                    "field names must be non-empty strings".into(),
                ));
            }
            if seen.insert(source.as_str(), dest.as_str()).is_some() {
                return Err(SyncError::InvalidMapping(format!(
                    "duplicate source field '{source}'"
                )));
            }
        }
        Ok(())
    }

    /// Returns the same mapping with source and destination swapped, for
    /// runs going in the opposite direction. The swapped direction is
    /// validated independently.
    pub fn reversed(&self) -> Result<Self> {
        Self::new(
            self.pairs
                .iter()
                .map(|(source, dest)| (dest.clone(), source.clone()))
                .collect(),
        )
    }

    /// Iterates over (source, destination) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(source, dest)| (source.as_str(), dest.as_str()))
    }

    /// Source field names in declaration order.
    pub fn source_fields(&self) -> Vec<String> {
        self.pairs.iter().map(|(source, _)| source.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Lookup from a free-text status label, as rendered by the board service,
/// to a stage id in the business suite's pipeline.
///
/// A label absent from the lookup is a skip condition for the engine, never
/// a fatal error and never an implicit default stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLookup {
    stages: BTreeMap<String, u32>,
}

impl StatusLookup {
    /// Builds a lookup, rejecting non-positive stage ids up front.
    pub fn new(stages: BTreeMap<String, u32>) -> Result<Self> {
        let lookup = Self { stages };
        lookup.validate()?;
        Ok(lookup)
    }

    /// Checks that every stage id is a positive integer.
    pub fn validate(&self) -> Result<()> {
        for (label, stage) in &self.stages {
            if *stage == 0 {
                return Err(SyncError::InvalidLookup(format!(
                    "status '{label}' maps to stage 0; stage ids start at 1"
                )));
            }
        }
        Ok(())
    }

    /// Resolves a status label to its stage id. `None` means "skip this
    /// item", by design.
    pub fn stage_for(&self, status: &str) -> Option<u32> {
        self.stages.get(status).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// A planned mutation against the business suite. Decisions are transient:
/// computed from one snapshot, applied immediately, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    /// Create a new record carrying the given fields.
    Create { fields: FieldSet },
    /// Update an existing record. Ambiguous name joins fan out to one
    /// `Update` per match, all carrying the same payload.
    Update { target_id: i64, fields: FieldSet },
}

impl SyncDecision {
    /// The field payload carried by the decision.
    pub fn fields(&self) -> &FieldSet {
        match self {
            SyncDecision::Create { fields } | SyncDecision::Update { fields, .. } => fields,
        }
    }
}
