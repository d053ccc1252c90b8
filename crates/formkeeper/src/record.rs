//! Record types for formkeeper.
//!
//! A [`Record`] maps field ids to scalar [`Value`]s and carries identity
//! metadata. It serializes as one flat JSON object:
//!
//! ```json
//! { "id": "6f1c...", "createdAt": "2024-03-01T12:00:00Z",
//!   "updatedAt": "2024-03-02T08:30:00Z",
//!   "first_name": "Ada", "nights_owned": 10, "remaining_nights": 7 }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{FieldKind, Schema};

/// Keys used by record metadata; schemas may not declare fields with these ids.
pub const RESERVED_KEYS: &[&str] = &["id", "createdAt", "updatedAt"];

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
    /// No value.
    #[default]
    Empty,
}

impl Value {
    /// Check if this value is empty (`Empty` or an empty string).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Number(_) => false,
        }
    }

    /// The number held by this value, if it is numeric.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The amount this value stands for: a number, or text that is a whole
    /// numeric literal once thousands separators are removed (`"12,000"`).
    #[must_use]
    pub fn as_amount(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) => parse_amount(text),
            Self::Empty => None,
        }
    }

    /// Convert raw user input for a field of the given kind.
    ///
    /// Blank input is `Empty`. Number fields store a number when the input
    /// parses (thousands separators allowed) and keep the text otherwise.
    #[must_use]
    pub fn from_input(input: &str, kind: &FieldKind) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        if *kind == FieldKind::Number {
            if let Some(n) = parse_amount(trimmed) {
                return Self::Number(n);
            }
        }

        Self::Text(input.to_string())
    }
}

fn parse_amount(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Empty => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Opaque, stable identifier assigned to a record on first save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh unique id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A customer record: field values plus identity metadata.
///
/// An unsaved record (a draft) has no id or timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Assigned on first save; stable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    /// When the record was first saved.
    #[serde(
        rename = "createdAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,

    /// When the record was last saved.
    #[serde(
        rename = "updatedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,

    /// Field id to value.
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty draft with every schema field present and empty.
    #[must_use]
    pub fn blank(schema: &Schema) -> Self {
        Self {
            values: schema
                .fields()
                .map(|f| (f.id.clone(), Value::Empty))
                .collect(),
            ..Self::default()
        }
    }

    /// Get a field value.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.values.get(id)
    }

    /// Set a field value.
    pub fn set(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(id.into(), value.into());
    }

    /// Check if this record has been saved.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Stamp identity metadata for a save at `now`.
    ///
    /// The first save assigns an id and `created_at`; every save sets
    /// `updated_at`.
    pub fn stamp_for_save(&mut self, now: DateTime<Utc>) {
        if self.id.is_none() {
            self.id = Some(RecordId::generate());
            self.created_at = Some(now);
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    /// A short human-readable name, built from the first non-empty text
    /// values (for listings and confirmation prompts).
    #[must_use]
    pub fn summary(&self, schema: &Schema) -> String {
        let parts: Vec<String> = schema
            .fields()
            .filter(|f| matches!(f.kind, FieldKind::Text))
            .filter_map(|f| self.get(&f.id))
            .filter(|v| !v.is_empty())
            .take(2)
            .map(ToString::to_string)
            .collect();

        if parts.is_empty() {
            "(untitled)".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_has_every_field_empty() {
        let schema = Schema::default_customer();
        let record = Record::blank(&schema);

        assert_eq!(record.values.len(), schema.fields().count());
        assert!(record.values.values().all(Value::is_empty));
        assert!(!record.is_saved());
    }

    #[test]
    fn test_stamp_first_save() {
        let mut record = Record::default();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        record.stamp_for_save(now);

        assert!(record.is_saved());
        assert_eq!(record.created_at, Some(now));
        assert_eq!(record.updated_at, Some(now));
    }

    #[test]
    fn test_stamp_resave_preserves_identity() {
        let mut record = Record::default();
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap();

        record.stamp_for_save(first);
        let id = record.id.clone();
        record.stamp_for_save(second);

        assert_eq!(record.id, id);
        assert_eq!(record.created_at, Some(first));
        assert_eq!(record.updated_at, Some(second));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn test_serializes_flat() {
        let mut record = Record::default();
        record.id = Some(RecordId::from("abc"));
        record.set("first_name", "Ada");
        record.set("nights_owned", 10.0);
        record.set("notes", Value::Empty);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["first_name"], "Ada");
        assert_eq!(json["nights_owned"], 10.0);
        assert!(json["notes"].is_null());
        assert!(json.get("values").is_none());
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_deserializes_flat() {
        let json = r#"{
            "id": "r-1",
            "createdAt": "2024-03-01T12:00:00Z",
            "updatedAt": "2024-03-02T08:30:00Z",
            "first_name": "Ada",
            "nights_owned": 10,
            "cost_per_night": ""
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, Some(RecordId::from("r-1")));
        assert!(record.created_at.is_some());
        assert_eq!(record.get("first_name"), Some(&Value::from("Ada")));
        assert_eq!(record.get("nights_owned"), Some(&Value::Number(10.0)));
        assert!(record.get("cost_per_night").unwrap().is_empty());
        assert!(record.get("id").is_none());
    }

    #[test]
    fn test_value_from_input() {
        assert_eq!(Value::from_input("  ", &FieldKind::Number), Value::Empty);
        assert_eq!(
            Value::from_input("1,250", &FieldKind::Number),
            Value::Number(1250.0)
        );
        assert_eq!(
            Value::from_input("lots", &FieldKind::Number),
            Value::Text("lots".to_string())
        );
        assert_eq!(
            Value::from_input("42", &FieldKind::Text),
            Value::Text("42".to_string())
        );
    }

    #[test]
    fn test_value_as_amount() {
        assert_eq!(Value::Number(2.5).as_amount(), Some(2.5));
        assert_eq!(Value::from("12,000").as_amount(), Some(12_000.0));
        assert_eq!(Value::from(" -250.5 ").as_amount(), Some(-250.5));
        assert_eq!(Value::from("1,250 USD").as_amount(), None);
        assert_eq!(Value::from("NaN").as_amount(), None);
        assert_eq!(Value::Empty.as_amount(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(7.0).to_string(), "7");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(Value::Empty.to_string(), "");
    }

    #[test]
    fn test_summary() {
        let schema = Schema::default_customer();
        let mut record = Record::blank(&schema);
        assert_eq!(record.summary(&schema), "(untitled)");

        record.set("first_name", "Ada");
        record.set("last_name", "Lovelace");
        assert_eq!(record.summary(&schema), "Ada Lovelace");
    }
}
