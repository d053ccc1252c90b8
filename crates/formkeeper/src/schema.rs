//! Schema model for formkeeper records.
//!
//! A [`Schema`] is an ordered list of [`Section`]s, each holding typed
//! [`Field`]s. Field ids form one flat namespace across all sections: they are
//! both the keys of a record and the variable names available to formulas.
//!
//! Schemas are exchanged as JSON templates:
//!
//! ```json
//! {
//!   "title": "Customer Record",
//!   "sections": [
//!     {
//!       "id": "ownership",
//!       "title": "Ownership",
//!       "columns": 2,
//!       "fields": [
//!         { "id": "nights_owned", "label": "Nights Owned", "type": "number" },
//!         { "id": "remaining_nights", "label": "Remaining", "type": "calculated",
//!           "formula": "nights_owned - nights_used_ytd" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::RESERVED_KEYS;

/// Field ids formatted as money even when the template lacks a
/// `display: currency` attribute.
pub const LEGACY_CURRENCY_FIELDS: &[&str] = &[
    "purchase_price",
    "monthly_payment",
    "maintenance_fee_annual",
    "annual_loan_cost",
    "annual_cost_total",
    "cost_per_night",
    "rack_rate_per_night",
    "annual_rack_value",
    "annual_savings",
];

/// Accepted range for a section's column hint.
const COLUMNS_RANGE: std::ops::RangeInclusive<u8> = 1..=3;

/// Declarative description of a record's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Display title of the form.
    #[serde(default)]
    pub title: String,
    /// Ordered sections.
    pub sections: Vec<Section>,
}

/// An ordered group of fields under a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section identifier.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Layout hint: number of columns (1-3).
    #[serde(default = "default_columns")]
    pub columns: u8,
    /// Ordered fields.
    #[serde(default)]
    pub fields: Vec<Field>,
}

fn default_columns() -> u8 {
    1
}

/// One schema-declared attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Unique id; storage key and formula variable name.
    pub id: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Field type, carrying the formula for calculated fields.
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Optional display hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayHint>,
}

/// The type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Single-line text.
    Text,
    /// Email address.
    Email,
    /// Numeric input.
    Number,
    /// Calendar date.
    Date,
    /// Multi-line text.
    Textarea,
    /// Derived from a formula over other fields.
    Calculated {
        /// Arithmetic expression over field ids.
        formula: String,
    },
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Email => write!(f, "email"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Textarea => write!(f, "textarea"),
            Self::Calculated { .. } => write!(f, "calculated"),
        }
    }
}

/// How a field's value is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayHint {
    /// Monetary amount.
    Currency,
}

impl Field {
    /// Create an input (non-calculated) field.
    #[must_use]
    pub fn input(id: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            display: None,
        }
    }

    /// Create a calculated field.
    #[must_use]
    pub fn calculated(id: &str, label: &str, formula: &str) -> Self {
        Self::input(
            id,
            label,
            FieldKind::Calculated {
                formula: formula.to_string(),
            },
        )
    }

    /// Mark this field as a monetary amount.
    #[must_use]
    pub fn currency(mut self) -> Self {
        self.display = Some(DisplayHint::Currency);
        self
    }

    /// The formula, if this is a calculated field.
    #[must_use]
    pub fn formula(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Calculated { formula } => Some(formula),
            _ => None,
        }
    }

    /// Check if this field is derived from a formula.
    #[must_use]
    pub fn is_calculated(&self) -> bool {
        matches!(self.kind, FieldKind::Calculated { .. })
    }

    /// Check if values of this field are formatted as money.
    #[must_use]
    pub fn is_currency(&self) -> bool {
        self.display == Some(DisplayHint::Currency)
            || LEGACY_CURRENCY_FIELDS.contains(&self.id.as_str())
    }

    /// Label for display, falling back to the id.
    #[must_use]
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Load a schema from an untyped JSON document.
///
/// The document must have a `sections` sequence. Beyond that, every field must
/// have a known type, calculated fields must carry a `formula`, field ids must
/// be unique and not reserved, and section column hints must be 1-3. Formulas
/// are not checked against the declared ids: unknown names evaluate to 0.
///
/// # Errors
///
/// Returns [`Error::InvalidSchema`] if the document is rejected.
pub fn load_schema(raw: &serde_json::Value) -> Result<Schema> {
    match raw.get("sections") {
        None => return Err(Error::invalid_schema("missing 'sections'")),
        Some(sections) if !sections.is_array() => {
            return Err(Error::invalid_schema("'sections' must be a sequence"));
        }
        Some(_) => {}
    }

    let schema = Schema::deserialize(raw).map_err(|e| Error::invalid_schema(e.to_string()))?;
    schema.validate()?;
    Ok(schema)
}

impl Schema {
    /// Parse and validate a JSON template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the text is not JSON or the
    /// document is rejected by [`load_schema`].
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::invalid_schema(format!("not valid JSON: {e}")))?;
        load_schema(&raw)
    }

    /// Serialize as a pretty-printed JSON template.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the structural invariants described on [`load_schema`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for section in &self.sections {
            if !COLUMNS_RANGE.contains(&section.columns) {
                return Err(Error::invalid_schema(format!(
                    "section '{}' has {} columns; expected 1 to 3",
                    section.id, section.columns
                )));
            }

            for field in &section.fields {
                if field.id.trim().is_empty() {
                    return Err(Error::invalid_schema(format!(
                        "section '{}' has a field with an empty id",
                        section.id
                    )));
                }
                if RESERVED_KEYS.contains(&field.id.as_str()) {
                    return Err(Error::invalid_schema(format!(
                        "field id '{}' is reserved",
                        field.id
                    )));
                }
                if !seen.insert(field.id.as_str()) {
                    return Err(Error::invalid_schema(format!(
                        "duplicate field id '{}'",
                        field.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// All fields in declaration order, sections concatenated.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }

    /// Look up a field by id.
    #[must_use]
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields().find(|f| f.id == id)
    }

    /// Calculated fields with their formulas, in declaration order.
    pub fn calculated_fields(&self) -> impl Iterator<Item = (&Field, &str)> {
        self.fields().filter_map(|f| f.formula().map(|formula| (f, formula)))
    }

    /// The built-in customer record schema.
    #[must_use]
    pub fn default_customer() -> Self {
        Self {
            title: "Customer Record".to_string(),
            sections: vec![
                Section {
                    id: "customer".to_string(),
                    title: "Customer".to_string(),
                    columns: 2,
                    fields: vec![
                        Field::input("first_name", "First Name", FieldKind::Text),
                        Field::input("last_name", "Last Name", FieldKind::Text),
                        Field::input("email", "Email", FieldKind::Email),
                        Field::input("phone", "Phone", FieldKind::Text),
                        Field::input("address", "Address", FieldKind::Textarea),
                        Field::input("customer_since", "Customer Since", FieldKind::Date),
                    ],
                },
                Section {
                    id: "ownership".to_string(),
                    title: "Ownership".to_string(),
                    columns: 3,
                    fields: vec![
                        Field::input("resort_name", "Resort", FieldKind::Text),
                        Field::input("contract_number", "Contract #", FieldKind::Text),
                        Field::input("purchase_date", "Purchase Date", FieldKind::Date),
                        Field::input("purchase_price", "Purchase Price", FieldKind::Number)
                            .currency(),
                        Field::input("nights_owned", "Nights Owned", FieldKind::Number),
                        Field::input("nights_used_ytd", "Nights Used (YTD)", FieldKind::Number),
                        Field::calculated(
                            "remaining_nights",
                            "Remaining Nights",
                            "nights_owned - nights_used_ytd",
                        ),
                    ],
                },
                Section {
                    id: "costs".to_string(),
                    title: "Annual Costs".to_string(),
                    columns: 3,
                    fields: vec![
                        Field::input("monthly_payment", "Monthly Payment", FieldKind::Number)
                            .currency(),
                        Field::input(
                            "maintenance_fee_annual",
                            "Maintenance Fee (Annual)",
                            FieldKind::Number,
                        )
                        .currency(),
                        Field::calculated(
                            "annual_loan_cost",
                            "Annual Loan Cost",
                            "monthly_payment * 12",
                        )
                        .currency(),
                        Field::calculated(
                            "annual_cost_total",
                            "Total Annual Cost",
                            "annual_loan_cost + maintenance_fee_annual",
                        )
                        .currency(),
                        Field::calculated(
                            "cost_per_night",
                            "Cost per Night",
                            "annual_cost_total / nights_owned",
                        )
                        .currency(),
                        Field::input(
                            "rack_rate_per_night",
                            "Rack Rate per Night",
                            FieldKind::Number,
                        )
                        .currency(),
                        Field::calculated(
                            "annual_rack_value",
                            "Annual Rack Value",
                            "rack_rate_per_night * nights_owned",
                        )
                        .currency(),
                        Field::calculated(
                            "annual_savings",
                            "Annual Savings",
                            "annual_rack_value - annual_cost_total",
                        )
                        .currency(),
                    ],
                },
                Section {
                    id: "notes".to_string(),
                    title: "Notes".to_string(),
                    columns: 1,
                    fields: vec![Field::input("notes", "Notes", FieldKind::Textarea)],
                },
            ],
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::default_customer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_schema_is_valid() {
        let schema = Schema::default_customer();
        assert!(schema.validate().is_ok());
        assert!(schema.field("remaining_nights").unwrap().is_calculated());
        assert!(schema.field("monthly_payment").unwrap().is_currency());
        assert!(!schema.field("nights_owned").unwrap().is_currency());
    }

    #[test]
    fn test_default_schema_round_trips_through_load() {
        let schema = Schema::default_customer();
        let text = schema.to_json_pretty().unwrap();
        assert_eq!(Schema::from_json_str(&text).unwrap(), schema);
    }

    #[test]
    fn test_load_minimal_schema() {
        let raw = json!({
            "title": "Tiny",
            "sections": [{
                "id": "main",
                "title": "Main",
                "fields": [
                    { "id": "a", "label": "A", "type": "number" },
                    { "id": "b", "label": "B", "type": "calculated", "formula": "a * 2" }
                ]
            }]
        });

        let schema = load_schema(&raw).unwrap();
        assert_eq!(schema.title, "Tiny");
        assert_eq!(schema.sections[0].columns, 1);
        assert_eq!(schema.field("b").unwrap().formula(), Some("a * 2"));
    }

    #[test]
    fn test_load_empty_sections() {
        let schema = load_schema(&json!({ "sections": [] })).unwrap();
        assert_eq!(schema.fields().count(), 0);
    }

    #[test]
    fn test_load_rejects_missing_sections() {
        let err = load_schema(&json!({ "title": "x" })).unwrap_err();
        assert!(err.to_string().contains("missing 'sections'"));

        assert!(load_schema(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_load_rejects_non_sequence_sections() {
        let err = load_schema(&json!({ "sections": { "id": "main" } })).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn test_load_rejects_unknown_field_type() {
        let raw = json!({
            "sections": [{ "id": "s", "fields": [{ "id": "x", "type": "slider" }] }]
        });
        assert!(matches!(
            load_schema(&raw),
            Err(Error::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_load_rejects_calculated_without_formula() {
        let raw = json!({
            "sections": [{ "id": "s", "fields": [{ "id": "x", "type": "calculated" }] }]
        });
        assert!(load_schema(&raw).is_err());
    }

    #[test]
    fn test_load_rejects_duplicate_ids_across_sections() {
        let raw = json!({
            "sections": [
                { "id": "s1", "fields": [{ "id": "x", "type": "text" }] },
                { "id": "s2", "fields": [{ "id": "x", "type": "number" }] }
            ]
        });
        let err = load_schema(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate field id 'x'"));
    }

    #[test]
    fn test_load_rejects_reserved_ids() {
        let raw = json!({
            "sections": [{ "id": "s", "fields": [{ "id": "createdAt", "type": "date" }] }]
        });
        assert!(load_schema(&raw).unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_load_rejects_bad_columns() {
        let raw = json!({ "sections": [{ "id": "s", "columns": 4, "fields": [] }] });
        assert!(load_schema(&raw).unwrap_err().to_string().contains("columns"));
    }

    #[test]
    fn test_load_tolerates_unknown_formula_variables() {
        let raw = json!({
            "sections": [{ "id": "s", "fields": [
                { "id": "x", "type": "calculated", "formula": "ghost + 1" }
            ] }]
        });
        assert!(load_schema(&raw).is_ok());
    }

    #[test]
    fn test_from_json_str_rejects_garbage() {
        let err = Schema::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_display_hint_serialization() {
        let field = Field::input("price", "Price", FieldKind::Number).currency();
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["type"], "number");
        assert_eq!(value["display"], "currency");

        let plain = serde_json::to_value(Field::input("n", "N", FieldKind::Text)).unwrap();
        assert!(plain.get("display").is_none());
    }

    #[test]
    fn test_legacy_currency_fallback() {
        let field = Field::input("monthly_payment", "Monthly", FieldKind::Number);
        assert!(field.display.is_none());
        assert!(field.is_currency());
    }

    #[test]
    fn test_calculated_fields_order() {
        let schema = Schema::default_customer();
        let ids: Vec<&str> = schema.calculated_fields().map(|(f, _)| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "remaining_nights",
                "annual_loan_cost",
                "annual_cost_total",
                "cost_per_night",
                "annual_rack_value",
                "annual_savings",
            ]
        );
    }

    #[test]
    fn test_field_kind_display() {
        assert_eq!(FieldKind::Textarea.to_string(), "textarea");
        assert_eq!(
            FieldKind::Calculated {
                formula: "a".to_string()
            }
            .to_string(),
            "calculated"
        );
    }

    #[test]
    fn test_display_label_falls_back_to_id() {
        let field = Field::input("phone", "", FieldKind::Text);
        assert_eq!(field.display_label(), "phone");
    }
}
