//! Tab-delimited AIRR files
//!
//! One header line names the columns; every following line is one record.
//! Empty cells are null. There is no quoting, so values may not contain the
//! tab delimiter or a line break.
//!
//! [`TabularReader`] converts cells to typed values using the schema types of
//! the columns. [`TabularWriter`] fixes its column order when it is created:
//! required fields, then requested optional fields in schema order, then
//! requested fields unknown to the schema in the order given.

mod reader;
mod writer;

pub use reader::{FlaggedRow, TabularReader};
pub use writer::TabularWriter;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::CoercionMode;
use crate::schema::SchemaDefinition;

/// Column delimiter
pub const DELIMITER: &str = "\t";

/// One tabular row, keyed by column name in column order
pub type Record = Map<String, Value>;

/// What a reader does with a row whose cell count differs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowShapePolicy {
    /// Warn, pad or truncate the row, and keep going
    Flag,
    /// Yield a [`RowShape`](crate::AirrError::RowShape) error for the row
    Error,
}

/// Reader settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Check the header for required columns and convert values strictly
    pub validate: bool,
    /// Overrides the row shape policy implied by `validate`
    pub row_shape: Option<RowShapePolicy>,
}

impl ReaderOptions {
    pub fn validating() -> Self {
        Self {
            validate: true,
            row_shape: None,
        }
    }

    pub fn with_row_shape(mut self, policy: RowShapePolicy) -> Self {
        self.row_shape = Some(policy);
        self
    }

    pub fn coercion_mode(&self) -> CoercionMode {
        if self.validate {
            CoercionMode::Strict
        } else {
            CoercionMode::Lenient
        }
    }

    pub fn row_shape_policy(&self) -> RowShapePolicy {
        match (self.row_shape, self.validate) {
            (Some(policy), _) => policy,
            (None, true) => RowShapePolicy::Error,
            (None, false) => RowShapePolicy::Flag,
        }
    }
}

/// Writer settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Optional and external columns to write in addition to the required ones
    pub fields: Vec<String>,
    /// Warn about records that lack required fields
    pub debug: bool,
}

impl WriterOptions {
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            debug: false,
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Resolve the output column order for `requested` fields.
///
/// Returns every column plus the subset that the schema does not know.
pub fn column_order(schema: &SchemaDefinition, requested: &[String]) -> (Vec<String>, Vec<String>) {
    let mut fields: Vec<String> = schema.required().to_vec();

    for name in schema.field_names() {
        if !schema.is_required(name) && requested.iter().any(|r| r == name) {
            fields.push(name.to_string());
        }
    }

    let mut external = Vec::new();
    for name in requested {
        if !schema.contains(name) && !external.contains(name) {
            external.push(name.clone());
        }
    }
    fields.extend(external.iter().cloned());

    (fields, external)
}

/// Null and empty strings both count as absent
pub(crate) fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::from_value(
            "Row",
            &json!({
                "required": ["id", "seq"],
                "properties": {
                    "seq": {"type": "string"},
                    "score": {"type": "number"},
                    "id": {"type": "string"},
                    "count": {"type": "integer"}
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_column_order() {
        let requested = vec![
            "extra_b".to_string(),
            "count".to_string(),
            "extra_a".to_string(),
            "score".to_string(),
            "id".to_string(),
        ];
        let (fields, external) = column_order(&schema(), &requested);
        assert_eq!(fields, vec!["id", "seq", "score", "count", "extra_b", "extra_a"]);
        assert_eq!(external, vec!["extra_b", "extra_a"]);
    }

    #[test]
    fn test_column_order_ignores_request_order() {
        let a = column_order(&schema(), &["count".to_string(), "score".to_string()]);
        let b = column_order(&schema(), &["score".to_string(), "count".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_row_shape_defaults() {
        assert_eq!(ReaderOptions::default().row_shape_policy(), RowShapePolicy::Flag);
        assert_eq!(ReaderOptions::validating().row_shape_policy(), RowShapePolicy::Error);
        assert_eq!(
            ReaderOptions::validating()
                .with_row_shape(RowShapePolicy::Flag)
                .row_shape_policy(),
            RowShapePolicy::Flag
        );
    }

    #[test]
    fn test_is_absent() {
        assert!(is_absent(None));
        assert!(is_absent(Some(&Value::Null)));
        assert!(is_absent(Some(&json!(""))));
        assert!(!is_absent(Some(&json!(false))));
        assert!(!is_absent(Some(&json!(0))));
    }
}
