//! Port to the spreadsheet store ("Airtable").

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExternalStoreError;

/// Field name to value map, in the spreadsheet store's layout.
pub type FieldMap = serde_json::Map<String, Value>;

/// A record as returned by the spreadsheet store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRecord {
    /// Record identifier (`rec` + 14 alphanumerics).
    pub id: String,
    /// Creation timestamp assigned by the store.
    pub created_time: DateTime<Utc>,
    /// Field values. Empty fields are omitted by the store.
    #[serde(default)]
    pub fields: FieldMap,
}

impl ExternalRecord {
    /// Returns a text field, treating blank strings as absent.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns a date field (`YYYY-MM-DD`, or the date part of a timestamp).
    #[must_use]
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        let raw = self.fields.get(field)?.as_str()?;
        let date_part = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }

    /// Returns a timestamp field.
    #[must_use]
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Returns a checkbox field. Unchecked boxes are omitted by the store, so
    /// absence reads as `false`.
    #[must_use]
    pub fn checkbox(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns an integer field.
    #[must_use]
    pub fn integer(&self, field: &str) -> Option<i32> {
        self.fields
            .get(field)?
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
    }

    /// Returns the record ids held by a link field.
    #[must_use]
    pub fn links(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// Returns the first record id held by a link field.
    #[must_use]
    pub fn first_link(&self, field: &str) -> Option<String> {
        self.links(field).into_iter().next()
    }
}

/// Whether `value` has the spreadsheet store's record-id shape.
#[must_use]
pub fn is_external_record_id(value: &str) -> bool {
    value.len() == 17
        && value.starts_with("rec")
        && value.bytes().skip(3).all(|b| b.is_ascii_alphanumeric())
}

/// Operations the engine needs from the spreadsheet store.
///
/// Every call crosses the process boundary and must be bounded by a timeout
/// in the implementation.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Creates a record and returns it with its new id. Values are coerced by
    /// the store (`typecast`).
    async fn create_record(
        &self,
        table: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError>;

    /// Updates the given fields of an existing record, leaving other fields
    /// untouched.
    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError>;

    /// Destroys a record.
    async fn delete_record(&self, table: &str, record_id: &str) -> Result<(), ExternalStoreError>;

    /// Fetches a single record, `None` if it does not exist.
    async fn get_record(
        &self,
        table: &str,
        record_id: &str,
    ) -> Result<Option<ExternalRecord>, ExternalStoreError>;

    /// Lists every record of a table, optionally filtered by a formula,
    /// following pagination to the end.
    async fn list_records(
        &self,
        table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<ExternalRecord>, ExternalStoreError>;
}
