//! In-memory spreadsheet store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use coachsync_core::error::ExternalStoreError;
use coachsync_core::external::{ExternalRecord, ExternalStore, FieldMap};

use crate::clock::fixed_now;

/// One call made against [`InMemoryExternalStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalCall {
    /// `create_record(table)`.
    Create(String),
    /// `update_record(table, id)`.
    Update(String, String),
    /// `delete_record(table, id)`.
    Delete(String, String),
    /// `get_record(table, id)`.
    Get(String, String),
    /// `list_records(table, formula)`.
    List(String, Option<String>),
}

#[derive(Debug, Default)]
struct ExternalState {
    tables: HashMap<String, BTreeMap<String, ExternalRecord>>,
    calls: Vec<ExternalCall>,
    failures: VecDeque<ExternalStoreError>,
    next_id: u64,
}

/// Spreadsheet store fake with `PATCH`-style partial updates, generated
/// `rec…` ids, a call log, and scripted failures.
#[derive(Debug, Default)]
pub struct InMemoryExternalStore {
    state: Mutex<ExternalState>,
}

impl InMemoryExternalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record with a known id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, table: &str, record: ExternalRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .tables
            .entry(table.to_owned())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Makes the next call fail with `error`. Failures queue up in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next(&self, error: ExternalStoreError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// All records of a table, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self, table: &str) -> Vec<ExternalRecord> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<ExternalCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn begin(&self, call: ExternalCall) -> Result<std::sync::MutexGuard<'_, ExternalState>, ExternalStoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

/// Evaluates the one formula shape the engine issues:
/// `LOWER({Field}) = 'value'` with backslash escapes.
fn matches_formula(record: &ExternalRecord, formula: &str) -> bool {
    let Some(rest) = formula.strip_prefix("LOWER({") else {
        return true;
    };
    let Some((field, rest)) = rest.split_once("}) = '") else {
        return true;
    };
    let Some(literal) = rest.strip_suffix('\'') else {
        return true;
    };
    let mut expected = String::new();
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                expected.push(escaped);
            }
        } else {
            expected.push(c);
        }
    }
    record
        .text(field)
        .is_some_and(|value| value.to_lowercase() == expected)
}

#[async_trait]
impl ExternalStore for InMemoryExternalStore {
    async fn create_record(
        &self,
        table: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError> {
        let mut state = self.begin(ExternalCall::Create(table.to_owned()))?;
        state.next_id += 1;
        let n = state.next_id;
        let record = ExternalRecord {
            id: format!("rec{n:014}"),
            created_time: fixed_now() + Duration::seconds(i64::try_from(n).unwrap()),
            fields,
        };
        state
            .tables
            .entry(table.to_owned())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: FieldMap,
    ) -> Result<ExternalRecord, ExternalStoreError> {
        let mut state = self.begin(ExternalCall::Update(table.to_owned(), record_id.to_owned()))?;
        let record = state
            .tables
            .get_mut(table)
            .and_then(|records| records.get_mut(record_id))
            .ok_or(ExternalStoreError::NotFound)?;
        for (name, value) in fields {
            record.fields.insert(name, value);
        }
        Ok(record.clone())
    }

    async fn delete_record(&self, table: &str, record_id: &str) -> Result<(), ExternalStoreError> {
        let mut state = self.begin(ExternalCall::Delete(table.to_owned(), record_id.to_owned()))?;
        state
            .tables
            .get_mut(table)
            .and_then(|records| records.remove(record_id))
            .map(|_| ())
            .ok_or(ExternalStoreError::NotFound)
    }

    async fn get_record(
        &self,
        table: &str,
        record_id: &str,
    ) -> Result<Option<ExternalRecord>, ExternalStoreError> {
        let state = self.begin(ExternalCall::Get(table.to_owned(), record_id.to_owned()))?;
        Ok(state
            .tables
            .get(table)
            .and_then(|records| records.get(record_id))
            .cloned())
    }

    async fn list_records(
        &self,
        table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<ExternalRecord>, ExternalStoreError> {
        let state = self.begin(ExternalCall::List(
            table.to_owned(),
            filter_formula.map(str::to_owned),
        ))?;
        Ok(state
            .tables
            .get(table)
            .map(|records| {
                records
                    .values()
                    .filter(|record| filter_formula.is_none_or(|f| matches_formula(record, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
