//! Field tracking ledger
//!
//! One ledger is owned by each resolution run. The template engine records every leaf
//! substitution here; the finished [`FieldReport`] is what front ends use to highlight
//! filled, missing and computed values.

use crate::legal::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Filled,
    Empty,
    Logic,
}

impl FieldStatus {
    /// Logic wins over the value-based classification.
    pub fn classify(value: &Value, has_logic: bool) -> Self {
        if has_logic {
            FieldStatus::Logic
        } else if value.is_empty() {
            FieldStatus::Empty
        } else {
            FieldStatus::Filled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRecord {
    pub field: String,
    pub value: Value,
    pub status: FieldStatus,
    pub has_logic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<String>,
}

/// Per-run accumulator keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldLedger {
    records: IndexMap<String, FieldRecord>,
}

impl FieldLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome for `field`, returning the resulting status.
    ///
    /// A later write for the same field replaces its value, but a field once classified as
    /// logic stays logic.
    pub fn record(
        &mut self,
        field: impl Into<String>,
        value: &Value,
        has_logic: bool,
        helper: Option<&str>,
    ) -> FieldStatus {
        let field = field.into();
        let has_logic = has_logic
            || self
                .records
                .get(&field)
                .map(|previous| previous.has_logic)
                .unwrap_or(false);
        let status = FieldStatus::classify(value, has_logic);
        let helper = helper
            .map(str::to_string)
            .or_else(|| self.records.get(&field).and_then(|r| r.helper.clone()));

        self.records.insert(
            field.clone(),
            FieldRecord {
                field,
                value: value.clone(),
                status,
                has_logic,
                helper,
            },
        );
        status
    }

    pub fn get(&self, field: &str) -> Option<&FieldRecord> {
        self.records.get(field)
    }

    pub fn by_status(&self, status: FieldStatus) -> Vec<&FieldRecord> {
        self.records
            .values()
            .filter(|record| record.status == status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn summary(&self) -> FieldReport {
        let count = |status: FieldStatus| {
            self.records
                .values()
                .filter(|r| r.status == status)
                .count()
        };
        FieldReport {
            total: self.records.len(),
            filled: count(FieldStatus::Filled),
            empty: count(FieldStatus::Empty),
            logic: count(FieldStatus::Logic),
            fields: self.records.values().cloned().collect(),
        }
    }
}

/// Counts per status plus every record, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldReport {
    pub total: usize,
    pub filled: usize,
    pub empty: usize,
    pub logic: usize,
    pub fields: Vec<FieldRecord>,
}
