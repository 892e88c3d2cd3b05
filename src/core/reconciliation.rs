use crate::domain::model::{ReconciliationResult, Transaction, TransactionTable};
use crate::utils::error::{ReconError, Result};
use std::collections::BTreeSet;

/// 以共用鍵比對兩份交易資料
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(
        &self,
        primary: &TransactionTable,
        secondary: &TransactionTable,
        key_field: &str,
    ) -> Result<ReconciliationResult> {
        for table in [primary, secondary] {
            if !table.has_column(key_field) {
                return Err(ReconError::Schema {
                    source_name: table.name.clone(),
                    column: key_field.to_string(),
                });
            }
        }

        let primary_keys = distinct_keys(primary, key_field);
        let secondary_keys = distinct_keys(secondary, key_field);

        tracing::info!(
            stage = "reconciliation",
            "🔎 Found {} unique keys in '{}' and {} in '{}'",
            primary_keys.len(),
            primary.name,
            secondary_keys.len(),
            secondary.name
        );

        let missing_keys: BTreeSet<String> =
            primary_keys.difference(&secondary_keys).cloned().collect();
        let common_keys: BTreeSet<String> =
            primary_keys.intersection(&secondary_keys).cloned().collect();

        let primary_common = filter_rows(primary, key_field, &common_keys);
        let secondary_common = filter_rows(secondary, key_field, &common_keys);

        tracing::info!(
            stage = "reconciliation",
            common = common_keys.len(),
            missing = missing_keys.len(),
            "✅ Reconciliation complete"
        );

        Ok(ReconciliationResult {
            all_found: missing_keys.is_empty(),
            primary_common,
            secondary_common,
            missing_keys,
            key_field: key_field.to_string(),
        })
    }
}

fn distinct_keys(table: &TransactionTable, key_field: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let mut blank = 0usize;

    for row in &table.rows {
        match row.field(key_field) {
            Some(key) => {
                keys.insert(key);
            }
            None => blank += 1,
        }
    }

    if blank > 0 {
        tracing::warn!(
            "⚠️ {} rows in '{}' have an empty '{}' and are ignored",
            blank,
            table.name,
            key_field
        );
    }

    keys
}

fn filter_rows(
    table: &TransactionTable,
    key_field: &str,
    keys: &BTreeSet<String>,
) -> Vec<Transaction> {
    table
        .rows
        .iter()
        .filter(|row| row.field(key_field).is_some_and(|key| keys.contains(&key)))
        .cloned()
        .collect()
}
