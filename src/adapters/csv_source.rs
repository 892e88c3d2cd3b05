use crate::domain::model::{
    parse_date, Participants, Transaction, TransactionTable, PARTICIPANT_COLUMN, REQUIRED_COLUMNS,
};
use crate::domain::ports::TransactionSource;
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 從 CSV 匯出檔讀取交易
#[derive(Debug, Clone)]
pub struct CsvTransactionSource {
    name: String,
    path: PathBuf,
}

impl CsvTransactionSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> ReconError {
        ReconError::SourceUnavailable {
            source_name: self.name.clone(),
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(&self, data: &[u8]) -> Result<TransactionTable> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| self.unavailable(e))?
            .iter()
            .map(str::to_string)
            .collect();

        let index_of = |column: &str| columns.iter().position(|c| c == column);
        let mut required = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, column) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = index_of(column).ok_or_else(|| ReconError::Schema {
                source_name: self.name.clone(),
                column: column.to_string(),
            })?;
        }
        let [event_idx, amount_idx, currency_idx, vendor_idx, date_idx] = required;
        let participant_idx = index_of(PARTICIPANT_COLUMN);

        let mut rows = Vec::new();
        let mut undated = 0usize;
        for (row_number, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.unavailable(e))?;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let raw_amount = cell(amount_idx);
            let amount = parse_amount(raw_amount).ok_or_else(|| ReconError::InvalidCell {
                source_name: self.name.clone(),
                row: row_number + 1,
                column: "amount".to_string(),
                value: raw_amount.to_string(),
            })?;

            let date = parse_date(cell(date_idx));
            if date.is_none() {
                undated += 1;
            }

            let participant = participant_idx
                .map(cell)
                .filter(|p| !p.is_empty())
                .map(|p| Participants::Delimited(p.to_string()));

            let extra: BTreeMap<String, String> = columns
                .iter()
                .enumerate()
                .filter(|(idx, _)| {
                    !required.contains(idx) && Some(*idx) != participant_idx
                })
                .map(|(idx, column)| (column.clone(), cell(idx).to_string()))
                .collect();

            rows.push(Transaction {
                event_id: cell(event_idx).to_string(),
                amount,
                currency: cell(currency_idx).to_string(),
                vendor_name: cell(vendor_idx).to_string(),
                date,
                participant,
                extra,
            });
        }

        if undated > 0 {
            tracing::warn!(
                "⚠️ {} rows in '{}' have no parseable date and can only match by key",
                undated,
                self.name
            );
        }

        tracing::info!(
            stage = "load",
            source = self.name.as_str(),
            "📥 Loaded {} transactions from {}",
            rows.len(),
            self.path.display()
        );
        Ok(TransactionTable::new(self.name.clone(), columns, rows))
    }
}

#[async_trait]
impl TransactionSource for CsvTransactionSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<TransactionTable> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        self.parse(&data)
    }
}

/// 接受千分位逗號與貨幣符號
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
