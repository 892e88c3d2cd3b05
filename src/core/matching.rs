use crate::domain::model::{
    ExpenseRecord, ExtractedExpense, Match, ReconciliationResult, Transaction,
};

/// 模糊比對分數上限；只有 event_id 完全相符才給 1.0
pub const FUZZY_SCORE_CEILING: f64 = 0.99;

/// 將抽取出的費用對應到主來源的共同交易
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine {
    date_tolerance_days: u32,
}

impl MatchingEngine {
    pub fn new(date_tolerance_days: u32) -> Self {
        Self {
            date_tolerance_days,
        }
    }

    pub fn match_expenses(
        &self,
        extracted: &[ExtractedExpense],
        reconciliation: &ReconciliationResult,
    ) -> Vec<Match> {
        let candidates = &reconciliation.primary_common;

        let matches: Vec<Match> = extracted
            .iter()
            .map(|expense| self.best_match(expense, candidates))
            .collect();

        let matched = matches.iter().filter(|m| m.is_matched()).count();
        tracing::info!(
            stage = "matching",
            matched,
            unmatched = matches.len() - matched,
            "🔗 Matched extracted expenses against {} transactions",
            candidates.len()
        );

        matches
    }

    /// 對帳完全時，共同交易本身就是待拆分的費用
    pub fn from_reconciled(&self, reconciliation: &ReconciliationResult) -> Vec<Match> {
        reconciliation
            .primary_common
            .iter()
            .map(|row| Match {
                expense: ExpenseRecord::Reconciled(row.clone()),
                matched_transaction: Some(row.clone()),
                match_score: 1.0,
            })
            .collect()
    }

    fn best_match(&self, expense: &ExtractedExpense, candidates: &[Transaction]) -> Match {
        let record = ExpenseRecord::Extracted(expense.clone());

        if let Some(event_id) = expense
            .event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            if let Some(tx) = candidates.iter().find(|t| t.event_id == event_id) {
                tracing::debug!("🎯 {} matched by event_id {}", expense.source_file, event_id);
                return Match {
                    expense: record,
                    matched_transaction: Some(tx.clone()),
                    match_score: 1.0,
                };
            }
        }

        let (Some(vendor), Some(date)) = (expense.vendor_name.as_deref(), expense.date) else {
            tracing::debug!(
                "{} has no vendor or date; leaving unmatched",
                expense.source_file
            );
            return Match::unmatched(record);
        };
        let vendor = vendor.trim().to_lowercase();

        // 以分為單位比較距離，距離相同時保留較早的列
        let mut best: Option<(&Transaction, f64, i64)> = None;
        for tx in candidates {
            if tx.vendor_name.trim().to_lowercase() != vendor {
                continue;
            }
            let Some(tx_date) = tx.date else { continue };
            if (tx_date - date).num_days().unsigned_abs() > u64::from(self.date_tolerance_days) {
                continue;
            }

            let distance = (tx.amount - expense.amount).abs();
            let cents = minor_units(distance);
            if best.map_or(true, |(_, _, best_cents)| cents < best_cents) {
                best = Some((tx, distance, cents));
            }
        }

        match best {
            Some((tx, distance, _)) => Match {
                expense: record,
                matched_transaction: Some(tx.clone()),
                match_score: fuzzy_score(distance, tx.amount, expense.amount),
            },
            None => {
                tracing::debug!("❔ No candidate for {}", expense.source_file);
                Match::unmatched(record)
            }
        }
    }
}

fn minor_units(distance: f64) -> i64 {
    (distance * 100.0).round() as i64
}

/// 相對金額差越小分數越高，限制在 [0, FUZZY_SCORE_CEILING]
pub fn fuzzy_score(distance: f64, tx_amount: f64, expense_amount: f64) -> f64 {
    let scale = tx_amount.abs().max(expense_amount.abs());
    let relative = if scale > 0.0 { distance / scale } else { 0.0 };
    (1.0 / (1.0 + relative)).clamp(0.0, FUZZY_SCORE_CEILING)
}
