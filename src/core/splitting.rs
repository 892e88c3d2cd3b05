use crate::domain::model::{AllocatedLine, Match};

/// 依參與者平分每筆費用
#[derive(Debug, Clone, Copy, Default)]
pub struct SplittingEngine;

impl SplittingEngine {
    pub fn new() -> Self {
        Self
    }

    /// 金額不做四捨五入，留給報表層處理
    pub fn split(&self, matches: &[Match]) -> Vec<AllocatedLine> {
        let mut lines = Vec::with_capacity(matches.len());

        for m in matches {
            let amount = m.expense.amount();
            let names = m
                .expense
                .participant()
                .map(|p| p.names())
                .unwrap_or_default();

            if names.is_empty() {
                lines.push(AllocatedLine {
                    participant: None,
                    split_amount: amount,
                    source: m.clone(),
                });
                continue;
            }

            let split_amount = amount / names.len() as f64;
            for name in names {
                lines.push(AllocatedLine {
                    participant: Some(name),
                    split_amount,
                    source: m.clone(),
                });
            }
        }

        tracing::info!(
            stage = "splitting",
            "✂️ Allocated {} expenses into {} lines",
            matches.len(),
            lines.len()
        );
        lines
    }
}
