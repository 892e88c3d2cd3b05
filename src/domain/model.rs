use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// 交易來源必備欄位
pub const REQUIRED_COLUMNS: [&str; 5] = ["event_id", "amount", "currency", "vendor_name", "date"];
pub const PARTICIPANT_COLUMN: &str = "participant";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// 解析交易與單據上常見的日期格式；空字串或無法辨識時回傳 None
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// 參與者：逗號分隔字串或已結構化的名單
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Participants {
    List(Vec<String>),
    Delimited(String),
}

impl Participants {
    /// 依宣告順序展開參與者。重複的名字不去重，每次出現各分一份。
    pub fn names(&self) -> Vec<String> {
        match self {
            Participants::Delimited(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            Participants::List(names) => names.clone(),
        }
    }
}

impl std::fmt::Display for Participants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Participants::Delimited(raw) => write!(f, "{}", raw),
            Participants::List(names) => write!(f, "{}", names.join(", ")),
        }
    }
}

/// 表格來源中的一筆交易
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub event_id: String,
    pub amount: f64,
    pub currency: String,
    pub vendor_name: String,
    pub date: Option<NaiveDate>,
    pub participant: Option<Participants>,
    /// 非標準欄位，原樣保留
    pub extra: BTreeMap<String, String>,
}

impl Transaction {
    /// 以欄位名稱取值；空值視為不存在
    pub fn field(&self, column: &str) -> Option<String> {
        let value = match column {
            "event_id" => Some(self.event_id.clone()),
            "amount" => Some(self.amount.to_string()),
            "currency" => Some(self.currency.clone()),
            "vendor_name" => Some(self.vendor_name.clone()),
            "date" => self.date.map(|d| d.format("%Y-%m-%d").to_string()),
            PARTICIPANT_COLUMN => self.participant.as_ref().map(|p| p.to_string()),
            other => self.extra.get(other).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Transaction>,
}

impl TransactionTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Transaction>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 從單據影像抽取出的費用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedExpense {
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub vendor_name: Option<String>,
    pub currency: Option<String>,
    pub event_id: Option<String>,
    pub participant: Option<Participants>,
    pub source_file: String,
}

/// 待拆分的費用，明確區分來源
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpenseRecord {
    Extracted(ExtractedExpense),
    Reconciled(Transaction),
}

impl ExpenseRecord {
    pub fn amount(&self) -> f64 {
        match self {
            ExpenseRecord::Extracted(e) => e.amount,
            ExpenseRecord::Reconciled(t) => t.amount,
        }
    }

    pub fn participant(&self) -> Option<&Participants> {
        match self {
            ExpenseRecord::Extracted(e) => e.participant.as_ref(),
            ExpenseRecord::Reconciled(t) => t.participant.as_ref(),
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            ExpenseRecord::Extracted(e) => e.event_id.as_deref(),
            ExpenseRecord::Reconciled(t) => Some(t.event_id.as_str()),
        }
    }

    pub fn vendor_name(&self) -> Option<&str> {
        match self {
            ExpenseRecord::Extracted(e) => e.vendor_name.as_deref(),
            ExpenseRecord::Reconciled(t) => Some(t.vendor_name.as_str()),
        }
    }

    pub fn currency(&self) -> Option<&str> {
        match self {
            ExpenseRecord::Extracted(e) => e.currency.as_deref(),
            ExpenseRecord::Reconciled(t) => Some(t.currency.as_str()),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ExpenseRecord::Extracted(e) => e.date,
            ExpenseRecord::Reconciled(t) => t.date,
        }
    }

    pub fn source_file(&self) -> Option<&str> {
        match self {
            ExpenseRecord::Extracted(e) => Some(e.source_file.as_str()),
            ExpenseRecord::Reconciled(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExpenseRecord::Extracted(_) => "extracted",
            ExpenseRecord::Reconciled(_) => "reconciled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub all_found: bool,
    pub primary_common: Vec<Transaction>,
    pub secondary_common: Vec<Transaction>,
    /// 主來源有、次來源沒有的鍵
    pub missing_keys: BTreeSet<String>,
    pub key_field: String,
}

impl ReconciliationResult {
    /// 兩邊都有的鍵，去重
    pub fn common_keys(&self) -> BTreeSet<String> {
        self.primary_common
            .iter()
            .filter_map(|row| row.field(&self.key_field))
            .collect()
    }

    pub fn primary_key_count(&self) -> usize {
        self.common_keys().len() + self.missing_keys.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub expense: ExpenseRecord,
    /// None 表示沒有對應交易
    pub matched_transaction: Option<Transaction>,
    pub match_score: f64,
}

impl Match {
    pub fn unmatched(expense: ExpenseRecord) -> Self {
        Self {
            expense,
            matched_transaction: None,
            match_score: 0.0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_transaction.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedLine {
    pub participant: Option<String>,
    pub split_amount: f64,
    pub source: Match,
}

/// 一個參與者群組對應的報表
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub participant: Option<String>,
    pub location: String,
    pub line_count: usize,
}

/// 待抽取的單據
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableDocument {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBatch {
    pub documents: Vec<Document>,
    pub unreadable: Vec<UnreadableDocument>,
}

/// 單一單據抽取失敗；只影響該單據
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename = "extraction_failed")]
#[error("extraction failed for {file}: {reason}")]
pub struct ExtractionFailure {
    pub file: String,
    pub reason: String,
    pub raw_response: Option<String>,
    #[serde(skip)]
    pub retryable: bool,
}

impl ExtractionFailure {
    pub fn new(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
            raw_response: None,
            retryable: false,
        }
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn kind(&self) -> &'static str {
        "extraction_failed"
    }
}
