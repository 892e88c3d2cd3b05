use crate::domain::model::{
    Artifact, Document, DocumentBatch, ExtractedExpense, ExtractionFailure, TransactionTable,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 報表輸出位置
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// 寫入後可供通知端使用的位置
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn key_field(&self) -> &str;
    fn output_path(&self) -> &str;
    fn date_tolerance_days(&self) -> u32;
    fn concurrent_requests(&self) -> usize;
    fn retry_attempts(&self) -> u32;
    fn retry_delay(&self) -> std::time::Duration;
    fn decimal_places(&self) -> Option<u32>;
    fn archive_reports(&self) -> bool;
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    fn name(&self) -> &str;
    async fn load(&self) -> Result<TransactionTable>;
}

/// 由呼叫端負責列舉單據
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self) -> Result<DocumentBatch>;
}

/// 外部推論服務的抽取能力
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        document: &Document,
    ) -> std::result::Result<ExtractedExpense, ExtractionFailure>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, artifacts: &[Artifact]) -> Result<()>;
}
