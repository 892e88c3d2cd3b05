// 外部系統的具體實作：CSV 來源、單據目錄、抽取服務、輸出與通知
pub mod csv_source;
pub mod documents;
pub mod extractor;
pub mod notifier;
pub mod storage;

pub use csv_source::CsvTransactionSource;
pub use documents::{DirectoryDocumentSource, InMemoryDocuments};
pub use extractor::HttpDocumentExtractor;
pub use notifier::LogNotifier;
pub use storage::LocalStorage;
