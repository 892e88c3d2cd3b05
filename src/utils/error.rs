use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Transaction source '{source_name}' unavailable ({path}): {reason}")]
    SourceUnavailable {
        source_name: String,
        path: String,
        reason: String,
    },

    #[error("Schema error in source '{source_name}': missing column '{column}'")]
    Schema { source_name: String, column: String },

    #[error("Invalid value in source '{source_name}', row {row}, column '{column}': '{value}'")]
    InvalidCell {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// 錯誤分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Schema,
    Configuration,
    Io,
    Processing,
}

/// 錯誤嚴重程度，CLI 依此決定退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    High,
    Critical,
}

impl ReconError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SourceUnavailable { .. } => ErrorCategory::Source,
            Self::Schema { .. } | Self::InvalidCell { .. } | Self::CsvError(_) => {
                ErrorCategory::Schema
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::Io,
            Self::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Source | ErrorCategory::Schema | ErrorCategory::Processing => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration | ErrorCategory::Io => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::SourceUnavailable { path, .. } => {
                format!("Check that '{}' exists and is a readable CSV export", path)
            }
            Self::Schema { column, .. } => format!(
                "Add a '{}' column to the export or change sources.key_field",
                column
            ),
            Self::InvalidCell { column, .. } => {
                format!("Fix the '{}' values in the export and re-run", column)
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => {
                "Review the TOML configuration file".to_string()
            }
            Self::IoError(_) | Self::ZipError(_) => {
                "Check permissions and free space of the report output path".to_string()
            }
            _ => "Re-run with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Source => format!("Could not read transactions: {}", self),
            ErrorCategory::Schema => format!("Transaction export is malformed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Io => format!("Could not write reports: {}", self),
            ErrorCategory::Processing => format!("Processing failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
