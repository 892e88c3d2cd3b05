use crate::adapters::documents::DEFAULT_EXTENSIONS;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ReconError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub documents: Option<DocumentsConfig>,
    pub extractor: Option<ExtractorConfig>,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    pub description: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub primary_path: String,
    pub secondary_path: String,
    #[serde(default = "default_primary_name")]
    pub primary_name: String,
    #[serde(default = "default_secondary_name")]
    pub secondary_name: String,
    #[serde(default = "default_key_field")]
    pub key_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub directory: String,
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub concurrent_requests: Option<usize>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub date_tolerance_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    pub decimal_places: Option<u32>,
    #[serde(default)]
    pub archive: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            decimal_places: None,
            archive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

fn default_pipeline_name() -> String {
    "expense-recon".to_string()
}

fn default_primary_name() -> String {
    "citibank".to_string()
}

fn default_secondary_name() -> String {
    "concur".to_string()
}

fn default_key_field() -> String {
    "event_id".to_string()
}

fn default_output_path() -> String {
    "./reports".to_string()
}

const DEFAULT_DATE_TOLERANCE_DAYS: u32 = 0;
const DEFAULT_CONCURRENT_REQUESTS: usize = 4;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECONDS: u64 = 1;

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReconError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${EXTRACTOR_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReconError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("sources.primary_path", &self.sources.primary_path)?;
        validation::validate_path("sources.secondary_path", &self.sources.secondary_path)?;
        validation::validate_non_empty_string("sources.key_field", &self.sources.key_field)?;
        validation::validate_non_empty_string("sources.primary_name", &self.sources.primary_name)?;
        validation::validate_non_empty_string(
            "sources.secondary_name",
            &self.sources.secondary_name,
        )?;
        validation::validate_path("report.output_path", &self.report.output_path)?;

        if let Some(places) = self.report.decimal_places {
            validation::validate_range("report.decimal_places", places, 0, 6)?;
        }
        validation::validate_range(
            "matching.date_tolerance_days",
            self.date_tolerance_days(),
            0,
            365,
        )?;

        if let Some(documents) = &self.documents {
            validation::validate_path("documents.directory", &documents.directory)?;
            validation::validate_extensions("documents.extensions", &self.document_extensions())?;
            // 有單據就必須有抽取服務
            validation::validate_required_field("extractor", &self.extractor)?;
        }

        if let Some(extractor) = &self.extractor {
            validation::validate_url("extractor.endpoint", &extractor.endpoint)?;
            validation::validate_positive_number(
                "extractor.concurrent_requests",
                self.concurrent_requests(),
                1,
            )?;
            validation::validate_range("extractor.retry_attempts", self.retry_attempts(), 0, 10)?;
            if let Some(timeout) = extractor.timeout_seconds {
                validation::validate_positive_number(
                    "extractor.timeout_seconds",
                    timeout as usize,
                    1,
                )?;
            }
        }

        Ok(())
    }

    pub fn document_extensions(&self) -> Vec<String> {
        self.documents
            .as_ref()
            .and_then(|d| d.extensions.clone())
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    pub fn extractor_timeout(&self) -> Option<Duration> {
        self.extractor
            .as_ref()
            .and_then(|e| e.timeout_seconds)
            .map(Duration::from_secs)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// 命令列覆寫
    pub fn set_output_path(&mut self, output_path: impl Into<String>) {
        self.report.output_path = output_path.into();
    }

    pub fn set_date_tolerance_days(&mut self, days: u32) {
        self.matching.date_tolerance_days = Some(days);
    }
}

impl ConfigProvider for TomlConfig {
    fn key_field(&self) -> &str {
        &self.sources.key_field
    }

    fn output_path(&self) -> &str {
        &self.report.output_path
    }

    fn date_tolerance_days(&self) -> u32 {
        self.matching
            .date_tolerance_days
            .unwrap_or(DEFAULT_DATE_TOLERANCE_DAYS)
    }

    fn concurrent_requests(&self) -> usize {
        self.extractor
            .as_ref()
            .and_then(|e| e.concurrent_requests)
            .unwrap_or(DEFAULT_CONCURRENT_REQUESTS)
    }

    fn retry_attempts(&self) -> u32 {
        self.extractor
            .as_ref()
            .and_then(|e| e.retry_attempts)
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS)
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(
            self.extractor
                .as_ref()
                .and_then(|e| e.retry_delay_seconds)
                .unwrap_or(DEFAULT_RETRY_DELAY_SECONDS),
        )
    }

    fn decimal_places(&self) -> Option<u32> {
        self.report.decimal_places
    }

    fn archive_reports(&self) -> bool {
        self.report.archive
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[sources]
primary_path = "data/citibank.csv"
secondary_path = "data/concur.csv"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.pipeline.name, "expense-recon");
        assert_eq!(config.sources.primary_name, "citibank");
        assert_eq!(config.sources.secondary_name, "concur");
        assert_eq!(config.key_field(), "event_id");
        assert_eq!(config.output_path(), "./reports");
        assert_eq!(config.date_tolerance_days(), 0);
        assert_eq!(config.concurrent_requests(), 4);
        assert_eq!(config.retry_attempts(), 3);
        assert_eq!(config.decimal_places(), None);
        assert!(!config.archive_reports());
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[pipeline]
name = "monthly-close"
description = "Card vs. expense system"

[sources]
primary_path = "citibank.csv"
secondary_path = "concur.csv"
key_field = "transaction_ref"

[documents]
directory = "./receipts"
extensions = ["png", "pdf"]

[extractor]
endpoint = "https://vision.example.com/extract"
api_key = "secret"
timeout_seconds = 30
retry_attempts = 2
retry_delay_seconds = 5
concurrent_requests = 8

[extractor.headers]
X-Team = "finance"

[matching]
date_tolerance_days = 1

[report]
output_path = "./out"
decimal_places = 2
archive = true

[monitoring]
enabled = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.key_field(), "transaction_ref");
        assert_eq!(config.document_extensions(), vec!["png", "pdf"]);
        assert_eq!(config.extractor_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.concurrent_requests(), 8);
        assert_eq!(config.date_tolerance_days(), 1);
        assert_eq!(config.decimal_places(), Some(2));
        assert!(config.archive_reports());
        assert!(config.monitoring_enabled());
        assert_eq!(
            config
                .extractor
                .as_ref()
                .and_then(|e| e.headers.as_ref())
                .and_then(|h| h.get("X-Team"))
                .map(String::as_str),
            Some("finance")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RECON_TEST_API_KEY", "from-env");

        let toml_content = r#"
[sources]
primary_path = "a.csv"
secondary_path = "b.csv"

[extractor]
endpoint = "https://vision.example.com"
api_key = "${RECON_TEST_API_KEY}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.extractor.and_then(|e| e.api_key).as_deref(),
            Some("from-env")
        );

        std::env::remove_var("RECON_TEST_API_KEY");
    }

    #[test]
    fn test_unset_env_var_is_left_as_is() {
        let toml_content = r#"
[sources]
primary_path = "${RECON_TEST_UNSET_VAR}"
secondary_path = "b.csv"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.sources.primary_path, "${RECON_TEST_UNSET_VAR}");
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = format!(
            "{}\n[extractor]\nendpoint = \"invalid-url\"\n",
            MINIMAL
        );
        let config = TomlConfig::from_toml_str(&bad_endpoint).unwrap();
        assert!(config.validate().is_err());

        let documents_without_extractor =
            format!("{}\n[documents]\ndirectory = \"./receipts\"\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&documents_without_extractor).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ReconError::MissingConfigError { .. })
        ));

        let bad_places = format!("{}\n[report]\ndecimal_places = 9\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&bad_places).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retries_is_valid() {
        let no_retries = format!(
            "{}\n[extractor]\nendpoint = \"https://vision.example.com\"\nretry_attempts = 0\n",
            MINIMAL
        );
        let config = TomlConfig::from_toml_str(&no_retries).unwrap();
        assert_eq!(config.retry_attempts(), 0);
        assert!(config.validate().is_ok());

        let too_many = no_retries.replace("retry_attempts = 0", "retry_attempts = 11");
        let config = TomlConfig::from_toml_str(&too_many).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_sources_is_parse_error() {
        let err = TomlConfig::from_toml_str("[report]\narchive = true\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        config.set_output_path("/tmp/reports");
        config.set_date_tolerance_days(0);

        assert_eq!(config.output_path(), "/tmp/reports");
        assert_eq!(config.date_tolerance_days(), 0);
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.sources.secondary_path, "data/concur.csv");
    }
}
