pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "expense-recon")]
#[command(about = "Reconcile card transactions against expense reports and split costs per participant")]
pub struct CliConfig {
    #[arg(long, default_value = "recon.toml")]
    pub config: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, help = "Log memory and CPU usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Override report.output_path")]
    pub output_path: Option<String>,

    #[arg(long, help = "Override matching.date_tolerance_days")]
    pub date_tolerance_days: Option<u32>,

    #[arg(long, help = "Reconcile only; no extraction, reports or notifications")]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML 並套用命令列覆寫
    pub fn load(&self) -> crate::utils::error::Result<TomlConfig> {
        let mut config = TomlConfig::from_file(&self.config)?;
        if let Some(output_path) = &self.output_path {
            config.set_output_path(output_path.clone());
        }
        if let Some(days) = self.date_tolerance_days {
            config.set_date_tolerance_days(days);
        }
        Ok(config)
    }
}
