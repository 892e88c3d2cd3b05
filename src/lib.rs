pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::LocalStorage;
pub use config::toml_config::TomlConfig;
pub use core::{Orchestrator, RunOutcome, RunSummary};
pub use utils::error::{ReconError, Result};
