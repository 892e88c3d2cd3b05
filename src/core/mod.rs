pub mod aggregation;
pub mod matching;
pub mod orchestrator;
pub mod reconciliation;
pub mod splitting;

pub use crate::domain::ports::{ConfigProvider, Storage};
pub use crate::utils::error::Result;
pub use orchestrator::{Orchestrator, RunOutcome, RunSummary};
