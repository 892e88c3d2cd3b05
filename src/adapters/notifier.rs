use crate::domain::model::Artifact;
use crate::domain::ports::Notifier;
use crate::utils::error::Result;
use async_trait::async_trait;

/// 只寫日誌的通知端；實際投遞交給外部系統
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, artifacts: &[Artifact]) -> Result<()> {
        for artifact in artifacts {
            let participant = artifact.participant.as_deref().unwrap_or("<unattributed>");
            tracing::info!(
                stage = "notification",
                participant,
                lines = artifact.line_count,
                "📨 Sent report to participant {} ({})",
                participant,
                artifact.location
            );
        }
        Ok(())
    }
}
