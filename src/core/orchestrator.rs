use crate::adapters::notifier::LogNotifier;
use crate::core::aggregation::{ReportAggregator, ReportOptions};
use crate::core::matching::MatchingEngine;
use crate::core::reconciliation::ReconciliationEngine;
use crate::core::splitting::SplittingEngine;
use crate::domain::model::{
    Artifact, Document, ExtractedExpense, ExtractionFailure, ReconciliationResult,
    UnreadableDocument,
};
use crate::domain::ports::{
    ConfigProvider, DocumentExtractor, DocumentSource, Notifier, Storage, TransactionSource,
};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// 對帳不完整且沒有任何單據抽取成功，不產生報表
    NoDocumentsParsed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub all_found: bool,
    pub missing_keys: BTreeSet<String>,
    pub documents_parsed: usize,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub unreadable_documents: Vec<UnreadableDocument>,
    pub matched: usize,
    pub unmatched: usize,
    pub allocated_lines: usize,
    pub artifacts: Vec<Artifact>,
    pub notified: bool,
}

impl RunSummary {
    fn new(reconciliation: &ReconciliationResult) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            all_found: reconciliation.all_found,
            missing_keys: reconciliation.missing_keys.clone(),
            documents_parsed: 0,
            extraction_failures: Vec::new(),
            unreadable_documents: Vec::new(),
            matched: 0,
            unmatched: 0,
            allocated_lines: 0,
            artifacts: Vec::new(),
            notified: false,
        }
    }
}

struct Fallback {
    documents: Box<dyn DocumentSource>,
    extractor: Box<dyn DocumentExtractor>,
}

/// 串接對帳、抽取、比對、拆分、報表與通知
pub struct Orchestrator<S: Storage, C: ConfigProvider> {
    config: C,
    primary: Box<dyn TransactionSource>,
    secondary: Box<dyn TransactionSource>,
    fallback: Option<Fallback>,
    notifier: Box<dyn Notifier>,
    aggregator: ReportAggregator<S>,
    monitor: SystemMonitor,
}

impl<S: Storage, C: ConfigProvider> Orchestrator<S, C> {
    pub fn new(
        storage: S,
        config: C,
        primary: Box<dyn TransactionSource>,
        secondary: Box<dyn TransactionSource>,
    ) -> Self {
        let options = ReportOptions {
            decimal_places: config.decimal_places(),
            archive: config.archive_reports(),
        };

        Self {
            aggregator: ReportAggregator::new(storage, options),
            config,
            primary,
            secondary,
            fallback: None,
            notifier: Box::new(LogNotifier),
            monitor: SystemMonitor::new(false),
        }
    }

    /// 對帳不完整時使用的單據來源與抽取器
    pub fn with_fallback(
        mut self,
        documents: Box<dyn DocumentSource>,
        extractor: Box<dyn DocumentExtractor>,
    ) -> Self {
        self.fallback = Some(Fallback {
            documents,
            extractor,
        });
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = SystemMonitor::new(enabled);
        self
    }

    pub async fn reconcile_only(&self) -> Result<ReconciliationResult> {
        tracing::info!(stage = "load", "📂 Loading transaction sources");

        let primary = self.primary.load().await.inspect_err(|e| {
            tracing::error!(stage = "load", source = self.primary.name(), "❌ {}", e)
        })?;
        let secondary = self.secondary.load().await.inspect_err(|e| {
            tracing::error!(stage = "load", source = self.secondary.name(), "❌ {}", e)
        })?;
        self.monitor.log_stage("load");

        let result = ReconciliationEngine::new().reconcile(
            &primary,
            &secondary,
            self.config.key_field(),
        )?;
        self.monitor.log_stage("reconciliation");
        Ok(result)
    }

    pub async fn run(&self) -> Result<RunSummary> {
        tracing::info!("🚀 Starting expense processing workflow");

        let reconciliation = self.reconcile_only().await?;
        let mut summary = RunSummary::new(&reconciliation);
        let matcher = MatchingEngine::new(self.config.date_tolerance_days());

        let matches = if reconciliation.all_found {
            tracing::info!(
                stage = "reconciliation",
                "✅ All transactions found in secondary source"
            );
            matcher.from_reconciled(&reconciliation)
        } else {
            tracing::warn!(
                stage = "reconciliation",
                missing = reconciliation.missing_keys.len(),
                "⚠️ Reconciliation incomplete, missing keys: {:?}",
                reconciliation.missing_keys
            );

            let extracted = self.extract_fallback(&mut summary).await?;
            if extracted.is_empty() {
                tracing::warn!(
                    stage = "extraction",
                    "📭 No documents were parsed. Stopping workflow."
                );
                summary.outcome = RunOutcome::NoDocumentsParsed;
                self.monitor.log_final_stats();
                return Ok(summary);
            }
            summary.documents_parsed = extracted.len();

            let matches = matcher.match_expenses(&extracted, &reconciliation);
            self.monitor.log_stage("matching");
            matches
        };

        summary.matched = matches.iter().filter(|m| m.is_matched()).count();
        summary.unmatched = matches.len() - summary.matched;

        let lines = SplittingEngine::new().split(&matches);
        summary.allocated_lines = lines.len();
        self.monitor.log_stage("splitting");

        summary.artifacts = self.aggregator.aggregate(&lines).await?;
        self.monitor.log_stage("report");

        match self.notifier.notify(&summary.artifacts).await {
            Ok(()) => summary.notified = true,
            Err(e) => tracing::warn!(stage = "notification", "⚠️ Notification failed: {}", e),
        }

        tracing::info!(
            artifacts = summary.artifacts.len(),
            matched = summary.matched,
            unmatched = summary.unmatched,
            "🎉 Expense processing workflow finished"
        );
        self.monitor.log_final_stats();
        Ok(summary)
    }

    async fn extract_fallback(&self, summary: &mut RunSummary) -> Result<Vec<ExtractedExpense>> {
        let Some(fallback) = &self.fallback else {
            tracing::warn!(
                stage = "extraction",
                "⚠️ No document source configured; fallback unavailable"
            );
            return Ok(Vec::new());
        };

        let batch = fallback.documents.load().await?;
        for unreadable in &batch.unreadable {
            tracing::warn!(
                stage = "extraction",
                document = unreadable.name.as_str(),
                "⚠️ Skipping unreadable document: {}",
                unreadable.reason
            );
        }
        summary.unreadable_documents = batch.unreadable;

        let (extracted, failures) = self
            .extract_documents(fallback.extractor.as_ref(), &batch.documents)
            .await;
        tracing::info!(
            stage = "extraction",
            parsed = extracted.len(),
            failed = failures.len(),
            "🧾 Successfully parsed {} of {} documents",
            extracted.len(),
            batch.documents.len()
        );
        summary.extraction_failures = failures;
        self.monitor.log_stage("extraction");

        Ok(extracted)
    }

    /// 有界併發抽取，結果維持單據順序
    pub async fn extract_documents(
        &self,
        extractor: &dyn DocumentExtractor,
        documents: &[Document],
    ) -> (Vec<ExtractedExpense>, Vec<ExtractionFailure>) {
        let results: Vec<_> = stream::iter(documents)
            .map(|document| self.extract_with_retry(extractor, document))
            .buffered(self.config.concurrent_requests().max(1))
            .collect()
            .await;

        let mut extracted = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(expense) => extracted.push(expense),
                Err(failure) => {
                    tracing::warn!(
                        stage = "extraction",
                        document = failure.file.as_str(),
                        "❌ {}",
                        failure
                    );
                    failures.push(failure);
                }
            }
        }
        (extracted, failures)
    }

    async fn extract_with_retry(
        &self,
        extractor: &dyn DocumentExtractor,
        document: &Document,
    ) -> std::result::Result<ExtractedExpense, ExtractionFailure> {
        let max_attempts = self.config.retry_attempts();
        let mut attempt = 0;

        loop {
            tracing::debug!("Parsing document: {} (attempt {})", document.name, attempt + 1);
            match extractor.extract(document).await {
                Ok(expense) => return Ok(expense),
                Err(failure) if failure.retryable && attempt < max_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        document = document.name.as_str(),
                        "🔄 Retrying extraction ({}/{}): {}",
                        attempt,
                        max_attempts,
                        failure.reason
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}
