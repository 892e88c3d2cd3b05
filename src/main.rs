use clap::Parser;
use expense_recon::adapters::{CsvTransactionSource, DirectoryDocumentSource, HttpDocumentExtractor};
use expense_recon::domain::ports::ConfigProvider;
use expense_recon::utils::error::{ErrorSeverity, ReconError};
use expense_recon::utils::{logger, validation::Validate};
use expense_recon::{CliConfig, LocalStorage, Orchestrator, RunOutcome, TomlConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting expense-recon CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.load().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let monitor_enabled = cli.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let orchestrator = build_orchestrator(&config).with_monitoring(monitor_enabled);

    if cli.dry_run {
        match orchestrator.reconcile_only().await {
            Ok(result) => {
                println!(
                    "🔎 Dry run: {} of {} primary keys reconciled",
                    result.common_keys().len(),
                    result.primary_key_count()
                );
                for key in &result.missing_keys {
                    println!("   missing: {}", key);
                }
                return Ok(());
            }
            Err(e) => exit_with(e),
        }
    }

    match orchestrator.run().await {
        Ok(summary) => {
            if summary.outcome == RunOutcome::NoDocumentsParsed {
                println!("📭 Reconciliation incomplete and no documents were parsed; no reports written");
            } else {
                tracing::info!("✅ Expense processing completed successfully!");
                println!("✅ Expense processing completed successfully!");
                println!(
                    "📊 {} matched, {} unmatched, {} lines allocated",
                    summary.matched, summary.unmatched, summary.allocated_lines
                );
                for artifact in &summary.artifacts {
                    println!("📁 {}", artifact.location);
                }
            }
            if !summary.extraction_failures.is_empty() {
                println!(
                    "⚠️ {} documents failed extraction",
                    summary.extraction_failures.len()
                );
            }
            if cli.verbose {
                tracing::debug!("Run summary: {}", serde_json::to_string(&summary)?);
            }
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn build_orchestrator(config: &TomlConfig) -> Orchestrator<LocalStorage, TomlConfig> {
    let storage = LocalStorage::new(config.output_path().to_string());
    let primary = CsvTransactionSource::new(
        config.sources.primary_name.clone(),
        config.sources.primary_path.clone(),
    );
    let secondary = CsvTransactionSource::new(
        config.sources.secondary_name.clone(),
        config.sources.secondary_path.clone(),
    );

    let mut orchestrator = Orchestrator::new(
        storage,
        config.clone(),
        Box::new(primary),
        Box::new(secondary),
    );

    if let (Some(documents), Some(extractor)) = (&config.documents, &config.extractor) {
        let source =
            DirectoryDocumentSource::new(documents.directory.clone(), &config.document_extensions());
        let client = HttpDocumentExtractor::new(extractor.endpoint.clone())
            .with_api_key(extractor.api_key.clone())
            .with_headers(extractor.headers.clone().unwrap_or_default())
            .with_timeout(config.extractor_timeout());
        orchestrator = orchestrator.with_fallback(Box::new(source), Box::new(client));
    }

    orchestrator
}

fn exit_with(e: ReconError) -> ! {
    tracing::error!(
        "❌ Expense processing failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
