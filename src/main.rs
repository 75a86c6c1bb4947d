use clap::Parser;
use feedback_triage::core::Predictor;
use feedback_triage::utils::error::{ErrorSeverity, TriageError};
use feedback_triage::utils::{logger, validation::Validate};
use feedback_triage::{
    BulkPipeline, CliConfig, HttpPredictor, InputFile, KeywordFallbackPredictor, LocalStorage,
    TriageConfig, TriageEngine, UploadSession,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting feedback-triage");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli).await {
        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: &CliConfig) -> Result<(), TriageError> {
    let config = cli.resolve()?;
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }

    let bytes = tokio::fs::read(&cli.input)
        .await
        .map_err(|e| TriageError::UnreadableFile {
            file: cli.input.clone(),
            reason: e.to_string(),
        })?;
    let name = std::path::Path::new(&cli.input)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&cli.input)
        .to_string();
    let mut input = InputFile::new(name, bytes);
    if let Some(media_type) = &cli.media_type {
        input = input.with_media_type(media_type.clone());
    }

    let predictor = select_predictor(&config, cli.skip_health_check).await?;
    tracing::info!("🔌 Using '{}' predictor", predictor.name());

    let storage = LocalStorage::new(config.export.output_path.clone());
    let pipeline = BulkPipeline::new(storage, config, predictor);
    let engine = TriageEngine::new(pipeline);

    let mut session = UploadSession::new(input);
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, stopping after the current record");
            cancel.cancel();
        }
    });

    let report = engine.run(&mut session).await?;

    tracing::info!("✅ Run completed successfully!");
    println!("✅ {}", report.summary);
    if report.summary.failed > 0 {
        println!(
            "⚠️ {} failed of {}",
            report.summary.failed, report.summary.total
        );
        for failure in &report.summary.failures {
            println!("   - record {}: {}", failure.index, failure.message);
        }
    }
    println!("📁 Output saved to: {}", report.output_path);

    Ok(())
}

/// 服務未就緒時依設定改用本地規則，否則中止
async fn select_predictor(
    config: &TriageConfig,
    skip_health_check: bool,
) -> Result<Arc<dyn Predictor>, TriageError> {
    let http = HttpPredictor::new(config)?;
    if skip_health_check {
        return Ok(Arc::new(http));
    }

    match http.ensure_ready().await {
        Ok(_) => Ok(Arc::new(http)),
        Err(e) if config.fallback.enabled => {
            tracing::warn!("⚠️ {}; falling back to keyword rules", e);
            Ok(Arc::new(KeywordFallbackPredictor::new(&config.fallback)))
        }
        Err(e) => Err(e),
    }
}
