use anyhow::Context;
use clap::Parser;
use feedback_triage::core::Predictor;
use feedback_triage::utils::logger;
use feedback_triage::{HttpPredictor, TriageConfig};

/// 檢查分類服務：health、categories 與一筆範例預測
#[derive(Debug, Parser)]
#[command(name = "service_check")]
#[command(about = "Probe the prediction service before a bulk run")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    api_endpoint: Option<String>,

    #[arg(long, default_value = "The flight was delayed and nobody told us why")]
    sample: String,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let mut config = match &args.config {
        Some(path) => TriageConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => TriageConfig::default(),
    };
    if let Some(endpoint) = &args.api_endpoint {
        config.api.endpoint = endpoint.clone();
    }

    println!("🚀 Checking prediction service at {}", config.api.endpoint);
    let predictor = HttpPredictor::new(&config)?;

    let health = predictor.health().await.context("health check failed")?;
    println!(
        "{} status={} model_loaded={} main_classes={} sub_classes={}",
        if health.is_ready() { "✅" } else { "⚠️" },
        health.status,
        health.model_loaded,
        health.main_classes_count,
        health.sub_classes_count
    );

    match predictor.categories().await {
        Ok(categories) => {
            println!(
                "📋 {} main / {} sub categories",
                categories.main.len(),
                categories.sub.len()
            );
            tracing::debug!("Sub categories: {:?}", categories.sub);
        }
        Err(e) => println!("⚠️ Categories unavailable: {}", e),
    }

    let result = predictor
        .predict(&args.sample)
        .await
        .context("sample prediction failed")?;
    for (rank, score) in result.predictions.iter().take(3).enumerate() {
        println!("  {}. {} ({:.2}%)", rank + 1, score.label, score.probability);
    }

    if !health.is_ready() {
        anyhow::bail!("service reachable but not ready");
    }
    println!("✅ Service check passed");
    Ok(())
}
