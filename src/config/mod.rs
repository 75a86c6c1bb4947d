pub mod toml_config;

pub use toml_config::{ExportFormat, PredictionHead, StitchMode, TriageConfig};

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "feedback-triage")]
#[command(about = "Classify bulk feedback files against a prediction service")]
pub struct CliConfig {
    /// Feedback file to classify (.csv, .tsv, .txt, .xlsx, .xls, .ods)
    pub input: String,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long)]
    pub api_endpoint: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(long, value_enum)]
    pub format: Option<ExportFormat>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Use this column as feedback text instead of keyword detection
    #[arg(long)]
    pub text_column: Option<String>,

    #[arg(long, value_enum)]
    pub stitch_mode: Option<StitchMode>,

    /// Declared media type of the input, e.g. text/csv
    #[arg(long)]
    pub media_type: Option<String>,

    #[arg(long, help = "Do not query the health endpoint before the run")]
    pub skip_health_check: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入設定檔（若有）並套用命令列覆蓋
    pub fn resolve(&self) -> Result<TriageConfig> {
        let mut config = match &self.config {
            Some(path) => TriageConfig::from_file(path)?,
            None => TriageConfig::default(),
        };

        if let Some(endpoint) = &self.api_endpoint {
            config.api.endpoint = endpoint.clone();
        }
        if let Some(output_path) = &self.output_path {
            config.export.output_path = output_path.clone();
        }
        if let Some(format) = self.format {
            config.export.format = format;
        }
        if let Some(concurrency) = self.concurrency {
            config.processing.concurrency = concurrency;
        }
        if let Some(text_column) = &self.text_column {
            config.ingest.text_column = Some(text_column.clone());
        }
        if let Some(stitch_mode) = self.stitch_mode {
            config.ingest.stitch_mode = stitch_mode;
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = CliConfig::parse_from([
            "feedback-triage",
            "survey.csv",
            "--api-endpoint",
            "http://10.0.0.5:8000",
            "--format",
            "zip",
            "--stitch-mode",
            "off",
            "--concurrency",
            "3",
        ]);

        let config = cli.resolve().unwrap();
        assert_eq!(cli.input, "survey.csv");
        assert_eq!(config.api.endpoint, "http://10.0.0.5:8000");
        assert_eq!(config.export.format, ExportFormat::Zip);
        assert_eq!(config.ingest.stitch_mode, StitchMode::Off);
        assert_eq!(config.processing.concurrency, 3);
    }
}
