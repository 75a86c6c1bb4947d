use crate::utils::error::{Result, TriageError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_TEXT_KEYWORDS: &[&str] = &[
    "text",
    "comment",
    "comments",
    "feedback",
    "review",
    "remarks",
    "description",
    "pilot's questions/answers",
    "pilot questions",
    "question",
];

pub const DEFAULT_LABEL_COLUMN: &str = "Predicted_Subcategory";
pub const DEFAULT_CONFIDENCE_COLUMN: &str = "Subcategory_Confidence";
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub api: ApiConfig,
    pub ingest: IngestConfig,
    pub processing: ProcessingConfig,
    pub export: ExportConfig,
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionHead {
    Main,
    #[default]
    Sub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    pub predict_path: String,
    pub health_path: String,
    pub categories_path: String,
    pub timeout_seconds: u64,
    pub prediction_head: PredictionHead,
    pub headers: Option<HashMap<String, String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            predict_path: "/predict".to_string(),
            health_path: "/health".to_string(),
            categories_path: "/categories".to_string(),
            timeout_seconds: 30,
            prediction_head: PredictionHead::Sub,
            headers: None,
        }
    }
}

impl ApiConfig {
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StitchMode {
    /// 主鍵欄為空即視為片段
    #[default]
    Lenient,
    /// 主鍵欄為空且最多只有一個非空儲存格才視為片段
    Strict,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub text_column_keywords: Vec<String>,
    /// 指定文字欄位時略過關鍵字比對
    pub text_column: Option<String>,
    pub header_scan_rows: usize,
    /// 預設為第一個原始欄位
    pub key_column: Option<String>,
    pub stitch_mode: StitchMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            text_column_keywords: DEFAULT_TEXT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            text_column: None,
            header_scan_rows: 20,
            key_column: None,
            stitch_mode: StitchMode::Lenient,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 1 = 逐筆送出
    pub concurrency: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
    /// results.csv + summary.json
    Zip,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_path: String,
    pub format: ExportFormat,
    pub file_prefix: String,
    pub label_column: String,
    pub confidence_column: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            format: ExportFormat::Csv,
            file_prefix: "predictions".to_string(),
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            confidence_column: DEFAULT_CONFIDENCE_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// 服務未就緒時改用本地關鍵字規則
    pub enabled: bool,
    pub default_label: String,
    pub rules: Vec<FallbackRule>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_label: "Uncategorized".to_string(),
            rules: Vec::new(),
        }
    }
}

impl TriageConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，所有欄位都有預設值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| TriageError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TRIAGE_API})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| TriageError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("api.endpoint", &self.api.endpoint)?;
        validation::validate_non_empty_string("api.predict_path", &self.api.predict_path)?;
        validation::validate_range("api.timeout_seconds", self.api.timeout_seconds, 1, 600)?;

        if self.ingest.text_column.is_none() {
            validation::validate_non_empty_list(
                "ingest.text_column_keywords",
                &self.ingest.text_column_keywords,
            )?;
        }
        validation::validate_range("ingest.header_scan_rows", self.ingest.header_scan_rows, 1, 1000)?;

        validation::validate_range(
            "processing.concurrency",
            self.processing.concurrency,
            1,
            MAX_CONCURRENCY,
        )?;

        validation::validate_path("export.output_path", &self.export.output_path)?;
        validation::validate_non_empty_string("export.label_column", &self.export.label_column)?;
        validation::validate_non_empty_string(
            "export.confidence_column",
            &self.export.confidence_column,
        )?;
        if self.export.label_column == self.export.confidence_column {
            return Err(TriageError::InvalidConfigValueError {
                field: "export.confidence_column".to_string(),
                value: self.export.confidence_column.clone(),
                reason: "Must differ from export.label_column".to_string(),
            });
        }

        for rule in &self.fallback.rules {
            validation::validate_non_empty_string("fallback.rules.label", &rule.label)?;
        }

        Ok(())
    }

    pub fn predict_url(&self) -> String {
        self.api.url_for(&self.api.predict_path)
    }

    pub fn health_url(&self) -> String {
        self.api.url_for(&self.api.health_path)
    }

    pub fn categories_url(&self) -> String {
        self.api.url_for(&self.api.categories_path)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.ingest
            .text_column_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

impl Validate for TriageConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
