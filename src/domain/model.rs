use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 一筆邏輯資料列：欄位名稱對應原始儲存格內容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, String>,
}

impl Record {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 缺少的欄位視為空字串
    pub fn get(&self, column: &str) -> &str {
        self.data.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.data.insert(column.to_string(), value.into());
    }

    pub fn is_blank(&self, column: &str) -> bool {
        self.get(column).trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Delimited { delimiter: char },
    Spreadsheet { sheet: String, header_row: usize },
}

impl SourceKind {
    pub fn is_delimited(&self) -> bool {
        matches!(self, SourceKind::Delimited { .. })
    }
}

/// 一次上傳的完整資料：欄位順序 + 資料列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub source: SourceKind,
    /// 由預測階段附加的欄位，永遠排在原始欄位之後
    pub synthetic_columns: Vec<String>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, records: Vec<Record>, source: SourceKind) -> Self {
        Self {
            headers,
            records,
            source,
            synthetic_columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .chain(self.synthetic_columns.iter())
            .cloned()
            .collect()
    }

    /// 依輸出欄位順序取出一列的值
    pub fn row_values(&self, record: &Record) -> Vec<String> {
        self.headers
            .iter()
            .chain(self.synthetic_columns.iter())
            .map(|column| record.get(column).to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextColumn {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    /// 百分比，0..=100
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predictions: Vec<LabelScore>,
}

impl PredictionResult {
    /// 依機率由高到低排序
    pub fn ranked(mut predictions: Vec<LabelScore>) -> Self {
        predictions.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { predictions }
    }

    pub fn top(&self) -> Option<&LabelScore> {
        self.predictions.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Predicted(PredictionResult),
    Skipped,
    Failed(String),
}

impl ProcessingOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchReport {
    /// 合併回前一筆紀錄的片段數
    pub stitched: usize,
    pub orphans_dropped: usize,
    pub blank_dropped: usize,
}

/// Loader → Classifier → Stitcher 之後、送去預測之前的資料
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub dataset: Dataset,
    pub text_column: TextColumn,
    pub stitch: StitchReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub source_file: String,
    pub text_column: String,
    pub total: usize,
    pub predicted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stitched: usize,
    pub orphans_dropped: usize,
    pub failures: Vec<RecordFailure>,
    pub cancelled: bool,
    /// 取消時尚未處理的筆數（也計入 failed）
    pub unprocessed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} predicted, {} skipped, {} failed of {} ({} fragments stitched)",
            self.predicted, self.skipped, self.failed, self.total, self.stitched
        )?;
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub dataset: Dataset,
    pub outcomes: Vec<ProcessingOutcome>,
    pub summary: RunSummary,
}
