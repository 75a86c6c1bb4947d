use crate::core::loader::normalize_headers;
use crate::domain::model::{Dataset, PredictionResult, ProcessingOutcome, RecordFailure, TextColumn};
use crate::domain::ports::{Predictor, ProgressObserver};
use crate::domain::session::CancelHandle;
use crate::utils::error::{Result, TriageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

pub const ERROR_LABEL: &str = "Error";
pub const ERROR_CONFIDENCE: &str = "0%";
const CANCELLED_MESSAGE: &str = "Cancelled before prediction";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticColumns {
    pub label: String,
    pub confidence: String,
}

/// 以 tracing 記錄進度，大約每 10% 輸出一次 info
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        let step = (total / 10).max(1);
        if completed == total || completed % step == 0 {
            tracing::info!("⏳ Processed {}/{} records", completed, total);
        } else {
            tracing::debug!("⏳ Processed {}/{} records", completed, total);
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestrationReport {
    pub outcomes: Vec<ProcessingOutcome>,
    pub failures: Vec<RecordFailure>,
    pub cancelled: bool,
    /// 取消時尚未處理的筆數
    pub unprocessed: usize,
}

/// 對每筆紀錄呼叫一次預測。預設逐筆等待；`concurrency > 1` 時以索引標記結果，輸出順序不變。
pub struct Orchestrator {
    predictor: Arc<dyn Predictor>,
    columns: SyntheticColumns,
    concurrency: usize,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(predictor: Arc<dyn Predictor>, columns: SyntheticColumns) -> Self {
        Self {
            predictor,
            columns,
            concurrency: 1,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(
        &self,
        dataset: &mut Dataset,
        text_column: &TextColumn,
        cancel: &CancelHandle,
        progress: &dyn ProgressObserver,
    ) -> OrchestrationReport {
        let total = dataset.len();
        let texts: Vec<Option<String>> = dataset
            .records
            .iter()
            .map(|record| {
                // 只用修剪後的內容判斷是否空白，送出的是原始內容
                let text = record.get(&text_column.name);
                (!text.trim().is_empty()).then(|| text.to_string())
            })
            .collect();

        tracing::info!(
            "🤖 Predicting {} records with '{}' (concurrency {})",
            total,
            self.predictor.name(),
            self.concurrency
        );

        let mut outcomes: Vec<Option<ProcessingOutcome>> = vec![None; total];
        let cancelled = if self.concurrency <= 1 {
            self.run_sequential(texts, &mut outcomes, cancel, progress).await
        } else {
            self.run_bounded(texts, &mut outcomes, cancel, progress).await
        };

        let unprocessed = outcomes.iter().filter(|outcome| outcome.is_none()).count();
        let outcomes: Vec<ProcessingOutcome> = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    let message = if cancelled {
                        CANCELLED_MESSAGE
                    } else {
                        "Prediction task aborted"
                    };
                    ProcessingOutcome::Failed(message.to_string())
                })
            })
            .collect();

        self.write_synthetic_columns(dataset, &outcomes);

        let failures = outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                ProcessingOutcome::Failed(message) => Some(RecordFailure {
                    index,
                    message: message.clone(),
                }),
                _ => None,
            })
            .collect();

        OrchestrationReport {
            outcomes,
            failures,
            cancelled,
            unprocessed,
        }
    }

    async fn run_sequential(
        &self,
        texts: Vec<Option<String>>,
        outcomes: &mut [Option<ProcessingOutcome>],
        cancel: &CancelHandle,
        progress: &dyn ProgressObserver,
    ) -> bool {
        let total = texts.len();
        for (index, text) in texts.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!("🛑 Run cancelled at record {}/{}", index, total);
                return true;
            }

            let outcome = match text {
                None => ProcessingOutcome::Skipped,
                Some(text) => {
                    let result = predict_with_timeout(&*self.predictor, &text, self.timeout).await;
                    settle(index, result)
                }
            };
            outcomes[index] = Some(outcome);
            progress.on_progress(index + 1, total);
        }
        false
    }

    async fn run_bounded(
        &self,
        texts: Vec<Option<String>>,
        outcomes: &mut [Option<ProcessingOutcome>],
        cancel: &CancelHandle,
        progress: &dyn ProgressObserver,
    ) -> bool {
        let total = texts.len();
        let mut queue = texts.into_iter().enumerate();
        let mut in_flight: JoinSet<(usize, Result<PredictionResult>)> = JoinSet::new();
        let mut completed = 0usize;
        let mut cancelled = false;

        loop {
            while in_flight.len() < self.concurrency && !cancelled {
                if cancel.is_cancelled() {
                    tracing::warn!("🛑 Run cancelled with {} requests in flight", in_flight.len());
                    cancelled = true;
                    break;
                }
                match queue.next() {
                    Some((index, None)) => {
                        outcomes[index] = Some(ProcessingOutcome::Skipped);
                        completed += 1;
                        progress.on_progress(completed, total);
                    }
                    Some((index, Some(text))) => {
                        let predictor = Arc::clone(&self.predictor);
                        let timeout = self.timeout;
                        in_flight.spawn(async move {
                            let result = predict_with_timeout(&*predictor, &text, timeout).await;
                            (index, result)
                        });
                    }
                    None => break,
                }
            }

            match in_flight.join_next().await {
                Some(Ok((index, result))) => {
                    outcomes[index] = Some(settle(index, result));
                    completed += 1;
                    progress.on_progress(completed, total);
                }
                Some(Err(err)) => {
                    // 索引未知，結束後以失敗補上
                    tracing::error!("❌ Prediction task failed to complete: {}", err);
                }
                None => break,
            }
        }

        cancelled
    }

    /// 預測欄位名稱與原始欄位相同時加上 `_2`、`_3` 後綴，原始值保持不動
    fn resolve_synthetic_names(&self, dataset: &Dataset) -> (String, String) {
        if let [label, confidence] = dataset.synthetic_columns.as_slice() {
            return (label.clone(), confidence.clone());
        }

        let mut names = dataset.headers.clone();
        names.push(self.columns.label.clone());
        names.push(self.columns.confidence.clone());
        let mut resolved = normalize_headers(names).into_iter().rev();
        let confidence = resolved.next().unwrap_or_else(|| self.columns.confidence.clone());
        let label = resolved.next().unwrap_or_else(|| self.columns.label.clone());

        if label != self.columns.label || confidence != self.columns.confidence {
            tracing::warn!(
                "⚠️ Upload already has prediction columns, writing to '{}' / '{}'",
                label,
                confidence
            );
        }
        (label, confidence)
    }

    fn write_synthetic_columns(&self, dataset: &mut Dataset, outcomes: &[ProcessingOutcome]) {
        let (label_column, confidence_column) = self.resolve_synthetic_names(dataset);
        dataset.synthetic_columns = vec![label_column.clone(), confidence_column.clone()];

        for (record, outcome) in dataset.records.iter_mut().zip(outcomes) {
            let (label, confidence) = match outcome {
                ProcessingOutcome::Predicted(result) => match result.top() {
                    Some(top) => (top.label.clone(), format_confidence(top.probability)),
                    None => (ERROR_LABEL.to_string(), ERROR_CONFIDENCE.to_string()),
                },
                ProcessingOutcome::Skipped => (String::new(), String::new()),
                ProcessingOutcome::Failed(_) => {
                    (ERROR_LABEL.to_string(), ERROR_CONFIDENCE.to_string())
                }
            };
            record.set(&label_column, label);
            record.set(&confidence_column, confidence);
        }
    }
}

pub fn format_confidence(probability: f64) -> String {
    format!("{:.2}%", probability)
}

async fn predict_with_timeout(
    predictor: &dyn Predictor,
    text: &str,
    timeout: Duration,
) -> Result<PredictionResult> {
    match tokio::time::timeout(timeout, predictor.predict(text)).await {
        Ok(result) => result,
        Err(_) => Err(TriageError::ServiceUnavailable {
            message: format!("prediction timed out after {:?}", timeout),
        }),
    }
}

fn settle(index: usize, result: Result<PredictionResult>) -> ProcessingOutcome {
    let message = match result {
        Ok(prediction) if prediction.top().is_some() => {
            return ProcessingOutcome::Predicted(prediction)
        }
        Ok(_) => "service returned no predictions".to_string(),
        Err(err) => err.to_string(),
    };

    let failure = TriageError::RecordPredictionFailure {
        index,
        message: message.clone(),
    };
    tracing::warn!("⚠️ {}", failure);
    ProcessingOutcome::Failed(message)
}
