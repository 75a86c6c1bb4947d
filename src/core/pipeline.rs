use crate::config::TriageConfig;
use crate::core::classifier::ColumnClassifier;
use crate::core::exporter::Exporter;
use crate::core::loader::FileLoader;
use crate::core::orchestrator::{Orchestrator, SyntheticColumns, TracingProgress};
use crate::core::stitcher::Stitcher;
use crate::core::{Pipeline, PreparedDataset, Predictor, ProgressObserver, Storage, TransformResult};
use crate::domain::model::{ProcessingOutcome, RunSummary};
use crate::domain::session::UploadSession;
use crate::utils::error::{Result, TriageError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// 批次上傳流程：Loader → Classifier → Stitcher → Orchestrator → Exporter
pub struct BulkPipeline<S: Storage> {
    storage: S,
    config: TriageConfig,
    predictor: Arc<dyn Predictor>,
    progress: Arc<dyn ProgressObserver>,
}

impl<S: Storage> BulkPipeline<S> {
    pub fn new(storage: S, config: TriageConfig, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            storage,
            config,
            predictor,
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    fn loader(&self) -> FileLoader {
        FileLoader::new(self.config.keywords(), self.config.ingest.header_scan_rows)
    }

    fn classifier(&self) -> ColumnClassifier {
        ColumnClassifier::new(self.config.keywords())
            .with_explicit_column(self.config.ingest.text_column.clone())
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.predictor),
            SyntheticColumns {
                label: self.config.export.label_column.clone(),
                confidence: self.config.export.confidence_column.clone(),
            },
        )
        .with_concurrency(self.config.processing.concurrency)
        .with_timeout(Duration::from_secs(self.config.api.timeout_seconds))
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for BulkPipeline<S> {
    async fn extract(&self, session: &UploadSession) -> Result<PreparedDataset> {
        let input = session.input();
        let mut dataset = self.loader().load(input)?;

        tracing::debug!("Detected headers: {:?}", dataset.headers);
        let text_column = self.classifier().resolve(&dataset.headers)?;
        tracing::info!("📝 Using '{}' as the feedback text column", text_column.name);

        let stitch = Stitcher::new(
            self.config.ingest.stitch_mode,
            self.config.ingest.key_column.clone(),
        )
        .stitch(&mut dataset, &text_column);

        // 全部都是孤立片段時等同沒有資料
        if dataset.is_empty() {
            return Err(TriageError::EmptyFile {
                file: input.name.clone(),
            });
        }

        Ok(PreparedDataset {
            dataset,
            text_column,
            stitch,
        })
    }

    async fn transform(
        &self,
        prepared: PreparedDataset,
        session: &UploadSession,
    ) -> Result<TransformResult> {
        let PreparedDataset {
            mut dataset,
            text_column,
            stitch,
        } = prepared;

        let report = self
            .orchestrator()
            .run(
                &mut dataset,
                &text_column,
                &session.cancel_handle(),
                self.progress.as_ref(),
            )
            .await;

        let count = |wanted: fn(&ProcessingOutcome) -> bool| {
            report.outcomes.iter().filter(|o| wanted(o)).count()
        };
        let summary = RunSummary {
            source_file: session.input().name.clone(),
            text_column: text_column.name.clone(),
            total: dataset.len(),
            predicted: count(|o| matches!(o, ProcessingOutcome::Predicted(_))),
            skipped: count(|o| matches!(o, ProcessingOutcome::Skipped)),
            failed: report.failures.len(),
            stitched: stitch.stitched,
            orphans_dropped: stitch.orphans_dropped,
            failures: report.failures,
            cancelled: report.cancelled,
            unprocessed: report.unprocessed,
            started_at: session.created_at(),
            finished_at: Utc::now(),
        };

        if summary.failed > 0 {
            tracing::warn!("⚠️ {} failed of {} records", summary.failed, summary.total);
        }
        tracing::info!("📊 {}", summary);

        Ok(TransformResult {
            dataset,
            outcomes: report.outcomes,
            summary,
        })
    }

    async fn load(&self, result: &TransformResult, session: &UploadSession) -> Result<String> {
        let exporter = Exporter::new(self.config.export.format);
        let file_name = exporter.file_name(&self.config.export.file_prefix, session.created_at());
        let bytes = exporter.export(&result.dataset, &result.summary)?;

        tracing::debug!("Writing {} ({} bytes) to storage", file_name, bytes.len());
        self.storage.write_file(&file_name, &bytes).await?;

        Ok(format!(
            "{}/{}",
            self.config.export.output_path.trim_end_matches('/'),
            file_name
        ))
    }
}
