use crate::core::Pipeline;
use crate::domain::model::RunSummary;
use crate::domain::session::UploadSession;
use crate::utils::error::{Result, TriageError};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_path: String,
    pub summary: RunSummary,
}

pub struct TriageEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> TriageEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    /// 執行一次完整的上傳流程。檔案層級錯誤會在任何預測呼叫前中止；
    /// 單筆預測失敗只會出現在摘要裡。
    pub async fn run(&self, session: &mut UploadSession) -> Result<RunReport> {
        session.begin()?;
        tracing::info!("🚀 Starting run {} for '{}'", session.id(), session.input().name);

        match self.execute(session).await {
            Ok((summary, Some(output_path))) => {
                session.complete(summary.clone(), output_path.clone());
                Ok(RunReport {
                    output_path,
                    summary,
                })
            }
            Ok((summary, None)) => {
                let total = summary.total;
                let completed = total.saturating_sub(summary.unprocessed);
                session.mark_cancelled(summary);
                Err(TriageError::Cancelled { completed, total })
            }
            Err(e) => {
                session.fail();
                Err(e)
            }
        }
    }

    async fn execute(&self, session: &UploadSession) -> Result<(RunSummary, Option<String>)> {
        tracing::info!("Extracting records...");
        let prepared = self.pipeline.extract(session).await?;
        tracing::info!(
            "Extracted {} records ({} fragments stitched)",
            prepared.dataset.len(),
            prepared.stitch.stitched
        );

        tracing::info!("Predicting...");
        let result = self.pipeline.transform(prepared, session).await?;
        if result.summary.cancelled {
            tracing::warn!("🛑 Run {} cancelled, no export written", session.id());
            return Ok((result.summary, None));
        }

        tracing::info!("Exporting...");
        let output_path = self.pipeline.load(&result, session).await?;
        tracing::info!("📁 Output saved to: {}", output_path);

        Ok((result.summary, Some(output_path)))
    }
}
