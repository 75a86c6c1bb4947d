use crate::domain::model::{PredictionResult, PreparedDataset, TransformResult};
use crate::domain::session::UploadSession;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 單筆文字分類，由遠端服務或本地備援實作
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, text: &str) -> Result<PredictionResult>;

    fn name(&self) -> &str;
}

/// 每完成一筆就回報一次 `completed / total`，僅供觀察
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self, session: &UploadSession) -> Result<PreparedDataset>;
    async fn transform(
        &self,
        prepared: PreparedDataset,
        session: &UploadSession,
    ) -> Result<TransformResult>;
    async fn load(&self, result: &TransformResult, session: &UploadSession) -> Result<String>;
}
