use crate::domain::model::RunSummary;
use crate::utils::error::{Result, TriageError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 使用者上傳的原始檔案
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            bytes,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// 可跨 task 傳遞的取消旗標；只在兩筆紀錄之間檢查
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 一次上傳到下載的生命週期。由呼叫端持有，每次新上傳就建立新的 session。
#[derive(Debug)]
pub struct UploadSession {
    id: String,
    input: InputFile,
    state: SessionState,
    cancel: CancelHandle,
    created_at: DateTime<Utc>,
    summary: Option<RunSummary>,
    output_path: Option<String>,
}

impl UploadSession {
    pub fn new(input: InputFile) -> Self {
        let created_at = Utc::now();
        let stem: String = input
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self {
            id: format!("{}-{}", created_at.format("%Y%m%dT%H%M%S%.3f"), stem),
            input,
            state: SessionState::Ready,
            cancel: CancelHandle::default(),
            created_at,
            summary: None,
            output_path: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &InputFile {
        &self.input
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn output_path(&self) -> Option<&str> {
        self.output_path.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 只有 Ready 狀態可以開始；同一個 session 不允許重複執行
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(TriageError::SessionBusy {
                session_id: self.id.clone(),
                state: self.state.to_string(),
            });
        }
        self.state = SessionState::Running;
        Ok(())
    }

    pub fn complete(&mut self, summary: RunSummary, output_path: String) {
        self.state = SessionState::Completed;
        self.summary = Some(summary);
        self.output_path = Some(output_path);
    }

    /// 取消的執行不輸出檔案，但保留摘要供呼叫端查看
    pub fn mark_cancelled(&mut self, summary: RunSummary) {
        self.state = SessionState::Cancelled;
        self.summary = Some(summary);
        self.output_path = None;
    }

    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }

    /// 丟棄上一次執行的結果，保留同一份輸入
    pub fn reset(&mut self) {
        self.state = SessionState::Ready;
        self.summary = None;
        self.output_path = None;
        self.cancel.clear();
    }
}
