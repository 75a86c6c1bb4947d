use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet export error: {0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unreadable file '{file}': {reason}")]
    UnreadableFile { file: String, reason: String },

    #[error("File '{file}' contains no data records")]
    EmptyFile { file: String },

    #[error("No feedback text column found; detected headers: [{}]", headers.join(", "))]
    NoTextColumnFound { headers: Vec<String> },

    #[error("Prediction failed for record {index}: {message}")]
    RecordPredictionFailure { index: usize, message: String },

    #[error("Prediction service returned {status}: {message}")]
    PredictionError { status: u16, message: String },

    #[error("Prediction service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Upload session '{session_id}' is {state}; reset it before starting another run")]
    SessionBusy { session_id: String, state: String },

    #[error("Run cancelled after {completed} of {total} records")]
    Cancelled { completed: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Network,
    Configuration,
    Output,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TriageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TriageError::CsvError(_)
            | TriageError::UnreadableFile { .. }
            | TriageError::EmptyFile { .. }
            | TriageError::NoTextColumnFound { .. } => ErrorCategory::Input,
            TriageError::ApiError(_)
            | TriageError::RecordPredictionFailure { .. }
            | TriageError::PredictionError { .. }
            | TriageError::ServiceUnavailable { .. } => ErrorCategory::Network,
            TriageError::ConfigValidationError { .. }
            | TriageError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            TriageError::ZipError(_)
            | TriageError::XlsxError(_)
            | TriageError::IoError(_)
            | TriageError::SerializationError(_) => ErrorCategory::Output,
            TriageError::SessionBusy { .. } | TriageError::Cancelled { .. } => {
                ErrorCategory::Session
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單筆失敗會被記錄並以哨兵值取代，不會中止整批
            TriageError::RecordPredictionFailure { .. } | TriageError::Cancelled { .. } => {
                ErrorSeverity::Low
            }
            TriageError::ApiError(_)
            | TriageError::PredictionError { .. }
            | TriageError::ServiceUnavailable { .. }
            | TriageError::SessionBusy { .. } => ErrorSeverity::Medium,
            TriageError::CsvError(_)
            | TriageError::UnreadableFile { .. }
            | TriageError::EmptyFile { .. }
            | TriageError::NoTextColumnFound { .. }
            | TriageError::ConfigValidationError { .. }
            | TriageError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            TriageError::ZipError(_)
            | TriageError::XlsxError(_)
            | TriageError::IoError(_)
            | TriageError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// 給終端使用者看的簡短訊息
    pub fn user_friendly_message(&self) -> String {
        match self {
            TriageError::UnreadableFile { file, .. } => {
                format!("Could not read '{}'. Is it a valid CSV or Excel file?", file)
            }
            TriageError::EmptyFile { file } => format!("'{}' has no data rows to classify", file),
            TriageError::NoTextColumnFound { headers } => format!(
                "Could not find a feedback text column. Detected headers: {}",
                headers.join(", ")
            ),
            TriageError::ServiceUnavailable { .. } | TriageError::ApiError(_) => {
                "The prediction service could not be reached".to_string()
            }
            TriageError::ConfigValidationError { field, .. }
            | TriageError::InvalidConfigValueError { field, .. } => {
                format!("Configuration problem in '{}': {}", field, self)
            }
            _ => self.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => match self {
                TriageError::NoTextColumnFound { .. } => {
                    "Rename the feedback column (e.g. 'Comments') or set ingest.text_column"
                }
                _ => "Check the file is a UTF-8 CSV/TSV or an Excel workbook with data rows",
            },
            ErrorCategory::Network => {
                "Check api.endpoint and that the prediction service reports healthy"
            }
            ErrorCategory::Configuration => "Fix the configuration file and retry",
            ErrorCategory::Output => "Check the output directory exists and is writable",
            ErrorCategory::Session => "Start a new upload session",
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
