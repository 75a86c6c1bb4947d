pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TriageConfig;

pub use adapters::{fallback::KeywordFallbackPredictor, http::HttpPredictor, storage::LocalStorage};
pub use core::{etl::TriageEngine, pipeline::BulkPipeline};
pub use domain::session::{InputFile, UploadSession};
pub use utils::error::{Result, TriageError};
