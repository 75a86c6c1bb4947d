pub mod classifier;
pub mod etl;
pub mod exporter;
pub mod loader;
pub mod orchestrator;
pub mod pipeline;
pub mod stitcher;

pub use crate::domain::model::{Dataset, PreparedDataset, Record, TransformResult};
pub use crate::domain::ports::{Pipeline, Predictor, ProgressObserver, Storage};
pub use crate::utils::error::Result;
