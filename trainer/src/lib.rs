pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod train;

pub use config::{OptimizerKind, TrainingConfig};
pub use error::{Result, TrainerErr};
pub use metrics::TrainMetrics;
pub use train::Trainer;
