//! Model training
//!
//! Stratified splitting, the burn fitting loop, and evaluation metrics.

pub mod metrics;
pub mod split;
pub mod trainer;

pub use metrics::{EvaluationMetrics, TrainingMetrics};
pub use trainer::{train_from_corpus, train_model, LogisticTrainer, TrainingBackend};
