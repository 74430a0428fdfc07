//! Scaler, classifier and the persisted model artifact

pub mod artifact;
pub mod logistic;
pub mod scaler;

pub use artifact::{FittedModel, ModelArtifact, ModelMetadata, SampleCounts};
pub use logistic::LogisticRegression;
pub use scaler::StandardScaler;
