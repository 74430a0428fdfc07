//! Trained model on disk
//!
//! `model.json` holds the scaler and classifier, `metadata.json` describes how
//! they were produced. An artifact is never modified after training.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::features::{FeatureConfig, FeatureVector, FEATURE_DIM, FEATURE_NAMES};
use crate::model::{LogisticRegression, StandardScaler};
use crate::training::metrics::TrainingMetrics;
use crate::{Result, TennisError, TrainingConfig};

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const MODEL_TYPE: &str = "logistic_regression";

/// The fitted (scaler, classifier) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
}

impl FittedModel {
    /// Classifier output for one orientation of the matchup
    pub fn raw_probability(&self, features: &FeatureVector) -> f64 {
        let scaled = self.scaler.transform(&features.to_array());
        self.classifier.probability(&scaled)
    }

    /// P(player 1 wins), averaged over both orientations so that swapping
    /// the players yields exactly the complementary probability
    pub fn probability(&self, features: &FeatureVector) -> f64 {
        let forward = self.raw_probability(features);
        let reverse = self.raw_probability(&features.mirrored());
        0.5 + (forward - reverse) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub total: usize,
    pub train: usize,
    pub test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub samples: SampleCounts,
    pub first_match: Option<NaiveDate>,
    pub last_match: Option<NaiveDate>,
    pub feature_config: FeatureConfig,
    pub hyperparameters: TrainingConfig,
    pub metrics: TrainingMetrics,
}

/// A trained model plus its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub model: FittedModel,
    pub metadata: ModelMetadata,
}

impl ModelArtifact {
    pub fn probability(&self, features: &FeatureVector) -> f64 {
        self.model.probability(features)
    }

    pub fn feature_config(&self) -> &FeatureConfig {
        &self.metadata.feature_config
    }

    /// Write both files next to their targets first, then rename them into
    /// place. A failed write leaves any previous artifact untouched.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let files = [
            (MODEL_FILE, serde_json::to_string_pretty(&self.model)?),
            (METADATA_FILE, serde_json::to_string_pretty(&self.metadata)?),
        ];

        let staged: Vec<(PathBuf, PathBuf)> = files
            .iter()
            .map(|(name, _)| (staging_path(dir, name), dir.join(name)))
            .collect();
        let written = files
            .iter()
            .zip(&staged)
            .try_for_each(|((_, body), (tmp, _))| std::fs::write(tmp, body));
        if let Err(e) = written {
            discard_staged(&staged);
            return Err(e.into());
        }

        for (tmp, target) in &staged {
            if let Err(e) = std::fs::rename(tmp, target) {
                discard_staged(&staged);
                return Err(e.into());
            }
        }
        log::info!("Saved model to {}", dir.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let model_path = dir.join(MODEL_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        if !model_path.exists() || !metadata_path.exists() {
            return Err(TennisError::NoModel(dir.display().to_string()));
        }

        let model: FittedModel = serde_json::from_str(&std::fs::read_to_string(&model_path)?)?;
        let metadata: ModelMetadata =
            serde_json::from_str(&std::fs::read_to_string(&metadata_path)?)?;

        let artifact = ModelArtifact { model, metadata };
        artifact.validate()?;
        Ok(artifact)
    }

    /// The stored layout must match the features this build produces
    fn validate(&self) -> Result<()> {
        if self.metadata.model_type != MODEL_TYPE {
            return Err(TennisError::ModelMismatch(format!(
                "unsupported model type {:?}",
                self.metadata.model_type
            )));
        }
        if self.metadata.feature_names.iter().ne(FEATURE_NAMES.iter()) {
            return Err(TennisError::ModelMismatch(
                "feature names or order differ".to_string(),
            ));
        }
        if self.model.scaler.dim() != FEATURE_DIM
            || self.model.scaler.scale.len() != FEATURE_DIM
            || self.model.classifier.dim() != FEATURE_DIM
        {
            return Err(TennisError::ModelMismatch(format!(
                "expected {} coefficients",
                FEATURE_DIM
            )));
        }
        Ok(())
    }
}

fn staging_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.tmp", name))
}

fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if tmp.is_file() {
            if let Err(e) = std::fs::remove_file(tmp) {
                log::warn!("Could not remove {}: {}", tmp.display(), e);
            }
        }
    }
}
