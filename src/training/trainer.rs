//! Logistic regression training with burn
//!
//! Full-batch SGD on a single zero-initialised `Linear` layer with an L2 penalty
//! on the weights. The fitted parameters are exported to plain f64 so serving
//! does not need a tensor backend.

use burn::backend::{Autodiff, NdArray};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use chrono::Utc;
use std::collections::BTreeMap;

use crate::data::{read_corpus, LabeledRow};
use crate::features::{FeatureConfig, FEATURE_DIM, FEATURE_NAMES};
use crate::model::artifact::MODEL_TYPE;
use crate::model::{
    FittedModel, LogisticRegression, ModelArtifact, ModelMetadata, SampleCounts, StandardScaler,
};
use crate::training::metrics::{
    accuracy, feature_importance, roc_auc, CrossValidation, EvaluationMetrics, SurfaceMetrics,
    TrainingMetrics,
};
use crate::training::split::{stratified_folds, stratified_split, TEST_FRACTION};
use crate::{Config, Result, Surface, TennisError, TrainingConfig};

pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Fits one logistic regression on already scaled rows
pub struct LogisticTrainer<B: AutodiffBackend> {
    device: B::Device,
    epochs: usize,
    learning_rate: f64,
    l2_penalty: f64,
}

impl<B: AutodiffBackend> LogisticTrainer<B> {
    pub fn new(device: B::Device, config: &TrainingConfig) -> Self {
        LogisticTrainer {
            device,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            l2_penalty: config.l2_penalty,
        }
    }

    pub fn fit(&self, x: &[[f64; FEATURE_DIM]], y: &[u8]) -> Result<LogisticRegression> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(TennisError::Training(format!(
                "expected matching non-empty inputs, got {} rows and {} labels",
                n,
                y.len()
            )));
        }

        let flat: Vec<f32> = x.iter().flatten().map(|&v| v as f32).collect();
        let targets: Vec<f32> = y.iter().map(|&t| t as f32).collect();
        let x_train = Tensor::<B, 2>::from_data(TensorData::new(flat, [n, FEATURE_DIM]), &self.device);
        let y_train = Tensor::<B, 2>::from_data(TensorData::new(targets, [n, 1]), &self.device);

        let mut model: Linear<B> = LinearConfig::new(FEATURE_DIM, 1)
            .with_initializer(Initializer::Zeros)
            .init(&self.device);
        let mut optimizer = SgdConfig::new().init::<B, Linear<B>>();

        for epoch in 0..self.epochs {
            let probs = sigmoid(model.forward(x_train.clone()));
            let bce = binary_cross_entropy(probs, y_train.clone());
            let penalty = model
                .weight
                .val()
                .powf_scalar(2.0)
                .sum()
                .mul_scalar(self.l2_penalty / 2.0);
            let loss = bce + penalty;

            if epoch % 100 == 0 || epoch + 1 == self.epochs {
                let loss_val: f32 = loss.clone().into_scalar().elem();
                log::debug!("Epoch {}/{}: loss={:.5}", epoch + 1, self.epochs, loss_val);
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(self.learning_rate, model, grads);
        }

        let coefficients: Vec<f64> = model
            .weight
            .val()
            .into_data()
            .iter::<f32>()
            .map(f64::from)
            .collect();
        let intercept = model
            .bias
            .as_ref()
            .and_then(|b| b.val().into_data().iter::<f32>().next())
            .map(f64::from)
            .unwrap_or(0.0);

        if coefficients.len() != FEATURE_DIM || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TennisError::Training(
                "optimisation produced invalid coefficients".to_string(),
            ));
        }
        Ok(LogisticRegression {
            coefficients,
            intercept,
        })
    }
}

fn binary_cross_entropy<B: AutodiffBackend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let eps = 1e-7;
    let probs_clamped = probs.clamp(eps, 1.0 - eps);
    let loss = targets.clone().neg() * probs_clamped.clone().log()
        - (targets.neg() + 1.0) * (probs_clamped.neg() + 1.0).log();
    loss.mean()
}

fn select<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

/// Scaler fitted on `x` only, then the classifier on the scaled rows
fn fit_pipeline(
    trainer: &LogisticTrainer<TrainingBackend>,
    x: &[[f64; FEATURE_DIM]],
    y: &[u8],
) -> Result<FittedModel> {
    let scaler = StandardScaler::fit(x)?;
    let classifier = trainer.fit(&scaler.transform_all(x), y)?;
    Ok(FittedModel { scaler, classifier })
}

fn cross_validate(
    trainer: &LogisticTrainer<TrainingBackend>,
    rows: &[LabeledRow],
    x: &[[f64; FEATURE_DIM]],
    y: &[u8],
    config: &TrainingConfig,
) -> Result<CrossValidation> {
    let folds = stratified_folds(y, config.cv_folds, config.seed)?;
    let mut accuracies = Vec::with_capacity(folds.len());
    for (k, held_out) in folds.iter().enumerate() {
        let fit_idx: Vec<usize> = (0..y.len())
            .filter(|i| held_out.binary_search(i).is_err())
            .collect();
        let model = fit_pipeline(trainer, &select(x, &fit_idx), &select(y, &fit_idx))?;
        let probs: Vec<f64> = held_out
            .iter()
            .map(|&i| model.probability(&rows[i].features))
            .collect();
        let acc = accuracy(&probs, &select(y, held_out));
        log::info!("Fold {}/{}: accuracy={:.1}%", k + 1, folds.len(), acc * 100.0);
        accuracies.push(acc);
    }
    Ok(CrossValidation::from_folds(accuracies))
}

/// Train and evaluate a model on a labeled corpus
pub fn train_model(
    rows: &[LabeledRow],
    feature_config: &FeatureConfig,
    config: &TrainingConfig,
) -> Result<ModelArtifact> {
    let positives = rows.iter().filter(|r| r.target == 1).count();
    if positives == 0 || positives == rows.len() {
        return Err(TennisError::Training(format!(
            "corpus of {} rows needs both outcomes ({} positive)",
            rows.len(),
            positives
        )));
    }

    let x: Vec<[f64; FEATURE_DIM]> = rows.iter().map(|r| r.features.to_array()).collect();
    let y: Vec<u8> = rows.iter().map(|r| r.target).collect();
    let (train_idx, test_idx) = stratified_split(&y, TEST_FRACTION, config.seed);

    let train_rows = select(rows, &train_idx);
    let test_rows = select(rows, &test_idx);
    let x_train = select(&x, &train_idx);
    let y_train = select(&y, &train_idx);
    let y_test = select(&y, &test_idx);

    let trainer = LogisticTrainer::<TrainingBackend>::new(Default::default(), config);

    log::info!(
        "Fitting {} on {} rows for {} epochs (lr={}, l2={})",
        MODEL_TYPE,
        train_rows.len(),
        config.epochs,
        config.learning_rate,
        config.l2_penalty
    );
    let model = fit_pipeline(&trainer, &x_train, &y_train)?;
    log::debug!("Scaler mean={:?} scale={:?}", model.scaler.mean, model.scaler.scale);

    let predict = |part: &[LabeledRow]| -> Vec<f64> {
        part.iter().map(|r| model.probability(&r.features)).collect()
    };
    let train_probs = predict(&train_rows);
    let test_probs = predict(&test_rows);

    let cross_validation = cross_validate(&trainer, &train_rows, &x_train, &y_train, config)?;

    let mut per_surface = BTreeMap::new();
    for surface in Surface::ALL {
        let (probs, labels): (Vec<f64>, Vec<u8>) = test_rows
            .iter()
            .zip(&test_probs)
            .filter(|(r, _)| r.surface == surface)
            .map(|(r, &p)| (p, r.target))
            .unzip();
        if probs.is_empty() {
            continue;
        }
        per_surface.insert(
            surface.to_string(),
            SurfaceMetrics {
                samples: probs.len(),
                accuracy: accuracy(&probs, &labels),
                auc: roc_auc(&probs, &labels),
            },
        );
    }

    let metrics = TrainingMetrics {
        train: EvaluationMetrics::compute(&train_probs, &y_train),
        test: EvaluationMetrics::compute(&test_probs, &y_test),
        cross_validation,
        per_surface,
        feature_importance: feature_importance(&model.classifier),
    };
    log::info!("Training complete\n{}", metrics);

    let metadata = ModelMetadata {
        model_type: MODEL_TYPE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        trained_at: Utc::now(),
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        samples: SampleCounts {
            total: rows.len(),
            train: train_rows.len(),
            test: test_rows.len(),
        },
        first_match: rows.iter().map(|r| r.match_date).min(),
        last_match: rows.iter().map(|r| r.match_date).max(),
        feature_config: feature_config.clone(),
        hyperparameters: config.clone(),
        metrics,
    };
    Ok(ModelArtifact { model, metadata })
}

/// Read the corpus, train, and save the artifact to the model directory
pub fn train_from_corpus(config: &Config, corpus_path: Option<&str>) -> Result<ModelArtifact> {
    let path = corpus_path.unwrap_or(&config.data.corpus_path);
    let rows = read_corpus(path)?;
    log::info!("Loaded {} rows from {}", rows.len(), path);
    let artifact = train_model(&rows, &config.features, &config.training)?;
    artifact.save(&config.data.model_dir)?;
    Ok(artifact)
}
