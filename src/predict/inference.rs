//! Single-match inference

use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};

use crate::data::Database;
use crate::features::{build_features, HistorySource, Matchup, TemporalQuery};
use crate::model::ModelArtifact;
use crate::predict::request::{
    KeyFactors, PlayerStatsPair, PlayerStatsView, PredictionRequest, PredictionResponse,
    PredictionSummary, ValidRequest,
};
use crate::{Config, Result, TennisError};

/// Prediction for one matchup
#[derive(Debug, Clone)]
pub struct MatchPrediction {
    pub matchup: Matchup,
    pub player1_win_probability: f64,
}

impl MatchPrediction {
    pub fn player2_win_probability(&self) -> f64 {
        1.0 - self.player1_win_probability
    }

    pub fn winner(&self) -> &str {
        if self.player1_win_probability >= 0.5 {
            &self.matchup.player1.name
        } else {
            &self.matchup.player2.name
        }
    }

    /// Probability of the predicted winner
    pub fn confidence(&self) -> f64 {
        self.player1_win_probability
            .max(self.player2_win_probability())
    }
}

/// Predictor over a trained artifact
pub struct Predictor {
    artifact: ModelArtifact,
    database_path: PathBuf,
    rating_system: String,
}

impl Predictor {
    pub fn new<P: AsRef<Path>>(artifact: ModelArtifact, database_path: P, rating_system: &str) -> Self {
        Predictor {
            artifact,
            database_path: database_path.as_ref().to_path_buf(),
            rating_system: rating_system.to_string(),
        }
    }

    /// Load the artifact from the configured model directory
    pub fn load(config: &Config) -> Result<Self> {
        let artifact = ModelArtifact::load(&config.data.model_dir)?;
        log::info!(
            "Loaded {} trained at {} on {} samples",
            artifact.metadata.model_type,
            artifact.metadata.trained_at,
            artifact.metadata.samples.total
        );
        Ok(Self::new(
            artifact,
            &config.data.database_path,
            &config.data.rating_system,
        ))
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Open a read-only connection for one request; closed when dropped
    fn open_database(&self) -> Result<Database> {
        Ok(Database::open_read_only(&self.database_path)?.with_rating_system(&self.rating_system))
    }

    /// Predict against the configured database
    pub fn predict(&self, request: &ValidRequest) -> Result<MatchPrediction> {
        let db = self.open_database()?;
        self.predict_with(&db, request)
    }

    /// Predict against any history source
    pub fn predict_with<S: HistorySource + ?Sized>(
        &self,
        source: &S,
        request: &ValidRequest,
    ) -> Result<MatchPrediction> {
        let player1 = source
            .find_player_by_name(&request.player1)?
            .ok_or_else(|| TennisError::NotFound(request.player1.clone()))?;
        let player2 = source
            .find_player_by_name(&request.player2)?
            .ok_or_else(|| TennisError::NotFound(request.player2.clone()))?;
        if player1.id == player2.id {
            return Err(TennisError::InvalidInput(
                "player1_name and player2_name must be different players".to_string(),
            ));
        }

        let as_of = request.match_date.unwrap_or_else(today);
        let query = TemporalQuery::new(source, self.artifact.feature_config());
        let matchup = build_features(&query, player1.id, player2.id, request.surface, as_of)?;
        let probability = self.artifact.probability(&matchup.features);
        log::debug!(
            "{} vs {} on {} as of {}: p1={:.4}",
            matchup.player1.name,
            matchup.player2.name,
            matchup.surface,
            as_of,
            probability
        );

        Ok(MatchPrediction {
            matchup,
            player1_win_probability: probability,
        })
    }

    /// Validate, predict and wrap the outcome as a response document
    pub fn respond(&self, request: &PredictionRequest) -> PredictionResponse {
        let valid = match request.validate() {
            Ok(valid) => valid,
            Err(e) => return PredictionResponse::failure(&e),
        };
        match self.predict(&valid) {
            Ok(prediction) => self.success(&prediction),
            Err(e) => {
                log::warn!("Prediction failed: {}", e);
                PredictionResponse::failure(&e)
            }
        }
    }

    /// Like [`Predictor::respond`] against a given source
    pub fn respond_with<S: HistorySource + ?Sized>(
        &self,
        source: &S,
        request: &PredictionRequest,
    ) -> PredictionResponse {
        match request
            .validate()
            .and_then(|valid| self.predict_with(source, &valid))
        {
            Ok(prediction) => self.success(&prediction),
            Err(e) => PredictionResponse::failure(&e),
        }
    }

    fn success(&self, prediction: &MatchPrediction) -> PredictionResponse {
        let m = &prediction.matchup;
        let f = &m.features;
        let config = self.artifact.feature_config();
        PredictionResponse {
            success: true,
            player1: Some(m.player1.name.clone()),
            player2: Some(m.player2.name.clone()),
            surface: Some(m.surface),
            match_date: Some(m.as_of),
            prediction: Some(PredictionSummary {
                winner: prediction.winner().to_string(),
                player1_win_probability: prediction.player1_win_probability,
                player2_win_probability: prediction.player2_win_probability(),
                confidence: prediction.confidence(),
            }),
            key_factors: Some(KeyFactors {
                surface_elo_difference: f.surface_elo_diff,
                form_difference: f.form_diff_20,
                surface_form_difference: f.surface_form_diff_10,
                h2h_advantage: f.h2h_surface_advantage,
                player1_surface_wr: f.p1_surface_wr_12mo,
                player2_surface_wr: f.p2_surface_wr_12mo,
            }),
            player_stats: Some(PlayerStatsPair {
                player1: PlayerStatsView::from_stats(&m.stats1, config),
                player2: PlayerStatsView::from_stats(&m.stats2, config),
            }),
            error: None,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Format a prediction for display
pub fn format_prediction(prediction: &MatchPrediction) -> String {
    let m = &prediction.matchup;
    let f = &m.features;
    format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} vs {} ({}, as of {})
├─────────────────────────────────────────────────┤
│  Winner:           {} {:.1}%
│  {:<17} {:.1}%
│  {:<17} {:.1}%
│  Surface Elo diff: {:+.0}
│  Form diff (20):   {:+.2}
│  H2H on surface:   {:+.0}
└─────────────────────────────────────────────────┘
"#,
        m.player1.name,
        m.player2.name,
        m.surface,
        m.as_of,
        prediction.winner(),
        prediction.confidence() * 100.0,
        format!("{}:", m.player1.name),
        prediction.player1_win_probability * 100.0,
        format!("{}:", m.player2.name),
        prediction.player2_win_probability() * 100.0,
        f.surface_elo_diff,
        f.form_diff_20,
        f.h2h_surface_advantage
    )
}
