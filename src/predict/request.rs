//! Serving request and response documents

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureConfig, PlayerStats};
use crate::{Hand, Result, Surface, TennisError};

/// Incoming JSON request; every field is optional until validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub player1_name: Option<String>,
    #[serde(default)]
    pub player2_name: Option<String>,
    #[serde(default)]
    pub surface: Option<String>,
    /// `YYYY-MM-DD`; defaults to today
    #[serde(default)]
    pub match_date: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub player1: String,
    pub player2: String,
    pub surface: Surface,
    pub match_date: Option<NaiveDate>,
}

impl PredictionRequest {
    pub fn new(player1: &str, player2: &str, surface: &str) -> Self {
        PredictionRequest {
            player1_name: Some(player1.to_string()),
            player2_name: Some(player2.to_string()),
            surface: Some(surface.to_string()),
            match_date: None,
        }
    }

    /// Check the request without touching storage
    pub fn validate(&self) -> Result<ValidRequest> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let (Some(player1), Some(player2), Some(surface)) = (
            present(&self.player1_name),
            present(&self.player2_name),
            present(&self.surface),
        ) else {
            return Err(TennisError::InvalidInput(
                "Missing required fields: player1_name, player2_name, surface".to_string(),
            ));
        };

        let surface = Surface::parse(&surface).ok_or_else(|| {
            TennisError::InvalidInput(
                "Invalid surface. Must be one of: Hard, Clay, Grass".to_string(),
            )
        })?;

        if player1.to_lowercase() == player2.to_lowercase() {
            return Err(TennisError::InvalidInput(
                "player1_name and player2_name must be different players".to_string(),
            ));
        }

        let match_date = match present(&self.match_date) {
            None => None,
            Some(d) => Some(NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|_| {
                TennisError::InvalidInput(format!("Invalid match_date {:?}, expected YYYY-MM-DD", d))
            })?),
        };

        Ok(ValidRequest {
            player1,
            player2,
            surface,
            match_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub winner: String,
    pub player1_win_probability: f64,
    pub player2_win_probability: f64,
    pub confidence: f64,
}

/// The differences that drive the prediction most
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactors {
    pub surface_elo_difference: f64,
    pub form_difference: f64,
    pub surface_form_difference: f64,
    pub h2h_advantage: f64,
    pub player1_surface_wr: f64,
    pub player2_surface_wr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsView {
    pub surface_elo: f64,
    pub overall_elo: f64,
    pub surface_wr_12mo: f64,
    pub surface_wr_career: f64,
    pub recent_form: f64,
    pub surface_form: f64,
    pub age: f64,
    pub height: f64,
    pub hand: String,
}

impl PlayerStatsView {
    pub fn from_stats(stats: &PlayerStats, config: &FeatureConfig) -> Self {
        PlayerStatsView {
            surface_elo: stats.surface_elo,
            overall_elo: stats.overall_elo,
            surface_wr_12mo: stats.surface_wr_12mo,
            surface_wr_career: stats.surface_wr_career,
            recent_form: stats.recent_form,
            surface_form: stats.surface_form,
            age: stats.age.unwrap_or(config.default_age_years),
            height: stats.height_cm.unwrap_or(config.default_height_cm),
            hand: stats.hand.map_or("U", |h: Hand| h.code()).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatsPair {
    pub player1: PlayerStatsView,
    pub player2: PlayerStatsView,
}

/// Outgoing JSON response; carries either a prediction or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<Surface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_factors: Option<KeyFactors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_stats: Option<PlayerStatsPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResponse {
    pub fn failure(error: &TennisError) -> Self {
        let message = match error {
            // Input errors are returned without the category prefix
            TennisError::InvalidInput(msg) => msg.clone(),
            other => other.to_string(),
        };
        PredictionResponse {
            success: false,
            player1: None,
            player2: None,
            surface: None,
            match_date: None,
            prediction: None,
            key_factors: None,
            player_stats: None,
            error: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let mut request = PredictionRequest::new(" Alice Ace ", "Bob Baseline", "clay");
        request.match_date = Some("2024-05-20".to_string());
        let valid = request.validate().unwrap();
        assert_eq!(valid.player1, "Alice Ace");
        assert_eq!(valid.surface, Surface::Clay);
        assert_eq!(valid.match_date, NaiveDate::from_ymd_opt(2024, 5, 20));
    }

    #[test]
    fn test_missing_fields() {
        let request: PredictionRequest =
            serde_json::from_str(r#"{"player1_name": "Alice Ace", "surface": "Hard"}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("Missing required fields"));

        let blank = PredictionRequest::new("Alice Ace", "  ", "Hard");
        assert!(matches!(blank.validate(), Err(TennisError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_surface() {
        for surface in ["Carpet", "hardcourt"] {
            let err = PredictionRequest::new("A", "B", surface).validate().unwrap_err();
            assert!(err.to_string().contains("Invalid surface"));
        }
    }

    #[test]
    fn test_invalid_date_and_same_player() {
        let mut request = PredictionRequest::new("A", "B", "Grass");
        request.match_date = Some("20/05/2024".to_string());
        assert!(matches!(request.validate(), Err(TennisError::InvalidInput(_))));
        assert!(PredictionRequest::new("Ann", "ANN", "Hard").validate().is_err());
    }

    #[test]
    fn test_failure_response_json() {
        let response = PredictionResponse::failure(&TennisError::NotFound("Zed".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Player not found: Zed");
        assert!(json.get("prediction").is_none());
    }
}
