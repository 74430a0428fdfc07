//! Tennis match prediction from point-in-time player statistics
//!
//! Every statistic that feeds the model is computed "as of" a cutoff date using
//! only facts dated strictly before it. The same feature builder serves both the
//! batch training corpus and single-match inference.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use features::FeatureConfig;

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Unique identifier for a tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentId(pub i64);

/// Unique identifier for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({})", self.0)
    }
}

/// Court surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Surface {
    #[default]
    Hard,
    Clay,
    Grass,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Hard, Surface::Clay, Surface::Grass];

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Hard => "Hard",
            Surface::Clay => "Clay",
            Surface::Grass => "Grass",
        }
    }

    /// Strict, case-insensitive parse. Returns None for anything outside the three surfaces.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hard" => Some(Surface::Hard),
            "clay" => Some(Surface::Clay),
            "grass" => Some(Surface::Grass),
            _ => None,
        }
    }

    /// Numeric encoding used as the last model feature
    pub fn encoded(&self) -> f64 {
        match self {
            Surface::Hard => 0.0,
            Surface::Clay => 1.0,
            Surface::Grass => 2.0,
        }
    }

    /// Index into per-surface arrays
    pub fn index(&self) -> usize {
        match self {
            Surface::Hard => 0,
            Surface::Clay => 1,
            Surface::Grass => 2,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dominant playing hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hand {
    Right,
    Left,
}

impl Hand {
    pub fn code(&self) -> &'static str {
        match self {
            Hand::Right => "R",
            Hand::Left => "L",
        }
    }

    /// Parse a stored hand code. Unknown ("U") and anything else map to None.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "R" | "RIGHT" => Some(Hand::Right),
            "L" | "LEFT" => Some(Hand::Left),
            _ => None,
        }
    }
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub hand: Option<Hand>,
}

/// Case-folded lookup key for player names; storage and the in-memory index both match on it
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Player {
    pub fn matches_name(&self, name: &str) -> bool {
        name_key(&self.name) == name_key(name)
    }

    /// Fractional age in 365.25-day years on the given date
    pub fn age_on(&self, date: NaiveDate) -> Option<f64> {
        self.birth_date
            .map(|birth| (date - birth).num_days() as f64 / 365.25)
    }
}

/// A tournament and the surface it is played on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub level: Option<String>,
    /// None when the recorded surface is not Hard, Clay or Grass
    pub surface: Option<Surface>,
}

/// A recorded match, with its surface resolved through the tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub date: NaiveDate,
    pub player1: PlayerId,
    pub player2: PlayerId,
    /// None when the outcome is unknown or the match was not played
    pub winner: Option<PlayerId>,
    /// Missing surfaces resolve to Hard; None when the recorded surface is anything else
    pub surface: Option<Surface>,
    pub round: Option<String>,
}

impl MatchRecord {
    /// Check if the given player won this match
    pub fn did_win(&self, player: PlayerId) -> Option<bool> {
        if !self.involves(player) {
            return None;
        }
        self.winner.map(|w| w == player)
    }

    /// Get the opponent for a given player
    pub fn opponent(&self, player: PlayerId) -> Option<PlayerId> {
        if player == self.player1 {
            Some(self.player2)
        } else if player == self.player2 {
            Some(self.player1)
        } else {
            None
        }
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        player == self.player1 || player == self.player2
    }

    /// The loser, when the winner is one of the two players
    pub fn loser(&self) -> Option<PlayerId> {
        self.winner.and_then(|w| self.opponent(w))
    }

    /// True when the outcome is recorded and consistent with the players
    pub fn is_decided(&self) -> bool {
        self.winner.is_some_and(|w| self.involves(w))
    }
}

/// Which rating a snapshot describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatingScope {
    Overall,
    Surface(Surface),
}

impl RatingScope {
    pub fn surface(&self) -> Option<Surface> {
        match self {
            RatingScope::Overall => None,
            RatingScope::Surface(s) => Some(*s),
        }
    }
}

/// A rating value computed by the upstream rating system at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub player: PlayerId,
    pub scope: RatingScope,
    pub value: f64,
    pub calculated_at: chrono::NaiveDateTime,
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TennisError {
    #[error("Player not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Inconsistent match {0}: winner is not one of its players")]
    InvalidMatch(MatchId),

    #[error("Match {0} is not on Hard, Clay or Grass")]
    UnsupportedSurface(MatchId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("No trained model at {0} - run `tennis train` first")]
    NoModel(String),

    #[error("Model artifact does not match this build: {0}")]
    ModelMismatch(String),
}

impl TennisError {
    /// Row-level data problems the batch path may skip under its row policy
    pub fn is_row_skippable(&self) -> bool {
        matches!(
            self,
            TennisError::NotFound(_) | TennisError::InvalidMatch(_) | TennisError::UnsupportedSurface(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TennisError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub corpus_path: String,
    pub model_dir: String,
    /// `rating_type` value of the snapshots to read
    pub rating_system: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            database_path: "data/tennis.db".to_string(),
            corpus_path: "data/ml_features.csv".to_string(),
            model_dir: "model".to_string(),
            rating_system: "elo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Matches before this date are not loaded for the corpus
    pub start_date: NaiveDate,
    /// Seed for the balancing coin; None draws from entropy
    pub seed: Option<u64>,
    /// Skip rows with unknown players or inconsistent winners instead of aborting
    pub skip_missing_players: bool,
    /// Worker threads for feature computation (0 = rayon default)
    pub threads: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            seed: None,
            skip_missing_players: true,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seed for the stratified split and cross-validation folds
    pub seed: u64,
    pub cv_folds: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            seed: 42,
            cv_folds: 5,
            epochs: 400,
            learning_rate: 0.5,
            l2_penalty: 1e-3,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TennisError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| TennisError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TennisError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_match(p1: i64, p2: i64, winner: Option<i64>) -> MatchRecord {
        MatchRecord {
            id: MatchId(1),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            player1: PlayerId(p1),
            player2: PlayerId(p2),
            winner: winner.map(PlayerId),
            surface: Some(Surface::Hard),
            round: None,
        }
    }

    #[test]
    fn test_surface_parse() {
        assert_eq!(Surface::parse("clay"), Some(Surface::Clay));
        assert_eq!(Surface::parse(" Grass "), Some(Surface::Grass));
        assert_eq!(Surface::parse("Carpet"), None);
        assert_eq!(Surface::parse("CLAY"), Some(Surface::Clay));
    }

    #[test]
    fn test_surface_encoding() {
        assert_eq!(Surface::Hard.encoded(), 0.0);
        assert_eq!(Surface::Clay.encoded(), 1.0);
        assert_eq!(Surface::Grass.encoded(), 2.0);
    }

    #[test]
    fn test_hand_codes() {
        assert_eq!(Hand::from_code("R"), Some(Hand::Right));
        assert_eq!(Hand::from_code("l"), Some(Hand::Left));
        assert_eq!(Hand::from_code("U"), None);
    }

    #[test]
    fn test_match_outcome_helpers() {
        let m = make_match(1, 2, Some(2));
        assert_eq!(m.did_win(PlayerId(2)), Some(true));
        assert_eq!(m.did_win(PlayerId(1)), Some(false));
        assert_eq!(m.did_win(PlayerId(3)), None);
        assert_eq!(m.loser(), Some(PlayerId(1)));
        assert!(m.is_decided());

        assert!(!make_match(1, 2, None).is_decided());
        assert!(!make_match(1, 2, Some(7)).is_decided());
    }

    #[test]
    fn test_player_age() {
        let player = Player {
            id: PlayerId(1),
            name: "Test".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2000, 1, 1),
            height_cm: None,
            hand: None,
        };
        let age = player.age_on(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).unwrap();
        assert!((age - 7305.0 / 365.25).abs() < 1e-12);
        assert!(player.matches_name("TEST"));
    }

    #[test]
    fn test_name_key_folds_unicode_case() {
        assert_eq!(name_key(" Đoković Novak "), "đoković novak");
        assert_eq!(name_key("ŚWIĄTEK"), name_key("świątek"));
        assert_ne!(name_key("Ørsted"), name_key("Orsted"));
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[training]\nseed = 7\ncv_folds = 3\nepochs = 10\nlearning_rate = 0.1\nl2_penalty = 0.0\n").unwrap();
        assert_eq!(parsed.training.seed, 7);
        assert_eq!(parsed.features, FeatureConfig::default());
        assert_eq!(parsed.data.rating_system, "elo");
    }
}
