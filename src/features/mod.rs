//! Feature extraction
//!
//! Point-in-time statistics over stored history and the model's input vector.

pub mod history;
pub mod temporal;
pub mod vector;

pub use history::HistoryIndex;
pub use temporal::{HistorySource, TemporalQuery, WinLoss};
pub use vector::{
    build_features, FeatureConfig, FeatureVector, Matchup, PlayerStats, FEATURE_DIM,
    FEATURE_NAMES, STORED_FEATURE_COUNT,
};
