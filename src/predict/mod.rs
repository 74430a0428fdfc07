//! Serving
//!
//! Validates prediction requests and answers them from a trained artifact.

pub mod inference;
pub mod request;

pub use inference::{format_prediction, MatchPrediction, Predictor};
pub use request::{PredictionRequest, PredictionResponse, ValidRequest};
