//! Per-feature standardisation

use serde::{Deserialize, Serialize};

use crate::features::FEATURE_DIM;
use crate::{Result, TennisError};

/// Zero-mean, unit-variance scaling fitted on training rows only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; 1.0 where a feature is constant
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[[f64; FEATURE_DIM]]) -> Result<Self> {
        if rows.is_empty() {
            return Err(TennisError::Training(
                "cannot fit scaler on an empty partition".to_string(),
            ));
        }
        let n = rows.len() as f64;

        let mut mean = vec![0.0; FEATURE_DIM];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut scale = vec![0.0; FEATURE_DIM];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        for s in scale.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(StandardScaler { mean, scale })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (row[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_all(&self, rows: &[[f64; FEATURE_DIM]]) -> Vec<[f64; FEATURE_DIM]> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: f64, second: f64) -> [f64; FEATURE_DIM] {
        let mut r = [3.0; FEATURE_DIM];
        r[0] = first;
        r[1] = second;
        r
    }

    #[test]
    fn test_fit_population_std() {
        let scaler = StandardScaler::fit(&[row(1.0, 10.0), row(3.0, 10.0)]).unwrap();
        assert_eq!(scaler.mean[0], 2.0);
        assert_eq!(scaler.scale[0], 1.0);
        // Constant columns keep unit scale
        assert_eq!(scaler.scale[1], 1.0);
        assert_eq!(scaler.scale[2], 1.0);

        let scaled = scaler.transform(&row(3.0, 10.0));
        assert_eq!(scaled[0], 1.0);
        assert_eq!(scaled[1], 0.0);
    }

    #[test]
    fn test_fit_empty_fails() {
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
