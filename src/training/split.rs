//! Label-stratified partitions

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{Result, TennisError};

/// Share of each class held out for testing
pub const TEST_FRACTION: f64 = 0.2;

fn indices_by_class(labels: &[u8]) -> [Vec<usize>; 2] {
    let mut classes = [Vec::new(), Vec::new()];
    for (i, &y) in labels.iter().enumerate() {
        classes[(y == 1) as usize].push(i);
    }
    classes
}

/// Row indices of the (train, test) partitions, each sorted ascending
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for mut class in indices_by_class(labels) {
        class.shuffle(&mut rng);
        let n_test = (class.len() as f64 * test_fraction).round() as usize;
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    log::info!(
        "Split {} samples: train={}, test={}",
        labels.len(),
        train.len(),
        test.len()
    );
    (train, test)
}

/// `k` disjoint folds with the class ratio preserved in each
pub fn stratified_folds(labels: &[u8], k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(TennisError::Training(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut next = 0;
    for mut class in indices_by_class(labels) {
        class.shuffle(&mut rng);
        for idx in class {
            folds[next % k].push(idx);
            next += 1;
        }
    }
    if folds.iter().any(|f| f.is_empty()) {
        return Err(TennisError::Training(format!(
            "{} samples are too few for {} folds",
            labels.len(),
            k
        )));
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Ok(folds)
}
