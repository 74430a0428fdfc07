//! Labeled training corpus
//!
//! Each decided match becomes one row with the player roles swapped on a coin
//! flip, built with the match's own date as the cutoff.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::data::Database;
use crate::features::{
    build_features, FeatureConfig, FeatureVector, HistoryIndex, HistorySource, TemporalQuery,
    FEATURE_NAMES, STORED_FEATURE_COUNT,
};
use crate::{Config, MatchId, MatchRecord, Result, Surface, TennisError};

const PROGRESS_EVERY: usize = 1000;

/// Source of the per-match role swap. `true` puts the loser in slot A.
pub trait Coin {
    fn flip(&mut self) -> bool;
}

/// Fair coin over any `rand` generator
pub struct RngCoin<R: Rng> {
    rng: R,
}

impl<R: Rng> RngCoin<R> {
    pub fn new(rng: R) -> Self {
        RngCoin { rng }
    }
}

impl RngCoin<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        RngCoin::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        RngCoin::new(StdRng::from_entropy())
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl<R: Rng> Coin for RngCoin<R> {
    fn flip(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }
}

/// What to do with a row whose players are unknown or whose winner is inconsistent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    Skip,
    Abort,
}

impl RowPolicy {
    pub fn from_config(skip_missing_players: bool) -> Self {
        if skip_missing_players {
            RowPolicy::Skip
        } else {
            RowPolicy::Abort
        }
    }
}

/// One balanced training example
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub match_id: MatchId,
    pub match_date: NaiveDate,
    pub surface: Surface,
    pub player1_name: String,
    pub player2_name: String,
    pub features: FeatureVector,
    /// 1 when player 1 won
    pub target: u8,
}

/// Summary of a corpus build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub built: usize,
    pub skipped: usize,
    pub positives: usize,
}

impl BuildReport {
    pub fn positive_rate(&self) -> f64 {
        if self.built == 0 {
            0.0
        } else {
            self.positives as f64 / self.built as f64
        }
    }
}

fn build_row<S: HistorySource + ?Sized>(
    query: &TemporalQuery<'_, S>,
    record: &MatchRecord,
    swap: bool,
) -> Result<LabeledRow> {
    let (Some(winner), Some(loser)) = (record.winner, record.loser()) else {
        return Err(TennisError::InvalidMatch(record.id));
    };
    let Some(surface) = record.surface else {
        return Err(TennisError::UnsupportedSurface(record.id));
    };
    let (a, b, target) = if swap {
        (loser, winner, 0)
    } else {
        (winner, loser, 1)
    };
    let matchup = build_features(query, a, b, surface, record.date)?;
    Ok(LabeledRow {
        match_id: record.id,
        match_date: record.date,
        surface,
        player1_name: matchup.player1.name,
        player2_name: matchup.player2.name,
        features: matchup.features,
        target,
    })
}

/// Build one labeled row per match, in match order.
///
/// Coins are drawn up front, one per match, so the output for a given coin
/// sequence does not depend on how rows are scheduled across threads.
pub fn build_corpus<S, C>(
    source: &S,
    config: &FeatureConfig,
    matches: &[MatchRecord],
    coin: &mut C,
    policy: RowPolicy,
) -> Result<(Vec<LabeledRow>, BuildReport)>
where
    S: HistorySource + Sync + ?Sized,
    C: Coin + ?Sized,
{
    let start = Instant::now();
    let swaps: Vec<bool> = matches.iter().map(|_| coin.flip()).collect();
    let query = TemporalQuery::new(source, config);
    let done = AtomicUsize::new(0);
    let total = matches.len();

    let results: Vec<Result<LabeledRow>> = matches
        .par_iter()
        .zip(swaps.par_iter())
        .map(|(record, &swap)| {
            let row = build_row(&query, record, swap);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_EVERY == 0 {
                log::info!("Built {}/{} rows", n, total);
            }
            row
        })
        .collect();

    let mut rows = Vec::with_capacity(results.len());
    let mut report = BuildReport::default();
    for (record, result) in matches.iter().zip(results) {
        match result {
            Ok(row) => {
                report.built += 1;
                report.positives += row.target as usize;
                rows.push(row);
            }
            Err(e) if e.is_row_skippable() && policy == RowPolicy::Skip => {
                log::warn!("Skipping {} on {}: {}", record.id, record.date, e);
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    log::info!(
        "Corpus built in {:.1}s: {} rows, {} skipped, {:.1}% player 1 wins",
        start.elapsed().as_secs_f64(),
        report.built,
        report.skipped,
        report.positive_rate() * 100.0
    );
    Ok((rows, report))
}

/// Build the corpus from the database and write it to the configured CSV path.
/// Matches without a winner or on a surface other than Hard, Clay or Grass are
/// left out before balancing.
pub fn export_corpus(db: &Database, config: &Config) -> Result<BuildReport> {
    let (matches, other_surface): (Vec<MatchRecord>, Vec<MatchRecord>) = db
        .get_all_matches_since(config.dataset.start_date)?
        .into_iter()
        .filter(|m| m.winner.is_some())
        .partition(|m| m.surface.is_some());
    log::info!(
        "Loaded {} matches with a recorded winner since {} ({} on other surfaces left out)",
        matches.len(),
        config.dataset.start_date,
        other_surface.len()
    );

    let index = HistoryIndex::load(db)?;
    let mut coin = RngCoin::from_seed(config.dataset.seed);
    let policy = RowPolicy::from_config(config.dataset.skip_missing_players);

    let (rows, report) = if config.dataset.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.dataset.threads)
            .build()
            .map_err(|e| TennisError::Config(format!("Failed to start worker pool: {}", e)))?;
        pool.install(|| build_corpus(&index, &config.features, &matches, &mut coin, policy))?
    } else {
        build_corpus(&index, &config.features, &matches, &mut coin, policy)?
    };

    write_corpus(&config.data.corpus_path, &rows)?;
    log::info!("Wrote {} rows to {}", rows.len(), config.data.corpus_path);
    Ok(report)
}

fn corpus_header() -> Vec<&'static str> {
    let mut header = vec!["match_id", "match_date", "surface", "player1_name", "player2_name"];
    header.extend_from_slice(&FEATURE_NAMES[..STORED_FEATURE_COUNT]);
    header.push("target");
    header
}

/// Write rows as CSV; `surface_encoded` is not stored
pub fn write_corpus<P: AsRef<Path>>(path: P, rows: &[LabeledRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(corpus_header())?;
    for row in rows {
        let mut record = vec![
            row.match_id.0.to_string(),
            row.match_date.format("%Y-%m-%d").to_string(),
            row.surface.to_string(),
            row.player1_name.clone(),
            row.player2_name.clone(),
        ];
        record.extend(
            row.features.to_array()[..STORED_FEATURE_COUNT]
                .iter()
                .map(|v| v.to_string()),
        );
        record.push(row.target.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a corpus written by [`write_corpus`]
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let expected = corpus_header();
    let header = reader.headers()?.clone();
    if header.iter().ne(expected.iter().copied()) {
        return Err(TennisError::InvalidInput(format!(
            "Corpus columns do not match the feature layout (found {} columns, expected {})",
            header.len(),
            expected.len()
        )));
    }

    let invalid = |line: usize, what: &str| {
        TennisError::InvalidInput(format!("Corpus row {}: invalid {}", line, what))
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let field = |idx: usize| record.get(idx).unwrap_or_default();

        let match_id = field(0).parse().map_err(|_| invalid(line, "match_id"))?;
        let match_date = NaiveDate::parse_from_str(field(1), "%Y-%m-%d")
            .map_err(|_| invalid(line, "match_date"))?;
        let surface = Surface::parse(field(2)).ok_or_else(|| invalid(line, "surface"))?;

        let mut stored = [0.0; STORED_FEATURE_COUNT];
        for (j, value) in stored.iter_mut().enumerate() {
            *value = field(5 + j)
                .parse()
                .map_err(|_| invalid(line, FEATURE_NAMES[j]))?;
        }
        let features = FeatureVector::from_stored(&stored, surface)
            .ok_or_else(|| invalid(line, "feature count"))?;

        let target = match field(5 + STORED_FEATURE_COUNT) {
            "0" => 0,
            "1" => 1,
            _ => return Err(invalid(line, "target")),
        };

        rows.push(LabeledRow {
            match_id: MatchId(match_id),
            match_date,
            surface,
            player1_name: field(3).to_string(),
            player2_name: field(4).to_string(),
            features,
            target,
        });
    }
    Ok(rows)
}
