//! Point-in-time statistics
//!
//! Every lookup here is constrained to facts dated strictly before a cutoff.
//! Storage backends implement the small [`HistorySource`] trait; [`TemporalQuery`]
//! layers the rating fallbacks and neutral defaults on top so that every backend
//! resolves missing data the same way.

use chrono::{Duration, NaiveDate};

use crate::features::FeatureConfig;
use crate::{Player, PlayerId, RatingScope, Result, Surface};

/// Wins out of decided matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinLoss {
    pub wins: u32,
    pub total: u32,
}

impl WinLoss {
    pub fn record(&mut self, won: bool) {
        self.total += 1;
        if won {
            self.wins += 1;
        }
    }

    /// Win rate, or `default` when no matches were found
    pub fn rate_or(&self, default: f64) -> f64 {
        if self.total == 0 {
            default
        } else {
            self.wins as f64 / self.total as f64
        }
    }
}

/// Raw history lookups. All date bounds are exclusive at the top: a fact dated
/// on `before` is never visible.
///
/// Only decided matches count (winner recorded and equal to one of the two
/// players). Surface-restricted tallies only see matches on that surface, so a
/// match on an unsupported surface counts in unrestricted recent form alone.
/// Unknown player ids produce `TennisError::NotFound`.
pub trait HistorySource {
    fn player(&self, id: PlayerId) -> Result<Player>;

    /// Case-insensitive exact name lookup; lowest id wins on duplicates.
    fn find_player_by_name(&self, name: &str) -> Result<Option<Player>>;

    /// Value of the most recent snapshot for `scope` calculated before `before`
    fn latest_rating(&self, player: PlayerId, scope: RatingScope, before: NaiveDate)
        -> Result<Option<f64>>;

    /// Tally on `surface` for matches dated in `[from, before)`
    fn surface_record(
        &self,
        player: PlayerId,
        surface: Surface,
        from: NaiveDate,
        before: NaiveDate,
    ) -> Result<WinLoss>;

    /// Tally over the `limit` most recent matches before `before`, newest first,
    /// optionally restricted to one surface
    fn recent_record(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        before: NaiveDate,
        limit: usize,
    ) -> Result<WinLoss>;

    /// (wins of `a` over `b`, wins of `b` over `a`) on `surface` before `before`
    fn head_to_head_record(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Surface,
        before: NaiveDate,
    ) -> Result<(u32, u32)>;
}

/// As-of statistics with the documented defaults applied
pub struct TemporalQuery<'a, S: ?Sized> {
    source: &'a S,
    config: &'a FeatureConfig,
}

impl<'a, S: HistorySource + ?Sized> TemporalQuery<'a, S> {
    pub fn new(source: &'a S, config: &'a FeatureConfig) -> Self {
        TemporalQuery { source, config }
    }

    pub fn source(&self) -> &S {
        self.source
    }

    pub fn config(&self) -> &FeatureConfig {
        self.config
    }

    /// Surface rating, falling back to the overall rating, then to the default
    pub fn surface_rating(&self, player: PlayerId, surface: Surface, as_of: NaiveDate) -> Result<f64> {
        if let Some(value) = self
            .source
            .latest_rating(player, RatingScope::Surface(surface), as_of)?
        {
            return Ok(value);
        }
        log::debug!("{}: no {} rating before {}, using overall", player, surface, as_of);
        self.overall_rating(player, as_of)
    }

    pub fn overall_rating(&self, player: PlayerId, as_of: NaiveDate) -> Result<f64> {
        let rating = self
            .source
            .latest_rating(player, RatingScope::Overall, as_of)?;
        Ok(rating.unwrap_or_else(|| {
            log::debug!("{}: no rating before {}, using default", player, as_of);
            self.config.default_rating
        }))
    }

    /// Win rate on `surface` over `[as_of - window_months * 30 days, as_of)`
    pub fn surface_win_rate(
        &self,
        player: PlayerId,
        surface: Surface,
        as_of: NaiveDate,
        window_months: u32,
    ) -> Result<f64> {
        let from = window_start(as_of, window_months);
        let record = self.source.surface_record(player, surface, from, as_of)?;
        Ok(record.rate_or(self.config.default_win_rate))
    }

    /// Win rate over the last `last_n` matches on any surface
    pub fn recent_form(&self, player: PlayerId, as_of: NaiveDate, last_n: usize) -> Result<f64> {
        let record = self.source.recent_record(player, None, as_of, last_n)?;
        Ok(record.rate_or(self.config.default_win_rate))
    }

    /// Win rate over the last `last_n` matches on `surface`
    pub fn surface_form(
        &self,
        player: PlayerId,
        surface: Surface,
        as_of: NaiveDate,
        last_n: usize,
    ) -> Result<f64> {
        let record = self
            .source
            .recent_record(player, Some(surface), as_of, last_n)?;
        Ok(record.rate_or(self.config.default_win_rate))
    }

    /// Head-to-head advantage on `surface`; positive favours `a`
    pub fn head_to_head(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Surface,
        as_of: NaiveDate,
    ) -> Result<i64> {
        let (a_wins, b_wins) = self.source.head_to_head_record(a, b, surface, as_of)?;
        Ok(a_wins as i64 - b_wins as i64)
    }
}

/// First day of a window of `months` 30-day months ending at `as_of`
pub fn window_start(as_of: NaiveDate, months: u32) -> NaiveDate {
    as_of - Duration::days(months as i64 * 30)
}
