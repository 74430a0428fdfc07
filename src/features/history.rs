//! In-memory history index
//!
//! Bulk-loads players, rating snapshots and decided matches once, then answers
//! every as-of lookup with a binary search over per-player date-sorted arrays.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::data::Database;
use crate::features::temporal::{HistorySource, WinLoss};
use crate::{
    name_key, MatchId, MatchRecord, Player, PlayerId, RatingScope, RatingSnapshot, Result, Surface,
    TennisError,
};

/// One decided match from a single player's point of view
#[derive(Debug, Clone, Copy)]
struct Outcome {
    date: NaiveDate,
    match_id: MatchId,
    /// None for surfaces outside Hard, Clay and Grass
    surface: Option<Surface>,
    opponent: PlayerId,
    won: bool,
}

#[derive(Debug, Clone, Copy)]
struct RatingPoint {
    calculated_at: NaiveDateTime,
    value: f64,
}

#[derive(Debug, Default)]
struct PlayerHistory {
    overall: Vec<RatingPoint>,
    by_surface: [Vec<RatingPoint>; 3],
    /// Sorted by (date, match id) ascending
    outcomes: Vec<Outcome>,
}

impl PlayerHistory {
    fn ratings(&self, scope: RatingScope) -> &[RatingPoint] {
        match scope {
            RatingScope::Overall => &self.overall,
            RatingScope::Surface(s) => &self.by_surface[s.index()],
        }
    }

    /// Outcomes dated strictly before `before`
    fn outcomes_before(&self, before: NaiveDate) -> &[Outcome] {
        let end = self.outcomes.partition_point(|o| o.date < before);
        &self.outcomes[..end]
    }
}

/// Time-indexed player history for the batch path
#[derive(Debug, Default)]
pub struct HistoryIndex {
    players: HashMap<PlayerId, Player>,
    by_name: HashMap<String, PlayerId>,
    history: HashMap<PlayerId, PlayerHistory>,
    match_count: usize,
    rating_count: usize,
}

impl HistoryIndex {
    /// Build from already-loaded records
    pub fn from_records(
        players: Vec<Player>,
        matches: &[MatchRecord],
        ratings: &[RatingSnapshot],
    ) -> Self {
        let mut index = HistoryIndex::default();

        for player in players {
            let key = name_key(&player.name);
            index
                .by_name
                .entry(key)
                .and_modify(|id| *id = (*id).min(player.id))
                .or_insert(player.id);
            index.history.entry(player.id).or_default();
            index.players.insert(player.id, player);
        }

        for record in matches {
            let Some(winner) = record.winner else {
                continue;
            };
            if !record.is_decided() {
                log::warn!("Ignoring {}: winner {} did not play", record.id, winner);
                continue;
            }
            for (player, opponent) in [
                (record.player1, record.player2),
                (record.player2, record.player1),
            ] {
                index.history.entry(player).or_default().outcomes.push(Outcome {
                    date: record.date,
                    match_id: record.id,
                    surface: record.surface,
                    opponent,
                    won: winner == player,
                });
            }
            index.match_count += 1;
        }

        for snapshot in ratings {
            let entry = index.history.entry(snapshot.player).or_default();
            let point = RatingPoint {
                calculated_at: snapshot.calculated_at,
                value: snapshot.value,
            };
            match snapshot.scope {
                RatingScope::Overall => entry.overall.push(point),
                RatingScope::Surface(s) => entry.by_surface[s.index()].push(point),
            }
            index.rating_count += 1;
        }

        // Stable sorts keep load order among equal timestamps; ratings arrive in storage id order
        for entry in index.history.values_mut() {
            entry
                .outcomes
                .sort_by_key(|o| (o.date, o.match_id));
            entry.overall.sort_by_key(|p| p.calculated_at);
            for points in entry.by_surface.iter_mut() {
                points.sort_by_key(|p| p.calculated_at);
            }
        }

        index
    }

    /// Bulk load everything the feature builder can ask about
    pub fn load(db: &Database) -> Result<Self> {
        let players = db.get_all_players()?;
        let matches = db.get_decided_matches()?;
        let ratings = db.get_all_ratings()?;
        log::info!(
            "Indexing {} players, {} matches, {} rating snapshots",
            players.len(),
            matches.len(),
            ratings.len()
        );
        Ok(Self::from_records(players, &matches, &ratings))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn rating_count(&self) -> usize {
        self.rating_count
    }

    fn history(&self, player: PlayerId) -> Result<&PlayerHistory> {
        if !self.players.contains_key(&player) {
            return Err(TennisError::NotFound(player.to_string()));
        }
        self.history
            .get(&player)
            .ok_or_else(|| TennisError::NotFound(player.to_string()))
    }
}

impl HistorySource for HistoryIndex {
    fn player(&self, id: PlayerId) -> Result<Player> {
        self.players
            .get(&id)
            .cloned()
            .ok_or_else(|| TennisError::NotFound(id.to_string()))
    }

    fn find_player_by_name(&self, name: &str) -> Result<Option<Player>> {
        Ok(self
            .by_name
            .get(&name_key(name))
            .and_then(|id| self.players.get(id))
            .cloned())
    }

    fn latest_rating(
        &self,
        player: PlayerId,
        scope: RatingScope,
        before: NaiveDate,
    ) -> Result<Option<f64>> {
        let points = self.history(player)?.ratings(scope);
        let end = points.partition_point(|p| p.calculated_at.date() < before);
        Ok(end.checked_sub(1).map(|i| points[i].value))
    }

    fn surface_record(
        &self,
        player: PlayerId,
        surface: Surface,
        from: NaiveDate,
        before: NaiveDate,
    ) -> Result<WinLoss> {
        let outcomes = self.history(player)?.outcomes_before(before);
        let start = outcomes.partition_point(|o| o.date < from);
        let mut record = WinLoss::default();
        for outcome in outcomes[start..].iter().filter(|o| o.surface == Some(surface)) {
            record.record(outcome.won);
        }
        Ok(record)
    }

    fn recent_record(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        before: NaiveDate,
        limit: usize,
    ) -> Result<WinLoss> {
        let outcomes = self.history(player)?.outcomes_before(before);
        let mut record = WinLoss::default();
        for outcome in outcomes
            .iter()
            .rev()
            .filter(|o| surface.map_or(true, |s| o.surface == Some(s)))
            .take(limit)
        {
            record.record(outcome.won);
        }
        Ok(record)
    }

    fn head_to_head_record(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Surface,
        before: NaiveDate,
    ) -> Result<(u32, u32)> {
        self.history(b)?;
        let outcomes = self.history(a)?.outcomes_before(before);
        let (mut a_wins, mut b_wins) = (0, 0);
        for outcome in outcomes
            .iter()
            .filter(|o| o.opponent == b && o.surface == Some(surface))
        {
            if outcome.won {
                a_wins += 1;
            } else {
                b_wins += 1;
            }
        }
        Ok((a_wins, b_wins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{self, date, FixtureIds};
    use crate::features::temporal::TemporalQuery;
    use crate::features::FeatureConfig;

    fn index_and_ids() -> (HistoryIndex, FixtureIds) {
        let (db, ids) = fixtures::sample_database();
        (HistoryIndex::load(&db).unwrap(), ids)
    }

    #[test]
    fn test_load_counts() {
        let (index, _) = index_and_ids();
        assert_eq!(index.player_count(), 4);
        // The undecided and inconsistent matches are not indexed
        assert_eq!(index.match_count(), fixtures::DECIDED_MATCHES);
        assert!(index.rating_count() > 0);
    }

    #[test]
    fn test_rating_strictly_before_cutoff() {
        let (index, ids) = index_and_ids();
        // Alice's clay snapshots: 1600 on 2023-05-01, 1650 on 2023-06-01
        let on_day = index
            .latest_rating(ids.alice, RatingScope::Surface(Surface::Clay), date(2023, 6, 1))
            .unwrap();
        assert_eq!(on_day, Some(1600.0));
        let after = index
            .latest_rating(ids.alice, RatingScope::Surface(Surface::Clay), date(2023, 6, 2))
            .unwrap();
        assert_eq!(after, Some(1650.0));
        let before_any = index
            .latest_rating(ids.alice, RatingScope::Surface(Surface::Clay), date(2023, 5, 1))
            .unwrap();
        assert_eq!(before_any, None);
    }

    #[test]
    fn test_rating_fallback_tiers() {
        let (index, ids) = index_and_ids();
        let config = FeatureConfig::default();
        let query = TemporalQuery::new(&index, &config);
        let as_of = date(2024, 1, 1);

        // Surface snapshot exists
        assert_eq!(query.surface_rating(ids.alice, Surface::Clay, as_of).unwrap(), 1650.0);
        // No grass snapshot: overall
        assert_eq!(query.surface_rating(ids.alice, Surface::Grass, as_of).unwrap(), 1620.0);
        // Nothing at all: default
        assert_eq!(query.surface_rating(ids.dave, Surface::Grass, as_of).unwrap(), 1500.0);
        assert_eq!(query.overall_rating(ids.dave, as_of).unwrap(), 1500.0);
    }

    #[test]
    fn test_neutral_defaults_without_history() {
        let (index, ids) = index_and_ids();
        let config = FeatureConfig::default();
        let query = TemporalQuery::new(&index, &config);
        let as_of = date(2024, 1, 1);

        assert_eq!(query.recent_form(ids.dave, as_of, 20).unwrap(), 0.5);
        for months in [1, 12, 120] {
            assert_eq!(
                query.surface_win_rate(ids.dave, Surface::Hard, as_of, months).unwrap(),
                0.5
            );
        }
        assert_eq!(query.head_to_head(ids.dave, ids.alice, Surface::Hard, as_of).unwrap(), 0);
    }

    #[test]
    fn test_match_on_cutoff_excluded() {
        let (index, ids) = index_and_ids();
        // Alice beat Bob on hard on 2023-03-01 and 2023-03-15
        let before = index
            .recent_record(ids.alice, None, date(2023, 3, 15), 20)
            .unwrap();
        let after = index
            .recent_record(ids.alice, None, date(2023, 3, 16), 20)
            .unwrap();
        assert_eq!(after.total, before.total + 1);
    }

    #[test]
    fn test_recent_form_limit_takes_newest() {
        let (index, ids) = index_and_ids();
        // Bob's last decided match before 2023-06-05 is his clay win over Alice
        let last = index.recent_record(ids.bob, None, date(2023, 6, 5), 1).unwrap();
        assert_eq!(last, WinLoss { wins: 1, total: 1 });
        // then Carol beat him on 2023-06-10
        let last = index.recent_record(ids.bob, None, date(2023, 7, 1), 1).unwrap();
        assert_eq!(last, WinLoss { wins: 0, total: 1 });
        let all = index.recent_record(ids.bob, None, date(2023, 7, 1), 20).unwrap();
        assert_eq!(all, WinLoss { wins: 1, total: 4 });
    }

    #[test]
    fn test_surface_form_filters_surface() {
        let (index, ids) = index_and_ids();
        let hard = index
            .recent_record(ids.alice, Some(Surface::Hard), date(2024, 1, 1), 10)
            .unwrap();
        assert_eq!(hard, WinLoss { wins: 2, total: 2 });
        let clay = index
            .recent_record(ids.alice, Some(Surface::Clay), date(2024, 1, 1), 10)
            .unwrap();
        assert_eq!(clay, WinLoss { wins: 0, total: 1 });
        // The carpet win over Carol only shows up without a surface filter
        let any = index.recent_record(ids.alice, None, date(2024, 1, 1), 10).unwrap();
        assert_eq!(any, WinLoss { wins: 3, total: 4 });
    }

    #[test]
    fn test_surface_window_bounds() {
        let (index, ids) = index_and_ids();
        // 2023-03-01 and 2023-03-15 hard wins; a 1-month window from 2023-04-05 starts 2023-03-06
        let record = index
            .surface_record(ids.alice, Surface::Hard, date(2023, 3, 6), date(2023, 4, 5))
            .unwrap();
        assert_eq!(record, WinLoss { wins: 1, total: 1 });
    }

    #[test]
    fn test_head_to_head_sign() {
        let (index, ids) = index_and_ids();
        let config = FeatureConfig::default();
        let query = TemporalQuery::new(&index, &config);
        let as_of = date(2024, 1, 1);
        assert_eq!(query.head_to_head(ids.alice, ids.bob, Surface::Hard, as_of).unwrap(), 2);
        assert_eq!(query.head_to_head(ids.bob, ids.alice, Surface::Hard, as_of).unwrap(), -2);
        assert_eq!(query.head_to_head(ids.alice, ids.bob, Surface::Clay, as_of).unwrap(), -1);
    }

    #[test]
    fn test_unknown_player_not_found() {
        let (index, ids) = index_and_ids();
        let ghost = PlayerId(999);
        assert!(matches!(index.player(ghost), Err(TennisError::NotFound(_))));
        assert!(matches!(
            index.recent_record(ghost, None, date(2024, 1, 1), 5),
            Err(TennisError::NotFound(_))
        ));
        assert!(matches!(
            index.head_to_head_record(ids.alice, ghost, Surface::Hard, date(2024, 1, 1)),
            Err(TennisError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_player_case_insensitive() {
        let (index, ids) = index_and_ids();
        let found = index.find_player_by_name("ALICE ACE").unwrap().unwrap();
        assert_eq!(found.id, ids.alice);
        assert!(index.find_player_by_name("Nobody").unwrap().is_none());
    }
}
