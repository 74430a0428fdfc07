//! Match feature vector
//!
//! One pure builder shared by the batch corpus and single-match serving. The
//! field order below is what the scaler and classifier are fitted against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::temporal::{HistorySource, TemporalQuery};
use crate::{Hand, Player, PlayerId, Result, Surface};

/// Neutral defaults and window sizes shared by training and serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub default_rating: f64,
    pub default_win_rate: f64,
    pub default_height_cm: f64,
    /// Only used when reporting player statistics; an unknown birth date zeroes `age_diff`
    pub default_age_years: f64,
    pub recent_window_months: u32,
    pub career_window_months: u32,
    pub form_matches: usize,
    pub surface_form_matches: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            default_rating: 1500.0,
            default_win_rate: 0.5,
            default_height_cm: 180.0,
            default_age_years: 25.0,
            recent_window_months: 12,
            career_window_months: 120,
            form_matches: 20,
            surface_form_matches: 10,
        }
    }
}

pub const FEATURE_DIM: usize = 19;

/// Features persisted in the training corpus; `surface_encoded` is derived from the surface column
pub const STORED_FEATURE_COUNT: usize = 18;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "surface_elo_diff",
    "overall_elo_diff",
    "p1_surface_wr_12mo",
    "p2_surface_wr_12mo",
    "surface_wr_diff_12mo",
    "p1_surface_wr_career",
    "p2_surface_wr_career",
    "surface_wr_diff_career",
    "p1_form_20",
    "p2_form_20",
    "form_diff_20",
    "p1_surface_form_10",
    "p2_surface_form_10",
    "surface_form_diff_10",
    "age_diff",
    "height_diff",
    "hand_matchup",
    "h2h_surface_advantage",
    "surface_encoded",
];

/// Features for player A vs player B; every `*_diff` is A minus B
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub surface_elo_diff: f64,
    pub overall_elo_diff: f64,
    pub p1_surface_wr_12mo: f64,
    pub p2_surface_wr_12mo: f64,
    pub surface_wr_diff_12mo: f64,
    pub p1_surface_wr_career: f64,
    pub p2_surface_wr_career: f64,
    pub surface_wr_diff_career: f64,
    pub p1_form_20: f64,
    pub p2_form_20: f64,
    pub form_diff_20: f64,
    pub p1_surface_form_10: f64,
    pub p2_surface_form_10: f64,
    pub surface_form_diff_10: f64,
    pub age_diff: f64,
    pub height_diff: f64,
    pub hand_matchup: f64,
    pub h2h_surface_advantage: f64,
    pub surface_encoded: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; FEATURE_DIM] {
        [
            self.surface_elo_diff,
            self.overall_elo_diff,
            self.p1_surface_wr_12mo,
            self.p2_surface_wr_12mo,
            self.surface_wr_diff_12mo,
            self.p1_surface_wr_career,
            self.p2_surface_wr_career,
            self.surface_wr_diff_career,
            self.p1_form_20,
            self.p2_form_20,
            self.form_diff_20,
            self.p1_surface_form_10,
            self.p2_surface_form_10,
            self.surface_form_diff_10,
            self.age_diff,
            self.height_diff,
            self.hand_matchup,
            self.h2h_surface_advantage,
            self.surface_encoded,
        ]
    }

    /// Inverse of `to_array`; None unless exactly `FEATURE_DIM` values are given
    pub fn from_slice(v: &[f64]) -> Option<Self> {
        if v.len() != FEATURE_DIM {
            return None;
        }
        Some(FeatureVector {
            surface_elo_diff: v[0],
            overall_elo_diff: v[1],
            p1_surface_wr_12mo: v[2],
            p2_surface_wr_12mo: v[3],
            surface_wr_diff_12mo: v[4],
            p1_surface_wr_career: v[5],
            p2_surface_wr_career: v[6],
            surface_wr_diff_career: v[7],
            p1_form_20: v[8],
            p2_form_20: v[9],
            form_diff_20: v[10],
            p1_surface_form_10: v[11],
            p2_surface_form_10: v[12],
            surface_form_diff_10: v[13],
            age_diff: v[14],
            height_diff: v[15],
            hand_matchup: v[16],
            h2h_surface_advantage: v[17],
            surface_encoded: v[18],
        })
    }

    /// Rebuild from the stored corpus columns plus the row's surface
    pub fn from_stored(stored: &[f64], surface: Surface) -> Option<Self> {
        if stored.len() != STORED_FEATURE_COUNT {
            return None;
        }
        let mut values = [0.0; FEATURE_DIM];
        values[..STORED_FEATURE_COUNT].copy_from_slice(stored);
        values[FEATURE_DIM - 1] = surface.encoded();
        Self::from_slice(&values)
    }

    /// The same matchup seen from B's side
    pub fn mirrored(&self) -> Self {
        FeatureVector {
            surface_elo_diff: -self.surface_elo_diff,
            overall_elo_diff: -self.overall_elo_diff,
            p1_surface_wr_12mo: self.p2_surface_wr_12mo,
            p2_surface_wr_12mo: self.p1_surface_wr_12mo,
            surface_wr_diff_12mo: -self.surface_wr_diff_12mo,
            p1_surface_wr_career: self.p2_surface_wr_career,
            p2_surface_wr_career: self.p1_surface_wr_career,
            surface_wr_diff_career: -self.surface_wr_diff_career,
            p1_form_20: self.p2_form_20,
            p2_form_20: self.p1_form_20,
            form_diff_20: -self.form_diff_20,
            p1_surface_form_10: self.p2_surface_form_10,
            p2_surface_form_10: self.p1_surface_form_10,
            surface_form_diff_10: -self.surface_form_diff_10,
            age_diff: -self.age_diff,
            height_diff: -self.height_diff,
            hand_matchup: self.hand_matchup,
            h2h_surface_advantage: -self.h2h_surface_advantage,
            surface_encoded: self.surface_encoded,
        }
    }
}

/// Raw per-player statistics behind a feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub name: String,
    pub surface_elo: f64,
    pub overall_elo: f64,
    pub surface_wr_12mo: f64,
    pub surface_wr_career: f64,
    pub recent_form: f64,
    pub surface_form: f64,
    pub age: Option<f64>,
    pub height_cm: Option<f64>,
    pub hand: Option<Hand>,
}

/// A built feature vector and the statistics it came from
#[derive(Debug, Clone)]
pub struct Matchup {
    pub player1: Player,
    pub player2: Player,
    pub surface: Surface,
    pub as_of: NaiveDate,
    pub features: FeatureVector,
    pub stats1: PlayerStats,
    pub stats2: PlayerStats,
}

fn player_stats<S: HistorySource + ?Sized>(
    query: &TemporalQuery<'_, S>,
    player: &Player,
    surface: Surface,
    as_of: NaiveDate,
) -> Result<PlayerStats> {
    let config = query.config();
    Ok(PlayerStats {
        name: player.name.clone(),
        surface_elo: query.surface_rating(player.id, surface, as_of)?,
        overall_elo: query.overall_rating(player.id, as_of)?,
        surface_wr_12mo: query.surface_win_rate(
            player.id,
            surface,
            as_of,
            config.recent_window_months,
        )?,
        surface_wr_career: query.surface_win_rate(
            player.id,
            surface,
            as_of,
            config.career_window_months,
        )?,
        recent_form: query.recent_form(player.id, as_of, config.form_matches)?,
        surface_form: query.surface_form(player.id, surface, as_of, config.surface_form_matches)?,
        age: player.age_on(as_of),
        height_cm: player.height_cm.filter(|h| *h > 0.0),
        hand: player.hand,
    })
}

/// Build the feature vector for A (`player1`) against B (`player2`) using
/// only facts dated strictly before `as_of`
pub fn build_features<S: HistorySource + ?Sized>(
    query: &TemporalQuery<'_, S>,
    player1: PlayerId,
    player2: PlayerId,
    surface: Surface,
    as_of: NaiveDate,
) -> Result<Matchup> {
    let source = query.source();
    let config = query.config();
    let p1 = source.player(player1)?;
    let p2 = source.player(player2)?;

    let s1 = player_stats(query, &p1, surface, as_of)?;
    let s2 = player_stats(query, &p2, surface, as_of)?;
    let h2h = query.head_to_head(player1, player2, surface, as_of)?;

    let age_diff = match (s1.age, s2.age) {
        (Some(a), Some(b)) => a - b,
        _ => 0.0,
    };
    let height_diff = s1.height_cm.unwrap_or(config.default_height_cm)
        - s2.height_cm.unwrap_or(config.default_height_cm);
    let hand_matchup = if s1.hand != s2.hand { 1.0 } else { 0.0 };

    let features = FeatureVector {
        surface_elo_diff: s1.surface_elo - s2.surface_elo,
        overall_elo_diff: s1.overall_elo - s2.overall_elo,
        p1_surface_wr_12mo: s1.surface_wr_12mo,
        p2_surface_wr_12mo: s2.surface_wr_12mo,
        surface_wr_diff_12mo: s1.surface_wr_12mo - s2.surface_wr_12mo,
        p1_surface_wr_career: s1.surface_wr_career,
        p2_surface_wr_career: s2.surface_wr_career,
        surface_wr_diff_career: s1.surface_wr_career - s2.surface_wr_career,
        p1_form_20: s1.recent_form,
        p2_form_20: s2.recent_form,
        form_diff_20: s1.recent_form - s2.recent_form,
        p1_surface_form_10: s1.surface_form,
        p2_surface_form_10: s2.surface_form,
        surface_form_diff_10: s1.surface_form - s2.surface_form,
        age_diff,
        height_diff,
        hand_matchup,
        h2h_surface_advantage: h2h as f64,
        surface_encoded: surface.encoded(),
    };

    Ok(Matchup {
        player1: p1,
        player2: p2,
        surface,
        as_of,
        features,
        stats1: s1,
        stats2: s2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{self, at, date};
    use crate::data::{Database, NewPlayer};
    use crate::features::HistoryIndex;
    use crate::{RatingScope, RatingSnapshot, TennisError};

    fn build_both(
        db: &Database,
        a: PlayerId,
        b: PlayerId,
        surface: Surface,
        as_of: NaiveDate,
    ) -> (FeatureVector, FeatureVector) {
        let config = FeatureConfig::default();
        let index = HistoryIndex::load(db).unwrap();
        let from_index = build_features(&TemporalQuery::new(&index, &config), a, b, surface, as_of).unwrap();
        let from_db = build_features(&TemporalQuery::new(db, &config), a, b, surface, as_of).unwrap();
        (from_index.features, from_db.features)
    }

    #[test]
    fn test_feature_names_order() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_DIM);
        assert_eq!(FEATURE_NAMES[0], "surface_elo_diff");
        assert_eq!(FEATURE_NAMES[STORED_FEATURE_COUNT - 1], "h2h_surface_advantage");
        assert_eq!(FEATURE_NAMES[FEATURE_DIM - 1], "surface_encoded");
    }

    #[test]
    fn test_field_order_matches_feature_names() {
        let values: Vec<f64> = (0..FEATURE_DIM).map(|i| i as f64 + 0.5).collect();
        let vector = FeatureVector::from_slice(&values).unwrap();
        let json = serde_json::to_value(vector).unwrap();
        let fields = json.as_object().unwrap();
        assert_eq!(fields.len(), FEATURE_DIM);

        let array = vector.to_array();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            assert_eq!(fields[*name].as_f64(), Some(array[i]), "{}", name);
            assert_eq!(array[i], values[i], "{}", name);
        }

        let mirrored = serde_json::to_value(vector.mirrored()).unwrap();
        assert_eq!(mirrored["hand_matchup"], json["hand_matchup"]);
        assert_eq!(mirrored["surface_encoded"], json["surface_encoded"]);
        assert_eq!(mirrored["p1_form_20"], json["p2_form_20"]);
        assert_eq!(mirrored["surface_elo_diff"].as_f64(), Some(-array[0]));
    }

    #[test]
    fn test_concrete_rating_gap() {
        let db = Database::in_memory().unwrap();
        let new = |name: &str| NewPlayer {
            name: name.to_string(),
            birth_date: Some(date(1995, 1, 1)),
            height_cm: Some(185.0),
            hand: Some(Hand::Right),
        };
        let a = db.insert_player(&new("Strong")).unwrap();
        let b = db.insert_player(&new("Steady")).unwrap();
        for (player, value) in [(a, 1700.0), (b, 1500.0)] {
            db.insert_rating(
                "elo",
                &RatingSnapshot {
                    player,
                    scope: RatingScope::Surface(Surface::Hard),
                    value,
                    calculated_at: at(2023, 12, 1, 0),
                },
            )
            .unwrap();
        }

        let (features, from_db) = build_both(&db, a, b, Surface::Hard, date(2024, 1, 1));
        assert_eq!(features, from_db);
        assert_eq!(features.surface_elo_diff, 200.0);
        assert_eq!(features.overall_elo_diff, 0.0);
        assert_eq!(features.form_diff_20, 0.0);
        assert_eq!(features.p1_form_20, 0.5);
        assert_eq!(features.age_diff, 0.0);
        assert_eq!(features.height_diff, 0.0);
        assert_eq!(features.hand_matchup, 0.0);
        assert_eq!(features.h2h_surface_advantage, 0.0);
        assert_eq!(features.surface_encoded, 0.0);
    }

    #[test]
    fn test_physical_defaults() {
        let (db, ids) = fixtures::sample_database();
        // Bob has no height and plays left-handed; Dave has nothing recorded
        let (features, _) = build_both(&db, ids.alice, ids.bob, Surface::Clay, date(2024, 1, 1));
        assert_eq!(features.height_diff, 5.0);
        assert_eq!(features.hand_matchup, 1.0);
        assert!(features.age_diff > 0.0);
        assert_eq!(features.surface_encoded, 1.0);

        let (features, _) = build_both(&db, ids.dave, ids.carol, Surface::Grass, date(2024, 1, 1));
        assert_eq!(features.age_diff, 0.0);
        assert_eq!(features.height_diff, 10.0);
        assert_eq!(features.surface_encoded, 2.0);
    }

    #[test]
    fn test_index_and_database_agree() {
        let (db, ids) = fixtures::sample_database();
        let players = [ids.alice, ids.bob, ids.carol, ids.dave];
        let cutoffs = [
            date(2023, 3, 1),
            date(2023, 3, 15),
            date(2023, 6, 1),
            date(2023, 6, 2),
            date(2023, 8, 1),
            date(2023, 9, 2),
            date(2024, 1, 1),
        ];
        for &a in &players {
            for &b in &players {
                if a == b {
                    continue;
                }
                for surface in Surface::ALL {
                    for &as_of in &cutoffs {
                        let (index, db_vec) = build_both(&db, a, b, surface, as_of);
                        assert_eq!(index, db_vec, "{} vs {} on {} as of {}", a, b, surface, as_of);
                    }
                }
            }
        }

        let iga = db
            .insert_player(&NewPlayer {
                name: "Šwiątek Iga".to_string(),
                ..Default::default()
            })
            .unwrap();
        let index = HistoryIndex::load(&db).unwrap();
        for name in ["šWIĄTEK iga", "ŠWIĄTEK IGA", "Swiatek Iga"] {
            let from_db = db.find_player_by_name(name).unwrap().map(|p| p.id);
            let from_index = index.find_player_by_name(name).unwrap().map(|p| p.id);
            assert_eq!(from_index, from_db, "{:?}", name);
        }
        assert_eq!(db.find_player_by_name("šWIĄTEK iga").unwrap().map(|p| p.id), Some(iga));
    }

    #[test]
    fn test_no_leakage_from_cutoff_day() {
        let (db, ids) = fixtures::sample_database();
        let before = build_both(&db, ids.bob, ids.alice, Surface::Clay, date(2023, 6, 1)).0;

        // Everything dated on or after the cutoff must be invisible
        db.insert_match(&crate::data::NewMatch {
            date: date(2023, 6, 1),
            player1: ids.alice,
            player2: ids.bob,
            winner: Some(ids.alice),
            tournament: None,
            round: None,
        })
        .unwrap();
        db.insert_rating(
            "elo",
            &RatingSnapshot {
                player: ids.bob,
                scope: RatingScope::Overall,
                value: 2500.0,
                calculated_at: at(2023, 6, 1, 0),
            },
        )
        .unwrap();

        let (after, after_db) = build_both(&db, ids.bob, ids.alice, Surface::Clay, date(2023, 6, 1));
        assert_eq!(before, after);
        assert_eq!(after, after_db);
    }

    #[test]
    fn test_mirror_negates_differences() {
        let (db, ids) = fixtures::sample_database();
        let a_b = build_both(&db, ids.alice, ids.bob, Surface::Hard, date(2024, 1, 1)).0;
        let b_a = build_both(&db, ids.bob, ids.alice, Surface::Hard, date(2024, 1, 1)).0;
        assert_eq!(a_b.mirrored(), b_a);
        assert_eq!(a_b.mirrored().mirrored(), a_b);
        assert_eq!(a_b.h2h_surface_advantage, 2.0);
    }

    #[test]
    fn test_unknown_player_aborts_build() {
        let (db, ids) = fixtures::sample_database();
        let config = FeatureConfig::default();
        let query = TemporalQuery::new(&db, &config);
        let result = build_features(&query, ids.alice, PlayerId(999), Surface::Hard, date(2024, 1, 1));
        assert!(matches!(result, Err(TennisError::NotFound(_))));
    }

    #[test]
    fn test_stored_columns_round_trip() {
        let (db, ids) = fixtures::sample_database();
        let features = build_both(&db, ids.alice, ids.carol, Surface::Grass, date(2024, 1, 1)).0;
        let values = features.to_array();
        let rebuilt = FeatureVector::from_stored(&values[..STORED_FEATURE_COUNT], Surface::Grass).unwrap();
        assert_eq!(rebuilt, features);
        assert!(FeatureVector::from_slice(&values[..5]).is_none());
    }
}
