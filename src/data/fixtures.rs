//! Shared sample database for tests

use chrono::{NaiveDate, NaiveDateTime};

use super::database::{Database, NewMatch, NewPlayer, NewTournament};
use crate::{Hand, PlayerId, RatingScope, RatingSnapshot, Surface, TournamentId};

/// Decided, consistent matches in [`sample_database`]
pub const DECIDED_MATCHES: usize = 5;

/// Decided, consistent matches on Hard, Clay or Grass
pub const SURFACE_MATCHES: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct FixtureIds {
    pub alice: PlayerId,
    pub bob: PlayerId,
    pub carol: PlayerId,
    /// Registered but never played and never rated
    pub dave: PlayerId,
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

fn player(db: &Database, name: &str, birth: Option<NaiveDate>, height: Option<f64>, hand: Option<Hand>) -> PlayerId {
    db.insert_player(&NewPlayer {
        name: name.to_string(),
        birth_date: birth,
        height_cm: height,
        hand,
    })
    .unwrap()
}

fn tournament(db: &Database, name: &str, surface: Option<&str>) -> TournamentId {
    db.insert_tournament(&NewTournament {
        name: name.to_string(),
        level: Some("ATP250".to_string()),
        surface: surface.map(str::to_string),
    })
    .unwrap()
}

fn played(
    db: &Database,
    on: NaiveDate,
    p1: PlayerId,
    p2: PlayerId,
    winner: Option<PlayerId>,
    at_tournament: TournamentId,
) {
    db.insert_match(&NewMatch {
        date: on,
        player1: p1,
        player2: p2,
        winner,
        tournament: Some(at_tournament),
        round: Some("R32".to_string()),
    })
    .unwrap();
}

fn rated(db: &Database, who: PlayerId, scope: RatingScope, value: f64, calculated_at: NaiveDateTime) {
    db.insert_rating(
        "elo",
        &RatingSnapshot {
            player: who,
            scope,
            value,
            calculated_at,
        },
    )
    .unwrap();
}

/// Four players with a short 2023 season.
///
/// Matches (date, p1 vs p2, winner, surface):
/// - 2023-03-01 Alice vs Bob, Alice, Hard
/// - 2023-03-15 Alice vs Bob, Alice, tournament without surface (Hard)
/// - 2023-06-01 Bob vs Alice, Bob, Clay
/// - 2023-06-10 Carol vs Bob, Carol, Clay
/// - 2023-07-05 Carol vs Alice, undecided, Grass
/// - 2023-08-01 Carol vs Bob, winner recorded as Alice, Hard
/// - 2023-09-01 Alice vs Carol, Alice, Carpet
pub fn sample_database() -> (Database, FixtureIds) {
    let db = Database::in_memory().unwrap();

    let ids = FixtureIds {
        alice: player(&db, "Alice Ace", Some(date(1995, 5, 5)), Some(185.0), Some(Hand::Right)),
        bob: player(&db, "Bob Baseline", Some(date(1998, 1, 1)), None, Some(Hand::Left)),
        carol: player(&db, "Carol Clay", Some(date(2000, 7, 20)), Some(170.0), Some(Hand::Right)),
        dave: player(&db, "Dave Debut", None, None, None),
    };

    let hard = tournament(&db, "Hard Open", Some("Hard"));
    let unknown = tournament(&db, "Mystery Cup", None);
    let clay = tournament(&db, "Clay Masters", Some("clay"));
    let grass = tournament(&db, "Grass Trophy", Some("Grass"));
    let carpet = tournament(&db, "Indoor Series", Some("Carpet"));

    played(&db, date(2023, 3, 1), ids.alice, ids.bob, Some(ids.alice), hard);
    played(&db, date(2023, 3, 15), ids.alice, ids.bob, Some(ids.alice), unknown);
    played(&db, date(2023, 6, 1), ids.bob, ids.alice, Some(ids.bob), clay);
    played(&db, date(2023, 6, 10), ids.carol, ids.bob, Some(ids.carol), clay);
    played(&db, date(2023, 7, 5), ids.carol, ids.alice, None, grass);
    played(&db, date(2023, 8, 1), ids.carol, ids.bob, Some(ids.alice), hard);
    played(&db, date(2023, 9, 1), ids.alice, ids.carol, Some(ids.alice), carpet);

    let clay_scope = RatingScope::Surface(Surface::Clay);
    rated(&db, ids.alice, RatingScope::Overall, 1550.0, at(2023, 3, 1, 10));
    rated(&db, ids.alice, RatingScope::Overall, 1620.0, at(2023, 3, 15, 0));
    rated(&db, ids.alice, clay_scope, 1600.0, at(2023, 5, 1, 0));
    rated(&db, ids.alice, clay_scope, 1650.0, at(2023, 6, 1, 0));
    rated(&db, ids.bob, RatingScope::Overall, 1480.0, at(2023, 3, 1, 12));
    rated(&db, ids.bob, clay_scope, 1560.0, at(2023, 6, 1, 18));
    rated(&db, ids.carol, clay_scope, 1700.0, at(2023, 6, 10, 20));

    // Noise the readers must ignore
    db.insert_rating(
        "glicko2",
        &RatingSnapshot {
            player: ids.alice,
            scope: RatingScope::Overall,
            value: 9999.0,
            calculated_at: at(2023, 1, 1, 0),
        },
    )
    .unwrap();
    db.insert_raw_rating(ids.bob, "elo", Some("Carpet"), 1234.0, "2023-02-01 00:00:00")
        .unwrap();

    (db, ids)
}
