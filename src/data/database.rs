//! SQLite storage for players, tournaments, matches and rating snapshots

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use crate::features::temporal::{HistorySource, WinLoss};
use crate::{
    name_key, Hand, MatchId, MatchRecord, Player, PlayerId, RatingScope, RatingSnapshot, Result, Surface,
    TennisError, Tournament, TournamentId,
};

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Match surface resolved through the tournament. A missing surface is Hard;
/// anything outside the three surfaces is NULL and never equals a requested surface.
const MATCH_SURFACE: &str = "CASE LOWER(TRIM(COALESCE(t.surface, ''))) \
     WHEN '' THEN 'Hard' WHEN 'hard' THEN 'Hard' WHEN 'clay' THEN 'Clay' WHEN 'grass' THEN 'Grass' END";

/// Winner recorded and one of the two players
const DECIDED: &str = "m.winner_id IS NOT NULL AND m.winner_id IN (m.player1_id, m.player2_id)";

/// A player to register
#[derive(Debug, Clone, Default)]
pub struct NewPlayer {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub hand: Option<Hand>,
}

/// A tournament to register. `surface` is stored verbatim.
#[derive(Debug, Clone, Default)]
pub struct NewTournament {
    pub name: String,
    pub level: Option<String>,
    pub surface: Option<String>,
}

/// A match to record
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub date: NaiveDate,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub winner: Option<PlayerId>,
    pub tournament: Option<TournamentId>,
    pub round: Option<String>,
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
    rating_system: String,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self::with_connection(Connection::open(path)?)?;
        db.init_schema()?;
        Ok(db)
    }

    /// Open an existing database without write access (serving path)
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = Self::with_connection(Connection::open_in_memory()?)?;
        db.init_schema()?;
        Ok(db)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // name_key(name): the same Unicode case folding the in-memory index uses
        conn.create_scalar_function(
            "name_key",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let name: Option<String> = ctx.get(0)?;
                Ok(name.map(|n| name_key(&n)))
            },
        )?;
        Ok(Database {
            conn,
            rating_system: "elo".to_string(),
        })
    }

    /// Select which `rating_type` snapshots are read
    pub fn with_rating_system(mut self, rating_system: &str) -> Self {
        self.rating_system = rating_system.to_string();
        self
    }

    pub fn rating_system(&self) -> &str {
        &self.rating_system
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                birth_date TEXT,
                height REAL,
                playing_hand TEXT
            );

            CREATE TABLE IF NOT EXISTS tournaments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                level TEXT,
                surface TEXT
            );

            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_date TEXT NOT NULL,
                player1_id INTEGER NOT NULL REFERENCES players(id),
                player2_id INTEGER NOT NULL REFERENCES players(id),
                winner_id INTEGER REFERENCES players(id),
                tournament_id INTEGER REFERENCES tournaments(id),
                round TEXT
            );

            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(id),
                rating_type TEXT NOT NULL,
                surface TEXT,
                rating_value REAL NOT NULL,
                calculated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date);
            CREATE INDEX IF NOT EXISTS idx_matches_p1 ON matches(player1_id, match_date);
            CREATE INDEX IF NOT EXISTS idx_matches_p2 ON matches(player2_id, match_date);
            CREATE INDEX IF NOT EXISTS idx_ratings_player ON ratings(player_id, rating_type, calculated_at);
            "#,
        )?;
        Ok(())
    }

    // ==================== Writes ====================

    pub fn insert_player(&self, player: &NewPlayer) -> Result<PlayerId> {
        self.conn.execute(
            "INSERT INTO players (name, birth_date, height, playing_hand) VALUES (?1, ?2, ?3, ?4)",
            params![
                player.name,
                player.birth_date.map(|d| d.format(DATE_FMT).to_string()),
                player.height_cm,
                player.hand.map(|h| h.code()),
            ],
        )?;
        Ok(PlayerId(self.conn.last_insert_rowid()))
    }

    pub fn insert_tournament(&self, tournament: &NewTournament) -> Result<TournamentId> {
        self.conn.execute(
            "INSERT INTO tournaments (name, level, surface) VALUES (?1, ?2, ?3)",
            params![tournament.name, tournament.level, tournament.surface],
        )?;
        Ok(TournamentId(self.conn.last_insert_rowid()))
    }

    pub fn get_tournament(&self, id: TournamentId) -> Result<Tournament> {
        let sql = format!(
            "SELECT t.id, t.name, t.level, {} FROM tournaments t WHERE t.id = ?1",
            MATCH_SURFACE
        );
        self.conn
            .query_row(&sql, params![id.0], |row| {
                let surface: Option<String> = row.get(3)?;
                Ok(Tournament {
                    id: TournamentId(row.get(0)?),
                    name: row.get(1)?,
                    level: row.get(2)?,
                    surface: surface.as_deref().and_then(Surface::parse),
                })
            })
            .optional()?
            .ok_or_else(|| TennisError::NotFound(format!("Tournament({})", id.0)))
    }

    pub fn insert_match(&self, record: &NewMatch) -> Result<MatchId> {
        self.conn.execute(
            "INSERT INTO matches (match_date, player1_id, player2_id, winner_id, tournament_id, round)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.date.format(DATE_FMT).to_string(),
                record.player1.0,
                record.player2.0,
                record.winner.map(|w| w.0),
                record.tournament.map(|t| t.0),
                record.round,
            ],
        )?;
        Ok(MatchId(self.conn.last_insert_rowid()))
    }

    /// Store a snapshot under an explicit `rating_type`
    pub fn insert_rating(&self, rating_type: &str, snapshot: &RatingSnapshot) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ratings (player_id, rating_type, surface, rating_value, calculated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.player.0,
                rating_type,
                snapshot.scope.surface().map(|s| s.as_str()),
                snapshot.value,
                snapshot.calculated_at.format(TIMESTAMP_FMT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// Raw write for upstream data that does not fit the typed snapshot
    pub fn insert_raw_rating(
        &self,
        player: PlayerId,
        rating_type: &str,
        surface: Option<&str>,
        value: f64,
        calculated_at: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ratings (player_id, rating_type, surface, rating_value, calculated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![player.0, rating_type, surface, value, calculated_at],
        )?;
        Ok(())
    }

    // ==================== Players ====================

    pub fn get_player(&self, id: PlayerId) -> Result<Player> {
        self.conn
            .query_row(
                "SELECT id, name, birth_date, height, playing_hand FROM players WHERE id = ?1",
                params![id.0],
                Self::row_to_player,
            )
            .optional()?
            .ok_or_else(|| TennisError::NotFound(id.to_string()))
    }

    /// Find a player by name, case-insensitively
    pub fn find_player_by_name(&self, name: &str) -> Result<Option<Player>> {
        let player = self
            .conn
            .query_row(
                "SELECT id, name, birth_date, height, playing_hand FROM players
                 WHERE name_key(name) = ?1 ORDER BY id LIMIT 1",
                params![name_key(name)],
                Self::row_to_player,
            )
            .optional()?;
        Ok(player)
    }

    pub fn get_all_players(&self) -> Result<Vec<Player>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, birth_date, height, playing_hand FROM players ORDER BY id")?;
        let players = stmt
            .query_map([], Self::row_to_player)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(players)
    }

    fn require_player(&self, id: PlayerId) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM players WHERE id = ?1)",
            params![id.0],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(TennisError::NotFound(id.to_string()))
        }
    }

    fn row_to_player(row: &rusqlite::Row) -> rusqlite::Result<Player> {
        let birth: Option<String> = row.get(2)?;
        let hand: Option<String> = row.get(4)?;
        Ok(Player {
            id: PlayerId(row.get(0)?),
            name: row.get(1)?,
            birth_date: birth.as_deref().and_then(parse_date_prefix),
            height_cm: row.get(3)?,
            hand: hand.as_deref().and_then(Hand::from_code),
        })
    }

    // ==================== Bulk reads ====================

    /// All snapshots of the configured rating system, oldest first; equal
    /// timestamps keep storage id order.
    /// Snapshots with an unrecognised surface or timestamp are skipped.
    pub fn get_all_ratings(&self) -> Result<Vec<RatingSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, player_id, surface, rating_value, calculated_at FROM ratings
             WHERE rating_type = ?1
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![self.rating_system], RatingRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut snapshots: Vec<RatingSnapshot> = rows
            .into_iter()
            .filter_map(|row| row.resolve().map(|(_, snapshot)| snapshot))
            .collect();
        snapshots.sort_by_key(|s| s.calculated_at);
        Ok(snapshots)
    }

    /// All decided matches, oldest first
    pub fn get_decided_matches(&self) -> Result<Vec<MatchRecord>> {
        self.query_matches(&format!("WHERE {DECIDED}"), &[])
    }

    /// Decided matches on or after `start`, oldest first
    pub fn get_matches_since(&self, start: NaiveDate) -> Result<Vec<MatchRecord>> {
        let start = start.format(DATE_FMT).to_string();
        self.query_matches(&format!("WHERE {DECIDED} AND m.match_date >= ?1"), &[&start])
    }

    /// Every stored match on or after `start`, including undecided and inconsistent rows
    pub fn get_all_matches_since(&self, start: NaiveDate) -> Result<Vec<MatchRecord>> {
        let start = start.format(DATE_FMT).to_string();
        self.query_matches("WHERE m.match_date >= ?1", &[&start])
    }

    fn query_matches(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MatchRecord>> {
        let sql = format!(
            "SELECT m.id, m.match_date, m.player1_id, m.player2_id, m.winner_id, {MATCH_SURFACE}, m.round
             FROM matches m LEFT JOIN tournaments t ON m.tournament_id = t.id
             {filter}
             ORDER BY m.match_date, m.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let matches = stmt
            .query_map(args, Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<MatchRecord> {
        let date_str: String = row.get(1)?;
        let date = parse_date_prefix(&date_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("invalid match date {:?}", date_str).into(),
            )
        })?;
        let surface: Option<String> = row.get(5)?;
        Ok(MatchRecord {
            id: MatchId(row.get(0)?),
            date,
            player1: PlayerId(row.get(2)?),
            player2: PlayerId(row.get(3)?),
            winner: row.get::<_, Option<i64>>(4)?.map(PlayerId),
            surface: surface.as_deref().and_then(Surface::parse),
            round: row.get(6)?,
        })
    }

    // ==================== Statistics ====================

    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let player_count = count("SELECT COUNT(*) FROM players")?;
        let tournament_count = count("SELECT COUNT(*) FROM tournaments")?;
        let match_count = count("SELECT COUNT(*) FROM matches")?;
        let decided_count = count(&format!("SELECT COUNT(*) FROM matches m WHERE {DECIDED}"))?;
        let rating_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ratings WHERE rating_type = ?1",
            params![self.rating_system],
            |row| row.get(0),
        )?;

        let (min_date, max_date): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(match_date), MAX(match_date) FROM matches",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatabaseStats {
            player_count,
            tournament_count,
            match_count,
            decided_count,
            rating_count: rating_count as usize,
            earliest_match: min_date.as_deref().and_then(parse_date_prefix),
            latest_match: max_date.as_deref().and_then(parse_date_prefix),
        })
    }
}

/// Point lookups, one query per statistic
impl HistorySource for Database {
    fn player(&self, id: PlayerId) -> Result<Player> {
        self.get_player(id)
    }

    fn find_player_by_name(&self, name: &str) -> Result<Option<Player>> {
        Database::find_player_by_name(self, name)
    }

    fn latest_rating(
        &self,
        player: PlayerId,
        scope: RatingScope,
        before: NaiveDate,
    ) -> Result<Option<f64>> {
        self.require_player(player)?;
        let surface_filter = match scope {
            RatingScope::Overall => "surface IS NULL",
            RatingScope::Surface(_) => "surface IS NOT NULL",
        };
        // Candidates by date prefix; the cutoff and ordering are applied to the
        // parsed timestamps so the result matches the in-memory index
        let sql = format!(
            "SELECT id, player_id, surface, rating_value, calculated_at FROM ratings
             WHERE player_id = ?1 AND rating_type = ?2 AND {surface_filter}
               AND substr(calculated_at, 1, 10) <= ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![player.0, self.rating_system, before.format(DATE_FMT).to_string()],
                RatingRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let latest = rows
            .into_iter()
            .filter_map(RatingRow::resolve)
            .filter(|(_, s)| s.scope == scope && s.calculated_at.date() < before)
            .max_by_key(|(id, s)| (s.calculated_at, *id));
        Ok(latest.map(|(_, s)| s.value))
    }

    fn surface_record(
        &self,
        player: PlayerId,
        surface: Surface,
        from: NaiveDate,
        before: NaiveDate,
    ) -> Result<WinLoss> {
        self.require_player(player)?;
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(m.winner_id = ?1), 0)
             FROM matches m LEFT JOIN tournaments t ON m.tournament_id = t.id
             WHERE (m.player1_id = ?1 OR m.player2_id = ?1)
               AND {DECIDED}
               AND {MATCH_SURFACE} = ?2
               AND m.match_date >= ?3
               AND m.match_date < ?4"
        );
        let (total, wins): (i64, i64) = self.conn.query_row(
            &sql,
            params![
                player.0,
                surface.as_str(),
                from.format(DATE_FMT).to_string(),
                before.format(DATE_FMT).to_string()
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(WinLoss {
            wins: wins as u32,
            total: total as u32,
        })
    }

    fn recent_record(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        before: NaiveDate,
        limit: usize,
    ) -> Result<WinLoss> {
        self.require_player(player)?;
        let surface_filter = if surface.is_some() {
            format!("AND {MATCH_SURFACE} = ?4")
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT m.winner_id = ?1
             FROM matches m LEFT JOIN tournaments t ON m.tournament_id = t.id
             WHERE (m.player1_id = ?1 OR m.player2_id = ?1)
               AND {DECIDED}
               AND m.match_date < ?2
               {surface_filter}
             ORDER BY m.match_date DESC, m.id DESC
             LIMIT ?3"
        );
        let before = before.format(DATE_FMT).to_string();
        let limit = limit as i64;
        let mut stmt = self.conn.prepare(&sql)?;
        let results = match surface {
            Some(s) => stmt
                .query_map(params![player.0, before, limit, s.as_str()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<bool>, _>>()?,
            None => stmt
                .query_map(params![player.0, before, limit], |row| row.get(0))?
                .collect::<std::result::Result<Vec<bool>, _>>()?,
        };

        let mut record = WinLoss::default();
        for won in results {
            record.record(won);
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
        self.require_player(a)?;
        self.require_player(b)?;
        let sql = format!(
            "SELECT COALESCE(SUM(m.winner_id = ?1), 0), COALESCE(SUM(m.winner_id = ?2), 0)
             FROM matches m LEFT JOIN tournaments t ON m.tournament_id = t.id
             WHERE ((m.player1_id = ?1 AND m.player2_id = ?2)
                 OR (m.player1_id = ?2 AND m.player2_id = ?1))
               AND {DECIDED}
               AND {MATCH_SURFACE} = ?3
               AND m.match_date < ?4"
        );
        let (a_wins, b_wins): (i64, i64) = self.conn.query_row(
            &sql,
            params![a.0, b.0, surface.as_str(), before.format(DATE_FMT).to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((a_wins as u32, b_wins as u32))
    }
}

/// A raw `ratings` row
struct RatingRow {
    id: i64,
    player: i64,
    surface: Option<String>,
    value: f64,
    calculated_at: String,
}

impl RatingRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(RatingRow {
            id: row.get(0)?,
            player: row.get(1)?,
            surface: row.get(2)?,
            value: row.get(3)?,
            calculated_at: row.get(4)?,
        })
    }

    /// Typed snapshot with its storage id; None for an unrecognised surface or timestamp
    fn resolve(self) -> Option<(i64, RatingSnapshot)> {
        let scope = match self.surface.as_deref() {
            None => RatingScope::Overall,
            Some(s) => RatingScope::Surface(Surface::parse(s)?),
        };
        let Some(calculated_at) = parse_timestamp(&self.calculated_at) else {
            log::warn!(
                "Skipping rating for Player({}) with unparseable timestamp {:?}",
                self.player,
                self.calculated_at
            );
            return None;
        };
        Some((
            self.id,
            RatingSnapshot {
                player: PlayerId(self.player),
                scope,
                value: self.value,
                calculated_at,
            },
        ))
    }
}

/// Parse the leading `YYYY-MM-DD` of a stored date or timestamp
fn parse_date_prefix(value: &str) -> Option<NaiveDate> {
    let prefix = value.get(..10)?;
    NaiveDate::parse_from_str(prefix, DATE_FMT).ok()
}

/// Parse a stored snapshot timestamp. Offsets (`Z`, `+00`, `+05:30`) are
/// converted to UTC; a bare date means midnight.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.naive_utc())
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FMT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub player_count: usize,
    pub tournament_count: usize,
    pub match_count: usize,
    pub decided_count: usize,
    pub rating_count: usize,
    pub earliest_match: Option<NaiveDate>,
    pub latest_match: Option<NaiveDate>,
}
