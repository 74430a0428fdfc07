//! Storage and the training corpus
//!
//! SQLite access to players, matches and rating snapshots, plus the balanced
//! corpus built from them.

pub mod database;
pub mod dataset;
#[cfg(test)]
pub(crate) mod fixtures;

pub use database::{Database, DatabaseStats, NewMatch, NewPlayer, NewTournament};
pub use dataset::{
    build_corpus, export_corpus, read_corpus, write_corpus, BuildReport, Coin, LabeledRow,
    RngCoin, RowPolicy,
};
