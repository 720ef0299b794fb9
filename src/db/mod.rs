//! Persistence layer for game records, rating profiles, and history.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::DbError;
pub use models::{
    EloChanges, EndReason, GameRecord, GameRow, GameStatus, MoveEntry, NewGame, NewPlayer,
    NewRatingHistory, PlayerRow, RatingHistoryRow,
};
pub use repository::GameRepository;

pub(crate) use repository::{
    activate_game, append_rating_history, apply_rating, finalize_game, find_game, find_player,
    record_move,
};
