//! Database models and persisted domain types.

use chrono::{DateTime, NaiveDateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::{DbError, schema};
use crate::games::checkers::{Board, Color, PieceId, Position};

/// Lifecycle status of a game record.
///
/// Moves are only accepted while `Active`; `Completed` and `Abandoned`
/// records are archival and read-only.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameStatus {
    /// Created, waiting for the second player.
    Waiting,
    /// Both players joined, moves accepted.
    Active,
    /// Finished with a recorded result.
    Completed,
    /// Abandoned before a natural result.
    Abandoned,
}

/// Terminal cause of a completed game.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EndReason {
    /// Opponent had no pieces or no legal moves.
    Checkmate,
    /// Move clock expired.
    Timeout,
    /// Player resigned.
    Resignation,
    /// Player abandoned the game.
    Abandonment,
    /// Move-count threshold reached.
    Draw,
}

/// One entry in a game's append-only move history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    /// Color that moved.
    pub color: Color,
    /// Source square.
    pub from: Position,
    /// Destination square.
    pub to: Position,
    /// Captured piece id, if the move was a jump.
    pub captured: Option<PieceId>,
    /// Whether the move promoted the piece.
    pub promoted: bool,
    /// Time the player spent on the move, in milliseconds.
    pub duration_ms: u64,
    /// When the move was applied.
    pub played_at: DateTime<Utc>,
}

/// Elo deltas applied to both sides at completion. Deltas are the clamped
/// rating differences, so a reported change never implies a rating outside
/// the allowed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct EloChanges {
    /// Red's rating change.
    pub red_delta: i32,
    /// Blue's rating change.
    pub blue_delta: i32,
    /// Red's rating after clamping.
    pub red_new_rating: i32,
    /// Blue's rating after clamping.
    pub blue_new_rating: i32,
}

/// In-memory view of a persisted game.
///
/// Created at match start, mutated only through the move transaction
/// coordinator, archived read-only on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Unique game id.
    pub game_id: String,
    /// Red player's uid.
    pub player_red: String,
    /// Blue player's uid.
    pub player_blue: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current board state (includes the side to move).
    pub board: Board,
    /// Append-only move log. Its length always equals `total_moves`.
    pub move_history: Vec<MoveEntry>,
    /// Number of moves applied so far.
    pub total_moves: u32,
    /// Winning color, once decided.
    pub winner: Option<Color>,
    /// Terminal cause, once decided.
    pub end_reason: Option<EndReason>,
    /// Elo deltas recorded at completion.
    pub elo_changes: Option<EloChanges>,
    /// When the game was created.
    pub created_at: NaiveDateTime,
}

impl GameRecord {
    /// The uid of the player whose turn it is.
    pub fn current_turn_uid(&self) -> &str {
        match self.board.to_move() {
            Color::Red => &self.player_red,
            Color::Blue => &self.player_blue,
        }
    }

    /// The uid playing the given color.
    pub fn uid_for(&self, color: Color) -> &str {
        match color {
            Color::Red => &self.player_red,
            Color::Blue => &self.player_blue,
        }
    }

    /// The color played by `uid`, if the uid is in this game's roster.
    pub fn color_of(&self, uid: &str) -> Option<Color> {
        if self.player_red == uid {
            Some(Color::Red)
        } else if self.player_blue == uid {
            Some(Color::Blue)
        } else {
            None
        }
    }
}

/// Player rating profile row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::players)]
#[diesel(primary_key(uid))]
pub struct PlayerRow {
    uid: String,
    display_name: String,
    elo_rating: i32,
    total_games: i32,
    wins: i32,
    losses: i32,
    draws: i32,
    peak_rating: i32,
    lowest_rating: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Insertable player profile.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::players)]
pub struct NewPlayer {
    uid: String,
    display_name: String,
    elo_rating: i32,
    total_games: i32,
    wins: i32,
    losses: i32,
    draws: i32,
    peak_rating: i32,
    lowest_rating: i32,
}

impl NewPlayer {
    /// Rating assigned to a freshly created profile.
    pub const STARTING_RATING: i32 = 1200;

    /// Creates a profile at the starting rating with zeroed counters.
    pub fn at_start(uid: String, display_name: String) -> Self {
        Self::new(
            uid,
            display_name,
            Self::STARTING_RATING,
            0,
            0,
            0,
            0,
            Self::STARTING_RATING,
            Self::STARTING_RATING,
        )
    }
}

/// Persisted game row. Board and move history are JSON documents.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::games)]
pub struct GameRow {
    id: String,
    player_red: String,
    player_blue: String,
    status: String,
    current_turn: String,
    board: String,
    move_history: String,
    total_moves: i32,
    winner: Option<String>,
    end_reason: Option<String>,
    elo_red_change: Option<i32>,
    elo_blue_change: Option<i32>,
    final_red_rating: Option<i32>,
    final_blue_rating: Option<i32>,
    game_stats: Option<String>,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
}

impl GameRow {
    /// Decodes this row into a [`GameRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a stored JSON document or enum value is
    /// malformed.
    pub fn to_record(&self) -> Result<GameRecord, DbError> {
        let elo_changes = match (
            self.elo_red_change,
            self.elo_blue_change,
            self.final_red_rating,
            self.final_blue_rating,
        ) {
            (Some(rd), Some(bd), Some(rn), Some(bn)) => Some(EloChanges::new(rd, bd, rn, bn)),
            _ => None,
        };
        Ok(GameRecord {
            game_id: self.id.clone(),
            player_red: self.player_red.clone(),
            player_blue: self.player_blue.clone(),
            status: self.status.parse()?,
            board: serde_json::from_str(&self.board)?,
            move_history: serde_json::from_str(&self.move_history)?,
            total_moves: self.total_moves.max(0) as u32,
            winner: self.winner.as_deref().map(str::parse).transpose()?,
            end_reason: self.end_reason.as_deref().map(str::parse).transpose()?,
            elo_changes,
            created_at: self.created_at,
        })
    }
}

/// Insertable game row.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    id: String,
    player_red: String,
    player_blue: String,
    status: String,
    current_turn: String,
    board: String,
    move_history: String,
    total_moves: i32,
}

impl NewGame {
    /// Encodes a fresh record for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the board fails to serialize.
    pub fn from_record(record: &GameRecord) -> Result<Self, DbError> {
        Ok(Self::new(
            record.game_id.clone(),
            record.player_red.clone(),
            record.player_blue.clone(),
            record.status.to_string(),
            record.current_turn_uid().to_string(),
            serde_json::to_string(&record.board)?,
            serde_json::to_string(&record.move_history)?,
            record.total_moves as i32,
        ))
    }
}

/// Append-only rating history row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::rating_history)]
pub struct RatingHistoryRow {
    id: i32,
    uid: String,
    game_id: String,
    rating_before: i32,
    rating_after: i32,
    delta: i32,
    outcome: String,
    recorded_at: NaiveDateTime,
}

/// Insertable rating history entry.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::rating_history)]
pub struct NewRatingHistory {
    uid: String,
    game_id: String,
    rating_before: i32,
    rating_after: i32,
    delta: i32,
    outcome: String,
}
