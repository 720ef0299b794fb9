//! Checkers Arena - ranked checkers with a search AI.
//!
//! # Architecture
//!
//! - **Rules engine** ([`games::checkers`]): pure legal-move and capture
//!   generation, move application, and terminal detection.
//! - **AI search** ([`games::checkers::ai`]): alpha-beta minimax over the
//!   same rules humans play under.
//! - **Coordinator** ([`coordinator`]): validates and atomically applies
//!   moves against persisted game state, exactly once per transaction.
//! - **Rating engine** ([`rating`]): Elo settlement, atomic with game
//!   completion.
//! - **Timeout monitor** ([`timeout`]): per-game move clocks, warnings,
//!   and forfeits.
//! - **Server** ([`server`]): thin REST surface over the coordinator.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod coordinator;
pub mod db;
pub mod games;
pub mod notify;
pub mod rating;
pub mod server;
pub mod timeout;

pub use coordinator::{MoveCoordinator, MoveOutcome, SubmitError};
pub use db::{
    DbError, EloChanges, EndReason, GameRecord, GameRepository, GameStatus, MoveEntry, PlayerRow,
};
pub use games::checkers::{
    AppliedMove, Board, Color, Difficulty, GameRules, Move, Piece, PieceId, PieceKind, Position,
    RulesError,
};
pub use notify::{GameEvent, Notifier};
pub use rating::{
    CompletionSummary, GameResult, GameStats, RatingEngine, RatingError, SideStats,
    calculate_elo_changes, expected_score, k_factor, performance_stats, rating_delta,
};
pub use timeout::{ClockStatus, TimeoutConfig, TimeoutRegistry};
