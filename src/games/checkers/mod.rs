//! Checkers: board model, rules engine, and search AI.

pub mod ai;
pub mod rules;
pub mod types;

pub use ai::{Difficulty, choose_move, evaluate, search};
pub use rules::{
    RulesError, apply_move, capture_targets, legal_moves_for_player, move_targets, must_capture,
    next_to_move, valid_square, winner,
};
pub use types::{AppliedMove, Board, Color, GameRules, Move, Piece, PieceId, PieceKind, Position};
