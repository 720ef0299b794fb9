//! Search-based AI: position evaluation, alpha-beta minimax, and move choice.
//!
//! The search reuses [`legal_moves_for_player`] so AI moves are judged by
//! exactly the same rules as human moves. Absence of a move is a valid
//! outcome (it signals a lost position), never an error.

use rand::seq::SliceRandom;
use tracing::{debug, instrument};

use super::rules::{apply_move, capture_targets, legal_moves_for_player, next_to_move, winner};
use super::types::{Board, Color, Move, PieceKind};

/// AI playing strength.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    /// Capture-priority random choice, no search.
    Easy,
    /// Alpha-beta search to depth 2.
    Medium,
    /// Alpha-beta search to depth 3.
    Hard,
}

impl Difficulty {
    /// Search depth for this difficulty; `None` skips the search entirely.
    fn depth(self) -> Option<u8> {
        match self {
            Difficulty::Easy => None,
            Difficulty::Medium => Some(2),
            Difficulty::Hard => Some(3),
        }
    }
}

/// Score granted per normal piece; kings are worth double.
const MAN_VALUE: i32 = 100;
/// Sentinel for decided or move-less nodes; dominates any material total.
const WIN_SCORE: i32 = 100_000;

/// Static evaluation of `board` from `for_color`'s perspective.
///
/// Material (man 100, king 200) plus a small advancement bonus toward the
/// promotion rank and mild center weighting.
#[instrument(skip(board))]
pub fn evaluate(board: &Board, for_color: Color) -> i32 {
    let size = board.rules().board_size;
    let mid_lo = size / 2 - 2;
    let mid_hi = size / 2 + 1;
    let mut score = 0;

    for piece in board.pieces() {
        let mut value = match piece.kind {
            PieceKind::Normal => {
                let advanced = match piece.color {
                    Color::Red => piece.position.row,
                    Color::Blue => size - 1 - piece.position.row,
                };
                MAN_VALUE + i32::from(advanced) * 3
            }
            PieceKind::King => MAN_VALUE * 2,
        };
        if piece.position.col >= mid_lo && piece.position.col <= mid_hi {
            value += 4;
        }
        if piece.color == for_color {
            score += value;
        } else {
            score -= value;
        }
    }
    score
}

/// Minimax with alpha-beta pruning.
///
/// Returns the node score and, at the root of each subtree, the best move
/// found. Terminal and move-less nodes score the win sentinel for or
/// against the searching side rather than a static evaluation.
pub fn search(
    board: &Board,
    depth: u8,
    mut alpha: i32,
    mut beta: i32,
    maximizing: bool,
    for_color: Color,
) -> (i32, Option<Move>) {
    if let Some(won_by) = winner(board) {
        let score = if won_by == for_color {
            WIN_SCORE
        } else {
            -WIN_SCORE
        };
        return (score, None);
    }
    if depth == 0 {
        return (evaluate(board, for_color), None);
    }

    let mover = if maximizing {
        for_color
    } else {
        for_color.opponent()
    };
    let moves = legal_moves_for_player(board, mover);
    if moves.is_empty() {
        let score = if maximizing { -WIN_SCORE } else { WIN_SCORE };
        return (score, None);
    }

    let mut best_move = None;
    let mut best_score = if maximizing { i32::MIN } else { i32::MAX };

    for mv in moves {
        let Ok((mut child, applied)) = apply_move(board, mv) else {
            // Generated moves are structurally valid by construction.
            continue;
        };
        let next_mover = next_to_move(&child, &applied);
        child.set_to_move(next_mover);
        let child_maximizing = next_mover == for_color;
        let (score, _) = search(&child, depth - 1, alpha, beta, child_maximizing, for_color);

        if maximizing {
            if score > best_score {
                best_score = score;
                best_move = Some(mv);
            }
            alpha = alpha.max(best_score);
        } else {
            if score < best_score {
                best_score = score;
                best_move = Some(mv);
            }
            beta = beta.min(best_score);
        }
        if beta <= alpha {
            break;
        }
    }

    (best_score, best_move)
}

/// Picks a random legal move, preferring captures when any exist.
fn random_move(board: &Board, color: Color) -> Option<Move> {
    let moves = legal_moves_for_player(board, color);
    let captures: Vec<Move> = moves
        .iter()
        .copied()
        .filter(|mv| {
            board
                .piece_at(mv.from)
                .is_some_and(|p| capture_targets(p, board).contains(&mv.to))
        })
        .collect();

    let mut rng = rand::thread_rng();
    if !captures.is_empty() {
        captures.choose(&mut rng).copied()
    } else {
        moves.choose(&mut rng).copied()
    }
}

/// Chooses a move for `color` at the given difficulty.
///
/// The search result is re-checked against the current legal-move set and
/// the choice degrades to a random legal move (captures first) if the
/// search returned nothing usable. Returns `None` only when no legal move
/// exists.
#[instrument(skip(board))]
pub fn choose_move(board: &Board, color: Color, difficulty: Difficulty) -> Option<Move> {
    let legal = legal_moves_for_player(board, color);
    if legal.is_empty() {
        debug!(%color, "no legal moves available");
        return None;
    }

    if let Some(depth) = difficulty.depth() {
        let (score, best) = search(board, depth, i32::MIN, i32::MAX, true, color);
        if let Some(mv) = best {
            if legal.contains(&mv) {
                debug!(%color, ?mv, score, "search selected move");
                return Some(mv);
            }
            debug!(%color, ?mv, "search result not in legal set, falling back");
        }
    }

    random_move(board, color)
}
