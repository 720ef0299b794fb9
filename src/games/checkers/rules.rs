//! Rules engine: legal-move and capture generation, move application,
//! and terminal detection.
//!
//! Every function here is a pure, deterministic transform over a [`Board`]
//! snapshot. Identical inputs always yield identical outputs; the engine
//! holds no hidden state.

use derive_more::{Display, Error};
use tracing::instrument;

use super::types::{AppliedMove, Board, Color, GameRules, Move, Piece, PieceKind, Position};

/// Rules engine failure for structurally invalid input.
///
/// Engine functions never fail for a structurally valid board and move;
/// these variants cover out-of-range coordinates and missing pieces,
/// which the coordinator surfaces to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum RulesError {
    /// A coordinate lies outside the board or on a light square.
    #[display("square {pos} is out of bounds or not playable")]
    MoveOutOfBounds {
        /// The offending coordinate.
        pos: Position,
    },
    /// No piece occupies the move's source square.
    #[display("no piece at source square {pos}")]
    NoPieceAtSource {
        /// The empty source square.
        pos: Position,
    },
}

/// True if `pos` is on the board and on a playable (dark) square.
pub fn valid_square(pos: Position, rules: &GameRules) -> bool {
    pos.row >= 0
        && pos.col >= 0
        && pos.row < rules.board_size
        && pos.col < rules.board_size
        && (pos.row + pos.col) % 2 == 1
}

/// Diagonal directions a piece may capture along.
fn capture_directions(piece: &Piece, rules: &GameRules) -> Vec<(i16, i16)> {
    match piece.kind {
        PieceKind::King => vec![(1, 1), (1, -1), (-1, 1), (-1, -1)],
        PieceKind::Normal => {
            let fwd = piece.color.forward();
            let mut dirs = vec![(fwd, 1), (fwd, -1)];
            if rules.backward_captures {
                dirs.push((-fwd, 1));
                dirs.push((-fwd, -1));
            }
            dirs
        }
    }
}

/// Diagonal directions a piece may make a quiet move along.
fn move_directions(piece: &Piece) -> Vec<(i16, i16)> {
    match piece.kind {
        PieceKind::King => vec![(1, 1), (1, -1), (-1, 1), (-1, -1)],
        PieceKind::Normal => {
            let fwd = piece.color.forward();
            vec![(fwd, 1), (fwd, -1)]
        }
    }
}

/// Landing squares for captures available to `piece`.
///
/// For each allowed direction: an adjacent opposing piece with an empty,
/// valid square beyond it yields that square as a target. Flying kings may
/// approach the victim across any number of empty squares.
#[instrument(skip(board), fields(piece_id = piece.id))]
pub fn capture_targets(piece: &Piece, board: &Board) -> Vec<Position> {
    let rules = board.rules();
    let mut targets = Vec::new();

    for (dr, dc) in capture_directions(piece, rules) {
        let flying = piece.kind == PieceKind::King && rules.flying_kings;
        let mut scan = piece.position.offset(dr, dc);

        // Flying kings slide over empty squares before the victim.
        while flying && valid_square(scan, rules) && board.piece_at(scan).is_none() {
            scan = scan.offset(dr, dc);
        }

        if !valid_square(scan, rules) {
            continue;
        }
        let Some(victim) = board.piece_at(scan) else {
            continue;
        };
        if victim.color == piece.color {
            continue;
        }
        let landing = scan.offset(dr, dc);
        if valid_square(landing, rules) && board.piece_at(landing).is_none() {
            targets.push(landing);
        }
    }

    targets
}

/// Landing squares for quiet (non-capturing) moves available to `piece`.
#[instrument(skip(board), fields(piece_id = piece.id))]
pub fn move_targets(piece: &Piece, board: &Board) -> Vec<Position> {
    let rules = board.rules();
    let mut targets = Vec::new();

    for (dr, dc) in move_directions(piece) {
        let mut dest = piece.position.offset(dr, dc);
        while valid_square(dest, rules) && board.piece_at(dest).is_none() {
            targets.push(dest);
            if piece.kind != PieceKind::King || !rules.flying_kings {
                break;
            }
            dest = dest.offset(dr, dc);
        }
    }

    targets
}

/// All legal moves for `color`.
///
/// Under `forced_capture`, if any piece of `color` can capture, the legal
/// set is restricted to exactly those capture moves.
#[instrument(skip(board))]
pub fn legal_moves_for_player(board: &Board, color: Color) -> Vec<Move> {
    let mut captures = Vec::new();
    let mut quiets = Vec::new();

    for piece in board.pieces().iter().filter(|p| p.color == color) {
        for to in capture_targets(piece, board) {
            captures.push(Move::new(piece.position, to));
        }
        for to in move_targets(piece, board) {
            quiets.push(Move::new(piece.position, to));
        }
    }

    if board.rules().forced_capture && !captures.is_empty() {
        return captures;
    }
    captures.extend(quiets);
    captures
}

/// True iff `color` has legal moves and all of them are captures.
#[instrument(skip(board))]
pub fn must_capture(board: &Board, color: Color) -> bool {
    board.rules().forced_capture
        && board
            .pieces()
            .iter()
            .filter(|p| p.color == color)
            .any(|p| !capture_targets(p, board).is_empty())
}

/// Finds the single opposing piece strictly between `from` and `to`, if any.
///
/// A move is a capture iff exactly one enemy piece sits on the diagonal
/// between source and destination; anything else on that path makes the
/// move a quiet slide or illegal (illegality is the validator's concern).
fn captured_between(board: &Board, mover: &Piece, from: Position, to: Position) -> Option<Piece> {
    let dr = (to.row - from.row).signum();
    let dc = (to.col - from.col).signum();
    let mut scan = from.offset(dr, dc);
    let mut victim = None;

    while scan != to {
        if let Some(p) = board.piece_at(scan) {
            if p.color == mover.color || victim.is_some() {
                return None;
            }
            victim = Some(*p);
        }
        scan = scan.offset(dr, dc);
    }
    victim
}

/// Applies `mv` to a copy of `board`, returning the new board and the
/// applied-move record.
///
/// The moving piece is relocated, the captured piece (inferred from the
/// jump geometry) is removed, and the piece is promoted on reaching its
/// farthest rank. The side to move is left unchanged; turn handoff
/// (including multi-jump retention) belongs to [`next_to_move`].
///
/// # Errors
///
/// Returns [`RulesError::MoveOutOfBounds`] for coordinates off the playable
/// squares and [`RulesError::NoPieceAtSource`] when the source is empty.
#[instrument(skip(board))]
pub fn apply_move(board: &Board, mv: Move) -> Result<(Board, AppliedMove), RulesError> {
    let rules = *board.rules();
    if !valid_square(mv.from, &rules) {
        return Err(RulesError::MoveOutOfBounds { pos: mv.from });
    }
    if !valid_square(mv.to, &rules) {
        return Err(RulesError::MoveOutOfBounds { pos: mv.to });
    }
    let mover = *board
        .piece_at(mv.from)
        .ok_or(RulesError::NoPieceAtSource { pos: mv.from })?;

    let captured = captured_between(board, &mover, mv.from, mv.to);
    let promotes =
        mover.kind == PieceKind::Normal && mv.to.row == mover.color.promotion_row(rules.board_size);

    let mut next = board.clone();
    if let Some(victim) = captured {
        next.pieces_mut().retain(|p| p.id != victim.id);
    }
    for piece in next.pieces_mut().iter_mut() {
        if piece.id == mover.id {
            piece.position = mv.to;
            if promotes {
                piece.kind = PieceKind::King;
            }
        }
    }

    let applied = AppliedMove {
        color: mover.color,
        from: mv.from,
        to: mv.to,
        captured: captured.map(|p| p.id),
        promoted: promotes,
    };
    Ok((next, applied))
}

/// Decides who moves next after `applied` on the resulting `board`.
///
/// The mover retains the turn when the move was a capture, the piece can
/// capture again, it did not just promote, and multi-jumps are enabled.
pub fn next_to_move(board: &Board, applied: &AppliedMove) -> Color {
    if board.rules().multiple_jumps && applied.is_capture() && !applied.promoted {
        if let Some(piece) = board.piece_at(applied.to) {
            if piece.color == applied.color && !capture_targets(piece, board).is_empty() {
                return applied.color;
            }
        }
    }
    applied.color.opponent()
}

/// Returns the winning color if the position is decided.
///
/// A color with zero pieces, or with pieces but no legal moves, loses.
#[instrument(skip(board))]
pub fn winner(board: &Board) -> Option<Color> {
    for color in [Color::Red, Color::Blue] {
        if board.count(color) == 0 || legal_moves_for_player(board, color).is_empty() {
            return Some(color.opponent());
        }
    }
    None
}
