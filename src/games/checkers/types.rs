//! Core domain types for checkers.

use serde::{Deserialize, Serialize};

/// Player color. Red moves first and advances toward higher rows.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    /// Red side (rows 0..3 at setup, promotes on the last row).
    Red,
    /// Blue side (top rows at setup, promotes on row 0).
    Blue,
}

impl Color {
    /// Returns the opposing color.
    pub fn opponent(self) -> Self {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }

    /// Row delta for this color's forward direction.
    pub fn forward(self) -> i16 {
        match self {
            Color::Red => 1,
            Color::Blue => -1,
        }
    }

    /// The promotion row for this color on a board of the given size.
    pub fn promotion_row(self, board_size: i16) -> i16 {
        match self {
            Color::Red => board_size - 1,
            Color::Blue => 0,
        }
    }
}

/// Kind of piece: a normal man or a crowned king.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    /// Ordinary piece, moves forward only.
    Normal,
    /// Crowned piece, moves along all four diagonals.
    King,
}

/// A square coordinate. Playable squares are the dark squares,
/// where `(row + col)` is odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_new::new)]
pub struct Position {
    /// Row index, 0-based from red's back rank.
    pub row: i16,
    /// Column index, 0-based.
    pub col: i16,
}

impl Position {
    /// Offsets this position by the given deltas.
    pub fn offset(self, dr: i16, dc: i16) -> Self {
        Self {
            row: self.row + dr,
            col: self.col + dc,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Stable identifier for a piece. Assigned at setup and never reused.
pub type PieceId = u32;

/// A piece on the board. Identity (`id`) persists across moves;
/// position and kind may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    /// Stable identifier.
    pub id: PieceId,
    /// Owning color.
    pub color: Color,
    /// Normal or king.
    pub kind: PieceKind,
    /// Current square.
    pub position: Position,
}

/// A requested move. The captured piece, if any, is derived by the
/// rules engine from the jump geometry rather than chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct Move {
    /// Source square.
    pub from: Position,
    /// Destination square.
    pub to: Position,
}

/// Rule configuration for a game.
///
/// The historical rule variants (backward captures, flying kings) are
/// explicit flags with one deterministic behavior per value rather than
/// a single hard-coded convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    /// Board side length. Must be even and at least 4.
    pub board_size: i16,
    /// When true, a player who can capture must capture.
    pub forced_capture: bool,
    /// When true, kings slide any number of empty squares.
    pub flying_kings: bool,
    /// When true, a capturing piece that can capture again keeps the turn.
    pub multiple_jumps: bool,
    /// When true, normal pieces may capture backward (movement stays forward).
    pub backward_captures: bool,
    /// Total move count at which the game is declared drawn.
    pub draw_after_moves: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            board_size: 8,
            forced_capture: true,
            flying_kings: false,
            multiple_jumps: true,
            backward_captures: false,
            draw_after_moves: 200,
        }
    }
}

/// Full board state: pieces, side to move, and the rule configuration.
///
/// Invariants: no two pieces share a square, every position is a valid
/// dark square, and every piece belongs to exactly one color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pieces: Vec<Piece>,
    to_move: Color,
    rules: GameRules,
}

impl Board {
    /// Creates a board with the standard starting layout for the given rules:
    /// each side fills its first `(board_size / 2) - 1` rows on dark squares.
    pub fn standard(rules: GameRules) -> Self {
        let size = rules.board_size;
        let rows_per_side = size / 2 - 1;
        let mut pieces = Vec::new();
        let mut next_id: PieceId = 0;

        for row in 0..rows_per_side {
            for col in 0..size {
                if (row + col) % 2 == 1 {
                    pieces.push(Piece {
                        id: next_id,
                        color: Color::Red,
                        kind: PieceKind::Normal,
                        position: Position::new(row, col),
                    });
                    next_id += 1;
                }
            }
        }
        for row in (size - rows_per_side)..size {
            for col in 0..size {
                if (row + col) % 2 == 1 {
                    pieces.push(Piece {
                        id: next_id,
                        color: Color::Blue,
                        kind: PieceKind::Normal,
                        position: Position::new(row, col),
                    });
                    next_id += 1;
                }
            }
        }

        Self {
            pieces,
            to_move: Color::Red,
            rules,
        }
    }

    /// Creates an empty board (useful for tests and position setup).
    pub fn empty(rules: GameRules) -> Self {
        Self {
            pieces: Vec::new(),
            to_move: Color::Red,
            rules,
        }
    }

    /// Places a piece, assigning the next free id. Returns the new id.
    ///
    /// Intended for position setup; does not validate occupancy.
    pub fn place(&mut self, color: Color, kind: PieceKind, position: Position) -> PieceId {
        let id = self.pieces.iter().map(|p| p.id + 1).max().unwrap_or(0);
        self.pieces.push(Piece {
            id,
            color,
            kind,
            position,
        });
        id
    }

    /// All pieces on the board.
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Mutable access to the piece list (crate-internal, used by apply_move).
    pub(crate) fn pieces_mut(&mut self) -> &mut Vec<Piece> {
        &mut self.pieces
    }

    /// The color whose turn it is.
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    /// Sets the side to move. Turn order is owned by the caller (the
    /// coordinator retains the turn during multi-jump sequences).
    pub fn set_to_move(&mut self, color: Color) {
        self.to_move = color;
    }

    /// The rule configuration this board plays under.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// The piece occupying the given square, if any.
    pub fn piece_at(&self, pos: Position) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.position == pos)
    }

    /// Looks up a piece by its stable id.
    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    /// Number of pieces of the given color still on the board.
    pub fn count(&self, color: Color) -> usize {
        self.pieces.iter().filter(|p| p.color == color).count()
    }

    /// Checks the structural invariants: unique occupancy and valid squares.
    pub fn is_consistent(&self) -> bool {
        for (i, a) in self.pieces.iter().enumerate() {
            if !crate::games::checkers::rules::valid_square(a.position, &self.rules) {
                return false;
            }
            if self.pieces[i + 1..].iter().any(|b| b.position == a.position) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Blue's back rank on top so red advances up the page.
        for row in (0..self.rules.board_size).rev() {
            for col in 0..self.rules.board_size {
                let symbol = match self.piece_at(Position::new(row, col)) {
                    Some(p) => match (p.color, p.kind) {
                        (Color::Red, PieceKind::Normal) => 'r',
                        (Color::Red, PieceKind::King) => 'R',
                        (Color::Blue, PieceKind::Normal) => 'b',
                        (Color::Blue, PieceKind::King) => 'B',
                    },
                    None if (row + col) % 2 == 1 => '.',
                    None => ' ',
                };
                write!(f, "{} ", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The effect of a single applied move, as recorded in the move history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMove {
    /// Color that moved.
    pub color: Color,
    /// Source square.
    pub from: Position,
    /// Destination square.
    pub to: Position,
    /// Id of the captured piece, if the move was a jump.
    pub captured: Option<PieceId>,
    /// Whether the move promoted the piece to a king.
    pub promoted: bool,
}

impl AppliedMove {
    /// True if this move captured a piece.
    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }
}
