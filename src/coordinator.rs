//! Move transaction coordinator.
//!
//! Validates and atomically applies a player's move against the persisted
//! game state, exactly once. Every validation runs before any mutation;
//! the write is guarded by the record's move count so a concurrent
//! submission for the same prior state surfaces as [`SubmitError::Conflict`]
//! instead of a double apply. The caller owns the retry loop.

use chrono::Utc;
use derive_more::{Display, Error};
use tracing::{debug, info, instrument, warn};

use crate::db::{self, DbError, EndReason, GameRecord, GameRepository, GameStatus, MoveEntry};
use crate::games::checkers::{
    self, AppliedMove, Board, GameRules, Move, Position, RulesError,
};
use crate::notify::{GameEvent, Notifier};
use crate::rating::{CompletionSummary, RatingEngine, RatingError};

/// Failure modes of [`MoveCoordinator::submit_move`].
///
/// All validation variants are raised strictly before any mutation.
/// `Conflict` is not a validation failure: the move may be valid, but
/// another transaction changed the record between read and write, and the
/// caller should re-read and retry.
#[derive(Debug, Display, Error)]
pub enum SubmitError {
    /// The stored board violates its structural invariants.
    #[display("game {game_id} has an inconsistent board state")]
    InvalidBoardState {
        /// The affected game.
        game_id: String,
    },
    /// No game record with this id.
    #[display("game {game_id} not found")]
    GameNotFound {
        /// The missing id.
        game_id: String,
    },
    /// The requested rule configuration cannot produce a playable game.
    #[display("unplayable rule configuration: {reason}")]
    InvalidRules {
        /// What was wrong with the configuration.
        reason: String,
    },
    /// Moves are only accepted while the game is active.
    #[display("game is not active (status {status})")]
    GameNotActive {
        /// Current status.
        status: GameStatus,
    },
    /// The requesting player is not the player to move.
    #[display("it is not your turn")]
    NotYourTurn,
    /// A coordinate is outside the playable squares.
    #[display("square {pos} is out of bounds")]
    MoveOutOfBounds {
        /// The offending coordinate.
        pos: Position,
    },
    /// The source square is empty.
    #[display("no piece at {pos}")]
    NoPieceAtSource {
        /// The empty source square.
        pos: Position,
    },
    /// The piece at the source belongs to the opponent.
    #[display("that piece belongs to your opponent")]
    WrongPieceOwner,
    /// A capture is available and mandatory, but the move is not one.
    #[display("a capture is available and must be taken")]
    MustCaptureViolation,
    /// The move is not a member of the current legal-move set.
    #[display("move from {from} to {to} is not legal in this position")]
    IllegalMove {
        /// Source square.
        from: Position,
        /// Destination square.
        to: Position,
    },
    /// The record changed between read and write; re-read and retry.
    #[display("game state changed concurrently, retry the move")]
    Conflict,
    /// Rating settlement failure during completion.
    #[display("rating settlement failed: {_0}")]
    Rating(RatingError),
    /// Underlying storage failure.
    #[display("storage failure: {_0}")]
    Storage(DbError),
}

impl From<RatingError> for SubmitError {
    fn from(err: RatingError) -> Self {
        SubmitError::Rating(err)
    }
}

impl From<DbError> for SubmitError {
    fn from(err: DbError) -> Self {
        SubmitError::Storage(err)
    }
}

impl From<diesel::result::Error> for SubmitError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        if let diesel::result::Error::DatabaseError(_, ref info) = err {
            // A concurrent immediate transaction holds the write lock.
            if info.message().contains("database is locked") {
                return SubmitError::Conflict;
            }
        }
        SubmitError::Storage(DbError::from(err))
    }
}

/// Result of a successfully applied move.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// The updated game record.
    pub game: GameRecord,
    /// What the move did on the board.
    pub applied: AppliedMove,
    /// Present when this move ended the game.
    pub completion: Option<CompletionSummary>,
}

/// Coordinates move transactions against persisted game state.
#[derive(Debug, Clone)]
pub struct MoveCoordinator {
    repository: GameRepository,
    rating: RatingEngine,
    notifier: Notifier,
}

impl MoveCoordinator {
    /// Creates a coordinator.
    #[instrument(skip(repository, rating, notifier))]
    pub fn new(repository: GameRepository, rating: RatingEngine, notifier: Notifier) -> Self {
        Self {
            repository,
            rating,
            notifier,
        }
    }

    /// The repository this coordinator writes through.
    pub fn repository(&self) -> &GameRepository {
        &self.repository
    }

    /// Creates a new game record.
    ///
    /// With both players known the game starts `Active`; with only the red
    /// player it is created `Waiting` and activated by [`Self::join_game`].
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::InvalidRules`] for an unplayable rule
    /// configuration, [`SubmitError::Storage`] on persistence failure.
    #[instrument(skip(self, rules))]
    pub fn create_game(
        &self,
        player_red: String,
        player_blue: Option<String>,
        rules: GameRules,
    ) -> Result<GameRecord, SubmitError> {
        validate_rules(&rules)?;
        let game_id = generate_game_id();
        let status = if player_blue.is_some() {
            GameStatus::Active
        } else {
            GameStatus::Waiting
        };
        let record = GameRecord {
            game_id: game_id.clone(),
            player_red,
            player_blue: player_blue.unwrap_or_default(),
            status,
            board: Board::standard(rules),
            move_history: Vec::new(),
            total_moves: 0,
            winner: None,
            end_reason: None,
            elo_changes: None,
            created_at: Utc::now().naive_utc(),
        };
        self.repository.create_game(&record).map_err(SubmitError::Storage)?;
        info!(game_id = %game_id, %status, "game created");
        Ok(record)
    }

    /// Joins a waiting game as the blue player, activating it.
    ///
    /// # Errors
    ///
    /// [`SubmitError::GameNotFound`] if the id is unknown,
    /// [`SubmitError::GameNotActive`] if the game already started.
    #[instrument(skip(self))]
    pub fn join_game(&self, game_id: &str, uid: &str) -> Result<GameRecord, SubmitError> {
        self.repository.immediate(|conn| {
            let row = db::find_game(conn, game_id)?.ok_or_else(|| SubmitError::GameNotFound {
                game_id: game_id.to_string(),
            })?;
            let record = row.to_record().map_err(SubmitError::Storage)?;
            if record.status != GameStatus::Waiting {
                return Err(SubmitError::GameNotActive {
                    status: record.status,
                });
            }
            let updated = db::activate_game(conn, game_id, uid)?;
            if updated == 0 {
                return Err(SubmitError::Conflict);
            }
            let row = db::find_game(conn, game_id)?.ok_or_else(|| SubmitError::GameNotFound {
                game_id: game_id.to_string(),
            })?;
            row.to_record().map_err(SubmitError::Storage)
        })
    }

    /// Validates and applies one move for `requesting_uid`.
    ///
    /// The read, the validation, the guarded write, and (when the move
    /// decides the game) the rating settlement all run in one atomic
    /// transaction. At most one move is durably applied per attempt; a
    /// lost race returns [`SubmitError::Conflict`] with nothing written.
    #[instrument(skip(self), fields(game_id = %game_id, uid = %requesting_uid))]
    pub fn submit_move(
        &self,
        game_id: &str,
        mv: Move,
        requesting_uid: &str,
    ) -> Result<MoveOutcome, SubmitError> {
        let outcome = self.repository.immediate(|conn| {
            let row = db::find_game(conn, game_id)?.ok_or_else(|| SubmitError::GameNotFound {
                game_id: game_id.to_string(),
            })?;
            let mut record = row.to_record().map_err(SubmitError::Storage)?;

            self.validate(&record, mv, requesting_uid)?;

            let (mut board, applied) =
                checkers::apply_move(&record.board, mv).map_err(|e| match e {
                    RulesError::MoveOutOfBounds { pos } => SubmitError::MoveOutOfBounds { pos },
                    RulesError::NoPieceAtSource { pos } => SubmitError::NoPieceAtSource { pos },
                })?;
            board.set_to_move(checkers::next_to_move(&board, &applied));

            let now = Utc::now();
            let duration_ms = record
                .move_history
                .last()
                .map(|m| m.played_at)
                .unwrap_or_else(|| record.created_at.and_utc())
                .signed_duration_since(now)
                .num_milliseconds()
                .unsigned_abs();
            record.move_history.push(MoveEntry {
                color: applied.color,
                from: applied.from,
                to: applied.to,
                captured: applied.captured,
                promoted: applied.promoted,
                duration_ms,
                played_at: now,
            });

            let expected = record.total_moves as i32;
            record.total_moves += 1;
            record.board = board;

            let updated = db::record_move(
                conn,
                game_id,
                expected,
                &serde_json::to_string(&record.board).map_err(DbError::from)?,
                &serde_json::to_string(&record.move_history).map_err(DbError::from)?,
                record.current_turn_uid(),
            )?;
            if updated == 0 {
                warn!(game_id, "concurrent move detected, aborting transaction");
                return Err(SubmitError::Conflict);
            }

            let completion = self.check_terminal(conn, &record)?;
            if let Some(summary) = &completion {
                record.status = match summary.end_reason {
                    EndReason::Abandonment => GameStatus::Abandoned,
                    _ => GameStatus::Completed,
                };
                record.winner = summary
                    .winner_uid
                    .as_deref()
                    .and_then(|uid| record.color_of(uid));
                record.end_reason = Some(summary.end_reason);
                record.elo_changes = Some(summary.elo_changes);
            }

            Ok(MoveOutcome {
                game: record,
                applied,
                completion,
            })
        })?;

        if let Some(summary) = &outcome.completion {
            self.notifier.emit(GameEvent::Completed {
                game_id: summary.game_id.clone(),
                winner: summary.winner_uid.clone(),
                end_reason: summary.end_reason,
                elo_changes: summary.elo_changes,
                game_stats: summary.game_stats,
            });
        }

        info!(
            game_id,
            total_moves = outcome.game.total_moves,
            completed = outcome.completion.is_some(),
            "move applied"
        );
        Ok(outcome)
    }

    /// Completes the game as a resignation by `uid`.
    ///
    /// # Errors
    ///
    /// Propagates [`RatingError`] from the settlement transaction.
    #[instrument(skip(self))]
    pub fn resign(&self, game_id: &str, uid: &str) -> Result<CompletionSummary, RatingError> {
        self.rating.handle_resignation(game_id, uid)
    }

    /// Runs the ordered pre-mutation validation chain.
    fn validate(
        &self,
        record: &GameRecord,
        mv: Move,
        requesting_uid: &str,
    ) -> Result<(), SubmitError> {
        let board = &record.board;
        if !board.is_consistent() || record.move_history.len() != record.total_moves as usize {
            return Err(SubmitError::InvalidBoardState {
                game_id: record.game_id.clone(),
            });
        }
        if record.status != GameStatus::Active {
            return Err(SubmitError::GameNotActive {
                status: record.status,
            });
        }
        if record.current_turn_uid() != requesting_uid {
            debug!(
                expected = %record.current_turn_uid(),
                got = %requesting_uid,
                "move submitted out of turn"
            );
            return Err(SubmitError::NotYourTurn);
        }
        let rules = board.rules();
        if !checkers::valid_square(mv.from, rules) {
            return Err(SubmitError::MoveOutOfBounds { pos: mv.from });
        }
        if !checkers::valid_square(mv.to, rules) {
            return Err(SubmitError::MoveOutOfBounds { pos: mv.to });
        }
        let piece = board
            .piece_at(mv.from)
            .ok_or(SubmitError::NoPieceAtSource { pos: mv.from })?;
        let color = board.to_move();
        if piece.color != color {
            return Err(SubmitError::WrongPieceOwner);
        }
        let legal = checkers::legal_moves_for_player(board, color);
        if !legal.contains(&mv) {
            if checkers::must_capture(board, color) {
                return Err(SubmitError::MustCaptureViolation);
            }
            return Err(SubmitError::IllegalMove {
                from: mv.from,
                to: mv.to,
            });
        }
        Ok(())
    }

    /// Settles the game if the position is decided or the draw threshold
    /// is reached. Runs within the caller's transaction.
    fn check_terminal(
        &self,
        conn: &mut diesel::SqliteConnection,
        record: &GameRecord,
    ) -> Result<Option<CompletionSummary>, SubmitError> {
        if let Some(winning_color) = checkers::winner(&record.board) {
            let summary = self
                .rating
                .settle(conn, record, Some(winning_color), EndReason::Checkmate)?;
            return Ok(Some(summary));
        }
        if record.total_moves >= record.board.rules().draw_after_moves {
            let summary = self.rating.settle(conn, record, None, EndReason::Draw)?;
            return Ok(Some(summary));
        }
        Ok(None)
    }
}

/// Rejects rule configurations that cannot produce a playable game.
fn validate_rules(rules: &GameRules) -> Result<(), SubmitError> {
    if rules.board_size < 4 || rules.board_size % 2 != 0 {
        return Err(SubmitError::InvalidRules {
            reason: format!(
                "board size {} must be an even number of at least 4",
                rules.board_size
            ),
        });
    }
    if rules.draw_after_moves == 0 {
        return Err(SubmitError::InvalidRules {
            reason: "draw threshold must allow at least one move".to_string(),
        });
    }
    Ok(())
}

/// Generates a unique game id from the wall clock and a random suffix.
fn generate_game_id() -> String {
    let suffix: u32 = rand::random();
    format!("game_{}_{:08x}", Utc::now().timestamp_millis(), suffix)
}
