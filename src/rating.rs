//! Rating engine: Elo computation, performance aggregation, and atomic
//! completion settlement.
//!
//! Settlement reads both players' profiles, computes clamped Elo changes,
//! updates the profiles, the game record, and the rating history, all in a
//! single storage transaction. A missing profile aborts the settlement with
//! no partial update; transaction failures propagate unchanged with no
//! silent retry.

use derive_more::{Display, Error, From};
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::db::{
    self, DbError, EloChanges, EndReason, GameRecord, GameRepository, GameStatus, NewRatingHistory,
};
use crate::games::checkers::Color;
use crate::notify::{GameEvent, Notifier};

/// Lowest rating a profile may hold.
pub const RATING_FLOOR: i32 = 100;
/// Highest rating a profile may hold.
pub const RATING_CEILING: i32 = 3000;
/// Game count below which a rating is provisional.
const PROVISIONAL_GAMES: i32 = 20;

/// Outcome of a game from the board's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// Red won.
    RedWin,
    /// Blue won.
    BlueWin,
    /// Drawn.
    Draw,
}

impl GameResult {
    /// Score for the given side: 1 for a win, 0.5 for a draw, 0 for a loss.
    pub fn score_for(self, color: Color) -> f64 {
        match (self, color) {
            (GameResult::RedWin, Color::Red) | (GameResult::BlueWin, Color::Blue) => 1.0,
            (GameResult::Draw, _) => 0.5,
            _ => 0.0,
        }
    }
}

impl From<Option<Color>> for GameResult {
    fn from(winner: Option<Color>) -> Self {
        match winner {
            Some(Color::Red) => GameResult::RedWin,
            Some(Color::Blue) => GameResult::BlueWin,
            None => GameResult::Draw,
        }
    }
}

/// Rating engine failure.
#[derive(Debug, Display, Error, From)]
pub enum RatingError {
    /// A required rating profile is missing; settlement aborts with no
    /// partial update.
    #[display("rating profile not found for player {uid}")]
    #[from(skip)]
    PlayerDocumentsNotFound {
        /// The missing profile's uid.
        uid: String,
    },
    /// The game record does not exist.
    #[display("game {game_id} not found")]
    #[from(skip)]
    GameNotFound {
        /// The missing game id.
        game_id: String,
    },
    /// The game is not active, so there is nothing to settle.
    #[display("game {game_id} is not active (status {status})")]
    #[from(skip)]
    GameNotActive {
        /// The game id.
        game_id: String,
        /// Its current status.
        status: GameStatus,
    },
    /// The triggering uid is not in the game's roster.
    #[display("player {uid} is not part of game {game_id}")]
    #[from(skip)]
    PlayerNotInGame {
        /// The unknown uid.
        uid: String,
        /// The game id.
        game_id: String,
    },
    /// Underlying storage failure, propagated unchanged.
    #[display("storage failure: {_0}")]
    Storage(DbError),
}

impl From<diesel::result::Error> for RatingError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        RatingError::Storage(DbError::from(err))
    }
}

/// Expected score of `self_rating` against `opp_rating`.
pub fn expected_score(self_rating: i32, opp_rating: i32) -> f64 {
    1.0 / (1.0 + 10_f64.powf(f64::from(opp_rating - self_rating) / 400.0))
}

/// K-factor: provisional players (under 20 games) move faster.
pub fn k_factor(games_played: i32) -> f64 {
    if games_played < PROVISIONAL_GAMES {
        40.0
    } else {
        32.0
    }
}

/// Rounded raw Elo delta for one side.
pub fn rating_delta(self_rating: i32, opp_rating: i32, self_games: i32, actual_score: f64) -> i32 {
    let expected = expected_score(self_rating, opp_rating);
    (k_factor(self_games) * (actual_score - expected)).round() as i32
}

/// Computes both sides' Elo changes for a result.
///
/// Each side uses its own game count for the K-factor. New ratings are
/// clamped to `[RATING_FLOOR, RATING_CEILING]` and the reported deltas are
/// the clamped differences, so a delta never implies an out-of-range
/// rating.
#[instrument]
pub fn calculate_elo_changes(
    red_rating: i32,
    blue_rating: i32,
    red_games: i32,
    blue_games: i32,
    result: GameResult,
) -> EloChanges {
    let red_raw = rating_delta(
        red_rating,
        blue_rating,
        red_games,
        result.score_for(Color::Red),
    );
    let blue_raw = rating_delta(
        blue_rating,
        red_rating,
        blue_games,
        result.score_for(Color::Blue),
    );

    let red_new = (red_rating + red_raw).clamp(RATING_FLOOR, RATING_CEILING);
    let blue_new = (blue_rating + blue_raw).clamp(RATING_FLOOR, RATING_CEILING);

    EloChanges::new(
        red_new - red_rating,
        blue_new - blue_rating,
        red_new,
        blue_new,
    )
}

/// Per-side performance aggregates derived from the move history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideStats {
    /// Moves played by this side.
    pub moves: u32,
    /// Average move duration in milliseconds.
    pub avg_move_ms: f64,
    /// Total time used in milliseconds.
    pub total_time_ms: u64,
    /// Number of capturing moves.
    pub captures: u32,
    /// Number of promotions.
    pub promotions: u32,
}

/// Performance aggregates for a completed game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    /// Red's aggregates.
    pub red: SideStats,
    /// Blue's aggregates.
    pub blue: SideStats,
    /// Total moves in the game.
    pub total_moves: u32,
}

/// Aggregates per-color performance from a game's move history.
#[instrument(skip(record), fields(game_id = %record.game_id))]
pub fn performance_stats(record: &GameRecord) -> GameStats {
    let mut stats = GameStats {
        total_moves: record.total_moves,
        ..GameStats::default()
    };

    for color in [Color::Red, Color::Blue] {
        let side = match color {
            Color::Red => &mut stats.red,
            Color::Blue => &mut stats.blue,
        };
        for entry in record.move_history.iter().filter(|m| m.color == color) {
            side.moves += 1;
            side.total_time_ms += entry.duration_ms;
            side.captures += u32::from(entry.captured.is_some());
            side.promotions += u32::from(entry.promoted);
        }
        if side.moves > 0 {
            side.avg_move_ms = side.total_time_ms as f64 / f64::from(side.moves);
        }
    }
    stats
}

/// Payload produced by a committed settlement.
#[derive(Debug, Clone)]
pub struct CompletionSummary {
    /// The game that completed.
    pub game_id: String,
    /// Winning uid, `None` on a draw.
    pub winner_uid: Option<String>,
    /// Terminal cause.
    pub end_reason: EndReason,
    /// Applied Elo changes.
    pub elo_changes: EloChanges,
    /// Performance aggregates.
    pub game_stats: GameStats,
}

/// Rating engine bound to the repository and notification hub.
#[derive(Debug, Clone)]
pub struct RatingEngine {
    repository: GameRepository,
    notifier: Notifier,
}

impl RatingEngine {
    /// Creates a rating engine.
    #[instrument(skip(repository, notifier))]
    pub fn new(repository: GameRepository, notifier: Notifier) -> Self {
        Self {
            repository,
            notifier,
        }
    }

    /// Settles a decided game inside an already-open transaction.
    ///
    /// Reads both profiles, applies clamped Elo updates, appends rating
    /// history, and finalizes the game row. Everything commits or aborts
    /// together with the caller's transaction.
    ///
    /// # Errors
    ///
    /// [`RatingError::PlayerDocumentsNotFound`] if either profile is
    /// missing; storage failures propagate unchanged.
    pub fn settle(
        &self,
        conn: &mut SqliteConnection,
        record: &GameRecord,
        winner: Option<Color>,
        end_reason: EndReason,
    ) -> Result<CompletionSummary, RatingError> {
        let red = db::find_player(conn, &record.player_red)?.ok_or_else(|| {
            RatingError::PlayerDocumentsNotFound {
                uid: record.player_red.clone(),
            }
        })?;
        let blue = db::find_player(conn, &record.player_blue)?.ok_or_else(|| {
            RatingError::PlayerDocumentsNotFound {
                uid: record.player_blue.clone(),
            }
        })?;

        let result = GameResult::from(winner);
        let changes = calculate_elo_changes(
            *red.elo_rating(),
            *blue.elo_rating(),
            *red.total_games(),
            *blue.total_games(),
            result,
        );
        let stats = performance_stats(record);

        for (row, color, new_rating, delta) in [
            (&red, Color::Red, changes.red_new_rating, changes.red_delta),
            (
                &blue,
                Color::Blue,
                changes.blue_new_rating,
                changes.blue_delta,
            ),
        ] {
            let score = result.score_for(color);
            let outcome = match score {
                s if s == 1.0 => "win",
                s if s == 0.5 => "draw",
                _ => "loss",
            };
            db::apply_rating(
                conn,
                row.uid(),
                new_rating,
                score == 1.0,
                score == 0.0,
                score == 0.5,
                (*row.peak_rating()).max(new_rating),
                (*row.lowest_rating()).min(new_rating),
            )?;
            db::append_rating_history(
                conn,
                &NewRatingHistory::new(
                    row.uid().clone(),
                    record.game_id.clone(),
                    *row.elo_rating(),
                    new_rating,
                    delta,
                    outcome.to_string(),
                ),
            )?;
        }

        let status = match end_reason {
            EndReason::Abandonment => GameStatus::Abandoned,
            _ => GameStatus::Completed,
        };
        let winner_uid = winner.map(|c| record.uid_for(c).to_string());
        db::finalize_game(
            conn,
            &record.game_id,
            &status.to_string(),
            winner.map(|c| c.to_string()).as_deref(),
            &end_reason.to_string(),
            changes.red_delta,
            changes.blue_delta,
            changes.red_new_rating,
            changes.blue_new_rating,
            &serde_json::to_string(&stats).map_err(DbError::from)?,
        )?;

        info!(
            game_id = %record.game_id,
            ?winner,
            %end_reason,
            red_delta = changes.red_delta,
            blue_delta = changes.blue_delta,
            "game settled"
        );

        Ok(CompletionSummary {
            game_id: record.game_id.clone(),
            winner_uid,
            end_reason,
            elo_changes: changes,
            game_stats: stats,
        })
    }

    /// Completes a game because `triggering_uid` resigned.
    #[instrument(skip(self))]
    pub fn handle_resignation(
        &self,
        game_id: &str,
        triggering_uid: &str,
    ) -> Result<CompletionSummary, RatingError> {
        self.complete_against(game_id, triggering_uid, EndReason::Resignation)
    }

    /// Completes a game because `triggering_uid`'s move clock expired.
    #[instrument(skip(self))]
    pub fn handle_timeout(
        &self,
        game_id: &str,
        triggering_uid: &str,
    ) -> Result<CompletionSummary, RatingError> {
        self.complete_against(game_id, triggering_uid, EndReason::Timeout)
    }

    /// Completes a game because `triggering_uid` abandoned it.
    #[instrument(skip(self))]
    pub fn handle_abandonment(
        &self,
        game_id: &str,
        triggering_uid: &str,
    ) -> Result<CompletionSummary, RatingError> {
        self.complete_against(game_id, triggering_uid, EndReason::Abandonment)
    }

    /// Shared completion path: the opponent of the triggering player wins.
    ///
    /// Runs one atomic transaction, then emits the completion notification
    /// after commit.
    fn complete_against(
        &self,
        game_id: &str,
        triggering_uid: &str,
        end_reason: EndReason,
    ) -> Result<CompletionSummary, RatingError> {
        let summary = self.repository.immediate(|conn| {
            let row = db::find_game(conn, game_id)?.ok_or_else(|| RatingError::GameNotFound {
                game_id: game_id.to_string(),
            })?;
            let record = row.to_record().map_err(RatingError::Storage)?;

            if record.status != GameStatus::Active {
                warn!(game_id, status = %record.status, "completion requested for inactive game");
                return Err(RatingError::GameNotActive {
                    game_id: game_id.to_string(),
                    status: record.status,
                });
            }
            let loser = record.color_of(triggering_uid).ok_or_else(|| {
                RatingError::PlayerNotInGame {
                    uid: triggering_uid.to_string(),
                    game_id: game_id.to_string(),
                }
            })?;

            self.settle(conn, &record, Some(loser.opponent()), end_reason)
        })?;

        debug!(game_id = %summary.game_id, "emitting completion notification");
        self.notifier.emit(GameEvent::Completed {
            game_id: summary.game_id.clone(),
            winner: summary.winner_uid.clone(),
            end_reason: summary.end_reason,
            elo_changes: summary.elo_changes,
            game_stats: summary.game_stats,
        });
        Ok(summary)
    }
}
