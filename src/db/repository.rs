//! Repository over the game and rating tables.
//!
//! Single-operation reads and inserts open their own connection. Multi-step
//! read-modify-write flows (move application, rating settlement) run inside
//! [`GameRepository::immediate`], which opens a `BEGIN IMMEDIATE` SQLite
//! transaction: conflicting writers abort instead of interleaving, and the
//! caller owns the retry.

use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

use crate::db::models::{
    GameRecord, GameRow, NewGame, NewPlayer, NewRatingHistory, PlayerRow, RatingHistoryRow,
};
use crate::db::{DbError, schema};

/// Repository for player profiles, game records, and rating history.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a repository for the database at the given path.
    ///
    /// Use `":memory:"` for an in-memory database in tests.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Self {
        info!(path = %db_path, "creating game repository");
        Self { db_path }
    }

    /// Establishes a database connection.
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("failed to connect to '{}': {}", self.db_path, e)))
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// SQLite serializes immediate transactions; a writer that lost the
    /// race observes an error and nothing it wrote is kept. The closure's
    /// error type carries both diesel and storage failures so callers keep
    /// their own taxonomy.
    pub fn immediate<T, E>(
        &self,
        f: impl FnOnce(&mut SqliteConnection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<diesel::result::Error> + From<DbError>,
    {
        let mut conn = self.connection()?;
        conn.immediate_transaction(f)
    }

    /// Creates a player profile at the starting rating.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the uid already exists or on database failure.
    #[instrument(skip(self))]
    pub fn create_player(&self, uid: String, display_name: String) -> Result<PlayerRow, DbError> {
        debug!(uid = %uid, "creating player profile");
        let mut conn = self.connection()?;

        let row = diesel::insert_into(schema::players::table)
            .values(&NewPlayer::at_start(uid, display_name))
            .returning(PlayerRow::as_returning())
            .get_result(&mut conn)?;

        info!(uid = %row.uid(), rating = row.elo_rating(), "player profile created");
        Ok(row)
    }

    /// Gets a player profile by uid. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on database failure.
    #[instrument(skip(self))]
    pub fn get_player(&self, uid: &str) -> Result<Option<PlayerRow>, DbError> {
        let mut conn = self.connection()?;
        Ok(find_player(&mut conn, uid)?)
    }

    /// Returns an existing profile or creates one at the starting rating.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on database failure.
    #[instrument(skip(self))]
    pub fn get_or_create_player(
        &self,
        uid: String,
        display_name: String,
    ) -> Result<PlayerRow, DbError> {
        if let Some(row) = self.get_player(&uid)? {
            debug!(uid = %uid, "existing player profile found");
            return Ok(row);
        }
        self.create_player(uid, display_name)
    }

    /// Inserts a fresh game record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the insert fails.
    #[instrument(skip(self, record), fields(game_id = %record.game_id))]
    pub fn create_game(&self, record: &GameRecord) -> Result<(), DbError> {
        let mut conn = self.connection()?;

        diesel::insert_into(schema::games::table)
            .values(&NewGame::from_record(record)?)
            .execute(&mut conn)?;

        info!(game_id = %record.game_id, status = %record.status, "game record created");
        Ok(())
    }

    /// Loads a game record by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on database failure or a malformed stored record.
    #[instrument(skip(self))]
    pub fn load_game(&self, game_id: &str) -> Result<Option<GameRecord>, DbError> {
        let mut conn = self.connection()?;
        match find_game(&mut conn, game_id)? {
            Some(row) => Ok(Some(row.to_record()?)),
            None => Ok(None),
        }
    }

    /// Lists a player's rating history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on database failure.
    #[instrument(skip(self))]
    pub fn get_rating_history(&self, uid: &str) -> Result<Vec<RatingHistoryRow>, DbError> {
        let mut conn = self.connection()?;
        let rows = schema::rating_history::table
            .filter(schema::rating_history::uid.eq(uid))
            .order(schema::rating_history::recorded_at.asc())
            .load::<RatingHistoryRow>(&mut conn)?;
        debug!(uid = %uid, count = rows.len(), "rating history loaded");
        Ok(rows)
    }
}

// ── Connection-scoped helpers used inside transactions ──────────────

/// Finds a game row by id.
pub(crate) fn find_game(
    conn: &mut SqliteConnection,
    game_id: &str,
) -> Result<Option<GameRow>, diesel::result::Error> {
    schema::games::table
        .filter(schema::games::id.eq(game_id))
        .first::<GameRow>(conn)
        .optional()
}

/// Finds a player row by uid.
pub(crate) fn find_player(
    conn: &mut SqliteConnection,
    uid: &str,
) -> Result<Option<PlayerRow>, diesel::result::Error> {
    schema::players::table
        .filter(schema::players::uid.eq(uid))
        .first::<PlayerRow>(conn)
        .optional()
}

/// Writes a move's board/history update, guarded by the expected move count.
///
/// Returns the number of updated rows: zero means another transaction moved
/// first and the caller must treat the attempt as a conflict.
pub(crate) fn record_move(
    conn: &mut SqliteConnection,
    game_id: &str,
    expected_total_moves: i32,
    board_json: &str,
    history_json: &str,
    current_turn_uid: &str,
) -> Result<usize, diesel::result::Error> {
    diesel::update(
        schema::games::table
            .filter(schema::games::id.eq(game_id))
            .filter(schema::games::total_moves.eq(expected_total_moves)),
    )
    .set((
        schema::games::board.eq(board_json),
        schema::games::move_history.eq(history_json),
        schema::games::total_moves.eq(expected_total_moves + 1),
        schema::games::current_turn.eq(current_turn_uid),
    ))
    .execute(conn)
}

/// Promotes a waiting game to active with the joining player as blue.
///
/// Returns zero rows if the game is missing or no longer waiting.
pub(crate) fn activate_game(
    conn: &mut SqliteConnection,
    game_id: &str,
    blue_uid: &str,
) -> Result<usize, diesel::result::Error> {
    diesel::update(
        schema::games::table
            .filter(schema::games::id.eq(game_id))
            .filter(schema::games::status.eq("waiting")),
    )
    .set((
        schema::games::player_blue.eq(blue_uid),
        schema::games::status.eq("active"),
    ))
    .execute(conn)
}

/// Marks a game completed with its result, Elo changes, and stats payload.
pub(crate) fn finalize_game(
    conn: &mut SqliteConnection,
    game_id: &str,
    status: &str,
    winner: Option<&str>,
    end_reason: &str,
    elo_red_change: i32,
    elo_blue_change: i32,
    final_red_rating: i32,
    final_blue_rating: i32,
    game_stats_json: &str,
) -> Result<usize, diesel::result::Error> {
    diesel::update(schema::games::table.filter(schema::games::id.eq(game_id)))
        .set((
            schema::games::status.eq(status),
            schema::games::winner.eq(winner),
            schema::games::end_reason.eq(end_reason),
            schema::games::elo_red_change.eq(elo_red_change),
            schema::games::elo_blue_change.eq(elo_blue_change),
            schema::games::final_red_rating.eq(final_red_rating),
            schema::games::final_blue_rating.eq(final_blue_rating),
            schema::games::game_stats.eq(game_stats_json),
            schema::games::completed_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

/// Applies a settled rating update to a profile.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_rating(
    conn: &mut SqliteConnection,
    uid: &str,
    new_rating: i32,
    won: bool,
    lost: bool,
    drew: bool,
    peak: i32,
    lowest: i32,
) -> Result<usize, diesel::result::Error> {
    diesel::update(schema::players::table.filter(schema::players::uid.eq(uid)))
        .set((
            schema::players::elo_rating.eq(new_rating),
            schema::players::total_games.eq(schema::players::total_games + 1),
            schema::players::wins.eq(schema::players::wins + i32::from(won)),
            schema::players::losses.eq(schema::players::losses + i32::from(lost)),
            schema::players::draws.eq(schema::players::draws + i32::from(drew)),
            schema::players::peak_rating.eq(peak),
            schema::players::lowest_rating.eq(lowest),
            schema::players::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

/// Appends a rating history entry.
pub(crate) fn append_rating_history(
    conn: &mut SqliteConnection,
    entry: &NewRatingHistory,
) -> Result<usize, diesel::result::Error> {
    diesel::insert_into(schema::rating_history::table)
        .values(entry)
        .execute(conn)
}
