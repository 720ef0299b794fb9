//! REST surface over the move coordinator.
//!
//! Transport only: every game decision is made by the coordinator and the
//! rules engine. Handlers translate the coordinator's error taxonomy into
//! status codes; `Conflict` maps to 409 so callers know to re-read and
//! retry rather than treat the move as rejected.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::coordinator::{MoveCoordinator, SubmitError};
use crate::db::{GameRecord, GameRepository};
use crate::games::checkers::{GameRules, Move, Position};
use crate::rating::RatingError;
use crate::timeout::{TimeoutConfig, TimeoutRegistry};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Move transaction coordinator.
    pub coordinator: MoveCoordinator,
    /// Per-game move clocks.
    pub timeouts: TimeoutRegistry,
    /// Repository for profile reads.
    pub repository: GameRepository,
    /// Clock configuration applied to every game.
    pub timeout_config: TimeoutConfig,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/players", post(create_player))
        .route("/players/{uid}", get(get_player))
        .route("/games", post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/join", post(join_game))
        .route("/games/{id}/moves", post(submit_move))
        .route("/games/{id}/resign", post(resign))
        .with_state(state)
}

/// Serves the router on the given listener until shutdown.
///
/// # Errors
///
/// Returns any I/O error from the underlying server.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn submit_error_response(err: SubmitError) -> Response {
    let status = match &err {
        SubmitError::GameNotFound { .. } => StatusCode::NOT_FOUND,
        SubmitError::Conflict => StatusCode::CONFLICT,
        SubmitError::Storage(_) | SubmitError::Rating(RatingError::Storage(_)) => {
            warn!(error = %err, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SubmitError::Rating(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_response(status, err.to_string())
}

fn rating_error_response(err: RatingError) -> Response {
    let status = match &err {
        RatingError::GameNotFound { .. } => StatusCode::NOT_FOUND,
        RatingError::GameNotActive { .. } | RatingError::PlayerNotInGame { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

/// Request to create or fetch a player profile.
#[derive(Debug, Deserialize)]
struct CreatePlayerRequest {
    uid: String,
    display_name: String,
}

/// Player profile response.
#[derive(Debug, Serialize)]
struct ProfileResponse {
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

impl ProfileResponse {
    fn from_row(row: &crate::db::PlayerRow) -> Self {
        Self {
            uid: row.uid().clone(),
            display_name: row.display_name().clone(),
            elo_rating: *row.elo_rating(),
            total_games: *row.total_games(),
            wins: *row.wins(),
            losses: *row.losses(),
            draws: *row.draws(),
            peak_rating: *row.peak_rating(),
            lowest_rating: *row.lowest_rating(),
        }
    }
}

#[instrument(skip(state, req), fields(uid = %req.uid))]
async fn create_player(
    State(state): State<AppState>,
    Json(req): Json<CreatePlayerRequest>,
) -> Response {
    match state
        .repository
        .get_or_create_player(req.uid, req.display_name)
    {
        Ok(row) => (StatusCode::OK, Json(ProfileResponse::from_row(&row))).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[instrument(skip(state))]
async fn get_player(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    match state.repository.get_player(&uid) {
        Ok(Some(row)) => (StatusCode::OK, Json(ProfileResponse::from_row(&row))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("player {uid} not found")),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Request to create a game.
#[derive(Debug, Deserialize)]
struct CreateGameRequest {
    player_red: String,
    player_blue: Option<String>,
    #[serde(default)]
    rules: Option<GameRules>,
}

#[instrument(skip(state, req), fields(red = %req.player_red))]
async fn create_game(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> Response {
    let rules = req.rules.unwrap_or_default();
    match state
        .coordinator
        .create_game(req.player_red, req.player_blue, rules)
    {
        Ok(record) => {
            if record.status == crate::db::GameStatus::Active {
                state.timeouts.start(&record.game_id, state.timeout_config);
            }
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => submit_error_response(e),
    }
}

#[instrument(skip(state))]
async fn get_game(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.repository.load_game(&id) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("game {id} not found")),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Request to join a waiting game.
#[derive(Debug, Deserialize)]
struct JoinGameRequest {
    uid: String,
}

#[instrument(skip(state, req), fields(uid = %req.uid))]
async fn join_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JoinGameRequest>,
) -> Response {
    match state.coordinator.join_game(&id, &req.uid) {
        Ok(record) => {
            state.timeouts.start(&record.game_id, state.timeout_config);
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => submit_error_response(e),
    }
}

/// Request to submit a move.
#[derive(Debug, Deserialize)]
struct SubmitMoveRequest {
    player_uid: String,
    from: Position,
    to: Position,
}

/// Response to a successful move.
#[derive(Debug, Serialize)]
struct SubmitMoveResponse {
    game: GameRecord,
    captured: Option<u32>,
    promoted: bool,
    completed: bool,
}

#[instrument(skip(state, req), fields(uid = %req.player_uid))]
async fn submit_move(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitMoveRequest>,
) -> Response {
    let mv = Move::new(req.from, req.to);
    match state.coordinator.submit_move(&id, mv, &req.player_uid) {
        Ok(outcome) => {
            if outcome.completion.is_some() {
                state.timeouts.stop(&id);
            } else {
                state.timeouts.reset(&id, state.timeout_config);
            }
            let body = SubmitMoveResponse {
                captured: outcome.applied.captured,
                promoted: outcome.applied.promoted,
                completed: outcome.completion.is_some(),
                game: outcome.game,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => submit_error_response(e),
    }
}

/// Request to resign a game.
#[derive(Debug, Deserialize)]
struct ResignRequest {
    player_uid: String,
}

#[instrument(skip(state, req), fields(uid = %req.player_uid))]
async fn resign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResignRequest>,
) -> Response {
    match state.coordinator.resign(&id, &req.player_uid) {
        Ok(summary) => {
            state.timeouts.stop(&id);
            (StatusCode::OK, Json(serde_json::json!({
                "game_id": summary.game_id,
                "winner": summary.winner_uid,
                "end_reason": summary.end_reason,
            })))
                .into_response()
        }
        Err(e) => rating_error_response(e),
    }
}
