//! Tests for the move transaction coordinator.

use chrono::Utc;
use diesel::Connection;
use diesel::RunQueryDsl;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tempfile::NamedTempFile;

use checkers_arena::coordinator::{MoveCoordinator, SubmitError};
use checkers_arena::db::{EndReason, GameRecord, GameRepository, GameStatus};
use checkers_arena::games::checkers::{
    Board, Color, GameRules, Move, PieceKind, Position,
};
use checkers_arena::notify::{GameEvent, Notifier};
use checkers_arena::rating::{RatingEngine, RatingError};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn setup() -> (NamedTempFile, MoveCoordinator, GameRepository, Notifier) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");

    let repo = GameRepository::new(db_path);
    let notifier = Notifier::default();
    let rating = RatingEngine::new(repo.clone(), notifier.clone());
    let coordinator = MoveCoordinator::new(repo.clone(), rating, notifier.clone());

    repo.create_player("alice".to_string(), "Alice".to_string())
        .expect("Create alice failed");
    repo.create_player("bob".to_string(), "Bob".to_string())
        .expect("Create bob failed");

    (db_file, coordinator, repo, notifier)
}

fn pos(row: i16, col: i16) -> Position {
    Position::new(row, col)
}

fn custom_game(repo: &GameRepository, game_id: &str, board: Board) -> GameRecord {
    let record = GameRecord {
        game_id: game_id.to_string(),
        player_red: "alice".to_string(),
        player_blue: "bob".to_string(),
        status: GameStatus::Active,
        board,
        move_history: Vec::new(),
        total_moves: 0,
        winner: None,
        end_reason: None,
        elo_changes: None,
        created_at: Utc::now().naive_utc(),
    };
    repo.create_game(&record).expect("Create game failed");
    record
}

#[test]
fn test_create_game_with_both_players_is_active() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    assert_eq!(game.status, GameStatus::Active);
    assert_eq!(game.player_red, "alice");
    assert_eq!(game.player_blue, "bob");
    assert_eq!(game.current_turn_uid(), "alice");
}

#[test]
fn test_create_and_join_waiting_game() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), None, GameRules::default())
        .expect("Create failed");
    assert_eq!(game.status, GameStatus::Waiting);

    let joined = coordinator
        .join_game(&game.game_id, "bob")
        .expect("Join failed");
    assert_eq!(joined.status, GameStatus::Active);
    assert_eq!(joined.player_blue, "bob");
}

#[test]
fn test_join_active_game_fails() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    let err = coordinator.join_game(&game.game_id, "carol").unwrap_err();
    assert!(matches!(err, SubmitError::GameNotActive { .. }));
}

#[test]
fn test_submit_move_updates_record() {
    let (_db, coordinator, repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    let outcome = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(3, 0)), "alice")
        .expect("Submit failed");
    assert_eq!(outcome.game.total_moves, 1);
    assert_eq!(outcome.game.current_turn_uid(), "bob");
    assert!(outcome.completion.is_none());

    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.total_moves, 1);
    assert_eq!(loaded.move_history.len(), 1);
    assert_eq!(loaded.move_history[0].from, pos(2, 1));
    assert_eq!(loaded.board.to_move(), Color::Blue);
}

#[test]
fn test_submit_move_unknown_game() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let err = coordinator
        .submit_move("no_such_game", Move::new(pos(2, 1), pos(3, 0)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::GameNotFound { .. }));
}

#[test]
fn test_out_of_turn_move_rejected_without_mutation() {
    let (_db, coordinator, repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(5, 0), pos(4, 1)), "bob")
        .unwrap_err();
    assert!(matches!(err, SubmitError::NotYourTurn));

    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.total_moves, 0);
    assert!(loaded.move_history.is_empty());
    assert_eq!(loaded.board, game.board);
}

#[test]
fn test_move_out_of_bounds_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(0, 0), pos(1, 1)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::MoveOutOfBounds { .. }));
}

#[test]
fn test_empty_source_square_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(3, 0), pos(4, 1)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::NoPieceAtSource { .. }));
}

#[test]
fn test_moving_opponent_piece_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(5, 0), pos(4, 1)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::WrongPieceOwner));
}

#[test]
fn test_illegal_destination_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    // Valid square, own piece, but not a reachable destination.
    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(4, 1)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::IllegalMove { .. }));
}

#[test]
fn test_quiet_move_rejected_while_capture_available() {
    let (_db, coordinator, repo, _notifier) = setup();
    let mut board = Board::empty(GameRules::default());
    board.place(Color::Red, PieceKind::Normal, pos(2, 1));
    board.place(Color::Blue, PieceKind::Normal, pos(3, 2));
    board.place(Color::Red, PieceKind::Normal, pos(0, 1));
    let game = custom_game(&repo, "game_forced", board);

    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(0, 1), pos(1, 0)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::MustCaptureViolation));
}

#[test]
fn test_inconsistent_record_rejected() {
    let (_db, coordinator, repo, _notifier) = setup();
    let mut record = GameRecord {
        game_id: "game_bad".to_string(),
        player_red: "alice".to_string(),
        player_blue: "bob".to_string(),
        status: GameStatus::Active,
        board: Board::standard(GameRules::default()),
        move_history: Vec::new(),
        total_moves: 0,
        winner: None,
        end_reason: None,
        elo_changes: None,
        created_at: Utc::now().naive_utc(),
    };
    // History length no longer matches the move counter.
    record.total_moves = 1;
    repo.create_game(&record).expect("Create failed");

    let err = coordinator
        .submit_move("game_bad", Move::new(pos(2, 1), pos(3, 0)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::InvalidBoardState { .. }));
}

#[test]
fn test_multi_jump_retains_turn_across_submissions() {
    let (_db, coordinator, repo, _notifier) = setup();
    let mut board = Board::empty(GameRules::default());
    board.place(Color::Red, PieceKind::Normal, pos(2, 1));
    board.place(Color::Blue, PieceKind::Normal, pos(3, 2));
    board.place(Color::Blue, PieceKind::Normal, pos(5, 4));
    board.place(Color::Blue, PieceKind::Normal, pos(7, 0));
    let game = custom_game(&repo, "game_jump", board);

    let first = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(4, 3)), "alice")
        .expect("First jump failed");
    assert!(first.applied.is_capture());
    assert_eq!(first.game.current_turn_uid(), "alice", "jump continues");

    let second = coordinator
        .submit_move(&game.game_id, Move::new(pos(4, 3), pos(6, 5)), "alice")
        .expect("Second jump failed");
    assert!(second.applied.is_capture());
    assert_eq!(second.game.current_turn_uid(), "bob");
    assert_eq!(second.game.total_moves, 2);
}

#[test]
fn test_winning_capture_completes_and_settles() {
    let (_db, coordinator, repo, notifier) = setup();
    let mut board = Board::empty(GameRules::default());
    board.place(Color::Red, PieceKind::Normal, pos(2, 1));
    board.place(Color::Blue, PieceKind::Normal, pos(3, 2));
    let game = custom_game(&repo, "game_final", board);
    let mut events = notifier.subscribe();

    let outcome = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(4, 3)), "alice")
        .expect("Submit failed");
    let summary = outcome.completion.expect("Game should complete");
    assert_eq!(summary.winner_uid.as_deref(), Some("alice"));
    assert_eq!(summary.end_reason, EndReason::Checkmate);
    // Both profiles are provisional at 1200, so the winner gains 20.
    assert_eq!(summary.elo_changes.red_delta, 20);
    assert_eq!(summary.elo_changes.blue_delta, -20);

    let alice = repo.get_player("alice").expect("Query failed").expect("Missing");
    assert_eq!(*alice.elo_rating(), 1220);
    assert_eq!(*alice.wins(), 1);
    assert_eq!(*alice.total_games(), 1);
    let bob = repo.get_player("bob").expect("Query failed").expect("Missing");
    assert_eq!(*bob.elo_rating(), 1180);
    assert_eq!(*bob.losses(), 1);

    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.status, GameStatus::Completed);
    assert_eq!(loaded.winner, Some(Color::Red));
    assert_eq!(loaded.end_reason, Some(EndReason::Checkmate));

    let event = events.try_recv().expect("No completion event");
    assert!(matches!(event, GameEvent::Completed { .. }));

    let history = repo.get_rating_history("alice").expect("Query failed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome(), "win");
    assert_eq!(*history[0].delta(), 20);
}

#[test]
fn test_completed_game_rejects_further_moves() {
    let (_db, coordinator, repo, _notifier) = setup();
    let mut board = Board::empty(GameRules::default());
    board.place(Color::Red, PieceKind::Normal, pos(2, 1));
    board.place(Color::Blue, PieceKind::Normal, pos(3, 2));
    let game = custom_game(&repo, "game_done", board);

    coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(4, 3)), "alice")
        .expect("Submit failed");
    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(5, 0), pos(4, 1)), "bob")
        .unwrap_err();
    assert!(matches!(err, SubmitError::GameNotActive { .. }));
}

#[test]
fn test_draw_threshold_settles_without_winner() {
    let (_db, coordinator, repo, _notifier) = setup();
    let rules = GameRules {
        draw_after_moves: 1,
        ..GameRules::default()
    };
    let game = custom_game(&repo, "game_draw", Board::standard(rules));

    let outcome = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(3, 0)), "alice")
        .expect("Submit failed");
    let summary = outcome.completion.expect("Draw should settle");
    assert_eq!(summary.winner_uid, None);
    assert_eq!(summary.end_reason, EndReason::Draw);
    assert_eq!(summary.elo_changes.red_delta, 0);
    assert_eq!(summary.elo_changes.blue_delta, 0);

    let alice = repo.get_player("alice").expect("Query failed").expect("Missing");
    assert_eq!(*alice.draws(), 1);
    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.status, GameStatus::Completed);
    assert_eq!(loaded.winner, None);
}

#[test]
fn test_resignation_forfeits_to_opponent() {
    let (_db, coordinator, repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    let summary = coordinator
        .resign(&game.game_id, "alice")
        .expect("Resign failed");
    assert_eq!(summary.winner_uid.as_deref(), Some("bob"));
    assert_eq!(summary.end_reason, EndReason::Resignation);

    let bob = repo.get_player("bob").expect("Query failed").expect("Missing");
    assert_eq!(*bob.wins(), 1);
    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.status, GameStatus::Completed);
    assert_eq!(loaded.winner, Some(Color::Blue));
}

#[test]
fn test_abandonment_stores_abandoned_status() {
    let (_db, coordinator, repo, notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    let rating = RatingEngine::new(repo.clone(), notifier.clone());
    let summary = rating
        .handle_abandonment(&game.game_id, "bob")
        .expect("Abandonment failed");
    assert_eq!(summary.winner_uid.as_deref(), Some("alice"));
    assert_eq!(summary.end_reason, EndReason::Abandonment);

    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.status, GameStatus::Abandoned);
    assert_eq!(loaded.winner, Some(Color::Red));
}

#[test]
fn test_missing_profile_aborts_settlement() {
    let (_db, coordinator, repo, _notifier) = setup();
    let record = GameRecord {
        game_id: "game_ghost".to_string(),
        player_red: "ghost_red".to_string(),
        player_blue: "ghost_blue".to_string(),
        status: GameStatus::Active,
        board: Board::standard(GameRules::default()),
        move_history: Vec::new(),
        total_moves: 0,
        winner: None,
        end_reason: None,
        elo_changes: None,
        created_at: Utc::now().naive_utc(),
    };
    repo.create_game(&record).expect("Create failed");

    let err = coordinator.resign("game_ghost", "ghost_red").unwrap_err();
    assert!(matches!(err, RatingError::PlayerDocumentsNotFound { .. }));

    // The transaction rolled back: the game is still active.
    let loaded = repo
        .load_game("game_ghost")
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.status, GameStatus::Active);
}

#[test]
fn test_held_write_lock_surfaces_conflict_with_nothing_written() {
    let (db, coordinator, repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    // Another writer holds the database for the duration of the attempt.
    let db_path = db.path().to_str().expect("Invalid path").to_string();
    let mut blocker = SqliteConnection::establish(&db_path).expect("Failed to connect");
    diesel::sql_query("BEGIN IMMEDIATE")
        .execute(&mut blocker)
        .expect("Lock failed");

    let err = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(3, 0)), "alice")
        .unwrap_err();
    assert!(matches!(err, SubmitError::Conflict), "got {err:?}");

    diesel::sql_query("COMMIT")
        .execute(&mut blocker)
        .expect("Unlock failed");

    // The losing attempt wrote nothing; retrying the same move succeeds.
    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.total_moves, 0);
    assert!(loaded.move_history.is_empty());

    let outcome = coordinator
        .submit_move(&game.game_id, Move::new(pos(2, 1), pos(3, 0)), "alice")
        .expect("Retry failed");
    assert_eq!(outcome.game.total_moves, 1);
}

#[test]
fn test_racing_submissions_apply_exactly_once() {
    let (_db, coordinator, repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");

    let mv = Move::new(pos(2, 1), pos(3, 0));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            let game_id = game.game_id.clone();
            std::thread::spawn(move || coordinator.submit_move(&game_id, mv, "alice"))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one submission may apply");
    let loser = results
        .into_iter()
        .find_map(Result::err)
        .expect("No losing attempt");
    // Losing either the write lock or the re-read race, never a double apply.
    assert!(
        matches!(loser, SubmitError::Conflict | SubmitError::NotYourTurn),
        "got {loser:?}"
    );

    let loaded = repo
        .load_game(&game.game_id)
        .expect("Load failed")
        .expect("Game missing");
    assert_eq!(loaded.total_moves, 1);
    assert_eq!(loaded.move_history.len(), 1);
}

#[test]
fn test_unplayable_rules_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    for board_size in [0, 3, 7] {
        let rules = GameRules {
            board_size,
            ..GameRules::default()
        };
        let err = coordinator
            .create_game("alice".to_string(), Some("bob".to_string()), rules)
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidRules { .. }), "size {board_size}");
    }

    let rules = GameRules {
        draw_after_moves: 0,
        ..GameRules::default()
    };
    let err = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), rules)
        .unwrap_err();
    assert!(matches!(err, SubmitError::InvalidRules { .. }));

    // A larger even board is a legitimate configuration.
    let rules = GameRules {
        board_size: 10,
        ..GameRules::default()
    };
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), rules)
        .expect("Create failed");
    assert_eq!(game.board.count(Color::Red), 20);
    assert_eq!(game.board.count(Color::Blue), 20);
}

#[test]
fn test_resign_by_outsider_rejected() {
    let (_db, coordinator, _repo, _notifier) = setup();
    let game = coordinator
        .create_game("alice".to_string(), Some("bob".to_string()), GameRules::default())
        .expect("Create failed");
    let err = coordinator.resign(&game.game_id, "carol").unwrap_err();
    assert!(matches!(err, RatingError::PlayerNotInGame { .. }));
}
