//! Checkers Arena - unified CLI.

#![warn(missing_docs)]

use anyhow::Result;
use clap::Parser;
use diesel::Connection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use checkers_arena::cli::{Cli, Command};
use checkers_arena::coordinator::MoveCoordinator;
use checkers_arena::db::GameRepository;
use checkers_arena::games::checkers::{
    Board, Color, Difficulty, GameRules, apply_move, choose_move, next_to_move, winner,
};
use checkers_arena::notify::Notifier;
use checkers_arena::rating::RatingEngine;
use checkers_arena::server::{self, AppState};
use checkers_arena::timeout::{TimeoutConfig, TimeoutRegistry};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            port,
            host,
            db_path,
            move_timeout_ms,
            warning_threshold_ms,
        } => {
            run_server(
                host,
                port,
                db_path,
                TimeoutConfig {
                    move_timeout_ms,
                    warning_threshold_ms,
                },
            )
            .await
        }
        Command::Demo { red, blue } => run_demo(red, blue),
    }
}

/// Runs migrations and serves the REST API.
async fn run_server(
    host: String,
    port: u16,
    db_path: String,
    timeout_config: TimeoutConfig,
) -> Result<()> {
    info!(db_path = %db_path, "applying pending migrations");
    let mut conn = diesel::SqliteConnection::establish(&db_path)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    drop(conn);

    let repository = GameRepository::new(db_path);
    let notifier = Notifier::default();
    let rating = RatingEngine::new(repository.clone(), notifier.clone());
    let coordinator = MoveCoordinator::new(repository.clone(), rating.clone(), notifier.clone());
    let timeouts = TimeoutRegistry::new(repository.clone(), rating, notifier.clone());

    // Log every outbound event for operators.
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(?event, "game event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let state = AppState {
        coordinator,
        timeouts,
        repository,
        timeout_config,
    };
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    server::serve(listener, state).await
}

/// Plays an AI-vs-AI game in the terminal.
fn run_demo(red: Difficulty, blue: Difficulty) -> Result<()> {
    let rules = GameRules::default();
    let mut board = Board::standard(rules);
    let mut moves = 0u32;

    println!("{board}");
    loop {
        if let Some(won_by) = winner(&board) {
            println!("winner: {won_by} after {moves} moves");
            return Ok(());
        }
        if moves >= rules.draw_after_moves {
            println!("draw after {moves} moves");
            return Ok(());
        }

        let color = board.to_move();
        let difficulty = match color {
            Color::Red => red,
            Color::Blue => blue,
        };
        let Some(mv) = choose_move(&board, color, difficulty) else {
            println!("winner: {} after {moves} moves", color.opponent());
            return Ok(());
        };

        let (mut next, applied) = apply_move(&board, mv)?;
        next.set_to_move(next_to_move(&next, &applied));
        board = next;
        moves += 1;

        println!(
            "{moves}. {color} {} -> {}{}{}",
            applied.from,
            applied.to,
            if applied.is_capture() { " x" } else { "" },
            if applied.promoted { " K" } else { "" },
        );
        println!("{board}");
    }
}
