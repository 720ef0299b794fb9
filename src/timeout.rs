//! Per-game move clocks with warnings and forfeits.
//!
//! The [`TimeoutRegistry`] is an explicit object owned by the hosting
//! process, keyed by game id, with a `start`/`stop`/`cleanup` lifecycle.
//! Each game gets an independent tokio timer task; `pause`, `stop`, and
//! `cleanup` deterministically cancel it, so no timer fires after its game
//! has been stopped or cleaned up. Notifications go through the typed
//! broadcast hub, never through ambient globals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::db::GameRepository;
use crate::notify::{GameEvent, Notifier};
use crate::rating::RatingEngine;

/// Move clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutConfig {
    /// Total time allowed per move, in milliseconds.
    pub move_timeout_ms: u64,
    /// Remaining time at which a warning is emitted, in milliseconds.
    pub warning_threshold_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            move_timeout_ms: 30_000,
            warning_threshold_ms: 10_000,
        }
    }
}

/// Snapshot of one game's clock.
#[derive(Debug, Clone, Serialize)]
pub struct ClockStatus {
    /// Remaining time in milliseconds.
    pub time_remaining_ms: u64,
    /// Whether the warning threshold has been crossed.
    pub is_warning: bool,
    /// When the current move started, if the clock has run.
    pub last_move_time: Option<DateTime<Utc>>,
}

struct ClockEntry {
    last_move_time: Option<DateTime<Utc>>,
    deadline: Instant,
    paused: Option<PausedClock>,
    is_warning: bool,
    task: Option<JoinHandle<()>>,
}

struct PausedClock {
    remaining_ms: u64,
    paused_at: Instant,
}

/// Registry of per-game move clocks.
#[derive(Clone)]
pub struct TimeoutRegistry {
    clocks: Arc<Mutex<HashMap<String, ClockEntry>>>,
    notifier: Notifier,
    rating: RatingEngine,
    repository: GameRepository,
}

impl TimeoutRegistry {
    /// Creates a registry wired to the rating engine (for forfeits) and
    /// the notification hub.
    #[instrument(skip(repository, rating, notifier))]
    pub fn new(repository: GameRepository, rating: RatingEngine, notifier: Notifier) -> Self {
        Self {
            clocks: Arc::new(Mutex::new(HashMap::new())),
            notifier,
            rating,
            repository,
        }
    }

    /// Starts (or restarts) the clock for a game's current move.
    ///
    /// If the warning threshold already covers the whole move time, the
    /// warning fires immediately.
    #[instrument(skip(self))]
    pub fn start(&self, game_id: &str, config: TimeoutConfig) {
        self.stop(game_id);

        let warn_now = config.warning_threshold_ms >= config.move_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(config.move_timeout_ms);
        {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            clocks.insert(
                game_id.to_string(),
                ClockEntry {
                    last_move_time: Some(Utc::now()),
                    deadline,
                    paused: None,
                    is_warning: warn_now,
                    task: None,
                },
            );
        }
        if warn_now {
            self.notifier.emit(GameEvent::TimeWarning {
                game_id: game_id.to_string(),
                time_remaining_ms: config.move_timeout_ms,
            });
        }
        self.spawn_timer(game_id.to_string(), deadline, config);
        debug!(game_id, move_timeout_ms = config.move_timeout_ms, "clock started");
    }

    /// Stops and clears a game's clock. Idempotent.
    #[instrument(skip(self))]
    pub fn stop(&self, game_id: &str) {
        let entry = {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            clocks.remove(game_id)
        };
        if let Some(entry) = entry {
            if let Some(task) = entry.task {
                task.abort();
            }
            debug!(game_id, "clock stopped");
        }
    }

    /// Resets the clock for a new move, clearing any warning state.
    #[instrument(skip(self))]
    pub fn reset(&self, game_id: &str, config: TimeoutConfig) {
        self.start(game_id, config);
    }

    /// Suspends the forfeit timer, remembering the remaining time.
    #[instrument(skip(self))]
    pub fn pause(&self, game_id: &str) {
        let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
        if let Some(entry) = clocks.get_mut(game_id) {
            if entry.paused.is_some() {
                return;
            }
            if let Some(task) = entry.task.take() {
                task.abort();
            }
            let now = Instant::now();
            let remaining_ms = entry
                .deadline
                .saturating_duration_since(now)
                .as_millis() as u64;
            entry.paused = Some(PausedClock {
                remaining_ms,
                paused_at: now,
            });
            debug!(game_id, remaining_ms, "clock paused");
        }
    }

    /// Resumes a paused clock.
    ///
    /// Remaining time is recomputed from the wall clock elapsed since the
    /// pause; if the move time fully elapsed while paused, the timeout
    /// fires immediately instead of waiting.
    #[instrument(skip(self))]
    pub async fn resume(&self, game_id: &str, config: TimeoutConfig) {
        let (remaining_ms, deadline) = {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            let Some(entry) = clocks.get_mut(game_id) else {
                return;
            };
            let Some(paused) = entry.paused.take() else {
                return;
            };
            let elapsed_ms = paused.paused_at.elapsed().as_millis() as u64;
            let remaining_ms = paused.remaining_ms.saturating_sub(elapsed_ms);
            entry.deadline = Instant::now() + Duration::from_millis(remaining_ms);
            (remaining_ms, entry.deadline)
        };

        if remaining_ms == 0 {
            info!(game_id, "move time elapsed during pause, forfeiting now");
            self.clone().fire_timeout(game_id.to_string()).await;
            return;
        }
        self.spawn_timer(game_id.to_string(), deadline, config);
        debug!(game_id, remaining_ms, "clock resumed");
    }

    /// Reports a game's clock state, or `None` for untracked games.
    #[instrument(skip(self))]
    pub fn status(&self, game_id: &str) -> Option<ClockStatus> {
        let clocks = self.clocks.lock().expect("clock registry lock poisoned");
        clocks.get(game_id).map(|entry| {
            let time_remaining_ms = match &entry.paused {
                Some(paused) => {
                    let elapsed = paused.paused_at.elapsed().as_millis() as u64;
                    paused.remaining_ms.saturating_sub(elapsed)
                }
                None => entry
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
            };
            ClockStatus {
                time_remaining_ms,
                is_warning: entry.is_warning,
                last_move_time: entry.last_move_time,
            }
        })
    }

    /// Cancels every pending timer and clears all tracked games.
    #[instrument(skip(self))]
    pub fn cleanup(&self) {
        let entries: Vec<ClockEntry> = {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            clocks.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        for entry in entries {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        info!(count, "timeout registry cleaned up");
    }

    /// Reports that a disconnected player failed to reconnect.
    ///
    /// The player is checked against the persisted game record's roster
    /// before the notification is emitted.
    #[instrument(skip(self))]
    pub fn handle_reconnection_timeout(&self, game_id: &str, player_id: &str) {
        match self.repository.load_game(game_id) {
            Ok(Some(record)) if record.color_of(player_id).is_some() => {
                info!(game_id, player_id, "player failed to reconnect");
                self.notifier.emit(GameEvent::ReconnectionTimeout {
                    game_id: game_id.to_string(),
                    player_id: player_id.to_string(),
                });
            }
            Ok(Some(_)) => {
                warn!(game_id, player_id, "reconnection timeout for unknown player, ignored");
            }
            Ok(None) => {
                warn!(game_id, "reconnection timeout for unknown game, ignored");
            }
            Err(e) => {
                warn!(game_id, error = %e, "failed to load game for reconnection timeout");
            }
        }
    }

    /// Spawns the warning/expiry timer task for a game.
    ///
    /// Both sleeps are anchored to the absolute deadline captured by the
    /// caller, so a task that is first polled late still fires on time. A
    /// clock that starts or resumes already inside the warning window warns
    /// right away instead of skipping the warning.
    fn spawn_timer(&self, game_id: String, deadline: Instant, config: TimeoutConfig) {
        let registry = self.clone();
        let task_game_id = game_id.clone();
        let handle = tokio::spawn(async move {
            let warn_deadline = deadline
                .checked_sub(Duration::from_millis(config.warning_threshold_ms))
                .unwrap_or_else(Instant::now);
            let now = Instant::now();
            if warn_deadline > now {
                sleep_until(warn_deadline).await;
                registry.mark_warning(&task_game_id, config.warning_threshold_ms);
            } else {
                let remaining = deadline.saturating_duration_since(now).as_millis() as u64;
                registry.mark_warning(&task_game_id, remaining);
            }
            sleep_until(deadline).await;
            registry.fire_timeout(task_game_id).await;
        });

        let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
        if let Some(entry) = clocks.get_mut(&game_id) {
            entry.task = Some(handle);
        } else {
            // Stopped between spawn and registration; cancel the orphan.
            handle.abort();
        }
    }

    /// Marks a clock as warned and emits the warning, unless the game was
    /// stopped or paused in the meantime.
    fn mark_warning(&self, game_id: &str, time_remaining_ms: u64) {
        let should_emit = {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            match clocks.get_mut(game_id) {
                Some(entry) if entry.paused.is_none() && !entry.is_warning => {
                    entry.is_warning = true;
                    true
                }
                _ => false,
            }
        };
        if should_emit {
            debug!(game_id, time_remaining_ms, "time warning");
            self.notifier.emit(GameEvent::TimeWarning {
                game_id: game_id.to_string(),
                time_remaining_ms,
            });
        }
    }

    /// Forfeits the game for the player to move: emits the timeout
    /// notification and completes the game through the rating engine.
    async fn fire_timeout(self, game_id: String) {
        // The entry may already be gone if the game was stopped between
        // the timer firing and this handler running.
        {
            let mut clocks = self.clocks.lock().expect("clock registry lock poisoned");
            if clocks.remove(&game_id).is_none() {
                return;
            }
        }

        let timed_out_player = match self.repository.load_game(&game_id) {
            Ok(Some(record)) => record.current_turn_uid().to_string(),
            Ok(None) => {
                warn!(game_id, "timeout fired for unknown game");
                return;
            }
            Err(e) => {
                warn!(game_id, error = %e, "failed to load game on timeout");
                return;
            }
        };

        info!(game_id, timed_out_player, "move clock expired");
        self.notifier.emit(GameEvent::Timeout {
            game_id: game_id.clone(),
            timed_out_player: timed_out_player.clone(),
        });
        if let Err(e) = self.rating.handle_timeout(&game_id, &timed_out_player) {
            warn!(game_id, error = %e, "failed to settle timed-out game");
        }
    }
}
