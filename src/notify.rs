//! Typed outbound notifications for UI and external collaborators.
//!
//! A [`Notifier`] is an explicit handle owned by the hosting process;
//! consumers hold typed subscriptions instead of listening on ambient
//! global events. Dropping a receiver unsubscribes it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::db::{EloChanges, EndReason};
use crate::rating::GameStats;

/// Events emitted by the core once their originating transaction commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// A game completed and ratings were settled.
    Completed {
        /// The game that completed.
        game_id: String,
        /// Winning uid, `None` on a draw.
        winner: Option<String>,
        /// Terminal cause.
        end_reason: EndReason,
        /// Applied Elo changes.
        elo_changes: EloChanges,
        /// Performance aggregates.
        game_stats: GameStats,
    },
    /// A player's move clock expired.
    Timeout {
        /// The affected game.
        game_id: String,
        /// Uid of the player whose clock expired.
        timed_out_player: String,
    },
    /// A move clock crossed its warning threshold.
    TimeWarning {
        /// The affected game.
        game_id: String,
        /// Remaining time in milliseconds.
        time_remaining_ms: u64,
    },
    /// A disconnected player failed to reconnect in time.
    ReconnectionTimeout {
        /// The affected game.
        game_id: String,
        /// Uid of the player who did not return.
        player_id: String,
    },
}

/// Broadcast hub for [`GameEvent`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<GameEvent>,
}

impl Notifier {
    /// Creates a hub buffering up to `capacity` undelivered events per
    /// subscriber.
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    /// Emits an event to all current subscribers.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    #[instrument(skip(self, event))]
    pub fn emit(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            debug!("no active subscribers, event dropped");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
