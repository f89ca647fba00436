//! Game-facing payloads shared by WebSocket events and REST responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Snapshot of a player as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    /// Display name, unique within the room.
    pub name: String,
    /// Opaque cosmetic payload chosen on the join screen, passed through
    /// unmodified.
    #[schema(value_type = Object)]
    pub avatar: Value,
    /// Cumulative score for the current game.
    pub score: u32,
}

/// Data broadcast when a round begins.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundStart {
    /// Topic the players must associate words with.
    pub topic: String,
    /// 1-based number of the round that just started.
    pub round: u32,
    /// Total number of rounds in the game.
    pub max_rounds: u32,
    /// Countdown duration in seconds.
    pub seconds: u32,
}

/// One submitted guess, as relayed in the guesses-so-far snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuessEntry {
    /// Player who submitted the guess.
    pub player_name: String,
    /// Raw guess text as typed.
    pub guess: String,
}

/// A matching group within a resolved round.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuessGroupSummary {
    /// Normalized guess text shared by the group.
    pub guess: String,
    /// Points awarded to each player of the group.
    pub points: u32,
    /// Members of the group with their updated scores.
    pub players: Vec<PlayerSummary>,
}

/// Outcome of a single round.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundResult {
    /// Match groups in first-submission order.
    pub groups: Vec<GuessGroupSummary>,
    /// All players sorted by score descending (ties keep join order).
    pub leaderboard: Vec<PlayerSummary>,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GameEndReason {
    /// All configured rounds were played.
    Completed,
    /// The host connection went away; the room was torn down.
    HostDisconnected,
}

/// Public snapshot of a room, served over REST.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomSummary {
    /// PIN identifying the room.
    pub pin: String,
    /// Current lifecycle phase (`waiting`, `playing`, `round-results`,
    /// `ended`).
    pub phase: String,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
    /// Topic of the round in progress, absent outside a round.
    pub topic: Option<String>,
    /// 1-based number of the round in progress (0 before the first round).
    pub current_round: u32,
    /// Configured number of rounds.
    pub max_rounds: u32,
}

/// Response body of the join-screen PIN pre-check.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PinValidation {
    /// True when a room with the requested PIN currently exists.
    pub valid: bool,
}
