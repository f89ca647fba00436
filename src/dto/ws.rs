//! Wire schemas for the game WebSocket channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::{
    game::{GameEndReason, GuessEntry, PlayerSummary, RoundResult, RoundStart},
    validation::{validate_display_name, validate_pin},
};

fn default_max_rounds() -> u32 {
    5
}

fn default_round_seconds() -> u32 {
    60
}

fn default_language() -> String {
    "ar".into()
}

/// Role a connection claims when joining a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerRole {
    /// Connection holding start authority for the room.
    Host,
    /// Regular participant.
    Player,
}

/// Settings for a new room, fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateGamePayload {
    /// Number of rounds to play.
    #[serde(default = "default_max_rounds")]
    #[validate(range(min = 1, max = 20))]
    pub max_rounds: u32,
    /// Countdown duration per round, in seconds.
    #[serde(default = "default_round_seconds")]
    #[validate(range(min = 5, max = 300))]
    pub round_seconds: u32,
    /// Language key selecting the topic pool.
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 8))]
    pub language: String,
}

/// Request to join (or rejoin) a room by PIN.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct JoinRoomPayload {
    /// PIN identifying the target room.
    #[validate(custom(function = validate_pin))]
    pub pin: String,
    /// Display name for the joining player.
    #[validate(length(min = 1, max = 24), custom(function = validate_display_name))]
    pub player_name: String,
    /// Claimed role; `host` reclaims host authority on reconnect.
    #[serde(default = "JoinRoomPayload::default_role")]
    pub role: PlayerRole,
    /// Opaque avatar payload, stored and echoed back as-is.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub avatar: Value,
}

impl JoinRoomPayload {
    fn default_role() -> PlayerRole {
        PlayerRole::Player
    }
}

/// Host request to begin round one.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StartGamePayload {
    /// PIN identifying the target room.
    #[validate(custom(function = validate_pin))]
    pub pin: String,
}

/// A player's guess for the current round.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitGuessPayload {
    /// PIN identifying the target room.
    #[validate(custom(function = validate_pin))]
    pub pin: String,
    /// Name of the submitting player.
    #[validate(length(min = 1, max = 24))]
    pub player_name: String,
    /// Free-text guess; re-submission overwrites the previous entry.
    #[validate(length(min = 1, max = 64))]
    pub guess: String,
}

/// Commands accepted from game WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Create a room and become its host.
    CreateGame(CreateGamePayload),
    /// Join a room by PIN.
    JoinRoom(JoinRoomPayload),
    /// Begin round one (host only).
    StartGame(StartGamePayload),
    /// Submit a guess for the in-progress round.
    SubmitGuess(SubmitGuessPayload),
}

/// Error returned when an inbound frame cannot be turned into a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The frame was not valid JSON for any known command.
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The command parsed but one of its fields failed validation.
    #[error("invalid command: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientCommand {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, CommandError> {
        let command: Self = serde_json::from_str(raw)?;
        command.validate_payload()?;
        Ok(command)
    }

    fn validate_payload(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::CreateGame(payload) => payload.validate(),
            Self::JoinRoom(payload) => payload.validate(),
            Self::StartGame(payload) => payload.validate(),
            Self::SubmitGuess(payload) => payload.validate(),
        }
    }
}

/// Events broadcast to the connections of a room (or sent to a single
/// connection, for `game-created` and the error variants).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent to the creating connection with the fresh room PIN.
    GameCreated {
        /// PIN of the newly created room.
        pin: String,
    },
    /// Roster snapshot after a join.
    PlayerJoined {
        /// All players in join order.
        players: Vec<PlayerSummary>,
    },
    /// Round one has begun.
    GameStarted(RoundStart),
    /// A subsequent round has begun.
    NewRound(RoundStart),
    /// Countdown progress for the current round.
    TimerUpdate {
        /// Remaining whole seconds.
        seconds: u32,
    },
    /// Guesses-so-far snapshot after a submission or a departure.
    GuessesUpdated {
        /// Current entries, one per player, in submission order.
        guesses: Vec<GuessEntry>,
        /// Number of players who have submitted.
        submitted: usize,
        /// Number of players currently in the room.
        total: usize,
    },
    /// A round has been resolved and scored.
    RoundCompleted(RoundResult),
    /// The game is over.
    GameEnded {
        /// Why the game ended.
        reason: GameEndReason,
        /// Final standings, sorted by score descending.
        leaderboard: Vec<PlayerSummary>,
    },
    /// Roster snapshot after a departure.
    PlayerLeft {
        /// Remaining players in join order.
        players: Vec<PlayerSummary>,
    },
    /// A command from this connection was rejected.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// A join attempt from this connection was rejected.
    JoinError {
        /// Human-readable description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_join_command_with_defaults() {
        let raw = r#"{"type":"join-room","pin":"123456","player_name":"Sara"}"#;
        let command = ClientCommand::from_json_str(raw).unwrap();

        let ClientCommand::JoinRoom(payload) = command else {
            panic!("expected join-room");
        };
        assert_eq!(payload.pin, "123456");
        assert_eq!(payload.role, PlayerRole::Player);
        assert!(payload.avatar.is_null());
    }

    #[test]
    fn create_game_defaults_match_the_classic_settings() {
        let command = ClientCommand::from_json_str(r#"{"type":"create-game"}"#).unwrap();

        let ClientCommand::CreateGame(payload) = command else {
            panic!("expected create-game");
        };
        assert_eq!(payload.max_rounds, 5);
        assert_eq!(payload.round_seconds, 60);
        assert_eq!(payload.language, "ar");
    }

    #[test]
    fn rejects_a_malformed_pin() {
        let raw = r#"{"type":"start-game","pin":"12ab"}"#;
        assert!(matches!(
            ClientCommand::from_json_str(raw),
            Err(CommandError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_a_blank_player_name() {
        let raw = r#"{"type":"join-room","pin":"123456","player_name":"   "}"#;
        assert!(matches!(
            ClientCommand::from_json_str(raw),
            Err(CommandError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_an_unknown_command_type() {
        assert!(matches!(
            ClientCommand::from_json_str(r#"{"type":"reboot"}"#),
            Err(CommandError::Malformed(_))
        ));
    }

    #[test]
    fn server_events_serialize_with_kebab_case_tags() {
        let event = ServerEvent::TimerUpdate { seconds: 42 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timer-update");
        assert_eq!(json["seconds"], 42);
    }
}
