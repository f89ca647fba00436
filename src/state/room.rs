//! One game instance: players, phase, rounds, guesses and scores.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    dto::{
        game::{GuessEntry, GuessGroupSummary, PlayerSummary, RoundResult, RoundStart},
        ws::{PlayerRole, ServerEvent},
    },
    error::ServiceError,
    state::{scoring, timer::RoundTimer},
};

/// Capacity of the per-room event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// High-level phases a room can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Players are joining; the host has not started the game.
    Waiting,
    /// A round countdown is active and guesses are accepted.
    Playing,
    /// The round has been scored; the next round (or the end) is pending.
    RoundResults,
    /// The final leaderboard has been published.
    Ended,
}

impl RoomPhase {
    /// Wire name of the phase, as exposed in REST snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomPhase::Waiting => "waiting",
            RoomPhase::Playing => "playing",
            RoomPhase::RoundResults => "round-results",
            RoomPhase::Ended => "ended",
        }
    }
}

/// Events that drive the room phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts round one from the lobby.
    Start,
    /// The in-progress round resolves (timer expiry or all submitted).
    ResolveRound,
    /// The inter-round delay elapsed; the next round begins.
    NextRound,
    /// The last round resolved (or the room is being torn down).
    Finish,
    /// A rematch join resets an ended room back to the lobby.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the room was in when the invalid event was received.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoomEvent,
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

/// Compute the next phase for an event, if the transition is valid.
fn next_phase(from: RoomPhase, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
    let next = match (from, event) {
        (RoomPhase::Waiting, RoomEvent::Start) => RoomPhase::Playing,
        (RoomPhase::Playing, RoomEvent::ResolveRound) => RoomPhase::RoundResults,
        (RoomPhase::RoundResults, RoomEvent::NextRound) => RoomPhase::Playing,
        (
            RoomPhase::Waiting | RoomPhase::Playing | RoomPhase::RoundResults,
            RoomEvent::Finish,
        ) => RoomPhase::Ended,
        (RoomPhase::Ended, RoomEvent::Reset) => RoomPhase::Waiting,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Immutable per-room settings, fixed at creation.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Number of rounds to play before the game ends.
    pub max_rounds: u32,
    /// Countdown duration per round, in seconds.
    pub round_seconds: u32,
    /// Language key the topic pool was selected for.
    pub language: String,
}

/// Player info tracked inside a room.
#[derive(Debug, Clone)]
pub struct Player {
    /// Display name, unique within the room.
    pub name: String,
    /// Opaque avatar payload, echoed back to clients unmodified.
    pub avatar: Value,
    /// Cumulative score for the current game.
    pub score: u32,
}

impl Player {
    fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            score: self.score,
        }
    }
}

/// State machine for one game instance, guarded by its own mutex.
///
/// The room owns its timers and its players; both die with the room. Events
/// are pushed into the broadcast channel while the room lock is held, so the
/// per-room event order observed by clients always matches the order of the
/// state transitions that produced them.
pub struct Room {
    pin: String,
    phase: RoomPhase,
    players: Vec<Player>,
    host_connection: Uuid,
    current_round: u32,
    settings: RoomSettings,
    topic_pool: Vec<String>,
    topic_queue: Vec<String>,
    topic: Option<String>,
    pending_guesses: IndexMap<String, String>,
    round_epoch: u64,
    countdown: Option<RoundTimer>,
    schedule: Option<RoundTimer>,
    events: broadcast::Sender<ServerEvent>,
}

impl Room {
    /// Build a fresh room in the lobby phase, owned by the creating
    /// connection as host.
    pub fn new(pin: String, settings: RoomSettings, topic_pool: Vec<String>, host: Uuid) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pin,
            phase: RoomPhase::Waiting,
            players: Vec::new(),
            host_connection: host,
            current_round: 0,
            settings,
            topic_pool,
            topic_queue: Vec::new(),
            topic: None,
            pending_guesses: IndexMap::new(),
            round_epoch: 0,
            countdown: None,
            schedule: None,
            events,
        }
    }

    /// PIN identifying this room to clients.
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Current phase.
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// 1-based number of the round in progress (0 before the first round).
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Configured number of rounds.
    pub fn max_rounds(&self) -> u32 {
        self.settings.max_rounds
    }

    /// Configured countdown duration per round.
    pub fn round_seconds(&self) -> u32 {
        self.settings.round_seconds
    }

    /// Monotonic counter bumped at every round start and reset; timer
    /// callbacks capture it and re-check it under the room lock so a stale
    /// callback can never act on a superseded round.
    pub fn round_epoch(&self) -> u64 {
        self.round_epoch
    }

    /// Topic of the round in progress, if any.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Connection currently holding host authority.
    pub fn host_connection(&self) -> Uuid {
        self.host_connection
    }

    /// Number of joined players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Subscribe to this room's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Cloneable sender used by the countdown task for timer ticks.
    pub fn event_sender(&self) -> broadcast::Sender<ServerEvent> {
        self.events.clone()
    }

    /// Push an event to every connection joined to this room.
    pub fn broadcast(&self, event: ServerEvent) {
        // No receivers is fine; the room may be freshly created.
        let _ = self.events.send(event);
    }

    /// Apply a phase transition, rejecting invalid event/phase pairs.
    fn transition(&mut self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        self.phase = next_phase(self.phase, event)?;
        Ok(self.phase)
    }

    /// Add or update a player, returning the roster snapshot.
    ///
    /// In the lobby any name may join; a name that already exists is updated
    /// in place (keeping its join position) and its score reset. Mid-game,
    /// only an existing player may reattach, so a typo'd PIN cannot inject a
    /// stranger into a running game. A join with the host role always
    /// reclaims host authority for the joining connection. Joining an ended
    /// room resets it back to the lobby for a rematch first.
    pub fn join(
        &mut self,
        connection: Uuid,
        name: &str,
        role: PlayerRole,
        avatar: Value,
    ) -> Result<Vec<PlayerSummary>, ServiceError> {
        if self.phase == RoomPhase::Ended {
            self.reset_for_rematch()?;
        }

        if role == PlayerRole::Host {
            self.host_connection = connection;
        }

        match self.players.iter_mut().find(|p| p.name == name) {
            Some(player) => {
                player.avatar = avatar;
                if self.phase == RoomPhase::Waiting {
                    player.score = 0;
                }
            }
            None => {
                if self.phase != RoomPhase::Waiting {
                    return Err(ServiceError::InvalidState(format!(
                        "cannot add new player `{name}` while the game is running"
                    )));
                }
                self.players.push(Player {
                    name: name.to_string(),
                    avatar,
                    score: 0,
                });
            }
        }

        Ok(self.roster())
    }

    /// Remove a departing player and their pending guess, returning the
    /// remaining roster.
    pub fn remove_player(&mut self, name: &str) -> Vec<PlayerSummary> {
        self.players.retain(|p| p.name != name);
        self.pending_guesses.shift_remove(name);
        self.roster()
    }

    /// Record (or overwrite) a player's guess for the in-progress round.
    pub fn record_guess(&mut self, name: &str, guess: &str) -> Result<(), ServiceError> {
        if self.phase != RoomPhase::Playing {
            return Err(ServiceError::InvalidState(
                "guesses are only accepted while a round is running".into(),
            ));
        }
        if !self.players.iter().any(|p| p.name == name) {
            return Err(ServiceError::InvalidInput(format!(
                "`{name}` is not a player in this room"
            )));
        }

        self.pending_guesses
            .insert(name.to_string(), guess.to_string());
        Ok(())
    }

    /// Current guesses with submitted/total counts for the progress snapshot.
    pub fn guess_progress(&self) -> (Vec<GuessEntry>, usize, usize) {
        let entries = self
            .pending_guesses
            .iter()
            .map(|(player_name, guess)| GuessEntry {
                player_name: player_name.clone(),
                guess: guess.clone(),
            })
            .collect();
        (entries, self.pending_guesses.len(), self.players.len())
    }

    /// True when every current player has a guess in for this round.
    pub fn all_submitted(&self) -> bool {
        !self.players.is_empty() && self.pending_guesses.len() == self.players.len()
    }

    /// Advance into the next round: draw a topic, clear guesses, bump the
    /// epoch and increment the round counter.
    ///
    /// Valid from the lobby (round one) and from round results (subsequent
    /// rounds). The caller is responsible for starting the countdown.
    pub fn begin_round(&mut self) -> Result<RoundStart, InvalidTransition> {
        let event = match self.phase {
            RoomPhase::Waiting => RoomEvent::Start,
            _ => RoomEvent::NextRound,
        };
        self.transition(event)?;

        self.current_round += 1;
        self.round_epoch += 1;
        self.pending_guesses.clear();
        self.schedule = None;

        let topic = self.draw_topic();
        self.topic = Some(topic.clone());

        Ok(RoundStart {
            topic,
            round: self.current_round,
            max_rounds: self.settings.max_rounds,
            seconds: self.settings.round_seconds,
        })
    }

    /// Score the in-progress round and move to round results.
    ///
    /// Cancels the countdown first so a tick can never trail the results.
    pub fn resolve_round(&mut self) -> Result<RoundResult, InvalidTransition> {
        self.transition(RoomEvent::ResolveRound)?;
        self.countdown = None;

        let groups = scoring::score_round(&self.pending_guesses);
        for group in &groups {
            if group.points == 0 {
                continue;
            }
            for name in &group.players {
                if let Some(player) = self.players.iter_mut().find(|p| p.name == *name) {
                    player.score += group.points;
                }
            }
        }

        let summaries = groups
            .into_iter()
            .map(|group| GuessGroupSummary {
                players: group
                    .players
                    .iter()
                    .filter_map(|name| {
                        self.players
                            .iter()
                            .find(|p| p.name == *name)
                            .map(Player::summary)
                    })
                    .collect(),
                guess: group.guess,
                points: group.points,
            })
            .collect();

        Ok(RoundResult {
            groups: summaries,
            leaderboard: self.leaderboard(),
        })
    }

    /// Transition to the terminal phase, cancelling any outstanding timers,
    /// and return the final standings. Used both for natural completion and
    /// for host-disconnect teardown.
    pub fn end_game(&mut self) -> Result<Vec<PlayerSummary>, InvalidTransition> {
        self.transition(RoomEvent::Finish)?;
        self.cancel_timers();
        Ok(self.leaderboard())
    }

    /// Reset an ended room back to the lobby for a rematch, preserving the
    /// PIN and roster but zeroing scores and the round counter.
    pub fn reset_for_rematch(&mut self) -> Result<(), InvalidTransition> {
        self.transition(RoomEvent::Reset)?;
        self.cancel_timers();
        self.current_round = 0;
        self.round_epoch += 1;
        self.topic = None;
        self.pending_guesses.clear();
        for player in &mut self.players {
            player.score = 0;
        }
        Ok(())
    }

    /// Drop both timer handles, aborting their tasks.
    pub fn cancel_timers(&mut self) {
        self.countdown = None;
        self.schedule = None;
    }

    /// Install the round countdown, replacing (and aborting) any prior one.
    pub fn install_countdown(&mut self, timer: RoundTimer) {
        self.countdown = Some(timer);
    }

    /// Install the pending inter-round delay or retention timer.
    pub fn install_schedule(&mut self, timer: RoundTimer) {
        self.schedule = Some(timer);
    }

    /// Roster snapshot in join order.
    pub fn roster(&self) -> Vec<PlayerSummary> {
        self.players.iter().map(Player::summary).collect()
    }

    /// Players sorted by score descending; ties keep join order.
    pub fn leaderboard(&self) -> Vec<PlayerSummary> {
        let mut board = self.roster();
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board
    }

    /// Draw the next topic without replacement, reshuffling the pool once it
    /// is exhausted.
    fn draw_topic(&mut self) -> String {
        if self.topic_queue.is_empty() {
            self.topic_queue = self.topic_pool.clone();
            self.topic_queue.shuffle(&mut rand::rng());
        }
        self.topic_queue
            .pop()
            .unwrap_or_else(|| "كلمات".to_string())
    }
}
