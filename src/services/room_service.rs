//! Room lifecycle operations: create, join, start, guess, disconnect, and
//! the timer-driven round progression.
//!
//! Every operation resolves the target room through the registry, locks that
//! room's mutex, mutates state and broadcasts the resulting events while the
//! lock is held. Timer and delay callbacks capture the round epoch at
//! scheduling time and re-check phase and epoch under the lock, so a late
//! callback can never resolve a superseded round or touch a deleted room.

use tokio::sync::{MutexGuard, broadcast};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        game::{GameEndReason, RoomSummary},
        ws::{CreateGamePayload, JoinRoomPayload, ServerEvent, StartGamePayload,
            SubmitGuessPayload},
    },
    error::ServiceError,
    state::{
        SharedState,
        room::{Room, RoomPhase, RoomSettings},
        timer::RoundTimer,
    },
};

/// Create a room owned by the calling connection and return its PIN.
pub fn create_game(state: &SharedState, connection: Uuid, payload: CreateGamePayload) -> String {
    let topic_pool = state.config().topics_for(&payload.language);
    let settings = RoomSettings {
        max_rounds: payload.max_rounds,
        round_seconds: payload.round_seconds,
        language: payload.language,
    };

    let (pin, _room) = state.registry().create_room(settings, topic_pool, connection);
    info!(%pin, %connection, "room created");
    pin
}

/// Join (or rejoin) a room, returning the event stream for the connection.
///
/// The subscription is taken before the roster broadcast so the joining
/// client observes its own `player-joined` snapshot.
pub async fn join_room(
    state: &SharedState,
    connection: Uuid,
    payload: JoinRoomPayload,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let room = state
        .registry()
        .get(&payload.pin)
        .ok_or_else(|| ServiceError::RoomNotFound(payload.pin.clone()))?;
    let mut room = room.lock().await;

    let receiver = room.subscribe();
    let roster = room.join(connection, &payload.player_name, payload.role, payload.avatar)?;
    info!(pin = %payload.pin, player = %payload.player_name, "player joined");
    room.broadcast(ServerEvent::PlayerJoined { players: roster });

    Ok(receiver)
}

/// Read-only snapshot of a room for the REST surface.
pub async fn room_summary(state: &SharedState, pin: &str) -> Result<RoomSummary, ServiceError> {
    let room = state
        .registry()
        .get(pin)
        .ok_or_else(|| ServiceError::RoomNotFound(pin.to_string()))?;
    let room = room.lock().await;

    Ok(RoomSummary {
        pin: room.pin().to_string(),
        phase: room.phase().as_str().to_string(),
        players: room.roster(),
        topic: room.topic().map(str::to_string),
        current_round: room.current_round(),
        max_rounds: room.max_rounds(),
    })
}

/// Begin round one. Host-only; enforces the configured player minimum.
pub async fn start_game(
    state: &SharedState,
    connection: Uuid,
    payload: StartGamePayload,
) -> Result<(), ServiceError> {
    let room = state
        .registry()
        .get(&payload.pin)
        .ok_or_else(|| ServiceError::RoomNotFound(payload.pin.clone()))?;
    let mut room = room.lock().await;

    if room.host_connection() != connection {
        return Err(ServiceError::Unauthorized(
            "only the host can start the game".into(),
        ));
    }
    if room.phase() != RoomPhase::Waiting {
        return Err(ServiceError::InvalidState(
            "the game has already started".into(),
        ));
    }
    let required = state.config().min_players();
    if room.player_count() < required {
        return Err(ServiceError::NotEnoughPlayers {
            current: room.player_count(),
            required,
        });
    }

    begin_round(state, &mut room)
}

/// Record a guess and broadcast the guesses-so-far snapshot; resolves the
/// round early once every current player has submitted.
pub async fn submit_guess(
    state: &SharedState,
    payload: SubmitGuessPayload,
) -> Result<(), ServiceError> {
    let room = state
        .registry()
        .get(&payload.pin)
        .ok_or_else(|| ServiceError::RoomNotFound(payload.pin.clone()))?;
    let mut room = room.lock().await;

    room.record_guess(&payload.player_name, &payload.guess)?;

    let (guesses, submitted, total) = room.guess_progress();
    room.broadcast(ServerEvent::GuessesUpdated {
        guesses,
        submitted,
        total,
    });

    if room.all_submitted() {
        finish_round(state, &mut room)?;
    }

    Ok(())
}

/// React to a closed connection.
///
/// A departing host tears the room down unconditionally; a departing player
/// is removed from the roster (and from the all-submitted denominator, which
/// may resolve the round early).
pub async fn handle_disconnect(
    state: &SharedState,
    connection: Uuid,
    pin: &str,
    player_name: &str,
) {
    let Some(room) = state.registry().get(pin) else {
        return;
    };
    let mut room = room.lock().await;

    if room.host_connection() == connection {
        tear_down_room(state, room, pin);
        return;
    }

    let roster = room.remove_player(player_name);
    info!(%pin, player = %player_name, "player left");
    room.broadcast(ServerEvent::PlayerLeft { players: roster });

    if room.phase() == RoomPhase::Playing {
        // Keep the submitted/total counts honest for the remaining players.
        let (guesses, submitted, total) = room.guess_progress();
        room.broadcast(ServerEvent::GuessesUpdated {
            guesses,
            submitted,
            total,
        });

        // A round should never wait on a guess from a player who is gone.
        if room.all_submitted() {
            if let Err(err) = finish_round(state, &mut room) {
                warn!(%pin, error = %err, "failed to resolve round after departure");
            }
        }
    }
}

/// Tear down a room created by a departing connection, if that connection
/// still holds host authority.
///
/// Covers the host who closed without ever joining their fresh room; for a
/// host the disconnect handling already removed, the lookup is a miss and
/// this is a no-op.
pub async fn handle_creator_disconnect(state: &SharedState, connection: Uuid, pin: &str) {
    let Some(room) = state.registry().get(pin) else {
        return;
    };
    let room = room.lock().await;

    // Host authority may have been reclaimed by a reconnected host; the room
    // no longer belongs to this connection then.
    if room.host_connection() != connection {
        return;
    }

    tear_down_room(state, room, pin);
}

/// Unconditional host teardown: publish the final standings and free the PIN.
fn tear_down_room(state: &SharedState, mut room: MutexGuard<'_, Room>, pin: &str) {
    let leaderboard = match room.end_game() {
        Ok(board) => board,
        // Already ended; tear down with the standings as they are.
        Err(_) => room.leaderboard(),
    };
    room.broadcast(ServerEvent::GameEnded {
        reason: GameEndReason::HostDisconnected,
        leaderboard,
    });
    drop(room);
    state.registry().remove(pin);
    info!(%pin, "room torn down after host disconnect");
}

/// Advance the room into its next round and arm the countdown.
fn begin_round(state: &SharedState, room: &mut Room) -> Result<(), ServiceError> {
    let start = room.begin_round()?;
    let event = if start.round == 1 {
        ServerEvent::GameStarted(start.clone())
    } else {
        ServerEvent::NewRound(start.clone())
    };
    room.broadcast(event);

    let events = room.event_sender();
    let epoch = room.round_epoch();
    let pin = room.pin().to_string();
    let state = state.clone();
    let timer = RoundTimer::start(
        start.seconds,
        move |seconds| {
            let _ = events.send(ServerEvent::TimerUpdate { seconds });
        },
        move || {
            tokio::spawn(resolve_expired_round(state, pin, epoch));
        },
    );
    room.install_countdown(timer);

    Ok(())
}

/// Score the current round, publish the results, and schedule what follows:
/// the next round after the configured delay, or the end of the game.
fn finish_round(state: &SharedState, room: &mut Room) -> Result<(), ServiceError> {
    let result = room.resolve_round()?;
    room.broadcast(ServerEvent::RoundCompleted(result));

    let pin = room.pin().to_string();
    let epoch = room.round_epoch();

    if room.current_round() >= room.max_rounds() {
        let leaderboard = room.end_game()?;
        info!(%pin, "game completed");
        room.broadcast(ServerEvent::GameEnded {
            reason: GameEndReason::Completed,
            leaderboard,
        });

        // Keep the ended room joinable for a rematch before freeing the PIN.
        let state = state.clone();
        let retention = state.config().ended_room_retention();
        room.install_schedule(RoundTimer::after(retention, move || {
            tokio::spawn(reap_ended_room(state, pin, epoch));
        }));
    } else {
        let state = state.clone();
        let delay = state.config().round_advance_delay();
        room.install_schedule(RoundTimer::after(delay, move || {
            tokio::spawn(advance_round(state, pin, epoch));
        }));
    }

    Ok(())
}

/// Countdown expiry callback for a specific round of a specific room.
async fn resolve_expired_round(state: SharedState, pin: String, epoch: u64) {
    let Some(room) = state.registry().get(&pin) else {
        return;
    };
    let mut room = room.lock().await;

    // Stale expiry: the round was already resolved or the room moved on.
    if room.phase() != RoomPhase::Playing || room.round_epoch() != epoch {
        return;
    }

    if let Err(err) = finish_round(&state, &mut room) {
        warn!(%pin, error = %err, "failed to resolve round on timer expiry");
    }
}

/// Inter-round delay callback.
async fn advance_round(state: SharedState, pin: String, epoch: u64) {
    let Some(room) = state.registry().get(&pin) else {
        return;
    };
    let mut room = room.lock().await;

    if room.phase() != RoomPhase::RoundResults || room.round_epoch() != epoch {
        return;
    }

    if let Err(err) = begin_round(&state, &mut room) {
        warn!(%pin, error = %err, "failed to start next round");
    }
}

/// Retention expiry: free the PIN of an ended room nobody rematched.
async fn reap_ended_room(state: SharedState, pin: String, epoch: u64) {
    let Some(room) = state.registry().get(&pin) else {
        return;
    };
    {
        let room = room.lock().await;
        if room.phase() != RoomPhase::Ended || room.round_epoch() != epoch {
            return;
        }
    }
    state.registry().remove(&pin);
    info!(%pin, "ended room reaped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{config::AppConfig, dto::ws::PlayerRole, state::AppState};

    fn test_state() -> SharedState {
        AppState::new(AppConfig::default())
    }

    fn create_payload(max_rounds: u32, round_seconds: u32) -> CreateGamePayload {
        CreateGamePayload {
            max_rounds,
            round_seconds,
            language: "en".into(),
        }
    }

    fn join_payload(pin: &str, name: &str, role: PlayerRole) -> JoinRoomPayload {
        JoinRoomPayload {
            pin: pin.to_string(),
            player_name: name.to_string(),
            role,
            avatar: Value::Null,
        }
    }

    fn guess_payload(pin: &str, name: &str, guess: &str) -> SubmitGuessPayload {
        SubmitGuessPayload {
            pin: pin.to_string(),
            player_name: name.to_string(),
            guess: guess.to_string(),
        }
    }

    /// Drain everything currently buffered on a subscription.
    fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    panic!("test receiver lagged by {skipped} events")
                }
                Err(_) => return events,
            }
        }
    }

    async fn setup_started_game(
        state: &SharedState,
        max_rounds: u32,
        round_seconds: u32,
        players: &[&str],
    ) -> (String, Uuid, broadcast::Receiver<ServerEvent>) {
        let host = Uuid::new_v4();
        let pin = create_game(state, host, create_payload(max_rounds, round_seconds));

        let mut receiver = None;
        for (index, name) in players.iter().enumerate() {
            let role = if index == 0 {
                PlayerRole::Host
            } else {
                PlayerRole::Player
            };
            let rx = join_room(state, if index == 0 { host } else { Uuid::new_v4() },
                join_payload(&pin, name, role))
            .await
            .unwrap();
            if receiver.is_none() {
                receiver = Some(rx);
            }
        }

        start_game(state, host, StartGamePayload { pin: pin.clone() })
            .await
            .unwrap();

        (pin, host, receiver.unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn all_submitted_resolves_the_round_before_the_timer() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 1, 30, &["p1", "p2"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p2", "cat")).await.unwrap();

        let events = drain(&mut rx);
        let completed = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::RoundCompleted(_)))
            .count();
        assert_eq!(completed, 1, "round did not resolve early");
        assert!(events.iter().any(|e| matches!(e, ServerEvent::GameEnded { .. })));

        // The cancelled countdown must never fire a second resolution.
        tokio::time::sleep(Duration::from_secs(40)).await;
        let later = drain(&mut rx);
        assert!(
            !later.iter().any(|e| matches!(e, ServerEvent::RoundCompleted(_))),
            "stale timer resolved the round again"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expiry_resolves_a_round_without_guesses() {
        let state = test_state();
        let (_pin, _host, mut rx) =
            setup_started_game(&state, 1, 3, &["p1", "p2"]).await;

        tokio::time::sleep(Duration::from_secs(5)).await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::RoundCompleted(_))));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::GameEnded { reason: GameEndReason::Completed, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn three_round_game_emits_exactly_three_round_completions() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 3, 30, &["p1", "p2"]).await;

        let mut completed = 0;
        let mut ended = 0;
        let mut round_starts = 1; // game-started for round one
        for _ in 0..3 {
            submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
            submit_guess(&state, guess_payload(&pin, "p2", "cat")).await.unwrap();
            // Cross the 5 s inter-round delay (or the retention no-op).
            tokio::time::sleep(Duration::from_secs(6)).await;

            for event in drain(&mut rx) {
                match event {
                    ServerEvent::RoundCompleted(_) => completed += 1,
                    ServerEvent::GameEnded { reason, .. } => {
                        assert_eq!(reason, GameEndReason::Completed);
                        ended += 1;
                    }
                    ServerEvent::NewRound(_) => round_starts += 1,
                    _ => {}
                }
            }
        }

        assert_eq!(completed, 3);
        assert_eq!(ended, 1);
        assert_eq!(round_starts, 3, "a fourth round must never start");
    }

    #[tokio::test(start_paused = true)]
    async fn final_leaderboard_reflects_scaled_group_awards() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 1, 30, &["p1", "p2", "p3"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p2", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p3", "dog")).await.unwrap();

        let events = drain(&mut rx);
        let leaderboard = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::GameEnded { leaderboard, .. } => Some(leaderboard.clone()),
                _ => None,
            })
            .expect("game should have ended");

        let standings: Vec<_> = leaderboard
            .iter()
            .map(|p| (p.name.as_str(), p.score))
            .collect();
        assert_eq!(standings, vec![("p1", 200), ("p2", 200), ("p3", 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn host_disconnect_tears_the_room_down_mid_round() {
        let state = test_state();
        let (pin, host, mut rx) =
            setup_started_game(&state, 3, 60, &["p1", "p2"]).await;
        drain(&mut rx);

        handle_disconnect(&state, host, &pin, "p1").await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::GameEnded { reason: GameEndReason::HostDisconnected, .. }
        )));

        // The PIN is freed; a rejoin sees a missing room.
        let err = join_room(&state, Uuid::new_v4(), join_payload(&pin, "p2", PlayerRole::Player))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));

        // The cancelled countdown never fires against the deleted room.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(state.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn guess_before_start_is_rejected_without_side_effects() {
        let state = test_state();
        let host = Uuid::new_v4();
        let pin = create_game(&state, host, create_payload(1, 30));
        let mut rx = join_room(&state, host, join_payload(&pin, "p1", PlayerRole::Host))
            .await
            .unwrap();
        join_room(&state, Uuid::new_v4(), join_payload(&pin, "p2", PlayerRole::Player))
            .await
            .unwrap();
        drain(&mut rx);

        let err = submit_guess(&state, guess_payload(&pin, "p1", "early"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        // No guesses-updated snapshot reached the room.
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_host_cannot_start_the_game() {
        let state = test_state();
        let host = Uuid::new_v4();
        let imposter = Uuid::new_v4();
        let pin = create_game(&state, host, create_payload(1, 30));
        join_room(&state, host, join_payload(&pin, "p1", PlayerRole::Host))
            .await
            .unwrap();
        join_room(&state, imposter, join_payload(&pin, "p2", PlayerRole::Player))
            .await
            .unwrap();

        let err = start_game(&state, imposter, StartGamePayload { pin: pin.clone() })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        // The room stayed in the lobby; the real host can still start.
        start_game(&state, host, StartGamePayload { pin }).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_below_player_minimum_is_rejected() {
        let state = test_state();
        let host = Uuid::new_v4();
        let pin = create_game(&state, host, create_payload(1, 30));
        join_room(&state, host, join_payload(&pin, "p1", PlayerRole::Host))
            .await
            .unwrap();

        let err = start_game(&state, host, StartGamePayload { pin })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotEnoughPlayers { current: 1, required: 2 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn creator_disconnect_before_joining_frees_the_room() {
        let state = test_state();
        let host = Uuid::new_v4();
        let pin = create_game(&state, host, create_payload(3, 60));
        assert!(state.registry().validate_pin(&pin));

        // The creator's socket closes without ever sending join-room.
        handle_creator_disconnect(&state, host, &pin).await;

        assert!(!state.registry().validate_pin(&pin));
        let err = join_room(&state, Uuid::new_v4(), join_payload(&pin, "p1", PlayerRole::Player))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn creator_disconnect_spares_a_room_with_a_new_host() {
        let state = test_state();
        let creator = Uuid::new_v4();
        let pin = create_game(&state, creator, create_payload(3, 60));

        // Another connection reclaims host authority before the creator goes.
        let new_host = Uuid::new_v4();
        join_room(&state, new_host, join_payload(&pin, "p1", PlayerRole::Host))
            .await
            .unwrap();

        handle_creator_disconnect(&state, creator, &pin).await;
        assert!(state.registry().validate_pin(&pin));
    }

    #[tokio::test(start_paused = true)]
    async fn departure_refreshes_the_guess_counts() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 1, 60, &["p1", "p2", "p3"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();

        // p3 leaves without submitting; p2 is still pending.
        handle_disconnect(&state, Uuid::new_v4(), &pin, "p3").await;

        let events = drain(&mut rx);
        assert!(
            events.iter().any(|e| matches!(
                e,
                ServerEvent::GuessesUpdated { submitted: 1, total: 2, .. }
            )),
            "departure did not refresh the snapshot"
        );
        assert!(!events.iter().any(|e| matches!(e, ServerEvent::RoundCompleted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn departing_player_is_dropped_from_the_denominator() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 1, 60, &["p1", "p2", "p3"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p2", "cat")).await.unwrap();

        // p3 never submits and disconnects; the round must resolve now.
        handle_disconnect(&state, Uuid::new_v4(), &pin, "p3").await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::PlayerLeft { .. })));
        assert!(events.iter().any(|e| matches!(e, ServerEvent::RoundCompleted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn ended_room_is_reaped_after_the_retention_window() {
        let state = test_state();
        let (pin, _host, mut rx) =
            setup_started_game(&state, 1, 30, &["p1", "p2"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p2", "dog")).await.unwrap();

        assert!(state.registry().validate_pin(&pin));
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(!state.registry().validate_pin(&pin));
    }

    #[tokio::test(start_paused = true)]
    async fn rematch_join_resets_an_ended_room() {
        let state = test_state();
        let (pin, host, mut rx) =
            setup_started_game(&state, 1, 30, &["p1", "p2"]).await;
        drain(&mut rx);

        submit_guess(&state, guess_payload(&pin, "p1", "cat")).await.unwrap();
        submit_guess(&state, guess_payload(&pin, "p2", "cat")).await.unwrap();
        drain(&mut rx);

        // Rejoin within the retention window resets the lobby.
        join_room(&state, host, join_payload(&pin, "p1", PlayerRole::Host))
            .await
            .unwrap();

        let room = state.registry().get(&pin).unwrap();
        let room = room.lock().await;
        assert_eq!(room.phase(), RoomPhase::Waiting);
        assert_eq!(room.current_round(), 0);
        assert!(room.roster().iter().all(|p| p.score == 0));
    }
}
