//! WebSocket gateway: one task per client connection.
//!
//! Each socket gets a dedicated writer task so room broadcasts keep flowing
//! while we await inbound frames. Once a connection joins a room, a forwarder
//! task pipes that room's broadcast stream into the writer. Errors caused by
//! a command go back to the offending connection only, never to the room.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientCommand, ServerEvent},
    services::room_service,
    state::SharedState,
};

/// The room a connection has joined, plus the task forwarding that room's
/// events onto this connection's writer.
struct Membership {
    pin: String,
    player_name: String,
    forwarder: JoinHandle<()>,
}

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection = Uuid::new_v4();
    info!(%connection, "client connected");

    let mut membership: Option<Membership> = None;
    let mut created_pins: Vec<String> = Vec::new();

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match ClientCommand::from_json_str(&text) {
                    Ok(command) => {
                        handle_command(
                            &state,
                            connection,
                            command,
                            &outbound_tx,
                            &mut membership,
                            &mut created_pins,
                        )
                        .await;
                    }
                    Err(err) => {
                        warn!(%connection, error = %err, "rejected client command");
                        send_event(
                            &outbound_tx,
                            &ServerEvent::Error {
                                message: err.to_string(),
                            },
                        );
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Some(membership) = membership.take() {
        membership.forwarder.abort();
        room_service::handle_disconnect(
            &state,
            connection,
            &membership.pin,
            &membership.player_name,
        )
        .await;
    }
    // Host disconnect tears the room down even if the creator never joined
    // their own room; rooms this connection no longer hosts are left alone.
    for pin in &created_pins {
        room_service::handle_creator_disconnect(&state, connection, pin).await;
    }
    info!(%connection, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch one validated client command.
async fn handle_command(
    state: &SharedState,
    connection: Uuid,
    command: ClientCommand,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    membership: &mut Option<Membership>,
    created_pins: &mut Vec<String>,
) {
    match command {
        ClientCommand::CreateGame(payload) => {
            let pin = room_service::create_game(state, connection, payload);
            created_pins.push(pin.clone());
            send_event(outbound_tx, &ServerEvent::GameCreated { pin });
        }
        ClientCommand::JoinRoom(payload) => {
            if membership.is_some() {
                send_event(
                    outbound_tx,
                    &ServerEvent::JoinError {
                        message: "this connection already joined a room".into(),
                    },
                );
                return;
            }

            let pin = payload.pin.clone();
            let player_name = payload.player_name.clone();
            match room_service::join_room(state, connection, payload).await {
                Ok(events) => {
                    let forwarder = spawn_forwarder(events, outbound_tx.clone());
                    *membership = Some(Membership {
                        pin,
                        player_name,
                        forwarder,
                    });
                }
                Err(err) => {
                    warn!(%connection, pin = %pin, error = %err, "join refused");
                    send_event(
                        outbound_tx,
                        &ServerEvent::JoinError {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }
        ClientCommand::StartGame(payload) => {
            if let Err(err) = room_service::start_game(state, connection, payload).await {
                warn!(%connection, error = %err, "start refused");
                send_event(
                    outbound_tx,
                    &ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
            }
        }
        ClientCommand::SubmitGuess(payload) => {
            if let Err(err) = room_service::submit_guess(state, payload).await {
                warn!(%connection, error = %err, "guess refused");
                send_event(
                    outbound_tx,
                    &ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
            }
        }
    }
}

/// Pipe a room's broadcast stream into this connection's writer.
///
/// A lagged receiver skips to the live edge rather than tearing the
/// connection down; the next roster or timer event resynchronizes the client.
fn spawn_forwarder(
    mut events: broadcast::Receiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !send_event(&outbound_tx, &event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "slow websocket consumer skipped room events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Serialize an event and queue it on the connection's writer.
///
/// Returns `false` when the writer has shut down. A serialization failure is
/// a bug in the event type, not the connection; it is logged and swallowed.
fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> bool {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize server event");
            return true;
        }
    };
    tx.send(Message::Text(payload.into())).is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
