use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use gather_db::Database;
use gather_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::fanout;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket connection whose session cookie was already validated
/// at the HTTP upgrade layer, so there is no in-band handshake: the server
/// sends Ready and goes straight into the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Register per-user channel, replay current presence, then go online
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    let existing_users = dispatcher.online_users().await;
    for (uid, uname) in &existing_users {
        let event = GatewayEvent::PresenceUpdate {
            user_id: *uid,
            username: uname.clone(),
            online: true,
        };
        if sender
            .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
            .await
            .is_err()
        {
            return;
        }
    }

    // Now mark ourselves online (broadcasts to everyone else)
    dispatcher.user_online(user_id, username.clone()).await;

    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_clone = dispatcher.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events + presence broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let db_recv = db.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_clone, &db_recv, user_id, &username_recv, cmd)
                            .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            snippet(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::MessageSend {
            receiver_id,
            content,
        } => {
            let content = content.trim().to_string();
            if content.is_empty()
                || content.chars().count() > fanout::MAX_MESSAGE_LEN
                || receiver_id == user_id
            {
                warn!("{} ({}) dropped invalid message send", username, user_id);
                return;
            }

            if let Err(e) = fanout::persist_and_forward(
                dispatcher,
                db,
                user_id,
                username,
                receiver_id,
                content,
            )
            .await
            {
                warn!(
                    "{} ({}) message to {} failed: {}",
                    username, user_id, receiver_id, e
                );
            }
        }

        GatewayCommand::StartTyping { receiver_id } => {
            dispatcher
                .send_to_user(
                    receiver_id,
                    GatewayEvent::TypingStart {
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }
    }
}

/// Cap log output for unparseable frames without splitting a UTF-8 char.
const SNIPPET_LEN: usize = 200;

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_db::Database;

    fn seeded_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.create_user("11111111-1111-1111-1111-111111111111", "ada", "ada@example.com", "h", "t1")
            .unwrap();
        db.create_user("22222222-2222-2222-2222-222222222222", "bob", "bob@example.com", "h", "t2")
            .unwrap();
        Arc::new(db)
    }

    fn uid(s: &str) -> Uuid {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn oversized_message_send_is_dropped() {
        let db = seeded_db();
        let dispatcher = Dispatcher::new();
        let sender = uid("11111111-1111-1111-1111-111111111111");
        let receiver = uid("22222222-2222-2222-2222-222222222222");

        // One char past the limit never reaches the store
        handle_command(
            &dispatcher,
            &db,
            sender,
            "ada",
            GatewayCommand::MessageSend {
                receiver_id: receiver,
                content: "x".repeat(fanout::MAX_MESSAGE_LEN + 1),
            },
        )
        .await;
        assert!(
            db.get_conversation(&sender.to_string(), &receiver.to_string(), 10, None)
                .unwrap()
                .is_empty()
        );

        // Exactly at the limit goes through
        handle_command(
            &dispatcher,
            &db,
            sender,
            "ada",
            GatewayCommand::MessageSend {
                receiver_id: receiver,
                content: "x".repeat(fanout::MAX_MESSAGE_LEN),
            },
        )
        .await;
        assert_eq!(
            db.get_conversation(&sender.to_string(), &receiver.to_string(), 10, None)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn self_addressed_and_blank_sends_are_dropped() {
        let db = seeded_db();
        let dispatcher = Dispatcher::new();
        let sender = uid("11111111-1111-1111-1111-111111111111");
        let receiver = uid("22222222-2222-2222-2222-222222222222");

        handle_command(
            &dispatcher,
            &db,
            sender,
            "ada",
            GatewayCommand::MessageSend {
                receiver_id: sender,
                content: "talking to myself".into(),
            },
        )
        .await;
        handle_command(
            &dispatcher,
            &db,
            sender,
            "ada",
            GatewayCommand::MessageSend {
                receiver_id: receiver,
                content: "   ".into(),
            },
        )
        .await;

        assert!(
            db.get_conversation(&sender.to_string(), &receiver.to_string(), 10, None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        // 2-byte chars put a boundary in the middle of byte 200
        let long: String = "ü".repeat(300);
        assert_eq!(snippet(&long).chars().count(), SNIPPET_LEN);

        assert_eq!(snippet("short frame"), "short frame");
    }
}
