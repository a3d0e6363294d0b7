use std::sync::Arc;

use anyhow::Result;
use tracing::error;
use uuid::Uuid;

use gather_db::Database;
use gather_db::models::{MessageRow, NotificationRow, parse_timestamp};
use gather_types::events::GatewayEvent;

use crate::dispatcher::Dispatcher;

/// Notification payloads keep a short preview instead of the full message.
const PREVIEW_LEN: usize = 80;

/// Upper bound on direct message content, enforced on both the HTTP and the
/// socket path before anything is persisted.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// The delivery rule for direct messages: persist the message and a
/// notification for the receiver, then forward both to the receiver's live
/// connection if one exists and echo the message back to the sender.
///
/// Forwarding is best effort — an offline receiver still gets the rows.
pub async fn persist_and_forward(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    sender_id: Uuid,
    sender_username: &str,
    receiver_id: Uuid,
    content: String,
) -> Result<MessageRow> {
    let message_id = Uuid::new_v4();
    let notification_id = Uuid::new_v4();

    // Run blocking DB inserts off the async runtime
    let db = db.clone();
    let sender_name = sender_username.to_string();
    let (message, notification) = tokio::task::spawn_blocking(move || {
        let message = db.create_message(
            &message_id.to_string(),
            &sender_id.to_string(),
            &sender_name,
            &receiver_id.to_string(),
            &content,
        )?;

        let payload = serde_json::json!({
            "message_id": message.id,
            "sender_id": message.sender_id,
            "sender_username": message.sender_username,
            "preview": preview(&message.content),
        });

        let notification = db.create_notification(
            &notification_id.to_string(),
            &receiver_id.to_string(),
            "message",
            &payload.to_string(),
        )?;

        Ok::<_, anyhow::Error>((message, notification))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let event = message_event(&message);
    dispatcher.send_to_user(receiver_id, event.clone()).await;
    dispatcher
        .send_to_user(receiver_id, notification_event(&notification))
        .await;
    dispatcher.send_to_user(sender_id, event).await;

    Ok(message)
}

fn message_event(row: &MessageRow) -> GatewayEvent {
    GatewayEvent::MessageCreate {
        id: row.id.parse().unwrap_or_default(),
        sender_id: row.sender_id.parse().unwrap_or_default(),
        sender_username: row.sender_username.clone(),
        receiver_id: row.receiver_id.parse().unwrap_or_default(),
        content: row.content.clone(),
        timestamp: parse_timestamp(&row.created_at),
    }
}

fn notification_event(row: &NotificationRow) -> GatewayEvent {
    let payload = serde_json::from_str(&row.payload).unwrap_or_else(|e| {
        error!("Corrupt notification payload '{}': {}", row.id, e);
        serde_json::Value::Null
    });

    GatewayEvent::NotificationCreate {
        id: row.id.parse().unwrap_or_default(),
        kind: row.kind.clone(),
        payload,
        timestamp: parse_timestamp(&row.created_at),
    }
}

fn preview(content: &str) -> &str {
    match content.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => &content[..idx],
        None => content,
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
    async fn persists_and_forwards_to_connected_receiver() {
        let db = seeded_db();
        let dispatcher = Dispatcher::new();
        let sender = uid("11111111-1111-1111-1111-111111111111");
        let receiver = uid("22222222-2222-2222-2222-222222222222");

        let (_conn, mut rx) = dispatcher.register_user_channel(receiver).await;

        let row = persist_and_forward(&dispatcher, &db, sender, "ada", receiver, "hi bob".into())
            .await
            .unwrap();
        assert_eq!(row.sender_username, "ada");

        // Receiver sees the message, then the notification
        match rx.recv().await.unwrap() {
            GatewayEvent::MessageCreate { content, .. } => assert_eq!(content, "hi bob"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            GatewayEvent::NotificationCreate { kind, payload, .. } => {
                assert_eq!(kind, "message");
                assert_eq!(payload["preview"], "hi bob");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Both rows were persisted
        let convo = db
            .get_conversation(&sender.to_string(), &receiver.to_string(), 10, None)
            .unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(
            db.list_notifications(&receiver.to_string(), true, 10)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_rows() {
        let db = seeded_db();
        let dispatcher = Dispatcher::new();
        let sender = uid("11111111-1111-1111-1111-111111111111");
        let receiver = uid("22222222-2222-2222-2222-222222222222");

        persist_and_forward(&dispatcher, &db, sender, "ada", receiver, "you there?".into())
            .await
            .unwrap();

        assert_eq!(
            db.get_conversation(&sender.to_string(), &receiver.to_string(), 10, None)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let long: String = "ü".repeat(120);
        assert_eq!(preview(&long).chars().count(), PREVIEW_LEN);
        assert_eq!(preview("short"), "short");
    }
}
