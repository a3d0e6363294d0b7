use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the session was accepted
    Ready { user_id: Uuid, username: String },

    /// A direct message was persisted. Sent to the receiver if connected,
    /// and echoed to the sender.
    MessageCreate {
        id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        receiver_id: Uuid,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A notification was recorded for this user
    NotificationCreate {
        id: Uuid,
        kind: String,
        payload: Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },

    /// The other side of a conversation started typing
    TypingStart { user_id: Uuid, username: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Send a direct message over the live channel
    MessageSend { receiver_id: Uuid, content: String },

    /// Indicate typing to a specific user
    StartTyping { receiver_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format_is_tagged() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"MessageSend","data":{"receiver_id":"00000000-0000-0000-0000-000000000001","content":"hi"}}"#,
        )
        .unwrap();

        match cmd {
            GatewayCommand::MessageSend { content, .. } => assert_eq!(content, "hi"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn event_round_trips() {
        let event = GatewayEvent::PresenceUpdate {
            user_id: Uuid::new_v4(),
            username: "ada".into(),
            online: true,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"PresenceUpdate""#));

        let back: GatewayEvent = serde_json::from_str(&json).unwrap();
        match back {
            GatewayEvent::PresenceUpdate { online, .. } => assert!(online),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
