use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use gather_types::events::GatewayEvent;

/// Manages all connected clients. Targeted events go through per-user
/// channels; presence updates go through the broadcast channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for presence events — all connected clients receive them
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender).
    /// At most one live entry per user; a newer connection takes over.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Best effort — if the user has
    /// no live connection the event is dropped.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    /// Register a user as online.
    pub async fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, username.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Only clean up if this connection still owns the user channel
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels
                .get(&user_id)
                .map_or(false, |(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over — don't touch anything
            return;
        }

        let username = self
            .inner
            .online_users
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();

        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: false,
        });
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::TypingStart {
            user_id,
            username: "ada".into(),
        }
    }

    #[tokio::test]
    async fn targeted_send_reaches_registered_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_conn, mut rx) = dispatcher.register_user_channel(user).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.send_to_user(user, typing(user)).await;
        assert!(matches!(
            rx.recv().await,
            Some(GatewayEvent::TypingStart { .. })
        ));
    }

    #[tokio::test]
    async fn send_to_offline_user_is_dropped() {
        let dispatcher = Dispatcher::new();
        // No registration — should just be a no-op
        dispatcher.send_to_user(Uuid::new_v4(), typing(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn newer_connection_takes_over() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, mut old_rx) = dispatcher.register_user_channel(user).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        // Stale disconnect must not evict the new connection
        dispatcher.user_offline(user, old_conn).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.send_to_user(user, typing(user)).await;
        assert!(new_rx.recv().await.is_some());
        // Old channel was replaced in the registry, nothing queued for it
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_cleans_registry_and_broadcasts_presence() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let mut events = dispatcher.subscribe();

        let (conn, _rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user, "ada".into()).await;

        match events.recv().await.unwrap() {
            GatewayEvent::PresenceUpdate { online, .. } => assert!(online),
            other => panic!("unexpected event: {:?}", other),
        }

        dispatcher.user_offline(user, conn).await;
        assert!(!dispatcher.is_online(user).await);
        assert!(dispatcher.online_users().await.is_empty());

        match events.recv().await.unwrap() {
            GatewayEvent::PresenceUpdate { online, .. } => assert!(!online),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
