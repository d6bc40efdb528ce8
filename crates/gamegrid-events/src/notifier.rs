//! EventNotifier — tagged subscriber set with non-blocking fan-out.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use gamegrid_state::{GameServer, Node, now_millis};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::message::{
    ADMIN_CHANNEL, ClientMessage, EventMessage, NodeStatusPayload, SERVERS_CHANNEL,
    ServerStatusPayload,
};

/// Outbound messages buffered per subscriber before it is considered slow.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub type SubscriberId = u64;

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<EventMessage>,
    user_id: Option<String>,
    channel: Option<String>,
}

/// A live subscription. Dropping the receiver unsubscribes on the next
/// broadcast.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<EventMessage>,
}

/// Fans status events out to connected subscribers.
///
/// Safe for concurrent subscribe/unsubscribe/broadcast from any task; the
/// subscriber map is sharded, so there is no global lock.
#[derive(Debug)]
pub struct EventNotifier {
    subscribers: DashMap<SubscriberId, Subscriber>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register an untagged subscriber. It receives only broadcast
    /// notifications until it subscribes to a channel.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.queue_capacity);
        self.subscribers.insert(
            id,
            Subscriber {
                tx,
                user_id: None,
                channel: None,
            },
        );
        debug!(subscriber = id, "subscriber added");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber removed");
        }
        removed
    }

    /// Set the channel and user tags of a subscriber. Returns false if the
    /// subscriber is gone.
    pub fn set_subscription(
        &self,
        id: SubscriberId,
        channel: impl Into<String>,
        user_id: Option<String>,
    ) -> bool {
        match self.subscribers.get_mut(&id) {
            Some(mut sub) => {
                sub.channel = Some(channel.into());
                sub.user_id = user_id;
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Apply an inbound client message and return the direct reply, if any.
    pub fn handle_client_message(
        &self,
        id: SubscriberId,
        msg: ClientMessage,
    ) -> Option<EventMessage> {
        match msg {
            ClientMessage::Subscribe { channel, user_id } => {
                if !self.set_subscription(id, channel.clone(), user_id.clone()) {
                    return None;
                }
                info!(subscriber = id, %channel, user_id = ?user_id, "subscription updated");
                Some(EventMessage::SubscriptionConfirmed {
                    channel,
                    user_id,
                    timestamp: now_millis(),
                })
            }
            ClientMessage::Ping => Some(EventMessage::Pong {
                timestamp: now_millis(),
            }),
        }
    }

    // ── Broadcasts ─────────────────────────────────────────────────

    /// Notify the owner of a server, on the `servers` channel only.
    pub fn broadcast_server_status(
        &self,
        server_id: &str,
        user_id: &str,
        status: ServerStatusPayload,
    ) -> usize {
        let msg = EventMessage::ServerStatusUpdate {
            server_id: server_id.to_string(),
            status,
            timestamp: now_millis(),
        };
        self.deliver(&msg, |sub| {
            sub.channel.as_deref() == Some(SERVERS_CHANNEL)
                && sub.user_id.as_deref() == Some(user_id)
        })
    }

    /// Convenience wrapper building the payload from a server row.
    pub fn server_changed(&self, server: &GameServer) -> usize {
        self.broadcast_server_status(
            &server.server_id,
            &server.user_id,
            ServerStatusPayload::from(server),
        )
    }

    /// Publish a node snapshot on the `admin` channel.
    pub fn broadcast_node_status(&self, node_id: &str, status: NodeStatusPayload) -> usize {
        let msg = EventMessage::NodeStatusUpdate {
            node_id: node_id.to_string(),
            status,
            timestamp: now_millis(),
        };
        self.deliver(&msg, |sub| sub.channel.as_deref() == Some(ADMIN_CHANNEL))
    }

    pub fn node_changed(&self, node: &Node) -> usize {
        self.broadcast_node_status(&node.node_id, NodeStatusPayload::from(node))
    }

    /// Send a notification to every subscriber regardless of tags.
    pub fn broadcast_notification(&self, notification_type: &str, message: &str) -> usize {
        let msg = EventMessage::Notification {
            notification_type: notification_type.to_string(),
            message: message.to_string(),
            timestamp: now_millis(),
        };
        self.deliver(&msg, |_| true)
    }

    /// Enqueue `msg` for every matching subscriber without waiting.
    ///
    /// Subscribers with a full or closed queue are removed after the pass.
    fn deliver<F>(&self, msg: &EventMessage, matches: F) -> usize
    where
        F: Fn(&Subscriber) -> bool,
    {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for entry in self.subscribers.iter() {
            if !matches(entry.value()) {
                continue;
            }
            match entry.value().tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = *entry.key(), "subscriber queue full");
                    dropped.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => dropped.push(*entry.key()),
            }
        }

        // Removal happens outside the iteration to avoid holding shard locks.
        for id in dropped {
            if self.subscribers.remove(&id).is_some() {
                info!(subscriber = id, "dropped unresponsive subscriber");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gamegrid_state::{NodeStatus, ServerStatus};

    use super::*;

    fn payload(status: &str) -> ServerStatusPayload {
        ServerStatusPayload {
            status: status.to_string(),
            server_name: "arena".to_string(),
            node_id: "node-1".to_string(),
            game_port: 30000,
            beacon_port: 30001,
            message: None,
        }
    }

    #[tokio::test]
    async fn server_updates_reach_only_the_owner_on_servers_channel() {
        let notifier = EventNotifier::new();
        let mut owner = notifier.subscribe();
        let mut other_user = notifier.subscribe();
        let mut admin = notifier.subscribe();
        let mut untagged = notifier.subscribe();

        notifier.set_subscription(owner.id, SERVERS_CHANNEL, Some("u1".to_string()));
        notifier.set_subscription(other_user.id, SERVERS_CHANNEL, Some("u2".to_string()));
        notifier.set_subscription(admin.id, ADMIN_CHANNEL, Some("u1".to_string()));

        let delivered = notifier.broadcast_server_status("srv-1", "u1", payload("RUNNING"));
        assert_eq!(delivered, 1);

        match owner.receiver.try_recv().unwrap() {
            EventMessage::ServerStatusUpdate { server_id, status, .. } => {
                assert_eq!(server_id, "srv-1");
                assert_eq!(status.status, "RUNNING");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(other_user.receiver.try_recv().is_err());
        assert!(admin.receiver.try_recv().is_err());
        assert!(untagged.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn node_updates_go_to_admin_channel() {
        let notifier = EventNotifier::new();
        let mut admin = notifier.subscribe();
        let mut user = notifier.subscribe();
        notifier.set_subscription(admin.id, ADMIN_CHANNEL, None);
        notifier.set_subscription(user.id, SERVERS_CHANNEL, Some("u1".to_string()));

        let mut node = Node::new("node-1", "h", "10.0.0.1", 4, 1000);
        node.status = NodeStatus::Offline;
        assert_eq!(notifier.node_changed(&node), 1);

        match admin.receiver.try_recv().unwrap() {
            EventMessage::NodeStatusUpdate { node_id, status, .. } => {
                assert_eq!(node_id, "node-1");
                assert_eq!(status.status, NodeStatus::Offline);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(user.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn notifications_reach_everyone() {
        let notifier = EventNotifier::new();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        notifier.set_subscription(a.id, ADMIN_CHANNEL, None);

        assert_eq!(notifier.broadcast_notification("info", "hello"), 2);
        assert!(matches!(
            a.receiver.try_recv().unwrap(),
            EventMessage::Notification { .. }
        ));
        assert!(matches!(
            b.receiver.try_recv().unwrap(),
            EventMessage::Notification { .. }
        ));
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber_without_blocking() {
        let notifier = EventNotifier::with_queue_capacity(2);
        let slow = notifier.subscribe();
        let mut fast = notifier.subscribe();

        assert_eq!(notifier.broadcast_notification("n", "1"), 2);
        fast.receiver.try_recv().unwrap();
        assert_eq!(notifier.broadcast_notification("n", "2"), 2);
        fast.receiver.try_recv().unwrap();

        // Third message overflows the slow subscriber's queue.
        assert_eq!(notifier.broadcast_notification("n", "3"), 1);
        assert_eq!(notifier.subscriber_count(), 1);
        assert!(fast.receiver.try_recv().is_ok());
        drop(slow);
    }

    #[tokio::test]
    async fn closed_receiver_is_removed() {
        let notifier = EventNotifier::new();
        let gone = notifier.subscribe();
        drop(gone.receiver);

        assert_eq!(notifier.broadcast_notification("n", "x"), 0);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn client_messages_produce_replies() {
        let notifier = EventNotifier::new();
        let sub = notifier.subscribe();

        let reply = notifier
            .handle_client_message(
                sub.id,
                ClientMessage::Subscribe {
                    channel: SERVERS_CHANNEL.to_string(),
                    user_id: Some("u1".to_string()),
                },
            )
            .unwrap();
        assert!(matches!(reply, EventMessage::SubscriptionConfirmed { .. }));

        let pong = notifier.handle_client_message(sub.id, ClientMessage::Ping);
        assert!(matches!(pong, Some(EventMessage::Pong { .. })));

        notifier.unsubscribe(sub.id);
        assert!(
            notifier
                .handle_client_message(
                    sub.id,
                    ClientMessage::Subscribe {
                        channel: ADMIN_CHANNEL.to_string(),
                        user_id: None,
                    },
                )
                .is_none()
        );
    }

    #[tokio::test]
    async fn server_changed_uses_row_status() {
        let notifier = EventNotifier::new();
        let mut sub = notifier.subscribe();
        notifier.set_subscription(sub.id, SERVERS_CHANNEL, Some("user-9".to_string()));

        let server = GameServer {
            server_id: "srv_user-9_abcd1234".to_string(),
            user_id: "user-9".to_string(),
            server_name: "arena".to_string(),
            status: ServerStatus::Stopping,
            node_id: "node-1".to_string(),
            game_port: 30000,
            beacon_port: 30001,
            ram_allocation: 4,
            cpu_allocation: 2,
            max_players: 8,
            password: None,
            container_id: None,
            status_message: None,
            created_at: 0,
            started_at: None,
            last_seen: None,
        };
        assert_eq!(notifier.server_changed(&server), 1);
        match sub.receiver.try_recv().unwrap() {
            EventMessage::ServerStatusUpdate { status, .. } => assert_eq!(status.status, "STOPPING"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_broadcast() {
        let notifier = Arc::new(EventNotifier::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let notifier = notifier.clone();
            tasks.push(tokio::spawn(async move {
                let sub = notifier.subscribe();
                notifier.broadcast_notification("tick", &i.to_string());
                notifier.unsubscribe(sub.id);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
