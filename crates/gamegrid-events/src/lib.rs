//! gamegrid-events — push notifications for server and node state changes.
//!
//! The [`EventNotifier`] keeps a concurrent set of subscribers, each with
//! a bounded outbound queue and optional `user_id`/`channel` tags, and fans
//! out [`EventMessage`]s according to those tags. Delivery never blocks the
//! caller: a subscriber whose queue is full or closed is dropped.

pub mod message;
pub mod notifier;

pub use message::{
    ADMIN_CHANNEL, ClientMessage, DELETED_STATUS, EventMessage, NodeStatusPayload, SERVERS_CHANNEL,
    ServerStatusPayload,
};
pub use notifier::{DEFAULT_QUEUE_CAPACITY, EventNotifier, SubscriberId, Subscription};
