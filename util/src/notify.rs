//! A thread-safe, topic-based notification sink for integrity events.
//!
//! Uses Tokio broadcast channels per topic. Delivery is best-effort: a topic
//! with no subscribers simply drops the message, and send failures never
//! propagate to the caller. The attendance decision path must never block or
//! fail because a flag could not be delivered.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Type alias for topic name.
type Topic = String;

/// Sender for a topic's broadcast channel.
type Sender = broadcast::Sender<String>;

/// Receiver for a topic's broadcast channel.
type Receiver = broadcast::Receiver<String>;

/// Manages broadcast channels per topic.
///
/// - Lazily creates broadcast channels per topic on first subscription
/// - Removes topics when their subscriber count drops to zero after sending
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<RwLock<HashMap<Topic, Sender>>>,
}

impl Notifier {
    /// Creates a new, empty `Notifier`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the given topic, creating it if necessary.
    pub async fn subscribe(&self, topic: &str) -> Receiver {
        let mut map = self.inner.write().await;
        map.entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    /// Broadcasts a message to all subscribers of `topic`.
    ///
    /// If the topic does not exist, it's a no-op.
    /// If the topic has zero subscribers after sending, it is removed.
    pub async fn broadcast<T: Into<String>>(&self, topic: &str, msg: T) {
        let mut map = self.inner.write().await;
        if let Some(sender) = map.get(topic) {
            if sender.send(msg.into()).is_err() {
                tracing::debug!("No live subscribers on topic '{topic}'; message dropped");
            }
            if sender.receiver_count() == 0 {
                map.remove(topic);
            }
        }
    }
}
