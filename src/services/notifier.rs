//! Per-project broadcast groups.
//!
//! Every project with at least one live connection has a
//! `tokio::sync::broadcast` channel. REST mutations publish into it, socket
//! connections subscribe to it. Delivery is whatever the broadcast channel
//! gives: every subscriber present at send time sees the event, slow
//! subscribers may lag and skip events, and nothing is persisted.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default per-group buffer before slow connections start lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// Which mutation produced a `bug_update`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugEvent {
    BugCreated,
    BugUpdated,
}

/// Messages delivered to connected clients, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    BugUpdate {
        event_type: BugEvent,
        bug_id: i64,
        data: serde_json::Value,
    },
    CommentAdded {
        bug_id: i64,
        data: serde_json::Value,
    },
    TypingIndicator {
        user: String,
        bug_id: i64,
        is_typing: bool,
    },
    ActivityUpdate {
        data: serde_json::Value,
    },
}

/// Messages a client may send over its socket.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Typing {
        bug_id: i64,
        #[serde(default)]
        is_typing: bool,
    },
}

/// A message plus the connection that produced it, if any.
#[derive(Clone, Debug)]
struct Envelope {
    origin: Option<Uuid>,
    message: OutboundMessage,
}

/// Registry of project groups.
#[derive(Clone)]
pub struct Notifier {
    groups: Arc<Mutex<HashMap<i64, broadcast::Sender<Envelope>>>>,
    capacity: usize,
}

/// One connection's membership in a project group.
pub struct Subscription {
    pub project_id: i64,
    pub connection_id: Uuid,
    receiver: broadcast::Receiver<Envelope>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn group_name(project_id: i64) -> String {
        format!("project_{}", project_id)
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<i64, broadcast::Sender<Envelope>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the project's group, creating it on first use.
    pub fn join(&self, project_id: i64) -> Subscription {
        let receiver = self
            .groups()
            .entry(project_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        let connection_id = Uuid::new_v4();
        debug!(
            "connection {} joined {}",
            connection_id,
            Self::group_name(project_id)
        );
        Subscription {
            project_id,
            connection_id,
            receiver,
        }
    }

    /// Leave the group; the group is dropped once nobody is left in it.
    pub fn leave(&self, subscription: Subscription) {
        let Subscription {
            project_id,
            connection_id,
            receiver,
        } = subscription;
        drop(receiver);

        let mut groups = self.groups();
        if groups
            .get(&project_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            groups.remove(&project_id);
        }
        debug!(
            "connection {} left {}",
            connection_id,
            Self::group_name(project_id)
        );
    }

    /// Deliver `message` to every connection in the group.
    /// Returns how many connections it reached.
    pub fn publish(&self, project_id: i64, message: OutboundMessage) -> usize {
        self.send(
            project_id,
            Envelope {
                origin: None,
                message,
            },
        )
    }

    /// Deliver `message` to every connection in the group except `origin`.
    pub fn relay(&self, project_id: i64, origin: Uuid, message: OutboundMessage) -> usize {
        self.send(
            project_id,
            Envelope {
                origin: Some(origin),
                message,
            },
        )
    }

    /// Live connections in the project's group.
    pub fn group_size(&self, project_id: i64) -> usize {
        self.groups()
            .get(&project_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn send(&self, project_id: i64, envelope: Envelope) -> usize {
        match self.groups().get(&project_id) {
            // Err only means every receiver is gone.
            Some(sender) => sender.send(envelope).unwrap_or(0),
            None => 0,
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Subscription {
    /// Next message addressed to this connection, skipping its own relays.
    ///
    /// Returns `None` once the group's sender is gone. Cancel-safe.
    pub async fn next_message(&mut self) -> Option<OutboundMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == Some(self.connection_id) => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "connection {} lagged behind {}, skipped {} events",
                        self.connection_id,
                        Notifier::group_name(self.project_id),
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn activity(n: i64) -> OutboundMessage {
        OutboundMessage::ActivityUpdate {
            data: serde_json::json!({ "id": n }),
        }
    }

    #[test]
    fn outbound_messages_use_wire_shape() {
        let msg = OutboundMessage::BugUpdate {
            event_type: BugEvent::BugCreated,
            bug_id: 3,
            data: serde_json::json!({"title": "Login fails"}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "bug_update");
        assert_eq!(json["event_type"], "bug_created");
        assert_eq!(json["bug_id"], 3);
        assert_eq!(json["data"]["title"], "Login fails");

        let typing = OutboundMessage::TypingIndicator {
            user: "alice".into(),
            bug_id: 9,
            is_typing: true,
        };
        let json = serde_json::to_value(&typing).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "typing_indicator", "user": "alice", "bug_id": 9, "is_typing": true})
        );
    }

    #[test]
    fn inbound_typing_parses_and_defaults() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"typing","bug_id":4}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Typing {
                bug_id: 4,
                is_typing: false
            }
        );
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"shout"}"#).is_err());
        assert!(serde_json::from_str::<InboundMessage>("not json").is_err());
    }

    #[tokio::test]
    async fn publish_reaches_every_member_of_the_group_only() {
        let notifier = Notifier::new(8);
        let mut a = notifier.join(1);
        let mut b = notifier.join(1);
        let mut other = notifier.join(2);

        assert_eq!(notifier.publish(1, activity(1)), 2);

        assert_eq!(a.next_message().await, Some(activity(1)));
        assert_eq!(b.next_message().await, Some(activity(1)));
        assert!(
            timeout(Duration::from_millis(50), other.next_message())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn relay_skips_the_origin() {
        let notifier = Notifier::new(8);
        let mut a = notifier.join(1);
        let mut b = notifier.join(1);

        notifier.relay(1, a.connection_id, activity(7));
        notifier.publish(1, activity(8));

        assert_eq!(b.next_message().await, Some(activity(7)));
        assert_eq!(b.next_message().await, Some(activity(8)));
        // `a` never sees its own relay; the next thing it gets is the publish.
        assert_eq!(a.next_message().await, Some(activity(8)));
    }

    #[tokio::test]
    async fn publish_without_group_is_dropped() {
        let notifier = Notifier::default();
        assert_eq!(notifier.publish(42, activity(1)), 0);
        assert_eq!(notifier.group_size(42), 0);
    }

    #[tokio::test]
    async fn empty_groups_are_removed_on_leave() {
        let notifier = Notifier::new(8);
        let a = notifier.join(5);
        let b = notifier.join(5);
        assert_eq!(notifier.group_size(5), 2);

        notifier.leave(a);
        assert_eq!(notifier.group_size(5), 1);
        notifier.leave(b);
        assert_eq!(notifier.group_size(5), 0);
        assert!(notifier.groups().get(&5).is_none());
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let notifier = Notifier::new(2);
        let mut slow = notifier.join(1);
        for n in 0..5 {
            notifier.publish(1, activity(n));
        }
        // Oldest events were overwritten; the newest ones still arrive.
        assert_eq!(slow.next_message().await, Some(activity(3)));
        assert_eq!(slow.next_message().await, Some(activity(4)));
    }
}
