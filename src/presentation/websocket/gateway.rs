//! WebSocket Gateway
//!
//! Registry of live STOMP sessions and their subscriptions. Delivery is
//! in-process: every connection owns an unbounded queue drained by its
//! writer task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::frame::Frame;
use crate::application::events::{destinations, RealtimeBroker};
use crate::infrastructure::metrics;

/// Items queued for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Frame),
    Heartbeat,
    /// Flush what is queued, then close the socket
    Close,
}

/// A subscriber of one routing key
#[derive(Debug, Clone)]
struct Subscriber {
    session_id: String,
    subscription_id: String,
    /// Destination as the client subscribed to it
    destination: String,
}

/// Connected session with message sender
pub struct ConnectedSession {
    pub user_id: Uuid,
    pub session_id: String,
    pub sender: mpsc::UnboundedSender<Outbound>,
    /// subscription id -> routing key
    subscriptions: Mutex<HashMap<String, String>>,
    /// Conversations announced through `/app/conversation/{id}/join`
    joined: Mutex<HashSet<Uuid>>,
}

/// WebSocket gateway managing all connections
pub struct Gateway {
    /// Active sessions by session_id
    sessions: DashMap<String, Arc<ConnectedSession>>,
    /// User ID to session IDs mapping (one user can have multiple sessions)
    user_sessions: DashMap<Uuid, Vec<String>>,
    /// Routing key to subscribers
    subscriptions: DashMap<String, Vec<Subscriber>>,
    message_seq: AtomicU64,
    heartbeat_interval_ms: u64,
}

/// Routing key of a user queue, e.g. `/user/{id}/queue/errors`
fn user_key(user_id: Uuid, queue: &str) -> String {
    format!("{}/{}{}", destinations::USER_PREFIX, user_id, queue)
}

impl Gateway {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            subscriptions: DashMap::new(),
            message_seq: AtomicU64::new(0),
            heartbeat_interval_ms,
        }
    }

    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    /// Register a new connected session
    pub fn register_session(
        &self,
        session_id: String,
        user_id: Uuid,
        sender: mpsc::UnboundedSender<Outbound>,
    ) {
        let session = Arc::new(ConnectedSession {
            user_id,
            session_id: session_id.clone(),
            sender,
            subscriptions: Mutex::new(HashMap::new()),
            joined: Mutex::new(HashSet::new()),
        });

        self.sessions.insert(session_id.clone(), session);
        self.user_sessions
            .entry(user_id)
            .or_default()
            .push(session_id.clone());
        metrics::set_stomp_sessions(self.sessions.len());

        tracing::info!(user_id = %user_id, session_id = %session_id, "Session registered");
    }

    /// Unregister a session and drop its subscriptions. Returns `true` when
    /// this was the user's last session.
    pub fn unregister_session(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };

        let keys: Vec<String> = session.subscriptions.lock().drain().map(|(_, key)| key).collect();
        for key in keys {
            self.remove_subscriber(&key, session_id, None);
        }

        let went_offline = match self.user_sessions.get_mut(&session.user_id) {
            Some(mut sessions) => {
                sessions.retain(|s| s != session_id);
                sessions.is_empty()
            }
            None => true,
        };
        if went_offline {
            self.user_sessions
                .remove_if(&session.user_id, |_, sessions| sessions.is_empty());
        }
        metrics::set_stomp_sessions(self.sessions.len());

        tracing::info!(user_id = %session.user_id, session_id = %session_id, "Session unregistered");
        went_offline
    }

    /// Subscribe a session. `/user/queue/...` destinations resolve to the
    /// session user's own queue.
    pub fn subscribe(&self, session_id: &str, subscription_id: &str, destination: &str) -> bool {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(s.value())) else {
            return false;
        };

        let key = match destination.strip_prefix(destinations::USER_PREFIX) {
            Some(queue) if queue.starts_with("/queue/") => user_key(session.user_id, queue),
            _ => destination.to_string(),
        };

        // Re-subscribing with the same id replaces the old subscription
        if let Some(old) = session
            .subscriptions
            .lock()
            .insert(subscription_id.to_string(), key.clone())
        {
            self.remove_subscriber(&old, session_id, Some(subscription_id));
        }

        self.subscriptions.entry(key).or_default().push(Subscriber {
            session_id: session_id.to_string(),
            subscription_id: subscription_id.to_string(),
            destination: destination.to_string(),
        });
        true
    }

    pub fn unsubscribe(&self, session_id: &str, subscription_id: &str) -> bool {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        let removed = session.subscriptions.lock().remove(subscription_id);
        match removed {
            Some(key) => {
                self.remove_subscriber(&key, session_id, Some(subscription_id));
                true
            }
            None => false,
        }
    }

    fn user_session_list(&self, user_id: Uuid) -> Vec<Arc<ConnectedSession>> {
        let ids = match self.user_sessions.get(&user_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.sessions.get(id).map(|s| Arc::clone(s.value())))
            .collect()
    }

    /// Record that a session joined a conversation's presence
    pub fn join_conversation(&self, session_id: &str, conversation_id: Uuid) -> bool {
        match self.sessions.get(session_id) {
            Some(session) => {
                session.joined.lock().insert(conversation_id);
                true
            }
            None => false,
        }
    }

    /// Forget a join. Returns `true` when the session had joined and no other
    /// session of the same user is still joined, i.e. the user left.
    pub fn leave_conversation(&self, session_id: &str, conversation_id: Uuid) -> bool {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        if !session.joined.lock().remove(&conversation_id) {
            return false;
        }
        !self
            .user_session_list(session.user_id)
            .iter()
            .any(|other| other.joined.lock().contains(&conversation_id))
    }

    /// Drop every subscription and join a user holds on a conversation.
    /// Returns the number of subscriptions removed.
    pub fn revoke_conversation_access(&self, user_id: Uuid, conversation_id: Uuid) -> usize {
        let topic = destinations::conversation(conversation_id);
        let sub_topics = format!("{}/", topic);

        let mut removed = 0;
        for session in self.user_session_list(user_id) {
            session.joined.lock().remove(&conversation_id);

            let revoked: Vec<(String, String)> = {
                let mut subscriptions = session.subscriptions.lock();
                let ids: Vec<String> = subscriptions
                    .iter()
                    .filter(|(_, key)| **key == topic || key.starts_with(&sub_topics))
                    .map(|(id, _)| id.clone())
                    .collect();
                ids.into_iter()
                    .filter_map(|id| subscriptions.remove(&id).map(|key| (id, key)))
                    .collect()
            };
            for (subscription_id, key) in revoked {
                self.remove_subscriber(&key, &session.session_id, Some(&subscription_id));
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(%user_id, %conversation_id, removed, "Conversation subscriptions revoked");
        }
        removed
    }

    fn remove_subscriber(&self, key: &str, session_id: &str, subscription_id: Option<&str>) {
        if let Some(mut subscribers) = self.subscriptions.get_mut(key) {
            subscribers.retain(|s| {
                s.session_id != session_id
                    || subscription_id.map_or(false, |id| s.subscription_id != id)
            });
        }
        self.subscriptions.remove_if(key, |_, subscribers| subscribers.is_empty());
    }

    fn next_message_id(&self) -> String {
        self.message_seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Deliver a JSON body to every subscriber of a routing key
    fn deliver(&self, key: &str, payload: &Value) -> usize {
        let subscribers = match self.subscriptions.get(key) {
            Some(subscribers) => subscribers.value().clone(),
            None => return 0,
        };
        let body = payload.to_string();

        let mut delivered = 0;
        for subscriber in subscribers {
            if let Some(session) = self.sessions.get(&subscriber.session_id) {
                let frame = Frame::message(
                    &subscriber.destination,
                    &subscriber.subscription_id,
                    &self.next_message_id(),
                    body.clone(),
                );
                if session.sender.send(Outbound::Frame(frame)).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send a frame directly to a session (bypassing subscriptions)
    pub fn send_to_session(&self, session_id: &str, outbound: Outbound) -> bool {
        match self.sessions.get(session_id) {
            Some(session) => session.sender.send(outbound).is_ok(),
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.subscriptions
            .get(destination)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Check if user is online (has at least one session)
    pub fn is_user_online(&self, user_id: Uuid) -> bool {
        self.user_sessions
            .get(&user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }
}

impl RealtimeBroker for Gateway {
    fn publish_to_topic(&self, destination: &str, payload: &Value) {
        let delivered = self.deliver(destination, payload);
        tracing::trace!(destination = %destination, delivered, "Published to topic");
    }

    fn publish_to_user(&self, user_id: Uuid, queue: &str, payload: &Value) {
        let delivered = self.deliver(&user_key(user_id, queue), payload);
        tracing::trace!(user_id = %user_id, queue = %queue, delivered, "Published to user");
    }

    fn is_online(&self, user_id: Uuid) -> bool {
        self.is_user_online(user_id)
    }

    fn revoke_conversation(&self, user_id: Uuid, conversation_id: Uuid) {
        self.revoke_conversation_access(user_id, conversation_id);
    }
}
