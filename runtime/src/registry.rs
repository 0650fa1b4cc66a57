//! Live connection routing table.
//!
//! One entry per user and [`ChannelKey`]: a user may keep the waiting room of
//! one event and the purchase screen of another open at the same time.
//! Registering the same channel again replaces the previous connection;
//! dropping its sender ends the old receiver, which closes the old socket.
//! The table is process-local: a multi-instance deployment needs sticky
//! routing for notices to reach the right process.

use crate::metrics::RealtimeMetrics;
use chrono::{DateTime, Utc};
use ficket_core::{EventId, Notice, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

/// Which real-time channel a connection serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Waiting room of one event.
    Queue(EventId),
    /// Purchase screen of one event.
    Work(EventId),
}

impl ChannelKey {
    /// Event the channel belongs to.
    #[must_use]
    pub const fn event(&self) -> &EventId {
        match self {
            Self::Queue(event) | Self::Work(event) => event,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Queue(_) => "queue",
            Self::Work(_) => "work",
        }
    }

    /// Whether `notice` is delivered on this channel.
    ///
    /// Work notices without an event (seat releases) go to every work channel.
    #[must_use]
    pub fn carries(&self, notice: &Notice) -> bool {
        match (self, notice) {
            (Self::Queue(event), Notice::QueueStatus(message)) => &message.event_id == event,
            (Self::Work(event), Notice::Work(message)) => message.event_id.as_ref().is_none_or(|e| e == event),
            _ => false,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name(), self.event())
    }
}

/// Identity of one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle returned by [`ConnectionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    /// Pass back to [`ConnectionRegistry::deregister`].
    pub id: ConnectionId,
    /// Notices for this channel. Ends when the connection is replaced.
    pub receiver: mpsc::Receiver<Notice>,
}

struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Notice>,
    connected_at: DateTime<Utc>,
}

type Channels = HashMap<ChannelKey, Connection>;

struct Inner {
    connections: RwLock<HashMap<UserId, Channels>>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Maps users to their live connections, one per channel.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("buffer", &self.inner.buffer)
            .finish_non_exhaustive()
    }
}

fn count(connections: &HashMap<UserId, Channels>) -> usize {
    connections.values().map(HashMap::len).sum()
}

impl ConnectionRegistry {
    /// Create an empty registry whose connections buffer `buffer` notices.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register `user`'s connection on `channel`, replacing any previous one
    /// on the same channel.
    pub async fn register(&self, user: &UserId, channel: &ChannelKey) -> Registration {
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Connection { id, sender, connected_at: Utc::now() };

        let mut connections = self.inner.connections.write().await;
        let channels = connections.entry(user.clone()).or_default();
        if let Some(previous) = channels.insert(channel.clone(), connection) {
            tracing::info!(
                user_id = %user,
                %channel,
                previous = %previous.id,
                connected_for_secs = (Utc::now() - previous.connected_at).num_seconds(),
                "Replaced existing connection"
            );
        }
        RealtimeMetrics::set_connections(count(&connections));
        tracing::debug!(user_id = %user, %channel, connection = %id, "Connection registered");

        Registration { id, receiver }
    }

    /// Remove `user`'s entry on `channel` if it still belongs to connection `id`.
    ///
    /// Returns `false` when a newer connection has replaced it.
    pub async fn deregister(&self, user: &UserId, channel: &ChannelKey, id: ConnectionId) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(channels) = connections.get_mut(user) else {
            return false;
        };
        let current = channels.get(channel).is_some_and(|connection| connection.id == id);
        if current {
            channels.remove(channel);
            if channels.is_empty() {
                connections.remove(user);
            }
            RealtimeMetrics::set_connections(count(&connections));
            tracing::debug!(user_id = %user, %channel, connection = %id, "Connection deregistered");
        }
        current
    }

    /// Whether `user` has a live connection on `channel`.
    pub async fn is_connected(&self, user: &UserId, channel: &ChannelKey) -> bool {
        self.inner
            .connections
            .read()
            .await
            .get(user)
            .and_then(|channels| channels.get(channel))
            .is_some_and(|connection| !connection.sender.is_closed())
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        count(&*self.inner.connections.read().await)
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Senders of every channel of `user` that carries `notice`.
    pub(crate) async fn senders(&self, user: &UserId, notice: &Notice) -> Vec<mpsc::Sender<Notice>> {
        self.inner
            .connections
            .read()
            .await
            .get(user)
            .map(|channels| {
                channels
                    .iter()
                    .filter(|(channel, _)| channel.carries(notice))
                    .map(|(_, connection)| connection.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
