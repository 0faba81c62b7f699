//! Connection registry and outbound routing.
//!
//! The registry maps each user to the set of their live connection ids and each id
//! to its queue sender. One mutex guards both maps; it is held for membership
//! bookkeeping and non-blocking `try_send` only, never across transport I/O.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::types::UserId;
use crate::util::lock::mutex_lock;

use super::connection::{
    ConnectionHandle, ConnectionId, ConnectionState, StateCell, Transport, Writer,
};
use super::message::OutboundFrame;

const SOURCE: &str = "realtime::hub";

pub(crate) const METRIC_HUB_CONNECTIONS: &str = "pulsefeed_hub_connections";
pub(crate) const METRIC_HUB_REGISTRATIONS: &str = "pulsefeed_hub_registrations_total";
pub(crate) const METRIC_HUB_DISCONNECTS: &str = "pulsefeed_hub_disconnects_total";
pub(crate) const METRIC_HUB_EVICTIONS: &str = "pulsefeed_hub_evictions_total";
pub(crate) const METRIC_HUB_DELIVERIES: &str = "pulsefeed_hub_deliveries_total";

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before it is evicted as a slow consumer.
    pub queue_capacity: usize,
    /// Keep-alive ping period. `None` or zero disables pings.
    pub ping_interval: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
        }
    }
}

impl From<&crate::config::HubSettings> for HubConfig {
    fn from(settings: &crate::config::HubSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.get(),
            ping_interval: settings.ping_interval,
        }
    }
}

struct Entry {
    user: UserId,
    generation: u64,
    sender: mpsc::Sender<OutboundFrame>,
    state: Arc<StateCell>,
    token: CancellationToken,
}

impl Entry {
    fn teardown(&self) {
        self.state.advance(ConnectionState::Closing);
        self.token.cancel();
    }
}

#[derive(Default)]
struct Registry {
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Entry>,
}

impl Registry {
    fn insert(&mut self, id: ConnectionId, entry: Entry) {
        self.by_user.entry(entry.user).or_default().insert(id);
        self.connections.insert(id, entry);
    }

    fn remove(&mut self, id: ConnectionId) -> Option<Entry> {
        let entry = self.connections.remove(&id)?;
        if let Some(ids) = self.by_user.get_mut(&entry.user) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_user.remove(&entry.user);
            }
        }
        Some(entry)
    }

    /// Enqueue on each target; returns the accepted count and the connections to evict.
    fn offer<'a>(
        &self,
        targets: impl Iterator<Item = &'a ConnectionId>,
        frame: &OutboundFrame,
    ) -> (usize, Vec<(ConnectionId, &'static str)>) {
        let mut accepted = 0;
        let mut rejected = Vec::new();
        for id in targets {
            let Some(entry) = self.connections.get(id) else {
                continue;
            };
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => rejected.push((*id, "slow_consumer")),
                Err(TrySendError::Closed(_)) => rejected.push((*id, "writer_gone")),
            }
        }
        (accepted, rejected)
    }

    fn evict(&mut self, rejected: Vec<(ConnectionId, &'static str)>) {
        for (id, reason) in rejected {
            if let Some(entry) = self.remove(id) {
                entry.teardown();
                counter!(METRIC_HUB_EVICTIONS, "reason" => reason).increment(1);
                warn!(
                    connection_id = %id,
                    user_id = %entry.user,
                    reason,
                    "Evicted connection"
                );
            }
        }
        gauge!(METRIC_HUB_CONNECTIONS).set(self.connections.len() as f64);
    }
}

struct HubInner {
    config: HubConfig,
    registry: Mutex<Registry>,
    next_generation: AtomicU64,
    writers: TaskTracker,
}

/// Owned registry of live connections. Cloning shares the same registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                registry: Mutex::new(Registry::default()),
                next_generation: AtomicU64::new(1),
                writers: TaskTracker::new(),
            }),
        }
    }

    /// Register a connection for `user` and start its writer.
    ///
    /// An id that is already registered is replaced; the stale connection is torn down.
    pub fn register<T: Transport>(
        &self,
        id: ConnectionId,
        user: UserId,
        transport: T,
    ) -> ConnectionHandle {
        let (sender, queue) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(StateCell::new());
        let token = CancellationToken::new();
        let handle = ConnectionHandle {
            id,
            user,
            generation,
            state: Arc::clone(&state),
            token: token.clone(),
            hub: self.clone(),
        };

        {
            let mut registry = mutex_lock(&self.inner.registry, SOURCE, "register");
            if let Some(stale) = registry.remove(id) {
                stale.teardown();
                counter!(METRIC_HUB_DISCONNECTS, "reason" => "replaced").increment(1);
                debug!(connection_id = %id, user_id = %stale.user, "Replaced stale connection");
            }
            registry.insert(
                id,
                Entry {
                    user,
                    generation,
                    sender,
                    state: Arc::clone(&state),
                    token,
                },
            );
            state.advance(ConnectionState::Live);
            gauge!(METRIC_HUB_CONNECTIONS).set(registry.connections.len() as f64);
        }

        counter!(METRIC_HUB_REGISTRATIONS).increment(1);
        info!(connection_id = %id, user_id = %user, "Connection registered");

        self.inner.writers.spawn(
            Writer {
                handle: handle.clone(),
                transport,
                queue,
                ping_interval: self.inner.config.ping_interval,
            }
            .run(),
        );

        handle
    }

    /// Remove a connection and signal its writer. Returns false if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        self.remove_connection(id, None, "deregistered")
    }

    /// Remove `id` only while it still belongs to `generation` (when given).
    pub(crate) fn remove_connection(
        &self,
        id: ConnectionId,
        generation: Option<u64>,
        reason: &'static str,
    ) -> bool {
        let entry = {
            let mut registry = mutex_lock(&self.inner.registry, SOURCE, "deregister");
            let current = registry
                .connections
                .get(&id)
                .is_some_and(|entry| generation.is_none_or(|g| g == entry.generation));
            if !current {
                return false;
            }
            let Some(entry) = registry.remove(id) else {
                return false;
            };
            entry.teardown();
            gauge!(METRIC_HUB_CONNECTIONS).set(registry.connections.len() as f64);
            entry
        };

        counter!(METRIC_HUB_DISCONNECTS, "reason" => reason).increment(1);
        info!(connection_id = %id, user_id = %entry.user, reason, "Connection deregistered");
        true
    }

    /// Enqueue `frame` on every live connection of `user`.
    ///
    /// Returns how many queues accepted it; zero when the user has no connections.
    pub fn send_to_user(&self, user: UserId, frame: &OutboundFrame) -> usize {
        let mut registry = mutex_lock(&self.inner.registry, SOURCE, "send_to_user");
        let Some(ids) = registry.by_user.get(&user) else {
            return 0;
        };
        let (accepted, rejected) = registry.offer(ids.iter(), frame);
        if !rejected.is_empty() {
            registry.evict(rejected);
        }
        drop(registry);

        counter!(METRIC_HUB_DELIVERIES, "scope" => "user").increment(accepted as u64);
        accepted
    }

    /// Enqueue `frame` on every live connection. Returns the accepted count.
    pub fn broadcast(&self, frame: &OutboundFrame) -> usize {
        let mut registry = mutex_lock(&self.inner.registry, SOURCE, "broadcast");
        let (accepted, rejected) = registry.offer(registry.connections.keys(), frame);
        if !rejected.is_empty() {
            registry.evict(rejected);
        }
        drop(registry);

        counter!(METRIC_HUB_DELIVERIES, "scope" => "broadcast").increment(accepted as u64);
        accepted
    }

    pub fn connection_count(&self) -> usize {
        mutex_lock(&self.inner.registry, SOURCE, "connection_count")
            .connections
            .len()
    }

    pub fn user_connection_count(&self, user: UserId) -> usize {
        mutex_lock(&self.inner.registry, SOURCE, "user_connection_count")
            .by_user
            .get(&user)
            .map_or(0, HashSet::len)
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        mutex_lock(&self.inner.registry, SOURCE, "is_registered")
            .connections
            .contains_key(&id)
    }

    /// Tear down every connection and wait for their writers to finish.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Entry> = {
            let mut registry = mutex_lock(&self.inner.registry, SOURCE, "shutdown");
            registry.by_user.clear();
            let drained = registry.connections.drain().map(|(_, entry)| entry).collect();
            gauge!(METRIC_HUB_CONNECTIONS).set(0.0);
            drained
        };
        for entry in &drained {
            entry.teardown();
        }

        self.inner.writers.close();
        self.inner.writers.wait().await;
        self.inner.writers.reopen();

        info!(closed = drained.len(), "Hub shut down");
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    use crate::realtime::connection::TransportError;

    use super::*;

    struct ChannelTransport {
        frames: UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
            self.frames
                .send(frame.to_string())
                .map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {}
    }

    fn transport() -> (ChannelTransport, UnboundedReceiver<String>) {
        let (frames, rx) = unbounded_channel();
        (ChannelTransport { frames }, rx)
    }

    fn frame(text: &str) -> OutboundFrame {
        OutboundFrame::from(text)
    }

    fn hub() -> Hub {
        Hub::new(HubConfig {
            queue_capacity: 16,
            ping_interval: None,
        })
    }

    #[tokio::test]
    async fn register_and_deregister_track_membership() {
        let hub = hub();
        let (t, _rx) = transport();
        let id = ConnectionId::new();

        let handle = hub.register(id, UserId(1), t);
        assert!(hub.is_registered(id));
        assert_eq!(hub.user_connection_count(UserId(1)), 1);
        assert_eq!(handle.state(), ConnectionState::Live);

        assert!(hub.deregister(id));
        assert!(!hub.is_registered(id));
        assert_eq!(hub.user_connection_count(UserId(1)), 0);
        assert!(handle.state() >= ConnectionState::Closing);

        assert!(!hub.deregister(id));
        handle.closed().await;
    }

    #[tokio::test]
    async fn targeted_send_preserves_order() {
        let hub = hub();
        let (t, mut rx) = transport();
        hub.register(ConnectionId::new(), UserId(5), t);

        for text in ["a", "b", "c"] {
            assert_eq!(hub.send_to_user(UserId(5), &frame(text)), 1);
        }

        for expected in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn unknown_user_is_a_no_op() {
        let hub = hub();
        assert_eq!(hub.send_to_user(UserId(404), &frame("x")), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let hub = hub();
        let (t1, mut rx1) = transport();
        let (t2, mut rx2) = transport();
        let (t3, mut rx3) = transport();
        hub.register(ConnectionId::new(), UserId(1), t1);
        hub.register(ConnectionId::new(), UserId(1), t2);
        hub.register(ConnectionId::new(), UserId(2), t3);

        assert_eq!(hub.broadcast(&frame("all")), 3);
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(rx.recv().await.as_deref(), Some("all"));
        }
    }

    #[tokio::test]
    async fn reregistering_an_id_replaces_the_stale_entry() {
        let hub = hub();
        let id = ConnectionId::new();
        let (old, _old_rx) = transport();
        let (new, mut new_rx) = transport();

        let stale = hub.register(id, UserId(1), old);
        let fresh = hub.register(id, UserId(1), new);
        stale.closed().await;

        assert_eq!(hub.connection_count(), 1);
        assert!(!stale.close(), "stale handle must not remove the newer entry");
        assert!(hub.is_registered(id));
        assert_eq!(fresh.state(), ConnectionState::Live);

        assert_eq!(hub.send_to_user(UserId(1), &frame("hi")), 1);
        assert_eq!(new_rx.recv().await.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn degenerate_ping_intervals_disable_keepalive() {
        for ping_interval in [Some(Duration::ZERO), Some(Duration::MAX)] {
            let hub = Hub::new(HubConfig {
                queue_capacity: 4,
                ping_interval,
            });
            let (t, mut rx) = transport();
            hub.register(ConnectionId::new(), UserId(3), t);

            assert_eq!(hub.send_to_user(UserId(3), &frame("still-live")), 1);
            assert_eq!(rx.recv().await.as_deref(), Some("still-live"));
            assert_eq!(hub.shutdown().await, 1);
        }
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let hub = hub();
        let (t1, _rx1) = transport();
        let (t2, _rx2) = transport();
        let a = hub.register(ConnectionId::new(), UserId(1), t1);
        let b = hub.register(ConnectionId::new(), UserId(2), t2);

        assert_eq!(hub.shutdown().await, 2);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(a.state(), ConnectionState::Closed);
        assert_eq!(b.state(), ConnectionState::Closed);
    }
}
