//! Per-connection types and the writer task that drains a connection's queue.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::types::UserId;

use super::hub::Hub;
use super::message::OutboundFrame;

/// Opaque identity of one live client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Live = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Live,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Connecting as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward to `next`; never moves back.
    pub(crate) fn advance(&self, next: ConnectionState) {
        self.0.fetch_max(next as u8, Ordering::AcqRel);
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed by peer")]
    Closed,
    #[error("transport write failed: {0}")]
    Write(String),
}

/// Outbound half of a client session.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Keep-alive probe. Transports without one ignore it.
    async fn ping(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self);
}

/// Handle returned to the accept path for one registered connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) user: UserId,
    pub(crate) generation: u64,
    pub(crate) state: Arc<StateCell>,
    pub(crate) token: CancellationToken,
    pub(crate) hub: Hub,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Resolves once the connection has left `Live`.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    /// Deregister this connection. A no-op if it was already removed or replaced.
    pub fn close(&self) -> bool {
        self.hub
            .remove_connection(self.id, Some(self.generation), "client_closed")
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("state", &self.state.get())
            .finish()
    }
}

pub(crate) struct Writer<T> {
    pub(crate) handle: ConnectionHandle,
    pub(crate) transport: T,
    pub(crate) queue: mpsc::Receiver<OutboundFrame>,
    pub(crate) ping_interval: Option<Duration>,
}

impl<T: Transport> Writer<T> {
    /// Drain the queue to the transport in FIFO order until the connection closes.
    pub(crate) async fn run(self) {
        let Writer {
            handle,
            mut transport,
            mut queue,
            ping_interval,
        } = self;
        let mut keepalive = ping_interval
            .filter(|period| !period.is_zero())
            .and_then(|period| {
                let start = tokio::time::Instant::now().checked_add(period)?;
                let mut interval = tokio::time::interval_at(start, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(interval)
            });

        loop {
            tokio::select! {
                biased;
                _ = handle.token.cancelled() => break,
                frame = queue.recv() => {
                    let Some(frame) = frame else { break };
                    // A stalled write must not outlive eviction.
                    let sent = tokio::select! {
                        biased;
                        _ = handle.token.cancelled() => break,
                        sent = transport.send(frame) => sent,
                    };
                    if let Err(err) = sent {
                        warn!(
                            connection_id = %handle.id,
                            user_id = %handle.user,
                            error = %err,
                            "Transport write failed; closing connection"
                        );
                        handle.hub.remove_connection(handle.id, Some(handle.generation), "transport_error");
                        break;
                    }
                }
                _ = tick(&mut keepalive) => {
                    let pinged = tokio::select! {
                        biased;
                        _ = handle.token.cancelled() => break,
                        pinged = transport.ping() => pinged,
                    };
                    if let Err(err) = pinged {
                        debug!(connection_id = %handle.id, error = %err, "Keep-alive ping failed");
                        handle.hub.remove_connection(handle.id, Some(handle.generation), "transport_error");
                        break;
                    }
                }
            }
        }

        // Queued frames past this point are abandoned.
        drop(queue);
        transport.close().await;
        handle.state.advance(ConnectionState::Closed);
        debug!(connection_id = %handle.id, user_id = %handle.user, "Connection writer finished");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
