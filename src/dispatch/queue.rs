use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::EventDispatcher;
use super::events::Mutation;
use super::live::LiveDispatcher;

pub(crate) const METRIC_DISPATCH_DROPPED: &str = "pulsefeed_dispatch_dropped_total";

/// Dispatcher that hands mutations to a background worker through a bounded queue.
///
/// Enqueue never waits. When the queue is full the mutation is dropped and counted;
/// affected cache entries then age out by TTL.
pub struct QueuedDispatcher {
    sender: mpsc::Sender<Mutation>,
    dropped: Arc<AtomicU64>,
}

impl QueuedDispatcher {
    /// Start the worker on the current runtime. It stops once the dispatcher is dropped
    /// and the queue has drained.
    pub fn spawn(live: LiveDispatcher, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Mutation>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(mutation) = receiver.recv().await {
                live.apply(mutation).await;
            }
            debug!("Dispatch worker stopped");
        });

        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Mutations dropped because the queue was full or the worker was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, mutation: &Mutation, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_DISPATCH_DROPPED, "reason" => reason).increment(1);
        warn!(mutation = mutation.kind(), reason, "Mutation dropped before dispatch");
    }
}

#[async_trait]
impl EventDispatcher for QueuedDispatcher {
    async fn dispatch(&self, mutation: Mutation) {
        match self.sender.try_send(mutation) {
            Ok(()) => {}
            Err(TrySendError::Full(mutation)) => self.record_drop(&mutation, "queue_full"),
            Err(TrySendError::Closed(mutation)) => self.record_drop(&mutation, "worker_stopped"),
        }
    }
}
