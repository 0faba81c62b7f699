use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use crate::application::repos::FollowGraph;
use crate::cache::ResilientCache;
use crate::domain::types::UserId;
use crate::realtime::{Event, Hub};

use super::EventDispatcher;
use super::events::Mutation;
use super::planner::{Delivery, DispatchPlan};

pub(crate) const METRIC_DISPATCH_LATENCY_MS: &str = "pulsefeed_dispatch_ms";
pub(crate) const METRIC_DISPATCH_FOLLOWER_LOOKUP_FAILED: &str =
    "pulsefeed_dispatch_follower_lookup_failed_total";

/// What one dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub invalidated: usize,
    pub invalidation_failures: usize,
    pub delivered: usize,
}

/// Dispatcher that runs invalidation and delivery on the caller's task.
#[derive(Clone)]
pub struct LiveDispatcher {
    hub: Hub,
    cache: ResilientCache,
    graph: Arc<dyn FollowGraph>,
}

impl LiveDispatcher {
    pub fn new(hub: Hub, cache: ResilientCache, graph: Arc<dyn FollowGraph>) -> Self {
        Self { hub, cache, graph }
    }

    /// Invalidate every dependent key, then hand the event to the hub.
    #[instrument(skip_all, fields(mutation = mutation.kind()))]
    pub async fn apply(&self, mutation: Mutation) -> DispatchOutcome {
        let started_at = Instant::now();
        let kind = mutation.kind();

        let followers = match mutation.fan_out_author() {
            Some(author) => self.followers_of(author).await,
            None => Vec::new(),
        };

        let plan = DispatchPlan::build(mutation, &followers);
        debug!(%plan, "Dispatch plan built");

        let mut outcome = DispatchOutcome::default();
        for key in &plan.invalidate {
            if self.cache.invalidate(key).await {
                outcome.invalidated += 1;
            } else {
                outcome.invalidation_failures += 1;
            }
        }

        outcome.delivered = match plan.delivery {
            Some(Delivery::Broadcast(event)) => self.deliver(&event, None),
            Some(Delivery::User(user, event)) => self.deliver(&event, Some(user)),
            None => 0,
        };

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_DISPATCH_LATENCY_MS, "mutation" => kind).record(elapsed_ms);
        info!(
            invalidated = outcome.invalidated,
            invalidation_failures = outcome.invalidation_failures,
            delivered = outcome.delivered,
            elapsed_ms,
            "Mutation dispatched"
        );

        outcome
    }

    async fn followers_of(&self, author: UserId) -> Vec<UserId> {
        match self.graph.list_follower_ids(author).await {
            Ok(followers) => followers,
            Err(err) => {
                counter!(METRIC_DISPATCH_FOLLOWER_LOOKUP_FAILED).increment(1);
                warn!(
                    author_id = %author,
                    error = %err,
                    "Follower lookup failed; follower feeds expire by TTL"
                );
                Vec::new()
            }
        }
    }

    fn deliver(&self, event: &Event, target: Option<UserId>) -> usize {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = event.kind(), error = %err, "Event failed to encode; dropped");
                return 0;
            }
        };

        match target {
            Some(user) => self.hub.send_to_user(user, &frame),
            None => self.hub.broadcast(&frame),
        }
    }
}

#[async_trait]
impl EventDispatcher for LiveDispatcher {
    async fn dispatch(&self, mutation: Mutation) {
        self.apply(mutation).await;
    }
}
