//! Event dispatch: turns completed writes into cache invalidations and live events.
//!
//! Write paths call an [`EventDispatcher`] after their mutation commits. Dispatch is
//! fire-and-forget; nothing here can fail the write.

mod events;
mod live;
mod planner;
mod queue;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DispatchMode, DispatchSettings};
use crate::domain::entities::PostRecord;
use crate::domain::types::{PostId, UserId};

pub use events::Mutation;
pub use live::{DispatchOutcome, LiveDispatcher};
pub use planner::{Delivery, DispatchPlan};
pub use queue::QueuedDispatcher;

pub(crate) use live::{METRIC_DISPATCH_FOLLOWER_LOOKUP_FAILED, METRIC_DISPATCH_LATENCY_MS};
pub(crate) use queue::METRIC_DISPATCH_DROPPED;

/// Entry point for write paths.
///
/// Implementations only provide [`EventDispatcher::dispatch`]; the per-mutation methods
/// are conveniences over it.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, mutation: Mutation);

    async fn post_created(&self, post: PostRecord) {
        self.dispatch(Mutation::PostCreated {
            post: Box::new(post),
        })
        .await;
    }

    async fn post_liked(&self, post: PostId, owner: UserId, actor: UserId) {
        self.dispatch(Mutation::PostLiked { post, owner, actor })
            .await;
    }

    async fn post_unliked(&self, post: PostId) {
        self.dispatch(Mutation::PostUnliked { post }).await;
    }

    async fn comment_created(&self, post: PostId, owner: UserId, actor: UserId) {
        self.dispatch(Mutation::CommentCreated { post, owner, actor })
            .await;
    }

    async fn user_followed(&self, follower: UserId, followee: UserId) {
        self.dispatch(Mutation::UserFollowed { follower, followee })
            .await;
    }

    async fn user_unfollowed(&self, follower: UserId, followee: UserId) {
        self.dispatch(Mutation::UserUnfollowed { follower, followee })
            .await;
    }
}

/// Build the dispatcher selected by configuration.
pub fn build_dispatcher(
    settings: &DispatchSettings,
    live: LiveDispatcher,
) -> Arc<dyn EventDispatcher> {
    match settings.mode {
        DispatchMode::Inline => Arc::new(live),
        DispatchMode::Queued => Arc::new(QueuedDispatcher::spawn(
            live,
            settings.queue_capacity.get(),
        )),
    }
}
