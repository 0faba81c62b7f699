//! Dispatch plan generation.
//!
//! Maps one mutation to the cache keys it invalidates and the live event it emits.

use std::collections::HashSet;
use std::fmt;

use crate::cache::CacheKey;
use crate::domain::types::UserId;
use crate::realtime::{Event, Notification};

use super::events::Mutation;

/// Where the event of a mutation goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Broadcast(Event),
    User(UserId, Event),
}

/// Actions for one mutation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Keys to delete, deduplicated, in policy order.
    pub invalidate: Vec<CacheKey>,
    pub delivery: Option<Delivery>,
}

impl fmt::Display for DispatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delivery = match &self.delivery {
            Some(Delivery::Broadcast(_)) => "broadcast",
            Some(Delivery::User(..)) => "user",
            None => "none",
        };
        write!(
            f,
            "DispatchPlan {{ invalidate: {}, delivery: {} }}",
            self.invalidate.len(),
            delivery
        )
    }
}

impl DispatchPlan {
    /// Build the plan for `mutation`. `followers` are the author's followers for a new post
    /// and are ignored otherwise.
    pub fn build(mutation: Mutation, followers: &[UserId]) -> Self {
        let mut plan = Self::default();

        match mutation {
            Mutation::PostCreated { post } => {
                plan.push(CacheKey::Feed(post.user_id));
                for follower in followers {
                    plan.push(CacheKey::Feed(*follower));
                }
                plan.delivery = Some(Delivery::Broadcast(Event::NewPost(post)));
            }
            Mutation::PostLiked { post, owner, actor } => {
                plan.push(CacheKey::Post(post));
                if actor != owner {
                    plan.delivery = Some(Delivery::User(
                        owner,
                        Event::Notification(Notification::like(actor, post)),
                    ));
                }
            }
            Mutation::PostUnliked { post } => {
                plan.push(CacheKey::Post(post));
            }
            Mutation::CommentCreated { post, owner, actor } => {
                plan.push(CacheKey::Post(post));
                if actor != owner {
                    plan.delivery = Some(Delivery::User(
                        owner,
                        Event::Notification(Notification::comment(actor, post)),
                    ));
                }
            }
            Mutation::UserFollowed { follower, followee } => {
                plan.push_follow_keys(follower, followee);
                if follower != followee {
                    plan.delivery = Some(Delivery::User(
                        followee,
                        Event::Notification(Notification::follow(follower)),
                    ));
                }
            }
            Mutation::UserUnfollowed { follower, followee } => {
                plan.push_follow_keys(follower, followee);
            }
        }

        plan.dedup();
        plan
    }

    fn push(&mut self, key: CacheKey) {
        self.invalidate.push(key);
    }

    fn push_follow_keys(&mut self, follower: UserId, followee: UserId) {
        self.push(CacheKey::Feed(follower));
        self.push(CacheKey::User(follower));
        self.push(CacheKey::User(followee));
    }

    fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.invalidate.len());
        self.invalidate.retain(|key| seen.insert(*key));
    }
}
