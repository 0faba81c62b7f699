//! Repository traits describing the authoritative store.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::PostRecord;
use crate::domain::types::UserId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Reads the posts that make up a user's feed.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Posts by `user` and everyone `user` follows, newest first.
    ///
    /// Each post carries its author summary and whether `user` liked it.
    async fn list_feed(
        &self,
        user: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PostRecord>, RepoError>;
}

/// Reads the follow relation.
#[async_trait]
pub trait FollowGraph: Send + Sync {
    /// Users currently following `user`.
    async fn list_follower_ids(&self, user: UserId) -> Result<Vec<UserId>, RepoError>;
}
