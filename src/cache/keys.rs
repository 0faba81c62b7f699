//! Cache key definitions.
//!
//! The rendered form (`feed:<id>`, `user:<id>`, `post:<id>`) is the storage key and is
//! shared with collaborators that build keys themselves, so it must not change.

use std::fmt;

use crate::domain::types::{PostId, UserId};

/// Identifies one cached read view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// First page of a user's assembled feed.
    Feed(UserId),
    /// Profile view with follower/following counts.
    User(UserId),
    /// Single post view with like/comment counts.
    Post(PostId),
}

impl CacheKey {
    pub fn category(&self) -> &'static str {
        match self {
            CacheKey::Feed(_) => "feed",
            CacheKey::User(_) => "user",
            CacheKey::Post(_) => "post",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Feed(user) | CacheKey::User(user) => {
                write!(f, "{}:{}", self.category(), user)
            }
            CacheKey::Post(post) => write!(f, "{}:{}", self.category(), post),
        }
    }
}
