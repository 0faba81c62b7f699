//! Domain mutations reported by write paths.

use crate::domain::entities::PostRecord;
use crate::domain::types::{PostId, UserId};

/// A completed write that may invalidate cached views and notify live clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A post was published; its author is `post.user_id`.
    PostCreated { post: Box<PostRecord> },
    /// `actor` liked `post`, which belongs to `owner`.
    PostLiked {
        post: PostId,
        owner: UserId,
        actor: UserId,
    },
    /// A like on `post` was withdrawn.
    PostUnliked { post: PostId },
    /// `actor` commented on `post`, which belongs to `owner`.
    CommentCreated {
        post: PostId,
        owner: UserId,
        actor: UserId,
    },
    /// `follower` started following `followee`.
    UserFollowed { follower: UserId, followee: UserId },
    /// `follower` stopped following `followee`.
    UserUnfollowed { follower: UserId, followee: UserId },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::PostCreated { .. } => "post_created",
            Mutation::PostLiked { .. } => "post_liked",
            Mutation::PostUnliked { .. } => "post_unliked",
            Mutation::CommentCreated { .. } => "comment_created",
            Mutation::UserFollowed { .. } => "user_followed",
            Mutation::UserUnfollowed { .. } => "user_unfollowed",
        }
    }

    /// Author whose followers' feeds this mutation invalidates.
    pub fn fan_out_author(&self) -> Option<UserId> {
        match self {
            Mutation::PostCreated { post } => Some(post.user_id),
            _ => None,
        }
    }
}
