use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::application::repos::{FeedStore, FollowGraph, RepoError};
use crate::domain::entities::{PostRecord, UserSummary};
use crate::domain::types::{PostId, UserId};

use super::{PostgresRepositories, map_sqlx_error};

// Ids are INTEGER and timestamps are naive UTC in the schema; normalise in SQL.
const FEED_QUERY: &str = "\
SELECT p.id::BIGINT AS id, \
       p.user_id::BIGINT AS user_id, \
       COALESCE(p.content, '') AS content, \
       COALESCE(p.media_urls, '[]'::jsonb) AS media_urls, \
       COALESCE(p.media_type, '') AS media_type, \
       COALESCE(p.likes_count, 0)::BIGINT AS likes_count, \
       COALESCE(p.comments_count, 0)::BIGINT AS comments_count, \
       p.created_at AT TIME ZONE 'UTC' AS created_at, \
       p.updated_at AT TIME ZONE 'UTC' AS updated_at, \
       u.username AS author_username, \
       COALESCE(u.full_name, '') AS author_full_name, \
       COALESCE(u.avatar, '') AS author_avatar, \
       COALESCE(u.is_verified, FALSE) AS author_is_verified, \
       EXISTS(SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = $1) AS is_liked \
FROM posts p \
JOIN users u ON p.user_id = u.id \
WHERE p.user_id = $1 \
   OR p.user_id IN (SELECT following_id FROM follows WHERE follower_id = $1) \
ORDER BY p.created_at DESC, p.id DESC \
LIMIT $2 OFFSET $3";

const FOLLOWERS_QUERY: &str =
    "SELECT follower_id::BIGINT FROM follows WHERE following_id = $1 AND follower_id IS NOT NULL";

#[derive(sqlx::FromRow)]
pub(crate) struct FeedRow {
    id: i64,
    user_id: i64,
    content: String,
    media_urls: Json<Vec<String>>,
    media_type: String,
    likes_count: i64,
    comments_count: i64,
    created_at: Option<OffsetDateTime>,
    updated_at: Option<OffsetDateTime>,
    author_username: String,
    author_full_name: String,
    author_avatar: String,
    author_is_verified: bool,
    is_liked: bool,
}

impl From<FeedRow> for PostRecord {
    fn from(row: FeedRow) -> Self {
        let created_at = row.created_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            id: PostId(row.id),
            user_id: UserId(row.user_id),
            content: row.content,
            media_urls: row.media_urls.0,
            media_type: row.media_type,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            created_at,
            updated_at: row.updated_at.unwrap_or(created_at),
            user: Some(UserSummary {
                id: UserId(row.user_id),
                username: row.author_username,
                full_name: row.author_full_name,
                avatar: row.author_avatar,
                is_verified: row.author_is_verified,
            }),
            is_liked: row.is_liked,
        }
    }
}

fn to_i64(value: usize, field: &str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("{field} exceeds supported range"),
    })
}

#[async_trait]
impl FeedStore for PostgresRepositories {
    async fn list_feed(
        &self,
        user: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, FeedRow>(FEED_QUERY)
            .bind(user.get())
            .bind(to_i64(limit, "limit")?)
            .bind(to_i64(offset, "offset")?)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
}

#[async_trait]
impl FollowGraph for PostgresRepositories {
    async fn list_follower_ids(&self, user: UserId) -> Result<Vec<UserId>, RepoError> {
        let ids = sqlx::query_scalar::<_, i64>(FOLLOWERS_QUERY)
            .bind(user.get())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().map(UserId).collect())
    }
}
