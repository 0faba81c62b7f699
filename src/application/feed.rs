//! Feed page assembly over the authoritative store and the read cache.
//!
//! Cache-aside: a read that fetched before a write committed may repopulate `feed:<id>`
//! after that write's invalidation. The stale page lives at most one TTL.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::repos::{FeedStore, RepoError};
use crate::cache::{CacheConfig, CacheKey, ResilientCache};
use crate::domain::entities::{FeedPage, PostRecord};
use crate::domain::types::UserId;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed store failed: {0}")]
    Store(#[from] RepoError),
}

/// Feed page sizing and cache policy.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Posts assembled into the cached first page.
    pub cache_page_size: usize,
    pub cache_ttl: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for FeedConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            cache_page_size: config.feed_page_size.get(),
            cache_ttl: config.feed_ttl,
        }
    }
}

impl FeedConfig {
    /// Out-of-range limits fall back to the default page size.
    pub fn effective_limit(&self, limit: usize) -> usize {
        if (1..=self.max_page_size).contains(&limit) {
            limit
        } else {
            self.default_page_size
        }
    }
}

/// Assembles feed pages, serving the first page from the cache when possible.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn FeedStore>,
    cache: ResilientCache,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(store: Arc<dyn FeedStore>, cache: ResilientCache, config: FeedConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn read_feed(
        &self,
        user: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<FeedPage, FeedError> {
        let limit = self.config.effective_limit(limit);

        if offset > 0 {
            let posts = self.store.list_feed(user, limit, offset).await?;
            let has_more = posts.len() == limit;
            return Ok(FeedPage { posts, has_more });
        }

        let key = CacheKey::Feed(user);
        if let Some(cached) = self.load_cached(&key).await
            && !cached.is_empty()
        {
            let has_more = cached.len() > limit;
            let posts = cached.into_iter().take(limit).collect();
            debug!(cache_key = %key, "Feed served from cache");
            return Ok(FeedPage { posts, has_more });
        }

        let fetch = self.config.cache_page_size.max(limit);
        let assembled = self.store.list_feed(user, fetch, 0).await?;
        if !assembled.is_empty() {
            self.store_cached(&key, &assembled).await;
        }

        let posts: Vec<PostRecord> = assembled.into_iter().take(limit).collect();
        let has_more = posts.len() == limit;
        Ok(FeedPage { posts, has_more })
    }

    async fn load_cached(&self, key: &CacheKey) -> Option<Vec<PostRecord>> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_slice::<Vec<PostRecord>>(&raw) {
            Ok(posts) => Some(posts),
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Cached feed failed to decode; rebuilding");
                None
            }
        }
    }

    async fn store_cached(&self, key: &CacheKey, posts: &[PostRecord]) {
        match serde_json::to_vec(posts) {
            Ok(encoded) => {
                self.cache
                    .put(key, Bytes::from(encoded), self.config.cache_ttl)
                    .await
            }
            Err(err) => warn!(cache_key = %key, error = %err, "Feed page failed to encode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::macros::datetime;

    use crate::cache::MemoryCacheStore;
    use crate::domain::types::PostId;

    use super::*;

    struct FixedStore {
        posts: Vec<PostRecord>,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl FixedStore {
        fn with_posts(count: i64) -> Self {
            let posts = (0..count)
                .map(|n| PostRecord {
                    id: PostId(count - n),
                    user_id: UserId(1),
                    content: format!("post {n}"),
                    media_urls: Vec::new(),
                    media_type: String::new(),
                    likes_count: 0,
                    comments_count: 0,
                    created_at: datetime!(2024-01-01 00:00 UTC),
                    updated_at: datetime!(2024-01-01 00:00 UTC),
                    user: None,
                    is_liked: false,
                })
                .collect();
            Self {
                posts,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(usize, usize)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl FeedStore for FixedStore {
        async fn list_feed(
            &self,
            _user: UserId,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<PostRecord>, RepoError> {
            self.calls.lock().expect("calls lock").push((limit, offset));
            Ok(self.posts.iter().skip(offset).take(limit).cloned().collect())
        }
    }

    fn service(store: Arc<FixedStore>) -> FeedService {
        let config = CacheConfig::default();
        let cache = ResilientCache::new(Arc::new(MemoryCacheStore::new(&config)));
        FeedService::new(store, cache, FeedConfig::from(&config))
    }

    #[test]
    fn limit_outside_range_falls_back_to_default() {
        let config = FeedConfig::default();
        assert_eq!(config.effective_limit(0), 20);
        assert_eq!(config.effective_limit(51), 20);
        assert_eq!(config.effective_limit(1), 1);
        assert_eq!(config.effective_limit(50), 50);
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let store = Arc::new(FixedStore::with_posts(30));
        let feed = service(Arc::clone(&store));

        let first = feed.read_feed(UserId(1), 10, 0).await.expect("first read");
        assert_eq!(first.posts.len(), 10);
        assert!(first.has_more);

        let second = feed.read_feed(UserId(1), 25, 0).await.expect("cached read");
        assert_eq!(second.posts.len(), 25);
        assert!(second.has_more);

        // One assembly of the cached page size, nothing after.
        assert_eq!(store.calls(), vec![(50, 0)]);
    }

    #[tokio::test]
    async fn later_pages_always_hit_the_store() {
        let store = Arc::new(FixedStore::with_posts(30));
        let feed = service(Arc::clone(&store));

        let page = feed.read_feed(UserId(1), 20, 20).await.expect("page two");
        assert_eq!(page.posts.len(), 10);
        assert!(!page.has_more);

        feed.read_feed(UserId(1), 20, 20).await.expect("page two again");
        assert_eq!(store.calls(), vec![(20, 20), (20, 20)]);
    }

    #[tokio::test]
    async fn empty_feed_is_not_cached() {
        let store = Arc::new(FixedStore::with_posts(0));
        let feed = service(Arc::clone(&store));

        let page = feed.read_feed(UserId(1), 20, 0).await.expect("read");
        assert_eq!(page, FeedPage::empty());

        feed.read_feed(UserId(1), 20, 0).await.expect("read again");
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn undecodable_cache_entry_is_a_miss() {
        let store = Arc::new(FixedStore::with_posts(3));
        let config = CacheConfig::default();
        let cache = ResilientCache::new(Arc::new(MemoryCacheStore::new(&config)));
        cache
            .put(
                &CacheKey::Feed(UserId(1)),
                Bytes::from_static(b"not json"),
                Duration::from_secs(60),
            )
            .await;
        let feed = FeedService::new(
            Arc::clone(&store) as Arc<dyn FeedStore>,
            cache,
            FeedConfig::from(&config),
        );

        let page = feed.read_feed(UserId(1), 20, 0).await.expect("read");
        assert_eq!(page.posts.len(), 3);
        assert!(!page.has_more);
        assert_eq!(store.calls(), vec![(50, 0)]);
    }
}
