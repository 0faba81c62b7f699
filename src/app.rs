//! Wiring of the core components into one application context.

use std::sync::Arc;

use crate::application::feed::{FeedConfig, FeedService};
use crate::application::repos::{FeedStore, FollowGraph};
use crate::cache::{CacheConfig, ResilientCache};
use crate::config::{DispatchSettings, Settings};
use crate::dispatch::{EventDispatcher, LiveDispatcher, build_dispatcher};
use crate::realtime::{Hub, HubConfig};

/// Shared handles for the hub, the cache, feed reads and mutation dispatch.
#[derive(Clone)]
pub struct AppContext {
    pub hub: Hub,
    pub cache: ResilientCache,
    pub feed: Arc<FeedService>,
    pub dispatcher: Arc<dyn EventDispatcher>,
}

impl AppContext {
    pub fn new(
        cache_config: &CacheConfig,
        hub_config: HubConfig,
        dispatch: &DispatchSettings,
        store: Arc<dyn FeedStore>,
        graph: Arc<dyn FollowGraph>,
    ) -> Self {
        let hub = Hub::new(hub_config);
        let cache = ResilientCache::from_config(cache_config);
        let feed = Arc::new(FeedService::new(
            store,
            cache.clone(),
            FeedConfig::from(cache_config),
        ));
        let live = LiveDispatcher::new(hub.clone(), cache.clone(), graph);
        let dispatcher = build_dispatcher(dispatch, live);

        Self {
            hub,
            cache,
            feed,
            dispatcher,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn FeedStore>,
        graph: Arc<dyn FollowGraph>,
    ) -> Self {
        Self::new(
            &CacheConfig::from(&settings.cache),
            HubConfig::from(&settings.hub),
            &settings.dispatch,
            store,
            graph,
        )
    }
}
