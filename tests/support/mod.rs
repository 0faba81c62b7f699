//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use pulsefeed::application::repos::{FeedStore, FollowGraph, RepoError};
use pulsefeed::domain::entities::PostRecord;
use pulsefeed::domain::types::{PostId, UserId};
use pulsefeed::realtime::{OutboundFrame, Transport, TransportError};
use time::{Duration as TimeDuration, OffsetDateTime, macros::datetime};
use tokio::sync::{Notify, mpsc};

const EPOCH: OffsetDateTime = datetime!(2024-06-01 00:00 UTC);

pub fn post(id: i64, author: UserId) -> PostRecord {
    let created_at = EPOCH + TimeDuration::minutes(id);
    PostRecord {
        id: PostId(id),
        user_id: author,
        content: format!("post {id} by {}", author.0),
        media_urls: Vec::new(),
        media_type: String::new(),
        likes_count: 0,
        comments_count: 0,
        created_at,
        updated_at: created_at,
        user: None,
        is_liked: false,
    }
}

/// Authoritative store fake: posts plus a follow relation.
#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<PostRecord>>,
    /// follower -> followees
    follows: Mutex<HashMap<UserId, Vec<UserId>>>,
    feed_reads: AtomicUsize,
    fail_follower_lookup: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_post(&self, post: PostRecord) {
        self.posts.lock().expect("posts lock").push(post);
    }

    pub fn follow(&self, follower: UserId, followee: UserId) {
        self.follows
            .lock()
            .expect("follows lock")
            .entry(follower)
            .or_default()
            .push(followee);
    }

    pub fn feed_reads(&self) -> usize {
        self.feed_reads.load(Ordering::SeqCst)
    }

    pub fn fail_follower_lookups(&self) {
        self.fail_follower_lookup.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn list_feed(
        &self,
        user: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.feed_reads.fetch_add(1, Ordering::SeqCst);
        let followees = self
            .follows
            .lock()
            .expect("follows lock")
            .get(&user)
            .cloned()
            .unwrap_or_default();

        let mut posts: Vec<PostRecord> = self
            .posts
            .lock()
            .expect("posts lock")
            .iter()
            .filter(|post| post.user_id == user || followees.contains(&post.user_id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl FollowGraph for MemoryStore {
    async fn list_follower_ids(&self, user: UserId) -> Result<Vec<UserId>, RepoError> {
        if self.fail_follower_lookup.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let mut followers: Vec<UserId> = self
            .follows
            .lock()
            .expect("follows lock")
            .iter()
            .filter(|(_, followees)| followees.contains(&user))
            .map(|(follower, _)| *follower)
            .collect();
        followers.sort();
        Ok(followers)
    }
}

/// Transport that forwards every frame to a channel.
pub struct RecordingTransport {
    frames: mpsc::UnboundedSender<String>,
}

pub fn recording() -> (RecordingTransport, mpsc::UnboundedReceiver<String>) {
    let (frames, rx) = mpsc::unbounded_channel();
    (RecordingTransport { frames }, rx)
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.frames
            .send(frame.to_string())
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {}
}

/// Transport whose first write never completes.
pub struct StalledTransport {
    pub started: Arc<Notify>,
    pub closed: Arc<AtomicBool>,
}

pub fn stalled() -> (StalledTransport, Arc<Notify>, Arc<AtomicBool>) {
    let started = Arc::new(Notify::new());
    let closed = Arc::new(AtomicBool::new(false));
    (
        StalledTransport {
            started: Arc::clone(&started),
            closed: Arc::clone(&closed),
        },
        started,
        closed,
    )
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Transport that fails every write.
pub struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    async fn send(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
        Err(TransportError::Write("connection reset by peer".into()))
    }

    async fn close(&mut self) {}
}

pub fn json(frame: &str) -> serde_json::Value {
    serde_json::from_str(frame).expect("frame is valid json")
}

/// Transport whose keep-alive ping never completes. Frames are accepted.
pub struct StalledPingTransport {
    pub ping_started: Arc<Notify>,
    pub closed: Arc<AtomicBool>,
}

pub fn stalled_ping() -> (StalledPingTransport, Arc<Notify>, Arc<AtomicBool>) {
    let ping_started = Arc::new(Notify::new());
    let closed = Arc::new(AtomicBool::new(false));
    (
        StalledPingTransport {
            ping_started: Arc::clone(&ping_started),
            closed: Arc::clone(&closed),
        },
        ping_started,
        closed,
    )
}

#[async_trait]
impl Transport for StalledPingTransport {
    async fn send(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.ping_started.notify_one();
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
