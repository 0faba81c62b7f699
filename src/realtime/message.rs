//! Live event envelope.
//!
//! Every event is serialized once per dispatch into `{"type": <kind>, "data": <payload>}`
//! and the resulting frame is shared by all target queues.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::entities::PostRecord;
use crate::domain::types::{NotificationKind, PostId, UserId};

/// Serialized envelope shared by every queue it is enqueued on.
pub type OutboundFrame = Arc<str>;

/// Personal notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub actor_id: UserId,
    pub post_id: Option<PostId>,
}

impl Notification {
    pub fn like(actor: UserId, post: PostId) -> Self {
        Self {
            kind: NotificationKind::Like,
            actor_id: actor,
            post_id: Some(post),
        }
    }

    pub fn comment(actor: UserId, post: PostId) -> Self {
        Self {
            kind: NotificationKind::Comment,
            actor_id: actor,
            post_id: Some(post),
        }
    }

    pub fn follow(actor: UserId) -> Self {
        Self {
            kind: NotificationKind::Follow,
            actor_id: actor,
            post_id: None,
        }
    }
}

/// Event pushed to live connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    NewPost(Box<PostRecord>),
    Notification(Notification),
}

impl Event {
    pub fn new_post(post: PostRecord) -> Self {
        Self::NewPost(Box::new(post))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewPost(_) => "new_post",
            Event::Notification(_) => "notification",
        }
    }

    /// Serialize into the shared wire frame.
    pub fn encode(&self) -> Result<OutboundFrame, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}
