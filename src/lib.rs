//! PulseFeed: real-time fan-out and feed-cache consistency core.

pub mod app;
pub mod application;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod infra;
pub mod realtime;
mod util;
