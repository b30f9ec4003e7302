//! Pub/sub bus plumbing.
//!
//! The relay talks to the bus in two directions:
//!
//! - [`OutboundPublisher`] drains the outbound queue and publishes every
//!   item on the services channel.
//! - [`InboundSubscriber`] listens on the robot channel and turns control
//!   messages into writes on the named connection.
//!
//! Both sides go through the [`Publish`] and [`MessageSource`] traits so
//! they can run against Redis in the binary and against in-memory fakes in
//! tests.

mod error;
mod publisher;
pub mod redis;
mod subscriber;

use async_trait::async_trait;

pub use error::BusError;
pub use publisher::OutboundPublisher;
pub use subscriber::{Dispatch, InboundSubscriber};

/// Something that can publish a payload on a named channel.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError>;
}

/// A stream of raw payloads from one subscribed channel.
#[async_trait]
pub trait MessageSource: Send {
    /// Next payload; `None` once the subscription has ended for good.
    async fn next_message(&mut self) -> Option<Result<String, BusError>>;
}
