//! tenyks relay library
//!
//! Bridges line-oriented protocol connections (IRC-style servers) to a
//! pub/sub bus:
//! - Protocol connections with liveness tracking and keep-alive handling
//! - Transform pipeline applied to every inbound line
//! - Outbound publisher and inbound control-message subscriber
//! - The Robot, which supervises every connection's lifecycle

pub mod banner;
pub mod bus;
pub mod connection;
pub mod pipeline;
pub mod robot;

pub use robot::{Robot, RobotConfig};
