//! `tenyks` Core Library
//!
//! Shared functionality for the tenyks relay:
//! - Settings model and hierarchical resolution
//! - Protocol line grammar (parsing and command formatting)
//! - Bus message types exchanged with services
//! - Common error types

pub mod config;
pub mod error;
pub mod irc;
pub mod message;
pub mod tracing_init;

pub use config::{ConnectionConfig, Settings};
pub use error::{Error, Result};
pub use message::{ControlMessage, InboundLine, OutboundItem};
