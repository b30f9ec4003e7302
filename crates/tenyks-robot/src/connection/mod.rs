//! Protocol connections.
//!
//! A [`Connection`] owns one socket to one remote endpoint. The orchestrator
//! only talks to connections through this trait; [`IrcConnection`] is the
//! tokio-backed implementation used by the binary.

mod error;
mod flags;
mod irc;
mod table;
mod tls;

use std::time::Duration;

use async_trait::async_trait;

use tenyks_core::ConnectionConfig;
use tenyks_core::irc as line;

pub use error::ConnectionError;
pub use flags::ConnectionFlags;
pub use irc::IrcConnection;
pub use table::ConnectionTable;

/// Contract between the orchestrator and a protocol connection.
///
/// All methods take `&self` so a connection can be shared between its
/// supervising task, the bus subscriber and the shutdown path.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Static settings for this endpoint.
    fn config(&self) -> &ConnectionConfig;

    /// Runtime flags and liveness timestamp.
    fn flags(&self) -> &ConnectionFlags;

    /// Open the socket.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Drop the current socket (if any) and open a new one.
    async fn reconnect(&self) -> Result<(), ConnectionError>;

    /// Close the socket. Safe to call more than once.
    async fn close(&self);

    /// Send one line; a missing `\r\n` terminator is added.
    async fn send(&self, line: &str) -> Result<(), ConnectionError>;

    /// Resolve `true` once any data has arrived since the last (re)connect,
    /// or `false` after `timeout`.
    async fn wait_for_data(&self, timeout: Duration) -> bool;

    /// Take the next inbound line, waiting at most `wait`.
    async fn next_line(&self, wait: Duration) -> Option<String>;

    /// Hook run after the handshake: join the configured channels.
    async fn post_connect(&self) -> Result<(), ConnectionError> {
        for join in &self.config().channels {
            self.send(&line::join(&join.channel, join.secret.as_deref()))
                .await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config().name
    }

    fn needs_reconnect(&self) -> bool {
        self.flags().needs_reconnect()
    }

    fn user_disconnect(&self) -> bool {
        self.flags().user_disconnect()
    }
}
