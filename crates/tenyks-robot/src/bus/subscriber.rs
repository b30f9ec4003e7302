//! Inbound subscriber: robot channel → connection writes.

use tracing::{debug, info, warn};

use tenyks_core::irc;
use tenyks_core::message::{ControlCommand, ControlMessage};

use super::MessageSource;
use crate::connection::ConnectionTable;

/// What happened to one control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Written to the named connection.
    Sent,
    /// Valid, but not a command the relay acts on.
    Ignored,
    /// Not decodable as a control message.
    Malformed,
    /// Names a connection that is not configured.
    UnknownConnection,
    /// The target is empty or would split the protocol line.
    InvalidTarget,
    /// The connection rejected the write.
    SendFailed,
}

/// Turns control messages from services into protocol writes.
#[derive(Debug, Clone)]
pub struct InboundSubscriber {
    connections: ConnectionTable,
}

impl InboundSubscriber {
    pub const fn new(connections: ConnectionTable) -> Self {
        Self { connections }
    }

    /// Consume `source` until it ends. Individual bad messages never stop
    /// the loop.
    pub async fn run<S: MessageSource>(&self, mut source: S) {
        info!("Inbound subscriber started");
        while let Some(next) = source.next_message().await {
            match next {
                Ok(raw) => {
                    self.dispatch(&raw).await;
                }
                Err(e) => warn!(error = %e, "Bus receive error"),
            }
        }
        info!("Inbound subscriber stopped");
    }

    /// Handle one raw payload.
    pub async fn dispatch(&self, raw: &str) -> Dispatch {
        let message = match ControlMessage::from_json(raw) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Discarding malformed control message");
                return Dispatch::Malformed;
            }
        };

        match message.kind() {
            Some(ControlCommand::Privmsg) => self.privmsg(&message).await,
            None => {
                debug!(command = %message.command, "Ignoring control command");
                Dispatch::Ignored
            }
        }
    }

    async fn privmsg(&self, message: &ControlMessage) -> Dispatch {
        let Some(conn) = self.connections.get(&message.connection) else {
            warn!(connection = %message.connection, "Control message for unknown connection");
            return Dispatch::UnknownConnection;
        };
        if !irc::is_valid_target(&message.target) {
            warn!(connection = %message.connection, target = ?message.target, "Control message with invalid target");
            return Dispatch::InvalidTarget;
        }
        let line = irc::privmsg(&message.target, &message.payload);
        match conn.send(&line).await {
            Ok(()) => Dispatch::Sent,
            Err(e) => {
                warn!(connection = %message.connection, error = %e, "Failed to deliver control message");
                Dispatch::SendFailed
            }
        }
    }
}
