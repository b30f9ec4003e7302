//! Message types exchanged between the relay and services over the bus.
//!
//! Tolerant reader: unknown fields in bus payloads are ignored on the way in
//! and preserved on the way out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A raw line received from a connection, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLine {
    /// Name of the connection the line arrived on.
    pub connection: String,
    /// The line without its terminator.
    pub raw: String,
}

impl InboundLine {
    pub fn new(connection: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            raw: raw.into(),
        }
    }
}

/// Identifies the relay in published items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub version: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            name: "tenyks".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A payload queued for publication to services.
///
/// Starts life as a bare wrapper around an [`InboundLine`] and is filled in
/// by the transform pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundItem {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub mask: String,
    #[serde(default)]
    pub direct: bool,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub full_message: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub from_channel: bool,
    pub connection: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub meta: Meta,
    /// Parameters of the parsed line; not part of the published shape.
    #[serde(skip)]
    pub params: Vec<String>,
    /// Additional keys added by pipeline stages.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundItem {
    /// Wrap a freshly received line before any stage has run.
    pub fn from_line(line: InboundLine) -> Self {
        Self {
            target: String::new(),
            command: String::new(),
            mask: String::new(),
            direct: false,
            nick: String::new(),
            host: String::new(),
            full_message: line.raw,
            user: String::new(),
            from_channel: false,
            connection: line.connection,
            payload: String::new(),
            meta: Meta::default(),
            params: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Serialize for the bus.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An instruction from a service telling the relay to send something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub command: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub target: String,
    pub connection: String,
}

/// Commands the relay knows how to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Privmsg,
}

impl ControlMessage {
    /// Parse a bus payload.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The recognised command, matched case-insensitively.
    ///
    /// `None` means a command this relay does not act upon.
    pub fn kind(&self) -> Option<ControlCommand> {
        if self.command.eq_ignore_ascii_case("privmsg") {
            Some(ControlCommand::Privmsg)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn control_message_parses_and_ignores_unknown_fields() {
        let msg = ControlMessage::from_json(
            r##"{"command":"PRIVMSG","payload":"hi","target":"#x","connection":"net1","extra":42}"##,
        )
        .unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.payload, "hi");
        assert_eq!(msg.target, "#x");
        assert_eq!(msg.connection, "net1");
        assert_eq!(msg.kind(), Some(ControlCommand::Privmsg));
    }

    #[test]
    fn control_command_is_case_insensitive() {
        for command in ["privmsg", "PRIVMSG", "PrivMsg"] {
            let msg = ControlMessage {
                command: command.into(),
                payload: String::new(),
                target: String::new(),
                connection: "net1".into(),
            };
            assert_eq!(msg.kind(), Some(ControlCommand::Privmsg));
        }
    }

    #[test]
    fn unknown_control_command_has_no_kind() {
        let msg = ControlMessage::from_json(
            r#"{"command":"NOTICE","payload":"hi","target":"bob","connection":"net1"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn malformed_control_message_is_an_error() {
        assert!(ControlMessage::from_json("not json").is_err());
        assert!(ControlMessage::from_json(r#"{"payload":"hi"}"#).is_err());
    }

    #[test]
    fn outbound_item_serializes_published_shape() {
        let mut item = OutboundItem::from_line(InboundLine::new("net1", "PING :x"));
        item.extra.insert("admin".into(), Value::Bool(true));
        let value: Value = serde_json::from_str(&item.to_json().unwrap()).unwrap();

        assert_eq!(value["connection"], "net1");
        assert_eq!(value["full_message"], "PING :x");
        assert_eq!(value["meta"]["name"], "tenyks");
        assert_eq!(value["admin"], true);
        assert!(value.get("params").is_none());
    }
}
