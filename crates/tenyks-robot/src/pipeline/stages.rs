//! Built-in pipeline stages.

use serde_json::Value;

use tenyks_core::OutboundItem;
use tenyks_core::irc::{self, Line, Source};

use super::{Stage, StageContext};

const BASE: [Stage; 3] = [
    Stage {
        name: "parse",
        apply: parse,
    },
    Stage {
        name: "drop_keepalive",
        apply: drop_keepalive,
    },
    Stage {
        name: "extract",
        apply: extract,
    },
];

const EXTENSIONS: [Stage; 3] = [
    Stage {
        name: "ignore_self",
        apply: ignore_self,
    },
    Stage {
        name: "strip_formatting",
        apply: strip_formatting,
    },
    Stage {
        name: "mark_admin",
        apply: mark_admin,
    },
];

/// Stages every pipeline starts with.
pub const fn base() -> &'static [Stage] {
    &BASE
}

/// Look up an extension stage by its settings name.
pub fn by_name(name: &str) -> Option<Stage> {
    EXTENSIONS.iter().find(|s| s.name == name).copied()
}

/// Split the raw line into command and parameters.
pub fn parse(_: &StageContext<'_>, mut item: OutboundItem) -> Option<OutboundItem> {
    let line = Line::parse(&item.full_message).ok()?;
    item.command = line.command;
    item.mask = line.prefix.unwrap_or_default();
    item.params = line.params;
    Some(item)
}

/// Keep-alive traffic is answered by the connection and never published.
pub fn drop_keepalive(_: &StageContext<'_>, item: OutboundItem) -> Option<OutboundItem> {
    if item.command.eq_ignore_ascii_case("PING") || item.command.eq_ignore_ascii_case("PONG") {
        None
    } else {
        Some(item)
    }
}

/// Fill sender, target and payload fields.
///
/// A channel line addressed to the relay (`bot: hello`) is marked direct and
/// the address is stripped from the payload.
pub fn extract(ctx: &StageContext<'_>, mut item: OutboundItem) -> Option<OutboundItem> {
    let source = Source::from_mask(&item.mask);
    let (nick, user, host) = (
        source.nick.to_string(),
        source.user.to_string(),
        source.host.to_string(),
    );
    item.nick = nick;
    item.user = user;
    item.host = host;

    item.target = item.params.first().cloned().unwrap_or_default();
    item.payload = if item.params.len() > 1 {
        item.params.last().cloned().unwrap_or_default()
    } else {
        String::new()
    };
    item.from_channel = irc::is_channel(&item.target);

    if item.from_channel {
        if let Some(rest) = strip_address(&item.payload, ctx.nick) {
            item.payload = rest.to_string();
            item.direct = true;
        }
    } else {
        item.direct = item.target.eq_ignore_ascii_case(ctx.nick);
    }
    Some(item)
}

/// `"bot: hi"` / `"bot, hi"` → `"hi"` when `nick` is `bot`.
fn strip_address<'a>(payload: &'a str, nick: &str) -> Option<&'a str> {
    if nick.is_empty() || payload.len() <= nick.len() {
        return None;
    }
    let (head, tail) = payload.split_at_checked(nick.len())?;
    if !head.eq_ignore_ascii_case(nick) {
        return None;
    }
    let tail = tail.strip_prefix([':', ','])?;
    Some(tail.trim_start())
}

/// Drop lines the relay itself sent.
pub fn ignore_self(ctx: &StageContext<'_>, item: OutboundItem) -> Option<OutboundItem> {
    if item.nick.eq_ignore_ascii_case(ctx.nick) {
        None
    } else {
        Some(item)
    }
}

/// Remove mIRC colour, bold, italic, underline and reset codes from the payload.
pub fn strip_formatting(_: &StageContext<'_>, mut item: OutboundItem) -> Option<OutboundItem> {
    item.payload = strip_codes(&item.payload);
    Some(item)
}

fn strip_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x03' => {
                // Colour: up to two foreground digits, optionally ",bg".
                for _ in 0..2 {
                    if chars.next_if(char::is_ascii_digit).is_none() {
                        break;
                    }
                }
                let mut lookahead = chars.clone();
                if lookahead.next() == Some(',') && lookahead.peek().is_some_and(char::is_ascii_digit)
                {
                    chars.next();
                    for _ in 0..2 {
                        if chars.next_if(char::is_ascii_digit).is_none() {
                            break;
                        }
                    }
                }
            }
            '\x02' | '\x0F' | '\x11' | '\x16' | '\x1D' | '\x1E' | '\x1F' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Tag items whose sender matches an admin entry (nick, host or full mask).
pub fn mark_admin(ctx: &StageContext<'_>, mut item: OutboundItem) -> Option<OutboundItem> {
    let is_admin = !item.mask.is_empty()
        && ctx
            .admins
            .iter()
            .any(|admin| *admin == item.nick || *admin == item.host || *admin == item.mask);
    item.extra.insert("admin".to_string(), Value::Bool(is_admin));
    Some(item)
}
