//! Protocol line grammar.
//!
//! Lines follow the RFC 2812 shape:
//!   [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
//!
//! Parsing operates on the content without the `\r\n` terminator. The
//! formatting helpers build the handful of commands the relay itself emits.

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Optional prefix (server name or `nick!user@host`).
    pub prefix: Option<String>,
    /// The command (e.g. `PRIVMSG`, `001`, `NICK`).
    pub command: String,
    /// Parameters; the last may have been a trailing param (with spaces).
    pub params: Vec<String>,
}

/// Errors that can occur during line parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("prefix present but missing command")]
    MissingCommand,
}

impl Line {
    /// Parse a single line (a trailing `\r\n` or `\n` is ignored).
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = match input.strip_prefix(':') {
            Some(after) => match after.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix.to_owned()), rest),
                None => return Err(ParseError::MissingCommand),
            },
            None => (None, input),
        };

        let rest = rest.trim_start_matches(' ');
        let (command, param_str) = match rest.split_once(' ') {
            Some((command, params)) => (command, Some(params)),
            None => (rest, None),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        if let Some(mut remaining) = param_str {
            while !remaining.is_empty() {
                if let Some(trailing) = remaining.strip_prefix(':') {
                    params.push(trailing.to_owned());
                    break;
                }
                match remaining.split_once(' ') {
                    Some((param, tail)) => {
                        if !param.is_empty() {
                            params.push(param.to_owned());
                        }
                        remaining = tail;
                    }
                    None => {
                        params.push(remaining.to_owned());
                        break;
                    }
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_owned(),
            params,
        })
    }

    /// The last parameter, which carries free text for most commands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

/// The sender of a line, borrowed from its `nick!user@host` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'a> {
    pub nick: &'a str,
    pub user: &'a str,
    pub host: &'a str,
}

impl<'a> Source<'a> {
    /// Server prefixes (no `!`) yield the whole mask as the nick.
    pub fn from_mask(mask: &'a str) -> Self {
        let (nick, rest) = mask.split_once('!').unwrap_or((mask, ""));
        let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
        Self { nick, user, host }
    }
}

/// Whether a target names a channel rather than a user.
pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Replace embedded line breaks so a value cannot smuggle extra commands.
pub fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// A message target is one non-empty word with no line breaks and no
/// leading `:`.
pub fn is_valid_target(target: &str) -> bool {
    !target.is_empty()
        && !target.starts_with(':')
        && !target.contains([' ', '\r', '\n', '\0'])
}

/// `PASS <password>`
pub fn pass(password: &str) -> String {
    format!("PASS {password}")
}

/// `NICK <nick>`
pub fn nick(nick: &str) -> String {
    format!("NICK {nick}")
}

/// `USER <ident> <host> bla :<realname>`
pub fn user(ident: &str, host: &str, realname: &str) -> String {
    format!("USER {ident} {host} bla :{realname}")
}

/// `JOIN <channel>` or `JOIN <channel> <secret>`.
pub fn join(channel: &str, secret: Option<&str>) -> String {
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => format!("JOIN {channel} {secret}"),
        None => format!("JOIN {channel}"),
    }
}

/// `PRIVMSG <target> :<message>` terminated with `\r\n`.
///
/// Line breaks in either argument are flattened to spaces; callers should
/// check the target with [`is_valid_target`] first.
pub fn privmsg(target: &str, message: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", sanitize(target), sanitize(message))
}

/// `QUIT :<message>`
pub fn quit(message: &str) -> String {
    format!("QUIT :{message}")
}

/// `PONG :<token>`
pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}
