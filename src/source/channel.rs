#![allow(clippy::non_std_lazy_statics)]

use super::ChatIdentity;
use lazy_regex::lazy_regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Public Telegram usernames: 5-32 chars, letter first
static RE_USERNAME: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^[A-Za-z][A-Za-z0-9_]{4,31}$");

/// Invalid channel identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid channel identifier: {0}")]
pub struct ChannelRefError(pub String);

/// A channel named by numeric ID or public username
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Numeric chat ID, e.g. `-1001234567890`
    Id(i64),
    /// Username without `@`
    Username(String),
}

impl ChannelRef {
    /// True when `chat` is this channel. Usernames compare case-insensitively.
    #[must_use]
    pub fn matches(&self, chat: &ChatIdentity) -> bool {
        match self {
            Self::Id(id) => chat.id == *id,
            Self::Username(name) => chat
                .username
                .as_deref()
                .is_some_and(|username| username.eq_ignore_ascii_case(name)),
        }
    }
}

impl FromStr for ChannelRef {
    type Err = ChannelRefError;

    /// Accepts `-100123…`, `@name`, `name`, `t.me/name` and `https://t.me/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(Self::Id(id));
        }

        let name = ["https://t.me/", "http://t.me/", "t.me/", "@"]
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
            .unwrap_or(raw)
            .trim_end_matches('/');

        if RE_USERNAME.is_match(name) {
            Ok(Self::Username(name.to_string()))
        } else {
            Err(ChannelRefError(raw.to_string()))
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("-1001234567890".parse(), Ok(ChannelRef::Id(-1_001_234_567_890)));
        assert_eq!(
            "@my_channel".parse(),
            Ok(ChannelRef::Username("my_channel".into()))
        );
        assert_eq!(
            "https://t.me/my_channel/".parse(),
            Ok(ChannelRef::Username("my_channel".into()))
        );
        assert_eq!(
            " my_channel ".parse(),
            Ok(ChannelRef::Username("my_channel".into()))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("@ab".parse::<ChannelRef>().is_err());
        assert!("t.me/+invite".parse::<ChannelRef>().is_err());
        assert!("".parse::<ChannelRef>().is_err());
    }

    #[test]
    fn test_matches() {
        let chat = ChatIdentity {
            id: -100_42,
            username: Some("MyChannel".into()),
        };
        assert!(ChannelRef::Id(-100_42).matches(&chat));
        assert!(ChannelRef::Username("mychannel".into()).matches(&chat));
        assert!(!ChannelRef::Username("other_chan".into()).matches(&chat));

        let private = ChatIdentity {
            id: -100_42,
            username: None,
        };
        assert!(!ChannelRef::Username("mychannel".into()).matches(&private));
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(ChannelRef::Username("chan_x".into()).to_string(), "@chan_x");
        assert_eq!(ChannelRef::Id(-100_1).to_string(), "-1001");
    }
}
