//! Parsing of the game connection path, `/ws/{session_id}/{player_id}`.

use crate::{PlayerId, ProtocolError, SessionId};

/// Path prefix every game connection must use.
pub const WS_PREFIX: &str = "/ws/";

/// Default upper bound on the length of either identifier, in bytes.
pub const DEFAULT_MAX_ID_LEN: usize = 64;

/// The identities a connection claims through its request path.
///
/// Segments are taken verbatim: no percent-decoding and no normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsRoute {
    pub session_id: SessionId,
    pub player_id: PlayerId,
}

impl WsRoute {
    /// Parses `path`, requiring exactly two non-empty segments after
    /// [`WS_PREFIX`], each at most `max_id_len` bytes long.
    pub fn parse(path: &str, max_id_len: usize) -> Result<Self, ProtocolError> {
        let invalid = |reason| ProtocolError::InvalidRoute {
            path: path.to_owned(),
            reason,
        };

        let rest = path
            .strip_prefix(WS_PREFIX)
            .ok_or_else(|| invalid("expected /ws/{session_id}/{player_id}"))?;

        let (session, player) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing player id"))?;

        if session.is_empty() {
            return Err(invalid("empty session id"));
        }
        if player.is_empty() {
            return Err(invalid("empty player id"));
        }
        if player.contains('/') {
            return Err(invalid("too many path segments"));
        }
        if session.len() > max_id_len || player.len() > max_id_len {
            return Err(invalid("identifier too long"));
        }

        Ok(Self {
            session_id: SessionId::from(session),
            player_id: PlayerId::from(player),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Result<WsRoute, ProtocolError> {
        WsRoute::parse(path, DEFAULT_MAX_ID_LEN)
    }

    #[test]
    fn test_parse_valid_route() {
        let route = parse("/ws/abc/p1").unwrap();
        assert_eq!(route.session_id, SessionId::from("abc"));
        assert_eq!(route.player_id, PlayerId::from("p1"));
    }

    #[test]
    fn test_parse_keeps_segments_verbatim() {
        let route = parse("/ws/room%201/Player.One").unwrap();
        assert_eq!(route.session_id.as_str(), "room%201");
        assert_eq!(route.player_id.as_str(), "Player.One");
    }

    #[test]
    fn test_parse_rejects_wrong_prefix() {
        assert!(parse("/game/abc").is_err());
        assert!(parse("/").is_err());
        assert!(parse("ws/abc/p1").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_or_empty_segments() {
        assert!(parse("/ws/abc").is_err());
        assert!(parse("/ws/abc/").is_err());
        assert!(parse("/ws//p1").is_err());
    }

    #[test]
    fn test_parse_rejects_extra_segments() {
        assert!(parse("/ws/abc/p1/extra").is_err());
        assert!(parse("/ws/abc/p1/").is_err());
    }

    #[test]
    fn test_parse_enforces_length_limit() {
        let long = "x".repeat(9);
        assert!(WsRoute::parse(&format!("/ws/{long}/p1"), 8).is_err());
        assert!(WsRoute::parse(&format!("/ws/abc/{long}"), 8).is_err());
        assert!(WsRoute::parse("/ws/abcdefgh/p1", 8).is_ok());
    }

    #[test]
    fn test_invalid_route_error_names_the_path() {
        let err = parse("/nope").unwrap_err();
        assert!(err.to_string().contains("/nope"));
    }
}
