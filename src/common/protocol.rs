//! Text wire protocol shared by coordinators, slaves and clients
//!
//! Every message is a single `\n`-terminated line of at most [`MAX_FRAME_LEN`] bytes:
//!
//! ```text
//! handshake      CLIENT | SLAVE | MASTER | BACKUP
//! requests       WRITE <key> <value>
//!                READ <key>
//! slave replies  <key> <value> ACK        (write)
//!                <key> <value>            (read hit)
//!                <key> NOT FOUND          (read miss)
//! client replies WRITE_DONE | <key> <value> | NOT FOUND | INVALID_COMMAND
//! ```
//!
//! Keys and values are single tokens; they cannot contain spaces or newlines.

use tokio_util::codec::LinesCodec;

/// Largest frame accepted on any connection, terminator excluded
pub const MAX_FRAME_LEN: usize = 1024;

pub const WRITE_DONE: &str = "WRITE_DONE";
pub const NOT_FOUND: &str = "NOT FOUND";
pub const INVALID_COMMAND: &str = "INVALID_COMMAND";
pub const ACK: &str = "ACK";
pub const PING: &str = "PING";

/// Line codec with the protocol's frame limit
pub fn codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LEN)
}

/// Role announced in the first message of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Client,
    Slave,
    Master,
    Backup,
}

impl PeerRole {
    /// Parse a handshake line. Anything but an exact tag is unrecognized.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim_end() {
            "CLIENT" => Some(PeerRole::Client),
            "SLAVE" => Some(PeerRole::Slave),
            "MASTER" => Some(PeerRole::Master),
            "BACKUP" => Some(PeerRole::Backup),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRole::Client => "CLIENT",
            PeerRole::Slave => "SLAVE",
            PeerRole::Master => "MASTER",
            PeerRole::Backup => "BACKUP",
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A READ or WRITE, as sent by clients and forwarded verbatim to slaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Write { key: String, value: String },
    Read { key: String },
}

/// Why a line is not a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer fields than the command needs; dropped without a reply
    Incomplete,
    /// Unknown verb or extra fields; answered with `INVALID_COMMAND`
    Invalid,
}

impl Request {
    pub fn parse(line: &str) -> std::result::Result<Self, ParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(ParseError::Incomplete);
        }
        match (fields[0], fields.len()) {
            ("WRITE", 3) => Ok(Request::Write {
                key: fields[1].to_string(),
                value: fields[2].to_string(),
            }),
            ("READ", 2) => Ok(Request::Read {
                key: fields[1].to_string(),
            }),
            ("WRITE", 2) => Err(ParseError::Incomplete),
            _ => Err(ParseError::Invalid),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Request::Write { key, .. } | Request::Read { key } => key,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Request::Write { key, value } => format!("WRITE {} {}", key, value),
            Request::Read { key } => format!("READ {}", key),
        }
    }
}

/// The reply a slave gives for a key it does not hold
pub fn not_found_for(key: &str) -> String {
    format!("{} {}", key, NOT_FOUND)
}

/// `<key> <value>` read reply
pub fn value_line(key: &str, value: &str) -> String {
    format!("{} {}", key, value)
}

/// `<key> <value> ACK` write acknowledgment
pub fn ack_line(key: &str, value: &str) -> String {
    format!("{} {} {}", key, value, ACK)
}

/// Whether `reply` acknowledges a write of `key`
pub fn is_ack_for(reply: &str, key: &str) -> bool {
    let mut fields = reply.split_whitespace();
    fields.next() == Some(key) && reply.trim_end().ends_with(ACK)
}

/// True when a token can travel in a single protocol field
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && !token.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_tags() {
        assert_eq!(PeerRole::parse("CLIENT"), Some(PeerRole::Client));
        assert_eq!(PeerRole::parse("SLAVE\r"), Some(PeerRole::Slave));
        assert_eq!(PeerRole::parse("MASTER"), Some(PeerRole::Master));
        assert_eq!(PeerRole::parse("BACKUP"), Some(PeerRole::Backup));
        assert_eq!(PeerRole::parse("client"), None);
        assert_eq!(PeerRole::parse("HELLO"), None);
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Request::parse("WRITE color blue"),
            Ok(Request::Write {
                key: "color".into(),
                value: "blue".into()
            })
        );
        assert_eq!(
            Request::parse("READ color\r"),
            Ok(Request::Read { key: "color".into() })
        );
    }

    #[test]
    fn test_short_lines_are_incomplete() {
        assert_eq!(Request::parse(""), Err(ParseError::Incomplete));
        assert_eq!(Request::parse("READ"), Err(ParseError::Incomplete));
        assert_eq!(Request::parse("   "), Err(ParseError::Incomplete));
        assert_eq!(Request::parse("WRITE color"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_malformed_lines_are_invalid() {
        assert_eq!(Request::parse("DELETE color"), Err(ParseError::Invalid));
        assert_eq!(Request::parse("READ a b"), Err(ParseError::Invalid));
        assert_eq!(Request::parse("WRITE a b c"), Err(ParseError::Invalid));
    }

    #[test]
    fn test_encode_matches_wire_form() {
        let write = Request::Write {
            key: "k".into(),
            value: "v".into(),
        };
        assert_eq!(write.encode(), "WRITE k v");
        assert_eq!(Request::parse(&write.encode()), Ok(write));
        assert_eq!(Request::Read { key: "k".into() }.encode(), "READ k");
    }

    #[test]
    fn test_reply_helpers() {
        assert_eq!(not_found_for("k"), "k NOT FOUND");
        assert_eq!(value_line("k", "v"), "k v");
        assert!(is_ack_for(&ack_line("k", "v"), "k"));
        assert!(!is_ack_for("k v", "k"));
        assert!(!is_ack_for("other v ACK", "k"));
    }

    #[test]
    fn test_tokens() {
        assert!(is_valid_token("user:42"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("two words"));
        assert!(!is_valid_token("line\nbreak"));
    }
}
