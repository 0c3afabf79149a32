//! # Secondary Channel
//!
//! The out-of-band path a custody server uses to deliver freshly minted
//! tokens to the share owner: SMS, email, or — for tests and local
//! development — a spool of per-recipient files. The channel is strictly
//! one-way from the server's point of view; the client owns the receiving
//! side and polls whatever inbox the channel writes to.
//!
//! Every message is a single line of the exact form
//! `SVBD:{request_id}:{token}`.

pub mod file;

pub use file::FileChannel;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CHANNEL_PREFIX;

/// Errors from formatting, parsing, or moving channel messages.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Neither message field may contain the separator.
    #[error("{0} must not contain ':'")]
    IllegalColon(&'static str),

    /// The line does not carry the channel prefix.
    #[error("message prefix {0:?} is not {CHANNEL_PREFIX:?}")]
    BadPrefix(String),

    /// The line does not have the three-part shape.
    #[error("malformed channel message")]
    Malformed,

    /// The channel transport failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No matching token arrived in time.
    #[error("no token delivered for request {request_id} within {waited_ms}ms")]
    Timeout { request_id: String, waited_ms: u64 },
}

/// Who a channel message is addressed to, as an (id type, id) pair —
/// e.g. `("email", "owner@example.com")` or `("phone", "+15551234567")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub id_type: String,
    pub id: String,
}

impl Recipient {
    pub fn new(id_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id_type: id_type.into(),
            id: id.into(),
        }
    }
}

/// The `request_id`/`token` pair a channel line carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMessage {
    pub request_id: String,
    pub token: String,
}

impl TokenMessage {
    /// Renders the message as the wire line `SVBD:{request_id}:{token}`.
    ///
    /// Rejects a colon in either field — the line format has no escaping,
    /// so a colon would shift the token boundary for every parser.
    pub fn format(&self) -> Result<String, ChannelError> {
        if self.request_id.contains(':') {
            return Err(ChannelError::IllegalColon("request_id"));
        }
        if self.token.contains(':') {
            return Err(ChannelError::IllegalColon("token"));
        }
        Ok(format!(
            "{CHANNEL_PREFIX}:{}:{}",
            self.request_id, self.token
        ))
    }

    /// Parses a wire line. Splits on the first two colons only, so a
    /// foreign sender's token containing colons still parses as one
    /// token.
    pub fn parse(line: &str) -> Result<Self, ChannelError> {
        let mut parts = line.splitn(3, ':');
        let prefix = parts.next().ok_or(ChannelError::Malformed)?;
        let request_id = parts.next().ok_or(ChannelError::Malformed)?;
        let token = parts.next().ok_or(ChannelError::Malformed)?;

        if prefix != CHANNEL_PREFIX {
            return Err(ChannelError::BadPrefix(prefix.to_string()));
        }
        Ok(Self {
            request_id: request_id.to_string(),
            token: token.to_string(),
        })
    }
}

/// One-way sender of channel messages. Implemented by the concrete
/// transports (SMS gateway, SMTP relay, spool file).
#[async_trait]
pub trait SecondaryChannel: Send + Sync {
    /// Delivers `message` to `recipient`. Resolves once the transport has
    /// accepted the message; actual delivery is best-effort beyond that.
    async fn send(&self, recipient: &Recipient, message: &str) -> Result<(), ChannelError>;
}

/// Client-side receiving end: waits for the token answering a specific
/// request id to show up in the recipient's inbox.
#[async_trait]
pub trait TokenReceiver: Send + Sync {
    /// Blocks until a `SVBD:{request_id}:…` message for `recipient`
    /// arrives, returning its token. Fails with
    /// [`ChannelError::Timeout`] once `timeout` has elapsed.
    async fn await_token(
        &self,
        recipient: &Recipient,
        request_id: &str,
        timeout: std::time::Duration,
    ) -> Result<String, ChannelError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_round_trips() {
        let msg = TokenMessage {
            request_id: "reqID1".into(),
            token: "someToken".into(),
        };
        let line = msg.format().unwrap();
        assert_eq!(line, "SVBD:reqID1:someToken");
        assert_eq!(TokenMessage::parse(&line).unwrap(), msg);
    }

    #[test]
    fn colons_are_rejected_at_format_time() {
        let msg = TokenMessage {
            request_id: "req:1".into(),
            token: "tok".into(),
        };
        assert!(matches!(
            msg.format(),
            Err(ChannelError::IllegalColon("request_id"))
        ));

        let msg = TokenMessage {
            request_id: "req1".into(),
            token: "to:k".into(),
        };
        assert!(matches!(
            msg.format(),
            Err(ChannelError::IllegalColon("token"))
        ));
    }

    #[test]
    fn parse_splits_on_the_first_two_colons() {
        // A foreign token containing colons stays one token.
        let msg = TokenMessage::parse("SVBD:req1:to:k:en").unwrap();
        assert_eq!(msg.request_id, "req1");
        assert_eq!(msg.token, "to:k:en");
    }

    #[test]
    fn parse_validates_the_prefix() {
        assert!(matches!(
            TokenMessage::parse("XVBD:req1:tok"),
            Err(ChannelError::BadPrefix(_))
        ));
        assert!(matches!(
            TokenMessage::parse("SVBD-req1-tok"),
            Err(ChannelError::Malformed)
        ));
        assert!(matches!(
            TokenMessage::parse("SVBD:only-one-part"),
            Err(ChannelError::Malformed)
        ));
    }
}
