//! File-based channel backend for tests and local development.
//!
//! Sending appends one line per message to an append-only file per
//! recipient under a spool directory. Receiving polls the recipient's
//! file until a line answering the awaited request id appears. Real
//! deployments swap this for an SMS or email sender; the tests read and
//! write the same spool the server writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{ChannelError, Recipient, SecondaryChannel, TokenMessage, TokenReceiver};

/// How often the receiver re-reads the recipient file while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spool-directory channel. One instance serves both directions: the
/// server sends through it, the client receives through it.
#[derive(Debug, Clone)]
pub struct FileChannel {
    spool_dir: PathBuf,
}

impl FileChannel {
    /// Creates the channel, making the spool directory if needed.
    pub fn new<P: AsRef<Path>>(spool_dir: P) -> Result<Self, ChannelError> {
        let spool_dir = spool_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&spool_dir)?;
        Ok(Self { spool_dir })
    }

    /// Path of the append-only inbox for one recipient. Both id parts are
    /// sanitized so ids like email addresses cannot escape the spool.
    fn recipient_file(&self, recipient: &Recipient) -> PathBuf {
        let name = format!(
            "{}_{}",
            sanitize(&recipient.id_type),
            sanitize(&recipient.id)
        );
        self.spool_dir.join(name)
    }
}

/// Maps anything outside `[A-Za-z0-9.-]` to `_`.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SecondaryChannel for FileChannel {
    async fn send(&self, recipient: &Recipient, message: &str) -> Result<(), ChannelError> {
        let path = self.recipient_file(recipient);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(message.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        tracing::debug!(recipient = %path.display(), "channel message spooled");
        Ok(())
    }
}

#[async_trait]
impl TokenReceiver for FileChannel {
    async fn await_token(
        &self,
        recipient: &Recipient,
        request_id: &str,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        let path = self.recipient_file(recipient);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // The file may not exist yet; that just means nothing has been
            // delivered so far.
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                for line in contents.lines() {
                    // Foreign or damaged lines in a shared inbox are
                    // skipped, not fatal.
                    if let Ok(msg) = TokenMessage::parse(line) {
                        if msg.request_id == request_id {
                            return Ok(msg.token);
                        }
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ChannelError::Timeout {
                    request_id: request_id.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
