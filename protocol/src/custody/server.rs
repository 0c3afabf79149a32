//! Server custody: shares kept by a dedicated custody server.
//!
//! Every operation is a two-step token dance. The manager first POSTs to
//! `get_{storage|retrieval|deletion}_token` with a fresh request id; the
//! server answers out of band by pushing `SVBD:{request_id}:{token}`
//! through the owner's secondary channel. Once the token arrives, the
//! manager POSTs the actual `{store|retrieve|delete}_share` call with it.
//! Token issuance therefore strictly happens-before token use, and a
//! network attacker who can reach the server but not the owner's channel
//! holds no usable capability.
//!
//! The HTTP layer itself is an injected [`HttpTransport`]; the bundled
//! [`TcpTransport`] is a minimal HTTP/1.1 client, enough to drive a
//! custody fleet in tests and local setups.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::channel::{Recipient, TokenReceiver};
use crate::metadata::{LocationType, ShareLocation};
use crate::token::Operation;

use super::{CustodyError, ShareManager};

/// A parsed HTTP response: status code and raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body as lossy UTF-8, for error reporting and text responses.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The seam between the manager and the network. Implementations POST a
/// form to `{base_url}/{path}` and hand back the status and body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_form(
        &self,
        base_url: &str,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<HttpResponse, CustodyError>;
}

// ---------------------------------------------------------------------------
// Server share manager
// ---------------------------------------------------------------------------

/// Share manager for the server custody class.
pub struct ServerShareManager {
    transport: Arc<dyn HttpTransport>,
    receiver: Arc<dyn TokenReceiver>,
    /// How long to wait for the secondary channel to deliver a token.
    token_wait: Duration,
}

impl ServerShareManager {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        receiver: Arc<dyn TokenReceiver>,
        token_wait: Duration,
    ) -> Self {
        Self {
            transport,
            receiver,
            token_wait,
        }
    }

    fn check_location(location: &ShareLocation) -> Result<(), CustodyError> {
        if location.location_type != LocationType::Server {
            return Err(CustodyError::WrongLocationType {
                expected: LocationType::Server,
                got: location.location_type,
            });
        }
        location
            .validate()
            .map_err(|e| CustodyError::InvalidLocation(e.to_string()))
    }

    /// Runs the first half of the dance: request a token for `operation`
    /// and wait for it to arrive over the owner's secondary channel.
    async fn obtain_token(
        &self,
        operation: Operation,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<String, CustodyError> {
        let request_id = Uuid::new_v4().to_string();
        let path = format!("get_{}_token", operation.token_noun());
        let fields = [
            ("request_id", request_id.as_str()),
            ("owner_id_type", location.owner_id_type.as_str()),
            ("owner_id", location.owner_id.as_str()),
            ("secret_name", secret_name),
        ];

        let response = self
            .transport
            .post_form(&location.location_name, &path, &fields)
            .await?;
        if response.status != 200 {
            return Err(CustodyError::Server {
                status: response.status,
                body: response.body_text(),
            });
        }

        tracing::debug!(%request_id, operation = %operation, "token requested, waiting for channel delivery");
        let recipient = Recipient::new(location.owner_id_type.clone(), location.owner_id.clone());
        let token = self
            .receiver
            .await_token(&recipient, &request_id, self.token_wait)
            .await?;
        Ok(token)
    }

    /// Runs the second half: the actual share call, carrying the token.
    async fn execute(
        &self,
        operation: Operation,
        token: &str,
        secret_name: &str,
        location: &ShareLocation,
        share_value: Option<&str>,
    ) -> Result<HttpResponse, CustodyError> {
        let path = format!("{}_share", operation.verb());
        let mut fields = vec![
            ("token", token),
            ("owner_id_type", location.owner_id_type.as_str()),
            ("owner_id", location.owner_id.as_str()),
            ("secret_name", secret_name),
        ];
        if let Some(value) = share_value {
            fields.push(("share_value", value));
        }

        let response = self
            .transport
            .post_form(&location.location_name, &path, &fields)
            .await?;
        if response.status != 200 {
            return Err(CustodyError::Server {
                status: response.status,
                body: response.body_text(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ShareManager for ServerShareManager {
    async fn store(
        &self,
        secret_name: &str,
        share: &[u8],
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        let token = self.obtain_token(Operation::Store, secret_name, location).await?;
        let encoded = BASE64.encode(share);
        self.execute(Operation::Store, &token, secret_name, location, Some(&encoded))
            .await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<Vec<u8>, CustodyError> {
        Self::check_location(location)?;
        let token = self
            .obtain_token(Operation::Retrieve, secret_name, location)
            .await?;
        let response = self
            .execute(Operation::Retrieve, &token, secret_name, location, None)
            .await?;

        let body = response.body_text();
        BASE64
            .decode(body.trim())
            .map_err(|e| CustodyError::BadResponse(format!("share body is not base64: {e}")))
    }

    async fn delete(
        &self,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        let token = self
            .obtain_token(Operation::Delete, secret_name, location)
            .await?;
        self.execute(Operation::Delete, &token, secret_name, location, None)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Minimal TCP transport
// ---------------------------------------------------------------------------

/// Minimal HTTP/1.1 POST over a plain `tokio::net::TcpStream`.
///
/// The URL scheme is advisory: an `https://` location is dialed as plain
/// TCP on its stated port (default 443), which lets test fleets terminate
/// `https` locations with plain listeners. Production custody traffic
/// goes through a TLS terminator in front of the server, outside this
/// crate.
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpTransport for TcpTransport {
    async fn post_form(
        &self,
        base_url: &str,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<HttpResponse, CustodyError> {
        let (host, port) = parse_authority(base_url)
            .ok_or_else(|| CustodyError::Transport(format!("unparseable URL {base_url:?}")))?;

        let body = encode_form(fields);
        let request = format!(
            "POST /{path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        );

        let addr = format!("{host}:{port}");
        let mut stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| CustodyError::Transport(format!("connect {addr}: {e}")))?;
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| CustodyError::Transport(format!("write: {e}")))?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|e| CustodyError::Transport(format!("read: {e}")))?;

        parse_response(&raw)
    }
}

/// Extracts `(host, port)` from an `http(s)://host[:port][/...]` URL.
fn parse_authority(url: &str) -> Option<(String, u16)> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (80, rest)
    } else {
        return None;
    };

    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((authority.to_string(), default_port)),
    }
}

/// Percent-encodes form fields as `application/x-www-form-urlencoded`.
fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", form_escape(k), form_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Splits a raw HTTP/1.1 response into status code and body.
fn parse_response(raw: &[u8]) -> Result<HttpResponse, CustodyError> {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| CustodyError::Transport("response has no header terminator".into()))?;

    let head = std::str::from_utf8(&raw[..header_end])
        .map_err(|_| CustodyError::Transport("response head is not UTF-8".into()))?;
    let status_line = head.lines().next().unwrap_or_default();

    // "HTTP/1.1 200 OK" — the status is the second token.
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| {
            CustodyError::Transport(format!("malformed status line {status_line:?}"))
        })?;

    Ok(HttpResponse {
        status,
        body: raw[header_end + 4..].to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
