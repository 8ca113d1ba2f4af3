//! Upstream connection and streaming relay.
//!
//! One upstream connection per proxied client request. The request head is
//! rewritten and sent, the body is streamed through, and the upstream
//! response is relayed to the client chunk by chunk as it arrives. Nothing
//! is buffered beyond the copy buffer, so long-lived event streams flow
//! through and the client sees upstream bytes as soon as they are written.

use crate::http::request::RequestHead;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::rule::ProxyRule;
use crate::proxy::tls;
use anyhow::{Context, Result};
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// Copy buffer size for streaming in both directions
const BUFFER_SIZE: usize = 8192;

/// Hop-by-hop headers stripped before forwarding (RFC 7230 §6.1).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
    "TE",
    "Trailer",
];

/// Unified stream type for plain and TLS upstream connections.
trait UpstreamIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> UpstreamIo for T {}

enum ConnectError {
    Timeout,
    Unreachable(anyhow::Error),
}

/// Forwards matched requests to their rule's upstream.
///
/// Holds the connect timeout and the two shared TLS client configs; the
/// per-rule `secure` flag picks which one an https connection uses.
pub struct Forwarder {
    connect_timeout: Duration,
    secure_tls: Arc<ClientConfig>,
    insecure_tls: Arc<ClientConfig>,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        Ok(Self {
            connect_timeout,
            secure_tls: tls::secure_client_config()?,
            insecure_tls: tls::insecure_client_config()?,
        })
    }

    /// Drive one proxied exchange over the client socket.
    ///
    /// `leftover` holds body bytes the connection already read past the
    /// request head; they are sent upstream before the rest of the body is
    /// streamed from the socket. Connect failures are answered with a
    /// gateway error; a client disconnect mid-stream just tears everything
    /// down.
    pub async fn relay(
        &self,
        client: &mut TcpStream,
        head: &RequestHead,
        leftover: &[u8],
        rule: &ProxyRule,
    ) -> Result<()> {
        let mut upstream = match self.connect(rule).await {
            Ok(io) => io,
            Err(ConnectError::Timeout) => {
                tracing::warn!(
                    upstream = %rule.target,
                    path = %head.path,
                    "Upstream connect timed out"
                );
                return self.respond_locally(client, Response::gateway_timeout()).await;
            }
            Err(ConnectError::Unreachable(e)) => {
                tracing::warn!(
                    upstream = %rule.target,
                    path = %head.path,
                    error = %e,
                    "Upstream unreachable"
                );
                return self.respond_locally(client, Response::bad_gateway()).await;
            }
        };

        // Send the rewritten head, then stream the body through.
        let head_bytes = self.build_upstream_head(head, rule);
        upstream
            .write_all(&head_bytes)
            .await
            .context("Failed to write request head to upstream")?;

        self.stream_request_body(client, &mut *upstream, head, leftover)
            .await?;

        upstream.flush().await?;

        // Relay the response verbatim until upstream EOF. The upstream leg
        // is Connection: close, so EOF marks the end of the response.
        let relayed = self.stream_response(&mut *upstream, client).await?;

        tracing::info!(
            upstream = %rule.target,
            method = head.method.as_str(),
            path = %head.path,
            bytes = relayed,
            "Proxied request completed"
        );

        Ok(())
    }

    /// Connect to the rule's target, wrapping in TLS for https schemes.
    async fn connect(&self, rule: &ProxyRule) -> std::result::Result<Box<dyn UpstreamIo>, ConnectError> {
        let host = rule.target.host_str().unwrap_or_default().to_string();
        let port = rule.target.port().unwrap_or(match rule.target.scheme() {
            "https" => 443,
            _ => 80,
        });

        let addr = format!("{}:{}", host, port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectError::Timeout)?
            .map_err(|e| ConnectError::Unreachable(e.into()))?;

        tracing::trace!(addr = %addr, "Connected to upstream");

        if rule.target.scheme() != "https" {
            return Ok(Box::new(stream));
        }

        let config = if rule.secure {
            self.secure_tls.clone()
        } else {
            self.insecure_tls.clone()
        };

        let server_name = ServerName::try_from(host)
            .map_err(|e| ConnectError::Unreachable(anyhow::anyhow!("Invalid server name: {}", e)))?;

        let tls_stream = timeout(
            self.connect_timeout,
            TlsConnector::from(config).connect(server_name, stream),
        )
        .await
        .map_err(|_| ConnectError::Timeout)?
        .map_err(|e| ConnectError::Unreachable(anyhow::anyhow!("TLS handshake failed: {}", e)))?;

        Ok(Box::new(tls_stream))
    }

    /// Build the request head bytes to send upstream.
    ///
    /// Method, path, and version are preserved, and headers keep the
    /// client's order (repeated lines included). Hop-by-hop headers are
    /// stripped and the upstream leg is pinned to Connection: close. When
    /// the rule sets `change_origin`, Host (and Origin, if the client sent
    /// one) are rewritten to the target's host.
    ///
    /// Public so tests can assert on the exact bytes.
    pub fn build_upstream_head(&self, head: &RequestHead, rule: &ProxyRule) -> Vec<u8> {
        let mut buffer = Vec::new();

        buffer.extend_from_slice(
            format!("{} {} {}\r\n", head.method.as_str(), head.path, head.version).as_bytes(),
        );

        let mut headers = head.headers.clone();

        headers.retain(|(k, _)| {
            !HOP_BY_HOP_HEADERS.iter().any(|&h| k.eq_ignore_ascii_case(h))
        });

        if rule.change_origin {
            let target_host = rule.target_host();

            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Host"));
            headers.push(("Host".to_string(), target_host.clone()));

            if head.header("Origin").is_some() {
                let origin = format!("{}://{}", rule.target.scheme(), target_host);
                headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Origin"));
                headers.push(("Origin".to_string(), origin));
            }
        }

        headers.push(("Connection".to_string(), "close".to_string()));

        for (key, value) in &headers {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        buffer.extend_from_slice(b"\r\n");
        buffer
    }

    /// Stream the Content-Length-delimited request body to the upstream.
    async fn stream_request_body(
        &self,
        client: &mut TcpStream,
        upstream: &mut (dyn UpstreamIo),
        head: &RequestHead,
        leftover: &[u8],
    ) -> Result<()> {
        let content_length = head.content_length();
        if content_length == 0 {
            return Ok(());
        }

        let from_buffer = leftover.len().min(content_length);
        upstream
            .write_all(&leftover[..from_buffer])
            .await
            .context("Failed to write request body to upstream")?;

        let mut remaining = content_length - from_buffer;
        let mut buf = [0u8; BUFFER_SIZE];

        while remaining > 0 {
            let to_read = remaining.min(BUFFER_SIZE);
            let n = client
                .read(&mut buf[..to_read])
                .await
                .context("Failed to read request body from client")?;

            if n == 0 {
                anyhow::bail!("Client closed connection before body was complete");
            }

            upstream
                .write_all(&buf[..n])
                .await
                .context("Failed to write request body to upstream")?;

            remaining -= n;
        }

        Ok(())
    }

    /// Copy upstream response bytes to the client as they arrive.
    ///
    /// Each chunk is flushed immediately so event-stream data reaches the
    /// client without waiting for the response to complete. Returns the
    /// number of bytes relayed.
    ///
    /// The client side is watched for EOF while the upstream is quiet, so
    /// a client that walks away from a long-lived stream tears the
    /// upstream connection down promptly instead of leaving it parked on a
    /// read. A client-side write failure means the same thing; neither is
    /// an error.
    async fn stream_response(
        &self,
        upstream: &mut (dyn UpstreamIo),
        client: &mut TcpStream,
    ) -> Result<u64> {
        let (mut client_read, mut client_write) = client.split();

        let mut buf = [0u8; BUFFER_SIZE];
        let mut probe = [0u8; 512];
        let mut relayed: u64 = 0;

        loop {
            tokio::select! {
                res = upstream.read(&mut buf) => {
                    let n = res.context("Failed to read response from upstream")?;

                    if n == 0 {
                        break;
                    }

                    if let Err(e) = client_write.write_all(&buf[..n]).await {
                        tracing::debug!(error = %e, "Client disconnected mid-stream");
                        return Ok(relayed);
                    }
                    client_write.flush().await.ok();

                    relayed += n as u64;
                }

                res = client_read.read(&mut probe) => {
                    match res {
                        Ok(0) | Err(_) => {
                            tracing::debug!("Client disconnected mid-stream");
                            return Ok(relayed);
                        }
                        // Stray bytes from the client during a response are
                        // not part of any supported exchange; drop them.
                        Ok(_) => {}
                    }
                }
            }
        }

        Ok(relayed)
    }

    async fn respond_locally(&self, client: &mut TcpStream, response: Response) -> Result<()> {
        ResponseWriter::new(&response)
            .write_to_stream(client)
            .await
    }
}
