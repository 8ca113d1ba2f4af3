use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::RequestHead;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::ServerContext;

/// One accepted client connection.
///
/// Runs the per-request state machine: read a request head, match it
/// against the rule set, then either hand the socket to the forwarder or
/// answer with the default handler. A proxied exchange always ends the
/// connection (the upstream leg is Connection: close); default responses
/// honor keep-alive.
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    state: ConnectionState,
    ctx: Arc<ServerContext>,
}

pub enum ConnectionState {
    Reading,
    Matching(RequestHead),
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, ctx: Arc<ServerContext>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Reading,
            ctx,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    match self.read_head().await? {
                        Some(head) => {
                            self.state = ConnectionState::Matching(head);
                        }
                        None => {
                            self.state = ConnectionState::Closed;
                        }
                    }
                }

                ConnectionState::Matching(head) => {
                    self.state = self.dispatch(head).await?;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Route one parsed request: forward on a rule match, otherwise serve
    /// the default response. Returns the next connection state.
    async fn dispatch(&mut self, head: RequestHead) -> anyhow::Result<ConnectionState> {
        if head.is_chunked() {
            let mut writer = ResponseWriter::new(&Response::bad_request(
                "chunked request bodies are not supported",
            ));
            writer.write_to_stream(&mut self.stream).await?;
            return Ok(ConnectionState::Closed);
        }

        let rule = self.ctx.rules.find(&head.path).cloned();

        match rule {
            Some(rule) => {
                tracing::debug!(
                    prefix = %rule.path_prefix,
                    upstream = %rule.target,
                    method = head.method.as_str(),
                    path = %head.path,
                    "Rule matched, forwarding"
                );

                // Whatever was read past the head is the start of the body.
                let leftover = std::mem::take(&mut self.buffer);
                self.ctx
                    .forwarder
                    .relay(&mut self.stream, &head, &leftover, &rule)
                    .await?;

                Ok(ConnectionState::Closed)
            }

            None => {
                tracing::debug!(path = %head.path, "No rule matched, serving default response");

                self.discard_body(&head).await?;

                let mut writer = ResponseWriter::new(&Response::not_found());
                writer.write_to_stream(&mut self.stream).await?;

                if head.keep_alive() {
                    Ok(ConnectionState::Reading)
                } else {
                    Ok(ConnectionState::Closed)
                }
            }
        }
    }

    /// Read and parse the next request head, buffering as needed.
    ///
    /// Returns None when the client closes the connection between
    /// requests, or after a malformed request has been answered with 400.
    /// Bytes past the head stay in the buffer for body streaming.
    pub async fn read_head(&mut self) -> anyhow::Result<Option<RequestHead>> {
        loop {
            match parse_request_head(&self.buffer) {
                Ok((head, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some(head));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data, fall through to read
                }

                Err(e) => {
                    tracing::debug!("Rejecting malformed request: {:?}", e);
                    let mut writer = ResponseWriter::new(&Response::bad_request(
                        "malformed request head",
                    ));
                    writer.write_to_stream(&mut self.stream).await?;
                    return Ok(None);
                }
            }

            if self.buffer.len() > 64 * 1024 {
                anyhow::bail!("Request head too large");
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }
        }
    }

    /// Consume the request body of a non-proxied request so a keep-alive
    /// connection is positioned at the next request.
    async fn discard_body(&mut self, head: &RequestHead) -> anyhow::Result<()> {
        let content_length = head.content_length();

        let buffered = self.buffer.len().min(content_length);
        self.buffer.advance(buffered);

        let mut remaining = content_length - buffered;
        let mut scratch = [0u8; 1024];

        while remaining > 0 {
            let to_read = remaining.min(scratch.len());
            let n = self.stream.read(&mut scratch[..to_read]).await?;

            if n == 0 {
                anyhow::bail!("Client closed connection before body was complete");
            }

            remaining -= n;
        }

        Ok(())
    }
}
