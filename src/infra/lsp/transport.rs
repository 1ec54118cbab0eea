//! LSP Transport Layer
//!
//! `Content-Length` framing over any async byte stream. The reader separates
//! fatal stream errors (EOF, IO) from malformed frames, which callers skip.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{Message, Notification, Request, Response};

/// Largest body accepted from a server; a bigger declared length poisons the stream.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Result of reading one frame
#[derive(Debug)]
pub enum ReadOutcome {
    Message(Message),
    /// The frame was consumed but could not be decoded
    Malformed(String),
}

pub struct Transport<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> Transport<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame
    ///
    /// ```text
    /// Content-Length: 123\r\n
    /// \r\n
    /// {"jsonrpc":"2.0",...}
    /// ```
    ///
    /// Returns `Err` only when the stream itself is unusable.
    pub async fn read_message(&mut self) -> io::Result<ReadOutcome> {
        let content_length = match self.read_headers().await? {
            Ok(len) => len,
            Err(reason) => return Ok(ReadOutcome::Malformed(reason)),
        };
        // The body cannot be skipped without reading it, so the stream is unusable
        if content_length > MAX_CONTENT_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Content-Length {} exceeds limit of {} bytes",
                    content_length, MAX_CONTENT_LENGTH
                ),
            ));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;

        tracing::trace!("LSP <- {}", String::from_utf8_lossy(&body));

        Ok(match Message::parse(&body) {
            Ok(message) => ReadOutcome::Message(message),
            Err(e) => ReadOutcome::Malformed(format!("invalid JSON body: {}", e)),
        })
    }

    /// Consume a header block; the inner `Err` describes an unusable header.
    async fn read_headers(&mut self) -> io::Result<Result<usize, String>> {
        let mut content_length: Option<Result<usize, String>> = None;
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

            if bytes_read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Server closed connection",
                ));
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();

            if text.is_empty() {
                // Stray blank lines between frames
                if content_length.is_none() {
                    continue;
                }
                break;
            }

            match text.split_once(':') {
                Some((name, value)) if name.trim().eq_ignore_ascii_case("Content-Length") => {
                    content_length = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|e| format!("invalid Content-Length '{}': {}", value.trim(), e)),
                    );
                }
                // Content-Type and unknown headers
                Some(_) => {
                    if content_length.is_none() {
                        content_length = Some(Err("missing Content-Length".to_string()));
                    }
                }
                None => {
                    return Ok(Err(format!("invalid header line '{}'", text)));
                }
            }
        }

        Ok(content_length.unwrap_or_else(|| Err("missing Content-Length".to_string())))
    }
}

pub async fn write_request<W: AsyncWrite + Unpin>(writer: &mut W, request: &Request) -> io::Result<()> {
    let json = serde_json::to_string(request)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    write_message(writer, &json).await
}

pub async fn write_notification<W: AsyncWrite + Unpin>(
    writer: &mut W,
    notification: &Notification,
) -> io::Result<()> {
    let json = serde_json::to_string(notification)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    write_message(writer, &json).await
}

/// Reply to a server-initiated request
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> io::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    write_message(writer, &json).await
}

/// Header and body go out in a single write so a frame is never split.
async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> io::Result<()> {
    tracing::trace!("LSP -> {}", json);

    let message = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);
    writer.write_all(message.as_bytes()).await?;
    writer.flush().await
}
