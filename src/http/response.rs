//! HTTP/1.1 response framing.
//!
//! [`ResponseWriter`] serializes a response straight onto an async sink in
//! the order HTTP requires: status line, header block, then body bytes or
//! chunk records followed by trailers.

use std::fmt;
use std::io;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::headers::{HeaderError, check_name};
use super::{CRLF, HTTP_VERSION, Headers, StatusCode};

/// Errors produced while writing a response.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed writing to the response sink: {0}")]
    Sink(#[from] io::Error),

    #[error("cannot {attempted} while the writer expects the {expected}")]
    OutOfOrder {
        expected: WriterState,
        attempted: &'static str,
    },

    #[error("invalid header field: {0}")]
    Header(#[from] HeaderError),
}

/// The next part of the response a [`ResponseWriter`] expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    StatusLine,
    Headers,
    Body,
    Trailers,
    Done,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StatusLine => "status line",
            Self::Headers => "headers",
            Self::Body => "body",
            Self::Trailers => "trailers",
            Self::Done => "end of response",
        })
    }
}

/// Writes one HTTP/1.1 response to an [`AsyncWrite`] sink.
///
/// Nothing is buffered across calls; each operation writes its bytes with
/// `write_all` and any sink failure is returned as [`WriteError::Sink`].
///
/// # Examples
///
/// ```
/// use rawhttp::http::{ResponseWriter, StatusCode, response::default_headers};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rawhttp::http::WriteError> {
/// let mut writer = ResponseWriter::new(Vec::new());
/// writer.write_status_line(StatusCode::Ok).await?;
/// writer.write_headers(&default_headers(5)).await?;
/// writer.write_body(b"hello").await?;
///
/// let text = String::from_utf8(writer.into_inner()).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("content-length: 5\r\n"));
/// assert!(text.ends_with("\r\n\r\nhello"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseWriter<W> {
    sink: W,
    state: WriterState,
    written: u64,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Binds a writer to `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            state: WriterState::StatusLine,
            written: 0,
        }
    }

    /// Returns what the writer expects next.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Total bytes handed to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Writes `HTTP/1.1 <code> <reason>\r\n`.
    ///
    /// Only the codes in [`StatusCode`] are supported. Any other code writes
    /// nothing at all; the writer still moves on to the header block.
    pub async fn write_status_line(&mut self, code: impl Into<u16>) -> Result<(), WriteError> {
        self.expect(WriterState::StatusLine, "write the status line")?;
        let code = code.into();
        self.state = WriterState::Headers;

        let Some(status) = StatusCode::from_u16(code) else {
            warn!(code, "unsupported status code, status line not written");
            return Ok(());
        };

        let line = format!(
            "HTTP/{HTTP_VERSION} {} {}\r\n",
            status.as_u16(),
            status.canonical_reason()
        );
        self.send(line.as_bytes()).await
    }

    /// Writes every header as `name: value\r\n` followed by the blank line.
    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), WriteError> {
        self.expect(WriterState::Headers, "write headers")?;
        self.state = WriterState::Body;
        let block = field_block(headers);
        self.send(&block).await
    }

    /// Writes raw body bytes verbatim and returns how many were written.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<usize, WriteError> {
        self.expect(WriterState::Body, "write the body")?;
        self.send(body).await?;
        Ok(body.len())
    }

    /// Writes one chunk record: `<hex length>\r\n<data>\r\n`.
    ///
    /// An empty slice is skipped because a zero-length chunk ends the body.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.expect(WriterState::Body, "write a chunk")?;
        if data.is_empty() {
            return Ok(());
        }

        let mut record = BytesMut::with_capacity(data.len() + 16);
        record.put(format!("{:x}", data.len()).as_bytes());
        record.put(CRLF);
        record.put(data);
        record.put(CRLF);
        self.send(&record).await
    }

    /// Writes the terminal `0\r\n` chunk. Trailers must follow.
    pub async fn write_chunked_body_done(&mut self) -> Result<(), WriteError> {
        self.expect(WriterState::Body, "end the chunked body")?;
        self.state = WriterState::Trailers;
        self.send(b"0\r\n").await
    }

    /// Writes the trailer fields and the blank line that closes the message.
    pub async fn write_trailers(&mut self, trailers: &Headers) -> Result<(), WriteError> {
        self.expect(WriterState::Trailers, "write trailers")?;
        self.state = WriterState::Done;
        let block = field_block(trailers);
        self.send(&block).await
    }

    /// Flushes the sink.
    pub async fn flush(&mut self) -> Result<(), WriteError> {
        self.sink.flush().await?;
        Ok(())
    }

    fn expect(&self, expected: WriterState, attempted: &'static str) -> Result<(), WriteError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WriteError::OutOfOrder {
                expected: self.state,
                attempted,
            })
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.sink.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Serializes `name: value\r\n` lines plus the terminating blank line.
fn field_block(fields: &Headers) -> BytesMut {
    let rendered = fields.to_string();
    let mut buf = BytesMut::with_capacity(rendered.len() + CRLF.len());
    buf.put(rendered.as_bytes());
    buf.put(CRLF);
    buf
}

/// Headers every plain response starts from.
///
/// `content-length` is set to `content_len`, the connection is marked for
/// closing and the body is assumed to be plain text until replaced.
pub fn default_headers(content_len: usize) -> Headers {
    let mut headers = Headers::new();
    headers.replace_valid("content-length", content_len.to_string());
    headers.replace_valid("connection", "close".to_owned());
    headers.replace_valid("content-type", "text/plain".to_owned());
    headers
}

/// Switches `headers` to chunked framing and announces each trailer name.
///
/// # Errors
///
/// Returns [`HeaderError::MalformedFieldName`] if a trailer name is not a
/// token; `headers` is left untouched in that case.
pub fn prepare_chunked(headers: &mut Headers, trailer_names: &[&str]) -> Result<(), HeaderError> {
    for name in trailer_names {
        check_name(name.as_bytes())?;
    }

    headers.remove("content-length");
    headers.replace_valid("transfer-encoding", "chunked".to_owned());
    for name in trailer_names {
        headers.merge_valid("trailer", name);
    }
    Ok(())
}
