//! Forwarding an upstream body as a chunked response with digest trailers.
//!
//! The upstream is anything implementing [`ChunkSource`]. Every slice it
//! yields is re-framed into chunks of at most `max_chunk` bytes and fed to a
//! [`BodyDigest`], whose totals become the `X-Content-SHA256` and
//! `X-Content-Length` trailers once the source is exhausted.

use std::collections::VecDeque;
use std::future::Future;
use std::io;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use super::{Headers, ResponseWriter, WriteError};

/// Trailer carrying the hex SHA-256 of the forwarded body.
pub const TRAILER_CONTENT_SHA256: &str = "X-Content-SHA256";

/// Trailer carrying the decimal length of the forwarded body.
pub const TRAILER_CONTENT_LENGTH: &str = "X-Content-Length";

/// Default upper bound on the size of a single chunk record.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// A pull-based source of body bytes.
///
/// `Ok(None)` marks the end of the body.
pub trait ChunkSource {
    fn next_chunk(&mut self) -> impl Future<Output = io::Result<Option<Bytes>>> + Send;
}

impl ChunkSource for VecDeque<Bytes> {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.pop_front())
    }
}

/// Adapts an [`AsyncRead`] into a [`ChunkSource`] reading at most
/// `increment` bytes per pull.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    increment: usize,
}

impl<R> ReaderSource<R> {
    pub fn new(reader: R, increment: usize) -> Self {
        Self {
            reader,
            increment: increment.max(1),
        }
    }
}

impl<R> ChunkSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(self.increment);
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf.freeze()))
    }
}

/// Adapts a fallible byte [`Stream`], such as an HTTP client response body,
/// into a [`ChunkSource`].
#[derive(Debug)]
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S, E> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.stream.next().await.transpose().map_err(io::Error::other)
    }
}

/// Running SHA-256 and byte count of a streamed body.
#[derive(Debug, Clone, Default)]
pub struct BodyDigest {
    hasher: Sha256,
    len: u64,
}

impl BodyDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes seen so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lower-case hex SHA-256 of everything seen so far.
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }

    /// The trailer block announcing this body's digest and length.
    pub fn trailers(&self) -> Headers {
        let mut trailers = Headers::new();
        trailers.merge_valid(TRAILER_CONTENT_SHA256, &self.sha256_hex());
        trailers.merge_valid(TRAILER_CONTENT_LENGTH, &self.len.to_string());
        trailers
    }
}

/// Pumps `source` into `writer` as chunk records, then writes the terminal
/// chunk and the digest trailers.
///
/// The status line and a header block prepared with
/// [`prepare_chunked`](super::response::prepare_chunked) must already be
/// written. A failing source ends the body early; the trailers then describe
/// what was actually forwarded.
///
/// # Examples
///
/// ```
/// use std::collections::VecDeque;
///
/// use bytes::Bytes;
/// use rawhttp::http::{Headers, ResponseWriter, StatusCode};
/// use rawhttp::http::chunked::stream_chunked;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), rawhttp::http::WriteError> {
/// let mut writer = ResponseWriter::new(Vec::new());
/// writer.write_status_line(StatusCode::Ok).await?;
/// writer.write_headers(&Headers::new()).await?;
///
/// let mut source = VecDeque::from([Bytes::from_static(b"hi")]);
/// let digest = stream_chunked(&mut writer, &mut source, 32).await?;
/// assert_eq!(digest.len(), 2);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`WriteError`] if the sink fails or the writer is not positioned
/// at the body.
pub async fn stream_chunked<W, S>(
    writer: &mut ResponseWriter<W>,
    source: &mut S,
    max_chunk: usize,
) -> Result<BodyDigest, WriteError>
where
    W: AsyncWrite + Unpin,
    S: ChunkSource,
{
    let max_chunk = max_chunk.max(1);
    let mut digest = BodyDigest::new();

    loop {
        let slice = match source.next_chunk().await {
            Ok(Some(slice)) => slice,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, forwarded = digest.len(), "upstream read failed, ending body");
                break;
            }
        };

        for piece in slice.chunks(max_chunk) {
            writer.write_chunk(piece).await?;
            digest.update(piece);
        }
    }

    writer.write_chunked_body_done().await?;
    writer.write_trailers(&digest.trailers()).await?;
    debug!(bytes = digest.len(), sha256 = %digest.sha256_hex(), "chunked body complete");
    Ok(digest)
}
