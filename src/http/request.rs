//! Incremental HTTP/1.1 request parsing.
//!
//! [`RequestParser`] is a push parser: it is handed whatever bytes have
//! arrived so far, reports how many it consumed, and keeps its progress
//! between calls. [`read_request`] drives it from any [`AsyncRead`].

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::headers::{HeaderError, Headers, find_crlf};
use super::{CRLF, HTTP_VERSION, Method};

/// Initial receive buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 1024;

/// Default cap on the unconsumed bytes the reader will hold while waiting for
/// a line terminator (8 KiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024;

/// Default cap on a declared `Content-Length` (8 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Default cap on the whole request head: start line, header lines and the
/// blank line (64 KiB).
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request-line")]
    MalformedStartLine,

    #[error("unsupported HTTP version {0:?}: only HTTP/1.1 is supported")]
    UnsupportedHttpVersion(String),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("request parser is in an error state")]
    RequestInErrorState,

    #[error("connection closed after {received} bytes, before the request was complete")]
    UnexpectedConnectionClose { received: usize },

    #[error("line exceeds the maximum of {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("declared body of {declared} bytes exceeds the maximum of {limit} bytes")]
    BodyTooLarge { declared: u64, limit: usize },

    #[error("request head exceeds the maximum of {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The first line of a request: method, target and protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    target: String,
    version: String,
}

impl RequestLine {
    /// Parses a request line with its CRLF already stripped.
    ///
    /// The line must be exactly three tokens separated by single spaces, and
    /// the last one must be `HTTP/1.1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rawhttp::http::RequestLine;
    ///
    /// let line = RequestLine::parse(b"GET /coffee HTTP/1.1").unwrap();
    /// assert_eq!(line.method().as_str(), "GET");
    /// assert_eq!(line.target(), "/coffee");
    /// assert_eq!(line.version(), "1.1");
    /// ```
    ///
    /// # Errors
    ///
    /// - [`RequestError::MalformedStartLine`] when the token count is wrong or
    ///   the line is not UTF-8.
    /// - [`RequestError::UnsupportedHttpVersion`] for any version other than 1.1.
    pub fn parse(line: &[u8]) -> Result<Self, RequestError> {
        let line = std::str::from_utf8(line).map_err(|_| RequestError::MalformedStartLine)?;

        let parts: Vec<&str> = line.split(' ').collect();
        let [method, target, version] = parts.as_slice() else {
            return Err(RequestError::MalformedStartLine);
        };
        if method.is_empty() || target.is_empty() {
            return Err(RequestError::MalformedStartLine);
        }

        let version = match version.split_once('/') {
            Some(("HTTP", v)) if v == HTTP_VERSION => v,
            _ => return Err(RequestError::UnsupportedHttpVersion((*version).to_owned())),
        };

        let Ok(method) = method.parse::<Method>();
        Ok(Self {
            method,
            target: (*target).to_owned(),
            version: version.to_owned(),
        })
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw request target (path and query).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the protocol version without the `HTTP/` prefix.
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Produced by [`RequestParser`] once it reaches [`ParserState::Done`]. The
/// body holds exactly `Content-Length` bytes.
///
/// # Examples
///
/// ```
/// use rawhttp::http::RequestParser;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let mut parser = RequestParser::new();
/// assert_eq!(parser.parse(raw).unwrap(), raw.len());
///
/// let request = parser.into_request().unwrap();
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    line: RequestLine,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Returns the parsed request line.
    pub fn request_line(&self) -> &RequestLine {
        &self.line
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        self.line.method()
    }

    /// Returns the raw request target.
    pub fn target(&self) -> &str {
        self.line.target()
    }

    /// Returns the request path (the target without its query string).
    pub fn path(&self) -> &str {
        match self.line.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.line.target,
        }
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.line.target.split_once('?').map(|(_, q)| q)
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Observable phase of a [`RequestParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Initial,
    ParsingHeaders,
    ParsingBody,
    Done,
    Error,
}

// Each phase owns exactly the data that is meaningful in it.
#[derive(Debug)]
enum Stage {
    Initial,
    Headers {
        line: RequestLine,
        headers: Headers,
    },
    Body {
        line: RequestLine,
        headers: Headers,
        body: BytesMut,
        remaining: usize,
    },
    Done(Request),
    Error,
}

/// Push parser turning raw bytes into a [`Request`].
///
/// Every call to [`parse`](Self::parse) receives the unconsumed suffix of the
/// caller's receive buffer and returns how many bytes it took. The caller
/// drops that prefix and calls again with more data appended.
///
/// # Examples
///
/// ```
/// use rawhttp::http::{ParserState, RequestParser};
///
/// let mut parser = RequestParser::new();
/// assert_eq!(parser.parse(b"GET / HT").unwrap(), 0);
/// assert_eq!(parser.state(), ParserState::Initial);
///
/// let n = parser.parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
/// assert_eq!(n, 27);
/// assert_eq!(parser.state(), ParserState::Done);
/// ```
#[derive(Debug)]
pub struct RequestParser {
    stage: Stage,
    consumed: usize,
    max_header_bytes: usize,
    max_body_bytes: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with the default head and body limits.
    pub fn new() -> Self {
        Self::with_limits(ReadLimits::default())
    }

    /// Creates a parser that rejects declared bodies larger than `max_body_bytes`.
    pub fn with_max_body(max_body_bytes: usize) -> Self {
        Self::with_limits(ReadLimits {
            max_body_bytes,
            ..ReadLimits::default()
        })
    }

    /// Creates a parser enforcing the head and body budgets of `limits`.
    pub fn with_limits(limits: ReadLimits) -> Self {
        Self {
            stage: Stage::Initial,
            consumed: 0,
            max_header_bytes: limits.max_header_bytes,
            max_body_bytes: limits.max_body_bytes,
        }
    }

    /// Returns the current phase.
    pub fn state(&self) -> ParserState {
        match self.stage {
            Stage::Initial => ParserState::Initial,
            Stage::Headers { .. } => ParserState::ParsingHeaders,
            Stage::Body { .. } => ParserState::ParsingBody,
            Stage::Done(_) => ParserState::Done,
            Stage::Error => ParserState::Error,
        }
    }

    /// Returns `true` once a complete request has been parsed.
    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done(_))
    }

    /// Total bytes accepted over the parser's lifetime.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Returns the parsed request once the parser is done.
    pub fn request(&self) -> Option<&Request> {
        match &self.stage {
            Stage::Done(request) => Some(request),
            _ => None,
        }
    }

    /// Consumes the parser, returning the request if parsing finished.
    pub fn into_request(self) -> Option<Request> {
        match self.stage {
            Stage::Done(request) => Some(request),
            _ => None,
        }
    }

    /// Feeds `buf` to the state machine and returns the number of bytes consumed.
    ///
    /// Advances through as many states as the data allows. Returning fewer
    /// bytes than `buf.len()` means the rest is an incomplete line (or bytes
    /// past the end of the request once [`ParserState::Done`] is reached).
    ///
    /// # Errors
    ///
    /// Any error moves the parser to [`ParserState::Error`], after which every
    /// call fails with [`RequestError::RequestInErrorState`].
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize, RequestError> {
        let mut read = 0;
        let result = self.advance(buf, &mut read);
        self.consumed += read;
        result.map(|()| read)
    }

    fn advance(&mut self, buf: &[u8], read: &mut usize) -> Result<(), RequestError> {
        loop {
            let data = &buf[*read..];
            trace!(state = ?self.state(), available = data.len(), "parsing request");

            // A failed step leaves the parser in `Error`.
            match std::mem::replace(&mut self.stage, Stage::Error) {
                Stage::Error => return Err(RequestError::RequestInErrorState),

                Stage::Initial => {
                    let Some(idx) = find_crlf(data) else {
                        self.stage = Stage::Initial;
                        return Ok(());
                    };
                    let line = match RequestLine::parse(&data[..idx]) {
                        Ok(line) => line,
                        Err(err @ RequestError::UnsupportedHttpVersion(_)) => {
                            *read += idx + CRLF.len();
                            return Err(err);
                        }
                        Err(err) => return Err(err),
                    };
                    if idx + CRLF.len() > self.max_header_bytes {
                        return Err(RequestError::HeadersTooLarge {
                            limit: self.max_header_bytes,
                        });
                    }
                    *read += idx + CRLF.len();
                    self.stage = Stage::Headers {
                        line,
                        headers: Headers::new(),
                    };
                }

                Stage::Headers { line, mut headers } => {
                    // Only the bytes still inside the head budget are offered.
                    let budget = self.max_header_bytes.saturating_sub(self.consumed + *read);
                    let window = &data[..data.len().min(budget)];
                    let (n, complete) = headers.consume(window)?;
                    *read += n;
                    if !complete {
                        if window.len() < data.len() {
                            return Err(RequestError::HeadersTooLarge {
                                limit: self.max_header_bytes,
                            });
                        }
                        self.stage = Stage::Headers { line, headers };
                        return Ok(());
                    }
                    self.stage = self.after_headers(line, headers)?;
                }

                Stage::Body {
                    line,
                    headers,
                    mut body,
                    remaining,
                } => {
                    let take = remaining.min(data.len());
                    body.extend_from_slice(&data[..take]);
                    *read += take;

                    let remaining = remaining - take;
                    if remaining > 0 {
                        self.stage = Stage::Body {
                            line,
                            headers,
                            body,
                            remaining,
                        };
                        return Ok(());
                    }
                    self.stage = Stage::Done(Request {
                        line,
                        headers,
                        body: body.freeze(),
                    });
                }

                Stage::Done(request) => {
                    self.stage = Stage::Done(request);
                    return Ok(());
                }
            }
        }
    }

    fn after_headers(&self, line: RequestLine, headers: Headers) -> Result<Stage, RequestError> {
        let declared = headers.get_int("content-length", 0);
        if declared <= 0 {
            return Ok(Stage::Done(Request {
                line,
                headers,
                body: Bytes::new(),
            }));
        }

        let declared = declared as u64;
        if declared > self.max_body_bytes as u64 {
            return Err(RequestError::BodyTooLarge {
                declared,
                limit: self.max_body_bytes,
            });
        }

        let remaining = declared as usize;
        Ok(Stage::Body {
            line,
            headers,
            body: BytesMut::with_capacity(remaining),
            remaining,
        })
    }
}

/// Byte budgets applied by [`read_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Maximum unconsumed bytes held while waiting for a CRLF, terminator included.
    pub max_line_bytes: usize,
    /// Maximum size of the request head, from the start line to the blank line.
    pub max_header_bytes: usize,
    /// Maximum accepted `Content-Length`.
    pub max_body_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Reads exactly one request from `reader`.
///
/// Bytes are accumulated in a growable buffer; whatever the parser consumes
/// is dropped from the front before the next read. Each read is capped so the
/// buffer never holds more than `limits.max_line_bytes` unconsumed bytes,
/// which makes the line limit independent of how the peer fragments its
/// writes. Bytes after the end of the request are discarded.
///
/// # Errors
///
/// - Any parser error (see [`RequestParser::parse`]).
/// - [`RequestError::LineTooLong`] when `limits.max_line_bytes` unconsumed bytes
///   accumulate without completing a line.
/// - [`RequestError::HeadersTooLarge`] when the head outgrows
///   `limits.max_header_bytes`.
/// - [`RequestError::UnexpectedConnectionClose`] on EOF before the request is done.
/// - [`RequestError::Io`] if the read fails.
pub async fn read_request<R>(reader: &mut R, limits: ReadLimits) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin,
{
    let max_line = limits.max_line_bytes.max(1);
    let mut parser = RequestParser::with_limits(limits);
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE.min(max_line));
    let mut received = 0;

    while !parser.is_done() {
        // buf.len() < max_line holds here, so the read always has room.
        let room = (max_line - buf.len()) as u64;
        let n = (&mut *reader).take(room).read_buf(&mut buf).await?;
        if n == 0 {
            return Err(RequestError::UnexpectedConnectionClose { received });
        }
        received += n;

        let consumed = parser.parse(&buf)?;
        buf.advance(consumed);

        if !parser.is_done() && buf.len() >= max_line {
            return Err(RequestError::LineTooLong { limit: max_line });
        }
    }

    let request = parser
        .into_request()
        .ok_or(RequestError::RequestInErrorState)?;
    debug!(
        method = %request.method(),
        target = %request.target(),
        body_len = request.body().len(),
        "request parsed"
    );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Yields its data one byte per read.
    struct Trickle<'a> {
        data: &'a [u8],
    }

    impl AsyncRead for Trickle<'_> {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if let Some((&first, rest)) = this.data.split_first() {
                buf.put_slice(&[first]);
                this.data = rest;
            }
            Poll::Ready(Ok(()))
        }
    }

    fn parse_all(raw: &[u8]) -> (RequestParser, usize) {
        let mut parser = RequestParser::new();
        let n = parser.parse(raw).unwrap();
        (parser, n)
    }

    fn feed_bytewise(raw: &[u8]) -> Request {
        let mut parser = RequestParser::new();
        let mut buf = Vec::new();
        for &b in raw {
            buf.push(b);
            let n = parser.parse(&buf).unwrap();
            buf.drain(..n);
        }
        assert!(buf.is_empty());
        parser.into_request().unwrap()
    }

    #[test]
    fn request_line_good_get() {
        let line = RequestLine::parse(b"GET /path HTTP/1.1").unwrap();
        assert_eq!(line.method(), &Method::Get);
        assert_eq!(line.target(), "/path");
        assert_eq!(line.version(), "1.1");
    }

    #[test]
    fn request_line_http10_unsupported() {
        let err = RequestLine::parse(b"GET /path HTTP/1.0").unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedHttpVersion(v) if v == "HTTP/1.0"));
    }

    #[test]
    fn request_line_wrong_token_count() {
        assert!(matches!(
            RequestLine::parse(b"/path HTTP/1.1"),
            Err(RequestError::MalformedStartLine)
        ));
        assert!(matches!(
            RequestLine::parse(b"GET /a /b HTTP/1.1"),
            Err(RequestError::MalformedStartLine)
        ));
        // Double space yields an empty token.
        assert!(matches!(
            RequestLine::parse(b"GET  /path HTTP/1.1"),
            Err(RequestError::MalformedStartLine)
        ));
    }

    #[test]
    fn request_line_garbage_version_unsupported() {
        assert!(matches!(
            RequestLine::parse(b"GET / HTTPS/1.1"),
            Err(RequestError::UnsupportedHttpVersion(_))
        ));
        assert!(matches!(
            RequestLine::parse(b"GET / 1.1"),
            Err(RequestError::UnsupportedHttpVersion(_))
        ));
    }

    #[test]
    fn good_get_request_line_with_headers() {
        let raw = b"GET /coffee HTTP/1.1\r\nHost: localhost:42069\r\nUser-Agent: curl/7.81.0\r\nAccept: */*\r\n\r\n";
        let (parser, n) = parse_all(raw);
        assert_eq!(n, raw.len());
        let req = parser.into_request().unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.target(), "/coffee");
        assert_eq!(req.request_line().version(), "1.1");
        assert_eq!(req.headers().get("host"), Some("localhost:42069"));
        assert_eq!(req.headers().get("user-agent"), Some("curl/7.81.0"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn incomplete_start_line_consumes_nothing() {
        let mut parser = RequestParser::new();
        assert_eq!(parser.parse(b"GET /coffee HTTP/1").unwrap(), 0);
        assert_eq!(parser.state(), ParserState::Initial);
        assert_eq!(parser.consumed(), 0);
    }

    #[test]
    fn unsupported_version_still_consumes_line() {
        let mut parser = RequestParser::new();
        let err = parser.parse(b"GET /path HTTP/1.0\r\nHost: x\r\n\r\n").unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedHttpVersion(_)));
        assert_eq!(parser.consumed(), b"GET /path HTTP/1.0\r\n".len());
        assert_eq!(parser.state(), ParserState::Error);
    }

    #[test]
    fn malformed_start_line_consumes_nothing() {
        let mut parser = RequestParser::new();
        let err = parser.parse(b"GET /path\r\n\r\n").unwrap_err();
        assert!(matches!(err, RequestError::MalformedStartLine));
        assert_eq!(parser.consumed(), 0);
    }

    #[test]
    fn error_state_is_absorbing() {
        let mut parser = RequestParser::new();
        assert!(parser.parse(b"BROKEN\r\n").is_err());
        assert_eq!(parser.state(), ParserState::Error);
        assert!(matches!(
            parser.parse(b"GET / HTTP/1.1\r\n\r\n"),
            Err(RequestError::RequestInErrorState)
        ));
        assert!(parser.into_request().is_none());
    }

    #[test]
    fn malformed_first_header_fails_request() {
        let mut parser = RequestParser::new();
        let err = parser
            .parse(b"GET / HTTP/1.1\r\nHost localhost:42069\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, RequestError::Header(HeaderError::MalformedFieldName)));
        assert_eq!(parser.state(), ParserState::Error);
    }

    #[test]
    fn body_with_exact_content_length() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: localhost:42069\r\nContent-Length: 13\r\n\r\nhello world!\n";
        let (parser, n) = parse_all(raw);
        assert_eq!(n, raw.len());
        let req = parser.into_request().unwrap();
        assert_eq!(&req.body()[..], b"hello world!\n");
    }

    #[test]
    fn body_shorter_than_declared_waits() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 20\r\n\r\npartial content";
        let (parser, n) = parse_all(raw);
        assert_eq!(n, raw.len());
        assert_eq!(parser.state(), ParserState::ParsingBody);
        assert!(parser.request().is_none());
    }

    #[test]
    fn bytes_past_body_are_not_consumed() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcEXTRA";
        let (parser, n) = parse_all(raw);
        assert_eq!(n, raw.len() - b"EXTRA".len());
        assert_eq!(&parser.request().unwrap().body()[..], b"abc");
    }

    #[test]
    fn done_is_absorbing() {
        let mut parser = RequestParser::new();
        parser.parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(parser.is_done());
        assert_eq!(parser.parse(b"GET /again HTTP/1.1\r\n\r\n").unwrap(), 0);
        assert_eq!(parser.request().unwrap().target(), "/");
    }

    #[test]
    fn zero_or_bogus_content_length_means_no_body() {
        for value in ["0", "-4", "lots"] {
            let raw = format!("POST / HTTP/1.1\r\nContent-Length: {value}\r\n\r\nignored");
            let (parser, n) = parse_all(raw.as_bytes());
            assert!(parser.is_done(), "content-length {value}");
            assert_eq!(n, raw.len() - "ignored".len());
            assert!(parser.request().unwrap().body().is_empty());
        }
    }

    #[test]
    fn oversized_declared_body_rejected() {
        let mut parser = RequestParser::with_max_body(4);
        let err = parser
            .parse(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap_err();
        assert!(matches!(err, RequestError::BodyTooLarge { declared: 5, limit: 4 }));
    }

    #[test]
    fn bytewise_feed_matches_single_feed() {
        let raw = b"POST /api/items?x=1 HTTP/1.1\r\nHost: localhost\r\nX-Dup: a\r\nx-dup: b\r\nContent-Length: 13\r\n\r\nhello world!\n";
        let (parser, _) = parse_all(raw);
        let whole = parser.into_request().unwrap();
        let trickled = feed_bytewise(raw);
        assert_eq!(whole, trickled);
        assert_eq!(trickled.headers().get("x-dup"), Some("a,b"));
        assert_eq!(trickled.path(), "/api/items");
        assert_eq!(trickled.query_string(), Some("x=1"));
    }

    #[tokio::test]
    async fn read_request_from_slice() {
        let mut raw: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let req = read_request(&mut raw, ReadLimits::default()).await.unwrap();
        assert_eq!(req.headers().get("host"), Some("localhost"));
    }

    #[tokio::test]
    async fn read_request_one_byte_at_a_time() {
        let raw = b"PUT /thing HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
        let mut whole: &[u8] = raw;
        let expected = read_request(&mut whole, ReadLimits::default()).await.unwrap();

        let mut trickle = Trickle { data: raw };
        let got = read_request(&mut trickle, ReadLimits::default()).await.unwrap();
        assert_eq!(got, expected);
        assert_eq!(&got.body()[..], b"hello");
    }

    #[tokio::test]
    async fn read_request_eof_mid_headers() {
        let mut raw: &[u8] = b"GET / HTTP/1.1\r\nHost: local";
        let err = read_request(&mut raw, ReadLimits::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::UnexpectedConnectionClose { received } if received == 27
        ));
    }

    #[tokio::test]
    async fn read_request_eof_before_any_byte() {
        let mut raw: &[u8] = b"";
        let err = read_request(&mut raw, ReadLimits::default()).await.unwrap_err();
        assert!(matches!(err, RequestError::UnexpectedConnectionClose { received: 0 }));
    }

    #[tokio::test]
    async fn read_request_line_too_long() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Huge: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 256));
        raw.extend_from_slice(b"\r\n\r\n");
        let limits = ReadLimits {
            max_line_bytes: 64,
            ..ReadLimits::default()
        };
        let mut trickle = Trickle { data: &raw };
        let err = read_request(&mut trickle, limits).await.unwrap_err();
        assert!(matches!(err, RequestError::LineTooLong { limit: 64 }));
    }

    #[tokio::test]
    async fn line_limit_holds_when_line_arrives_in_one_read() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Huge: ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 100));
        raw.extend_from_slice(b"\r\n\r\n");
        let limits = ReadLimits {
            max_line_bytes: 64,
            ..ReadLimits::default()
        };
        let mut whole: &[u8] = &raw;
        let err = read_request(&mut whole, limits).await.unwrap_err();
        assert!(matches!(err, RequestError::LineTooLong { limit: 64 }));
    }

    #[tokio::test]
    async fn line_exactly_at_limit_is_accepted() {
        // 62 bytes of field line plus CRLF fill the 64-byte budget exactly.
        let field = format!("X-Fit: {}", "y".repeat(55));
        assert_eq!(field.len() + 2, 64);
        let raw = format!("GET / HTTP/1.1\r\n{field}\r\n\r\n");
        let limits = ReadLimits {
            max_line_bytes: 64,
            ..ReadLimits::default()
        };

        let mut whole: &[u8] = raw.as_bytes();
        let req = read_request(&mut whole, limits).await.unwrap();
        assert_eq!(req.headers().get("x-fit").map(str::len), Some(55));

        let mut trickle = Trickle { data: raw.as_bytes() };
        assert_eq!(read_request(&mut trickle, limits).await.unwrap(), req);
    }

    #[test]
    fn head_larger_than_budget_rejected() {
        let limits = ReadLimits {
            max_header_bytes: 64,
            ..ReadLimits::default()
        };
        let mut parser = RequestParser::with_limits(limits);
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..8 {
            raw.extend_from_slice(b"X-Flood: aaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");

        let err = parser.parse(&raw).unwrap_err();
        assert!(matches!(err, RequestError::HeadersTooLarge { limit: 64 }));
        assert_eq!(parser.state(), ParserState::Error);
        assert!(parser.consumed() <= 64);
    }

    #[test]
    fn head_exactly_at_budget_accepted() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut parser = RequestParser::with_limits(ReadLimits {
            max_header_bytes: raw.len(),
            ..ReadLimits::default()
        });
        assert_eq!(parser.parse(raw).unwrap(), raw.len());
        assert!(parser.is_done());

        let mut parser = RequestParser::with_limits(ReadLimits {
            max_header_bytes: raw.len() - 1,
            ..ReadLimits::default()
        });
        assert!(matches!(
            parser.parse(raw),
            Err(RequestError::HeadersTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn endless_header_section_is_cut_off() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..20_000 {
            raw.extend_from_slice(b"X-Flood: aaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        let limits = ReadLimits {
            max_line_bytes: 64,
            max_header_bytes: 4096,
            max_body_bytes: 64,
        };
        let mut whole: &[u8] = &raw;
        let err = read_request(&mut whole, limits).await.unwrap_err();
        assert!(matches!(err, RequestError::HeadersTooLarge { limit: 4096 }));
    }

    #[tokio::test]
    async fn read_request_body_larger_than_line_limit() {
        // Body bytes are consumed as they arrive, so the line limit does not
        // cap the body.
        let body = vec![b'z'; 512];
        let mut raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        raw.extend_from_slice(&body);
        let limits = ReadLimits {
            max_line_bytes: 64,
            ..ReadLimits::default()
        };
        let mut trickle = Trickle { data: &raw };
        let req = read_request(&mut trickle, limits).await.unwrap();
        assert_eq!(req.body().len(), 512);
    }
}
