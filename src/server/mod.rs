//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and serves exactly one HTTP/1.1 request per
//! connection: parse, hand the request and a [`ResponseWriter`] to the
//! [`Handler`], then close.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::http::{
    Request, ResponseWriter, StatusCode, WriteError,
    request::{ReadLimits, RequestError, read_request},
    response::default_headers,
};

/// Upper bound on request bytes read and discarded after a 400.
const DRAIN_LIMIT: u64 = 64 * 1024;

/// How long a rejected peer gets to finish sending before the socket drops.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Application logic invoked once per parsed request.
///
/// The handler must emit exactly one complete response through `writer`:
/// a status line, a header block and either a fixed-length body or the full
/// chunked sequence.
pub trait Handler: Send + Sync + 'static {
    fn handle<W>(
        &self,
        request: Request,
        writer: &mut ResponseWriter<W>,
    ) -> impl Future<Output = Result<(), WriteError>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

/// The rawhttp server.
///
/// # Examples
///
/// ```rust,no_run
/// use rawhttp::app::App;
/// use rawhttp::config::Config;
/// use rawhttp::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let server = Server::bind(&config.listen_addr).await?;
///     server.run(App::new(&config)).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: ReadLimits,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            limits: ReadLimits::default(),
        })
    }

    /// Overrides the byte budgets applied while reading each request.
    #[must_use]
    pub fn with_limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H>(self, handler: H) -> Result<(), ServerError>
    where
        H: Handler,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Once `shutdown` fires the listener is closed and this waits for every
    /// connection already accepted to finish on its own; none is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F>(self, handler: H, shutdown: F) -> Result<(), ServerError>
    where
        H: Handler,
        F: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "rawhttp listening");

        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                Some(joined) = connections.join_next() => {
                    reap(joined);
                    continue;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let limits = self.limits;

            connections.spawn(async move {
                if let Err(e) = serve_connection(stream, handler.as_ref(), limits).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        drop(self.listener);
        info!(
            in_flight = connections.len(),
            "shutdown requested, waiting for open connections"
        );
        while let Some(joined) = connections.join_next().await {
            reap(joined);
        }
        info!("all connections closed");
        Ok(())
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "connection task failed");
    }
}

/// Serves a single request on `stream` and closes it.
///
/// A request that fails to parse gets a best-effort `400 Bad Request`, after
/// which up to 64 KiB of unread input is discarded so closing the socket does
/// not reset the connection before the peer reads the 400. A peer that
/// disconnects without sending anything is closed quietly.
///
/// # Errors
///
/// Returns [`WriteError`] if the response (or the 400) cannot be written.
pub async fn serve_connection<S, H>(
    mut stream: S,
    handler: &H,
    limits: ReadLimits,
) -> Result<(), WriteError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: Handler,
{
    let request = match read_request(&mut stream, limits).await {
        Ok(request) => request,
        Err(RequestError::UnexpectedConnectionClose { received: 0 }) => {
            debug!("connection closed by peer before sending a request");
            return Ok(());
        }
        Err(e) => {
            warn!(error = %e, "bad request, sending 400");
            respond_bad_request(&mut stream).await?;
            stream.shutdown().await?;
            drain(&mut stream).await;
            return Ok(());
        }
    };

    debug!(method = %request.method(), target = %request.target(), "dispatching request");

    let mut writer = ResponseWriter::new(stream);
    handler.handle(request, &mut writer).await?;
    writer.flush().await?;

    let mut stream = writer.into_inner();
    stream.shutdown().await?;
    Ok(())
}

async fn respond_bad_request<S>(stream: &mut S) -> Result<(), WriteError>
where
    S: AsyncWrite + Unpin,
{
    let body = StatusCode::BadRequest.to_string();
    let mut writer = ResponseWriter::new(&mut *stream);
    writer.write_status_line(StatusCode::BadRequest).await?;
    writer.write_headers(&default_headers(body.len())).await?;
    writer.write_body(body.as_bytes()).await?;
    writer.flush().await
}

/// Reads and discards what the peer is still sending, bounded in bytes and time.
async fn drain<S>(stream: &mut S)
where
    S: AsyncRead + Unpin,
{
    let mut unread = (&mut *stream).take(DRAIN_LIMIT);
    let mut sink = tokio::io::sink();
    match tokio::time::timeout(DRAIN_TIMEOUT, tokio::io::copy(&mut unread, &mut sink)).await {
        Ok(Ok(n)) => trace!(bytes = n, "discarded unread request bytes"),
        Ok(Err(e)) => debug!(error = %e, "error while discarding request bytes"),
        Err(_) => debug!("peer still sending after 400, closing"),
    }
}
