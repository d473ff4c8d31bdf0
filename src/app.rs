//! The demo application served by the `rawhttp` binary.
//!
//! | target            | response                                         |
//! |-------------------|--------------------------------------------------|
//! | `/yourproblem`    | 400 page                                         |
//! | `/myproblem`      | 500 page                                         |
//! | `/video`          | `<assets_dir>/vim.mp4` as `video/mp4`            |
//! | `/httpbin/<rest>` | `<upstream_base>/<rest>` re-framed as chunked    |
//! | anything else     | 200 page                                         |

use std::path::PathBuf;

use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::config::Config;
use crate::http::chunked::{
    StreamSource, TRAILER_CONTENT_LENGTH, TRAILER_CONTENT_SHA256, stream_chunked,
};
use crate::http::response::{default_headers, prepare_chunked};
use crate::http::{Request, ResponseWriter, StatusCode, WriteError};
use crate::server::Handler;

const PROXY_PREFIX: &str = "/httpbin/";

const PAGE_200: &str = "<html>
  <head>
    <title>200 OK</title>
  </head>
  <body>
    <h1>Success!</h1>
    <p>Your request was an absolute banger.</p>
  </body>
</html>
";

const PAGE_400: &str = "<html>
  <head>
    <title>400 Bad Request</title>
  </head>
  <body>
    <h1>Bad Request</h1>
    <p>Your request honestly kinda sucked.</p>
  </body>
</html>
";

const PAGE_404: &str = "<html>
  <head>
    <title>404 Not Found</title>
  </head>
  <body>
    <h1>Not Found</h1>
    <p>Nothing lives here.</p>
  </body>
</html>
";

const PAGE_500: &str = "<html>
  <head>
    <title>500 Internal Server Error</title>
  </head>
  <body>
    <h1>Internal Server Error</h1>
    <p>Okay, you know what? This one is on me.</p>
  </body>
</html>
";

/// Route table for the demo server.
#[derive(Debug, Clone)]
pub struct App {
    client: reqwest::Client,
    upstream_base: String,
    assets_dir: PathBuf,
    chunk_size: usize,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            upstream_base: config.upstream_base.trim_end_matches('/').to_owned(),
            assets_dir: config.assets_dir.clone(),
            chunk_size: config.chunk_size,
        }
    }

    async fn serve_video<W>(&self, writer: &mut ResponseWriter<W>) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin,
    {
        let path = self.assets_dir.join("vim.mp4");
        let video = match tokio::fs::read(&path).await {
            Ok(video) => video,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "video asset unavailable");
                return respond_html(writer, StatusCode::NotFound, PAGE_404).await;
            }
        };

        let mut headers = default_headers(video.len());
        headers.replace("Content-Type", "video/mp4")?;
        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&headers).await?;
        writer.write_body(&video).await?;
        Ok(())
    }

    async fn proxy<W>(&self, rest: &str, writer: &mut ResponseWriter<W>) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let url = format!("{}/{rest}", self.upstream_base);
        let upstream = match self.client.get(&url).send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(url = %url, error = %e, "upstream request failed");
                return respond_html(writer, StatusCode::InternalServerError, PAGE_500).await;
            }
        };

        let mut headers = default_headers(0);
        headers.replace("Content-Type", "text/plain")?;
        prepare_chunked(&mut headers, &[TRAILER_CONTENT_SHA256, TRAILER_CONTENT_LENGTH])?;

        writer.write_status_line(StatusCode::Ok).await?;
        writer.write_headers(&headers).await?;

        let mut source = StreamSource::new(Box::pin(upstream.bytes_stream()));
        let digest = stream_chunked(writer, &mut source, self.chunk_size).await?;
        info!(url = %url, bytes = digest.len(), "proxied upstream body");
        Ok(())
    }
}

impl Handler for App {
    async fn handle<W>(&self, request: Request, writer: &mut ResponseWriter<W>) -> Result<(), WriteError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match request.target() {
            "/yourproblem" => respond_html(writer, StatusCode::BadRequest, PAGE_400).await,
            "/myproblem" => respond_html(writer, StatusCode::InternalServerError, PAGE_500).await,
            "/video" => self.serve_video(writer).await,
            target => match target.strip_prefix(PROXY_PREFIX) {
                Some(rest) => self.proxy(rest, writer).await,
                None => respond_html(writer, StatusCode::Ok, PAGE_200).await,
            },
        }
    }
}

async fn respond_html<W>(
    writer: &mut ResponseWriter<W>,
    status: StatusCode,
    page: &str,
) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
{
    let mut headers = default_headers(page.len());
    headers.replace("Content-Type", "text/html")?;
    writer.write_status_line(status).await?;
    writer.write_headers(&headers).await?;
    writer.write_body(page.as_bytes()).await?;
    Ok(())
}
