//! # rawhttp
//!
//! A from-scratch HTTP/1.1 server over raw byte streams: an incremental
//! request parser, a merging header map and a response writer with chunked
//! framing and trailers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rawhttp::http::{Request, ResponseWriter, StatusCode, WriteError};
//! use rawhttp::http::response::default_headers;
//! use rawhttp::server::{Handler, Server};
//! use tokio::io::AsyncWrite;
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     async fn handle<W>(&self, _req: Request, w: &mut ResponseWriter<W>) -> Result<(), WriteError>
//!     where
//!         W: AsyncWrite + Unpin + Send,
//!     {
//!         w.write_status_line(StatusCode::Ok).await?;
//!         w.write_headers(&default_headers(13)).await?;
//!         w.write_body(b"Hello, World!").await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(Hello).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod http;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, RequestParser, ResponseWriter, StatusCode};
pub use server::{Handler, Server, ServerError};
