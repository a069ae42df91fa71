//! Secure HTTP/2 transport used by the protocol probe
//!
//! This module provides the client side of the protocol check and the
//! server side used by the loopback fixture.
//!
//! # Architecture
//!
//! The transport layers are stacked the same way on both ends:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `tls::TlsSession` implements `SessionOps` over an OpenSSL stream and
//!   records what the handshake negotiated (version, cipher, ALPN)
//! - `HttpSession` adds a readiness timeout and exact-length helpers
//! - `h2` speaks HTTP/2 frames over any `SessionOps`
//!
//! # Examples
//!
//! ```no_run
//! use h2harness::http::h2::H2Client;
//! use h2harness::http::tls::TlsConfig;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .unwrap()
//!     .alpn(&["h2", "http/1.1"])
//!     .unwrap()
//!     .servername("localhost")
//!     .build()
//!     .unwrap();
//!
//! let stream = TcpStream::connect("127.0.0.1:8443").unwrap();
//! let session = tls_config.connect(stream).unwrap();
//! assert_eq!(session.vars().alpn.as_deref(), Some("h2"));
//!
//! let mut client = H2Client::new(session, "localhost");
//! let response = client.get("/jsp/jstl.jsp").unwrap();
//! assert_eq!(response.status(), 200);
//! ```

pub mod h2;
pub mod session;
pub mod tls;

pub use session::{HttpSession, PollEvents, SessionOps};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

/// ALPN identifier for HTTP/2 over TLS
pub const ALPN_H2: &str = "h2";

/// ALPN identifier for HTTP/1.1
pub const ALPN_HTTP11: &str = "http/1.1";
