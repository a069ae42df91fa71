//! HTTP/2 protocol implementation
//!
//! This module speaks HTTP/2 (RFC 7540) over any `SessionOps`, normally a
//! `TlsSession` whose ALPN negotiation selected `h2`.
//!
//! - **Frames**: header codec, SETTINGS, PING, WINDOW_UPDATE, GOAWAY,
//!   RST_STREAM, padding and CONTINUATION handling
//! - **HPACK**: header compression via the `hpack` crate
//! - **Client**: preface, settings exchange, one request at a time
//! - **Server**: the serving half used by the loopback fixture
//!
//! # Examples
//!
//! ```no_run
//! use h2harness::http::h2::H2Client;
//! use h2harness::http::tls::TlsConfig;
//! use std::net::TcpStream;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls_config = TlsConfig::client()?.alpn(&["h2"])?.servername("localhost").build()?;
//! let tls_session = tls_config.connect(TcpStream::connect("127.0.0.1:8443")?)?;
//!
//! let mut client = H2Client::new(tls_session, "localhost");
//! let response = client.get("/")?;
//! println!("Status: {}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod frames;
pub mod server;

pub use client::{H2Client, H2Response};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameHeader, FrameType};
pub use server::{H2Request, H2Server};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;
