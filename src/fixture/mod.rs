//! Test fixtures
//!
//! A loopback TLS server speaking HTTP/2 and an in-memory module host, so
//! both oracle checks can run without a module framework.

pub mod host;
pub mod server;

pub use host::{symbolic_name, StaticHost};
pub use server::{FixtureBuilder, FixtureServer, Route};

use crate::http::tls::{KeystoreError, TlsError};

/// Fixture errors
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("HTTP/2 error: {0}")]
    H2(#[from] crate::http::h2::Error),
}
