//! TLS support for the HTTP/2 transport
//!
//! # Architecture
//!
//! 1. `TlsConfig` holds an OpenSSL context built for one side of the
//!    connection, shaped by the selected `TlsProvider`
//! 2. `TlsSession` implements the `SessionOps` trait for encrypted I/O and
//!    records what the handshake negotiated in `TlsVars`
//! 3. `KeystoreFixture` loads the key/trust material both sides share
//!
//! # Examples
//!
//! ```no_run
//! use h2harness::http::tls::{KeystoreFixture, NamedProvider, TlsConfig, TlsProvider};
//! use std::net::TcpStream;
//!
//! let keystore = KeystoreFixture::new(
//!     "src/test/config/etc/keystore.p12",
//!     "OBF:1vny1zlo1x8e1vnw1vn61x8g1zlu1vn4",
//! )
//! .unwrap();
//! let credentials = keystore.open().unwrap();
//!
//! let tls_config = TlsConfig::client()
//!     .unwrap()
//!     .provider(TlsProvider::Named(NamedProvider::Conscrypt))
//!     .unwrap()
//!     .alpn(&["h2", "http/1.1"])
//!     .unwrap()
//!     .trust(&credentials)
//!     .unwrap()
//!     .servername("localhost")
//!     .build()
//!     .unwrap();
//! drop(credentials);
//!
//! let tcp_stream = TcpStream::connect("127.0.0.1:8443").unwrap();
//! let session = tls_config.connect(tcp_stream).unwrap();
//! println!("negotiated {:?}", session.negotiated_protocol());
//! ```

pub mod config;
pub mod keystore;
pub mod provider;
pub mod session;
pub mod vars;

pub use config::{ClientConfigBuilder, ServerConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use keystore::{Credentials, KeystoreError, KeystoreFixture, Password};
pub use provider::{NamedProvider, ProviderProfile, TlsProvider};
pub use session::TlsSession;
pub use vars::TlsVars;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
