//! TLS configuration
//!
//! This module provides TLS configuration builders for both client and server.

use super::keystore::{Credentials, KeystoreError};
use super::provider::TlsProvider;
use super::session::TlsSession;
use openssl::ssl::{SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::net::TcpStream;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown TLS provider: {0}")]
    UnknownProvider(String),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: openssl::ssl::SslContext,
    pub(crate) is_server: bool,
    pub(crate) servername: Option<String>,
    pub(crate) verify_hostname: bool,
    pub(crate) provider: TlsProvider,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> Result<ClientConfigBuilder, TlsError> {
        ClientConfigBuilder::new()
    }

    /// Create a new server configuration builder
    pub fn server() -> Result<ServerConfigBuilder, TlsError> {
        ServerConfigBuilder::new()
    }

    /// Engine this configuration was built for
    pub fn provider(&self) -> TlsProvider {
        self.provider
    }

    /// Connect to a server with TLS (client-side)
    pub fn connect(&self, stream: TcpStream) -> Result<TlsSession, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }
        TlsSession::connect(stream, self)
    }

    /// Accept a client connection with TLS (server-side)
    pub fn accept(&self, stream: TcpStream) -> Result<TlsSession, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }
        TlsSession::accept(stream, self)
    }
}

/// Encode protocol identifiers in ALPN wire format (length-prefixed)
pub fn encode_alpn(protocols: &[&str]) -> Result<Vec<u8>, TlsError> {
    let mut wire = Vec::new();
    for proto in protocols {
        if proto.is_empty() || proto.len() > 255 {
            return Err(TlsError::InvalidConfig(format!(
                "ALPN protocol identifier must be 1-255 bytes: {:?}",
                proto
            )));
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}

/// Pick the first client-offered protocol the server supports
pub fn select_alpn<'a>(client_protos: &'a [u8], supported: &[Vec<u8>]) -> Option<&'a [u8]> {
    let mut pos = 0;
    while pos < client_protos.len() {
        let len = client_protos[pos] as usize;
        pos += 1;
        if pos + len > client_protos.len() {
            break;
        }
        let client_proto = &client_protos[pos..pos + len];
        if supported.iter().any(|p| p.as_slice() == client_proto) {
            return Some(client_proto);
        }
        pos += len;
    }
    None
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
    verify_hostname: bool,
    provider: TlsProvider,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Default: don't verify peer until trust anchors are configured
        ctx_builder.set_verify(SslVerifyMode::NONE);

        Ok(ClientConfigBuilder {
            ctx_builder,
            servername: None,
            verify_hostname: false,
            provider: TlsProvider::Default,
        })
    }

    /// Apply the protocol range and cipher policy of a TLS engine
    pub fn provider(mut self, provider: TlsProvider) -> Result<Self, TlsError> {
        let profile = provider.profile();
        self.ctx_builder
            .set_min_proto_version(Some(profile.min_version.to_openssl_version()))?;
        self.ctx_builder
            .set_max_proto_version(profile.max_version.map(TlsVersion::to_openssl_version))?;
        if let Some(ciphers) = profile.cipher_list {
            self.ctx_builder.set_cipher_list(ciphers)?;
        }
        self.provider = provider;
        Ok(self)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Result<Self, TlsError> {
        self.ctx_builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        self.ctx_builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        Ok(self)
    }

    /// Set ALPN protocols, in preference order
    pub fn alpn(mut self, protocols: &[&str]) -> Result<Self, TlsError> {
        let wire = encode_alpn(protocols)?;
        self.ctx_builder.set_alpn_protos(&wire)?;
        Ok(self)
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Check the peer certificate against the SNI servername
    pub fn verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = verify;
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// Trust the keystore's certificate and chain, and verify the peer
    pub fn trust(mut self, credentials: &Credentials) -> Result<Self, TlsError> {
        let store = self.ctx_builder.cert_store_mut();
        store.add_cert(credentials.certificate().to_owned())?;
        for ca in credentials.chain() {
            store.add_cert(ca.to_owned())?;
        }
        Ok(self.verify_peer(true))
    }

    /// Present the keystore's key and certificate to the server
    pub fn identity(mut self, credentials: &Credentials) -> Result<Self, TlsError> {
        self.ctx_builder.set_certificate(credentials.certificate())?;
        self.ctx_builder.set_private_key(credentials.private_key())?;
        for ca in credentials.chain() {
            self.ctx_builder.add_extra_chain_cert(ca.to_owned())?;
        }
        self.ctx_builder.check_private_key()?;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if self.verify_hostname && self.servername.is_none() {
            return Err(TlsError::InvalidConfig(
                "Hostname verification requires a servername".to_string(),
            ));
        }

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: false,
            servername: self.servername,
            verify_hostname: self.verify_hostname,
            provider: self.provider,
        })
    }
}

/// Server configuration builder
pub struct ServerConfigBuilder {
    ctx_builder: SslContextBuilder,
    has_cert: bool,
}

impl ServerConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;

        Ok(ServerConfigBuilder {
            ctx_builder,
            has_cert: false,
        })
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Result<Self, TlsError> {
        self.ctx_builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        self.ctx_builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        Ok(self)
    }

    /// Set the protocols this server accepts during ALPN
    ///
    /// The first protocol in the client's list that is also supported here
    /// wins. When nothing matches, the server does not acknowledge ALPN and
    /// the handshake proceeds without a negotiated protocol.
    pub fn alpn(mut self, protocols: &[&str]) -> Result<Self, TlsError> {
        encode_alpn(protocols)?;
        let supported: Vec<Vec<u8>> = protocols.iter().map(|p| p.as_bytes().to_vec()).collect();

        self.ctx_builder.set_alpn_select_callback(move |_ssl, client_protos| {
            select_alpn(client_protos, &supported).ok_or(openssl::ssl::AlpnError::NOACK)
        });

        Ok(self)
    }

    /// Serve the keystore's key and certificate
    pub fn identity(mut self, credentials: &Credentials) -> Result<Self, TlsError> {
        self.ctx_builder.set_certificate(credentials.certificate())?;
        self.ctx_builder.set_private_key(credentials.private_key())?;
        for ca in credentials.chain() {
            self.ctx_builder.add_extra_chain_cert(ca.to_owned())?;
        }
        self.ctx_builder.check_private_key()?;
        self.has_cert = true;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if !self.has_cert {
            return Err(TlsError::InvalidConfig(
                "Server certificate not configured".to_string(),
            ));
        }

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            is_server: true,
            servername: None,
            verify_hostname: false,
            provider: TlsProvider::Default,
        })
    }
}
