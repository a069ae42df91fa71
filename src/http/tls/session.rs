//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections.

use super::config::{TlsConfig, TlsError};
use super::vars::TlsVars;
use crate::http::session::{poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS session
///
/// Wraps an OpenSSL SslStream and provides poll/read/write/close operations.
pub struct TlsSession {
    stream: SslStream<TcpStream>,
    vars: TlsVars,
    failed: bool,
}

impl TlsSession {
    /// Create a client TLS connection (perform handshake)
    pub(crate) fn connect(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(ref servername) = config.servername {
            // IP literals are matched against IP SANs and never sent as SNI
            match servername.parse::<IpAddr>() {
                Ok(ip) => {
                    if config.verify_hostname {
                        ssl.param_mut().set_ip(ip)?;
                    }
                }
                Err(_) => {
                    ssl.set_hostname(servername)?;
                    if config.verify_hostname {
                        ssl.param_mut().set_host(servername)?;
                    }
                }
            }
        }

        // The openssl crate's connect() performs the handshake synchronously
        let ssl_stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        let vars = TlsVars::from_ssl(ssl_stream.ssl());
        tracing::debug!(%vars, "client handshake complete");

        Ok(TlsSession {
            stream: ssl_stream,
            vars,
            failed: false,
        })
    }

    /// Accept a client connection with TLS (perform handshake)
    pub(crate) fn accept(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;

        let ssl_stream = ssl
            .accept(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))?;

        let vars = TlsVars::from_ssl(ssl_stream.ssl());
        tracing::debug!(%vars, "server handshake complete");

        Ok(TlsSession {
            stream: ssl_stream,
            vars,
            failed: false,
        })
    }

    /// Negotiated parameters
    pub fn vars(&self) -> &TlsVars {
        &self.vars
    }

    /// ALPN protocol selected by the server, if any
    pub fn negotiated_protocol(&self) -> Option<&str> {
        self.vars.alpn.as_deref()
    }

    /// Check if TLS I/O failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Get reference to underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }
}

impl SessionOps for TlsSession {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL
        if matches!(events, PollEvents::Read | PollEvents::Both) && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn flush(&mut self) -> HttpResult<()> {
        self.stream.flush().map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn close(&mut self) -> HttpResult<()> {
        // Send close_notify only on a healthy stream
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
