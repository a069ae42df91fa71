//! HTTP/2 over TLS protocol check
//!
//! The probe discovers the server's TLS port, builds a client context from
//! the keystore fixture, negotiates ALPN and issues a single GET over
//! HTTP/2. Anything other than `h2` coming out of ALPN is a failure even
//! when the TLS handshake itself succeeded.
//!
//! The exchange runs on a `WorkerPool` owned by one `verify` call. The
//! caller waits on the result channel for at most the probe timeout; past
//! that the socket is shut down through an abort handle, which unblocks
//! the worker, and the pool is joined before `Timeout` is returned.

use super::discovery::{read_port, DiscoveryError, PropertySource, HTTPS_PORT_KEY};
use super::pool::WorkerPool;
use crate::http::h2::{self, H2Client, H2Response};
use crate::http::tls::{KeystoreError, KeystoreFixture, TlsConfig, TlsError, TlsProvider};
use crate::http::ALPN_H2;
use crate::scenario::ScenarioConfig;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Default deadline for one complete exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol check failures
///
/// Each variant points at a different root cause, so they are never
/// folded into one another.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("port discovery failed: {0}")]
    PortDiscovery(#[from] DiscoveryError),

    #[error("keystore fixture unusable: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("ALPN negotiated {}, expected h2", .0.as_deref().unwrap_or("nothing"))]
    UnexpectedProtocol(Option<String>),

    #[error("status {got}, expected {want}")]
    StatusMismatch { got: u16, want: u16 },

    #[error("body does not contain {fragment:?}")]
    BodyMismatch { fragment: String, body: String },

    #[error("HTTP/2 exchange failed: {0}")]
    Transport(String),

    /// Exchange deadline elapsed; a handshake or transport failure, kept
    /// separate only so reports can name the deadline
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl ProtocolError {
    /// Whether the failure is about the response content rather than the
    /// connection
    pub fn is_content_assertion(&self) -> bool {
        matches!(self, ProtocolError::StatusMismatch { .. } | ProtocolError::BodyMismatch { .. })
    }

    /// What is known about the handshake when this error was raised
    pub fn handshake_outcome(&self) -> Option<HandshakeOutcome> {
        match self {
            ProtocolError::Handshake(reason) => Some(HandshakeOutcome::Failure(reason.clone())),
            ProtocolError::UnexpectedProtocol(Some(protocol)) => Some(HandshakeOutcome::Success(protocol.clone())),
            ProtocolError::UnexpectedProtocol(None) => {
                Some(HandshakeOutcome::Failure("no application protocol negotiated".to_string()))
            }
            ProtocolError::StatusMismatch { .. } | ProtocolError::BodyMismatch { .. } => {
                Some(HandshakeOutcome::Success(ALPN_H2.to_string()))
            }
            _ => None,
        }
    }
}

impl From<h2::Error> for ProtocolError {
    fn from(err: h2::Error) -> Self {
        ProtocolError::Transport(err.to_string())
    }
}

/// Result of the TLS handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Handshake completed; carries the negotiated application protocol
    Success(String),
    Failure(String),
}

impl fmt::Display for HandshakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeOutcome::Success(protocol) => write!(f, "negotiated {}", protocol),
            HandshakeOutcome::Failure(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One body substring check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyAssertion {
    pub fragment: String,
    pub found: bool,
}

/// Observed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    pub body: String,
    pub body_assertions: Vec<BodyAssertion>,
}

/// Successful protocol check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    pub port: u16,
    pub handshake: HandshakeOutcome,
    pub http: HttpOutcome,
    pub elapsed: Duration,
}

/// What the response must look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub path: String,
    pub status: u16,
    pub body_contains: Vec<String>,
}

impl Expectation {
    /// Expect `200` for a GET of `path`
    pub fn get(path: impl Into<String>) -> Self {
        Expectation {
            path: path.into(),
            status: 200,
            body_contains: Vec::new(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn body_contains(mut self, fragment: impl Into<String>) -> Self {
        self.body_contains.push(fragment.into());
        self
    }

    fn evaluate(&self, response: &H2Response) -> Result<HttpOutcome, ProtocolError> {
        let body = String::from_utf8_lossy(response.body()).into_owned();
        let body_assertions = self
            .body_contains
            .iter()
            .map(|fragment| BodyAssertion {
                fragment: fragment.clone(),
                found: body.contains(fragment.as_str()),
            })
            .collect();
        let outcome = HttpOutcome {
            status: response.status(),
            body,
            body_assertions,
        };

        if outcome.status != self.status {
            return Err(ProtocolError::StatusMismatch {
                got: outcome.status,
                want: self.status,
            });
        }
        if let Some(missing) = outcome.body_assertions.iter().find(|a| !a.found) {
            return Err(ProtocolError::BodyMismatch {
                fragment: missing.fragment.clone(),
                body: outcome.body,
            });
        }
        Ok(outcome)
    }
}

/// Client side of the protocol check
#[derive(Debug, Clone)]
pub struct Http2Probe {
    host: String,
    port_key: String,
    provider: TlsProvider,
    protocols: Vec<String>,
    keystore: KeystoreFixture,
    timeout: Duration,
    workers: usize,
}

impl Http2Probe {
    /// Probe `localhost` with the scenario's engine and protocol list
    pub fn new(scenario: &ScenarioConfig, keystore: KeystoreFixture) -> Self {
        Http2Probe {
            host: "localhost".to_string(),
            port_key: HTTPS_PORT_KEY.to_string(),
            provider: scenario.tls_provider,
            protocols: scenario.protocol_ids().into_iter().map(str::to_string).collect(),
            keystore,
            timeout: DEFAULT_TIMEOUT,
            workers: 2,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Property the TLS port is published under
    pub fn port_key(mut self, key: impl Into<String>) -> Self {
        self.port_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Run the check once against the server published in `source`
    pub fn verify(&self, source: &dyn PropertySource, expectation: &Expectation) -> Result<ProtocolOutcome, ProtocolError> {
        let started = Instant::now();
        let port = read_port(source, &self.port_key)?;
        tracing::debug!(host = %self.host, port, provider = %self.provider, "Discovered TLS port");

        let config = self.client_config()?;
        let stream = self.connect(port)?;
        let abort = stream
            .try_clone()
            .map_err(|e| ProtocolError::Transport(format!("cannot clone socket: {}", e)))?;

        let pool = WorkerPool::new("h2-probe", self.workers)
            .map_err(|e| ProtocolError::Transport(format!("cannot start workers: {}", e)))?;

        let authority = self.host.clone();
        let path = expectation.path.clone();
        let timeout = self.timeout;
        let result = pool.submit(move || exchange(&config, stream, authority, &path, timeout));

        let exchanged = match result.recv_timeout(self.timeout) {
            Ok(exchanged) => exchanged,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(port, timeout = ?self.timeout, "HTTP/2 exchange timed out, aborting connection");
                let _ = abort.shutdown(Shutdown::Both);
                drop(pool);
                return Err(ProtocolError::Timeout(self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ProtocolError::Transport("worker exited without a result".to_string()))
            }
        };
        drop(pool);

        let (protocol, response) = exchanged?;
        let http = expectation.evaluate(&response)?;

        let outcome = ProtocolOutcome {
            port,
            handshake: HandshakeOutcome::Success(protocol),
            http,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            port,
            status = outcome.http.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "HTTP/2 check passed"
        );
        Ok(outcome)
    }

    /// Client context trusting and presenting the keystore; the loaded key
    /// material is dropped on return
    fn client_config(&self) -> Result<TlsConfig, ProtocolError> {
        let credentials = self.keystore.open()?;
        let protocols: Vec<&str> = self.protocols.iter().map(String::as_str).collect();

        let build = || -> Result<TlsConfig, TlsError> {
            TlsConfig::client()?
                .provider(self.provider)?
                .alpn(&protocols)?
                .servername(self.host.clone())
                .verify_hostname(true)
                .trust(&credentials)?
                .identity(&credentials)?
                .build()
        };
        build().map_err(|e| ProtocolError::Handshake(e.to_string()))
    }

    fn connect(&self, port: u16) -> Result<TcpStream, ProtocolError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| ProtocolError::Transport(format!("cannot resolve {}: {}", self.host, e)))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match connect_one(addr, self.timeout) {
                Ok(stream) => {
                    tracing::debug!(%addr, "Connected");
                    return Ok(stream);
                }
                Err(e) => last_error = Some(format!("{}: {}", addr, e)),
            }
        }
        Err(ProtocolError::Transport(format!(
            "cannot connect to {}:{}: {}",
            self.host,
            port,
            last_error.unwrap_or_else(|| "no addresses".to_string())
        )))
    }
}

fn connect_one(addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.connect_timeout(&SockAddr::from(addr), timeout)?;
    socket.set_nodelay(true)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    Ok(socket.into())
}

/// Worker side: handshake, ALPN check, one GET
fn exchange(
    config: &TlsConfig,
    stream: TcpStream,
    authority: String,
    path: &str,
    timeout: Duration,
) -> Result<(String, H2Response), ProtocolError> {
    let session = config
        .connect(stream)
        .map_err(|e| ProtocolError::Handshake(e.to_string()))?;

    let negotiated = session.negotiated_protocol().map(str::to_string);
    tracing::debug!(tls = %session.vars(), "TLS established");
    if negotiated.as_deref() != Some(ALPN_H2) {
        return Err(ProtocolError::UnexpectedProtocol(negotiated));
    }

    let mut client = H2Client::new(session, authority);
    client.set_timeout(Some(timeout));
    let response = client.connect().and_then(|_| client.get(path));
    let _ = client.close();

    Ok((ALPN_H2.to_string(), response?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &str) -> H2Response {
        H2Response {
            stream_id: 1,
            status,
            headers: Vec::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_expectation_passes() {
        let expectation = Expectation::get("/jsp/jstl.jsp").body_contains("JSTL Example");
        let outcome = expectation
            .evaluate(&response(200, "<h1>JSTL Example</h1>"))
            .unwrap();
        assert_eq!(outcome.status, 200);
        assert!(outcome.body_assertions.iter().all(|a| a.found));
    }

    #[test]
    fn test_status_mismatch() {
        let expectation = Expectation::get("/").body_contains("anything");
        assert!(matches!(
            expectation.evaluate(&response(404, "anything")),
            Err(ProtocolError::StatusMismatch { got: 404, want: 200 })
        ));
    }

    #[test]
    fn test_body_mismatch_carries_body() {
        let expectation = Expectation::get("/").body_contains("JSTL Example");
        match expectation.evaluate(&response(200, "Hello")) {
            Err(ProtocolError::BodyMismatch { fragment, body }) => {
                assert_eq!(fragment, "JSTL Example");
                assert_eq!(body, "Hello");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(ProtocolError::StatusMismatch { got: 500, want: 200 }.is_content_assertion());
        assert!(!ProtocolError::UnexpectedProtocol(None).is_content_assertion());
        assert_eq!(
            ProtocolError::UnexpectedProtocol(Some("http/1.1".into())).to_string(),
            "ALPN negotiated http/1.1, expected h2"
        );
        assert_eq!(
            ProtocolError::UnexpectedProtocol(None).handshake_outcome(),
            Some(HandshakeOutcome::Failure("no application protocol negotiated".to_string()))
        );
    }
}
