//! Loopback HTTP/2 server
//!
//! Serves static routes over TLS on an ephemeral loopback port and
//! publishes that port the way the assembled server does. The accept loop
//! polls a non-blocking listener so it can observe the shutdown flag; every
//! connection gets its own thread and is joined on stop.

use super::FixtureError;
use crate::http::h2::{ErrorCode, H2Server};
use crate::http::tls::{KeystoreFixture, TlsConfig};
use crate::http::ALPN_H2;
use crate::oracle::HTTPS_PORT_KEY;
use crate::scenario::SystemProperties;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// A canned response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Route {
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Route {
            status,
            content_type: "text/html;charset=utf-8".to_string(),
            body: body.into().into_bytes(),
        }
    }
}

/// Builder for `FixtureServer`
pub struct FixtureBuilder {
    keystore: KeystoreFixture,
    alpn: Vec<String>,
    routes: HashMap<String, Route>,
}

impl FixtureBuilder {
    /// Protocols the server accepts, in its own preference order
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn route(mut self, path: impl Into<String>, route: Route) -> Self {
        self.routes.insert(path.into(), route);
        self
    }

    /// The page the demo web application serves at `/jsp/jstl.jsp`
    pub fn jstl_page(self) -> Self {
        self.route(
            "/jsp/jstl.jsp",
            Route::html(
                200,
                "<html><head><title>JSTL Example</title></head>\
                 <body><h1>JSTL Example</h1><p>1 2 3 4 5 6 7 8 9 10</p></body></html>",
            ),
        )
    }

    /// Bind an ephemeral loopback port and start serving
    pub fn start(self) -> Result<FixtureServer, FixtureError> {
        let credentials = self.keystore.open()?;
        let protocols: Vec<&str> = self.alpn.iter().map(String::as_str).collect();
        let tls = TlsConfig::server()?.alpn(&protocols)?.identity(&credentials)?.build()?;
        drop(credentials);

        let listener = bind_loopback()?;
        let addr = listener.local_addr()?;
        tracing::debug!(%addr, alpn = ?self.alpn, "Fixture server listening");

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections: Arc<Mutex<Vec<Connection>>> = Arc::default();
        let routes = Arc::new(self.routes);

        let accept = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            thread::Builder::new()
                .name("fixture-accept".to_string())
                .spawn(move || accept_loop(listener, tls, routes, shutdown, connections))?
        };

        Ok(FixtureServer {
            addr,
            shutdown,
            accept: Some(accept),
            connections,
        })
    }
}

struct Connection {
    stream: TcpStream,
    handle: JoinHandle<()>,
}

/// Running loopback server; stops on drop
pub struct FixtureServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl FixtureServer {
    /// Server presenting the keystore's identity, accepting `h2` and `http/1.1`
    pub fn builder(keystore: KeystoreFixture) -> FixtureBuilder {
        FixtureBuilder {
            keystore,
            alpn: vec![ALPN_H2.to_string(), "http/1.1".to_string()],
            routes: HashMap::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Publish the bound port under `boot.https.port`
    pub fn publish(&self, properties: &mut SystemProperties) {
        properties.set(HTTPS_PORT_KEY, self.port().to_string());
    }

    /// Connections whose threads are still running
    pub fn open_connections(&self) -> usize {
        let mut guard = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        reap(&mut guard);
        guard.len()
    }

    /// Stop accepting, close open connections and join every thread
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(accept) = self.accept.take() {
            if accept.join().is_err() {
                tracing::warn!("Fixture accept loop panicked");
            }
        }

        let connections = match self.connections.lock() {
            Ok(mut guard) => guard.drain(..).collect::<Vec<_>>(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for connection in connections {
            let _ = connection.stream.shutdown(Shutdown::Both);
            let _ = connection.handle.join();
        }
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_loopback() -> io::Result<TcpListener> {
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn accept_loop(
    listener: TcpListener,
    tls: TlsConfig,
    routes: Arc<HashMap<String, Route>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<Mutex<Vec<Connection>>>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = track(stream, peer, &tls, &routes, &connections) {
                    tracing::warn!(%peer, error = %e, "Fixture could not start connection");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_BACKOFF),
            Err(e) => {
                tracing::error!(error = %e, "Fixture accept failed");
                break;
            }
        }
    }
}

fn track(
    stream: TcpStream,
    peer: SocketAddr,
    tls: &TlsConfig,
    routes: &Arc<HashMap<String, Route>>,
    connections: &Mutex<Vec<Connection>>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(CONNECTION_TIMEOUT))?;
    let abort = stream.try_clone()?;

    let tls = tls.clone();
    let routes = Arc::clone(routes);
    let handle = thread::Builder::new()
        .name(format!("fixture-{}", peer))
        .spawn(move || {
            if let Err(e) = serve(stream, &tls, &routes) {
                tracing::debug!(%peer, error = %e, "Fixture connection ended");
            }
        })?;

    let mut guard = match connections.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    reap(&mut guard);
    guard.push(Connection { stream: abort, handle });
    Ok(())
}

/// Join connection threads that have already returned
fn reap(connections: &mut Vec<Connection>) {
    let (finished, running): (Vec<_>, Vec<_>) = connections.drain(..).partition(|c| c.handle.is_finished());
    *connections = running;
    for connection in finished {
        let _ = connection.handle.join();
    }
}

fn serve(stream: TcpStream, tls: &TlsConfig, routes: &HashMap<String, Route>) -> Result<(), FixtureError> {
    let session = tls.accept(stream)?;
    if session.negotiated_protocol() != Some(ALPN_H2) {
        tracing::debug!(tls = %session.vars(), "Client did not negotiate h2, closing");
        return Ok(());
    }

    let mut server = H2Server::new(session);
    server.accept()?;
    while let Some(request) = server.receive_request()? {
        if request.method != "GET" && request.method != "HEAD" {
            server.reset_stream(request.stream_id, ErrorCode::RefusedStream)?;
            continue;
        }
        let not_found = Route::html(404, "Not Found");
        let route = routes.get(&request.path).unwrap_or(&not_found);
        let length = route.body.len().to_string();
        let headers = [
            ("content-type", route.content_type.as_str()),
            ("content-length", length.as_str()),
        ];
        let body: &[u8] = if request.method == "HEAD" { &[] } else { &route.body };
        tracing::debug!(path = %request.path, status = route.status, "Fixture serving");
        server.send_response(request.stream_id, route.status, &headers, body)?;
    }
    server.close()?;
    Ok(())
}
