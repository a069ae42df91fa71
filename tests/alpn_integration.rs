//! ALPN negotiation integration tests
//!
//! The server picks the first protocol in the client's offered list that it
//! also supports. With no overlap it does not answer ALPN at all and the
//! handshake completes without a negotiated protocol.

use h2harness::http::tls::{KeystoreFixture, TlsConfig, TlsError};
use std::net::{TcpListener, TcpStream};
use std::thread;

fn negotiate(client_protocols: &[&str], server_protocols: &[&str]) -> Option<String> {
    let dir = tempfile::tempdir().unwrap();
    let keystore = KeystoreFixture::generate_self_signed(dir.path().join("ks.p12"), "storepwd", "localhost").unwrap();
    let credentials = keystore.open().unwrap();

    let server_config = TlsConfig::server()
        .unwrap()
        .alpn(server_protocols)
        .unwrap()
        .identity(&credentials)
        .unwrap()
        .build()
        .unwrap();
    let client_config = TlsConfig::client()
        .unwrap()
        .alpn(client_protocols)
        .unwrap()
        .trust(&credentials)
        .unwrap()
        .servername("localhost")
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let session = server_config.accept(tcp_stream).unwrap();
        session.negotiated_protocol().map(str::to_string)
    });

    let session = client_config.connect(TcpStream::connect(addr).unwrap()).unwrap();
    let client_side = session.negotiated_protocol().map(str::to_string);
    let server_side = server.join().unwrap();
    assert_eq!(client_side, server_side, "both ends must agree on ALPN");
    client_side
}

#[test]
fn test_alpn_client_order_wins() {
    assert_eq!(negotiate(&["h2", "http/1.1"], &["http/1.1", "h2"]).as_deref(), Some("h2"));
}

#[test]
fn test_alpn_http11_only_client() {
    assert_eq!(negotiate(&["http/1.1"], &["h2", "http/1.1"]).as_deref(), Some("http/1.1"));
}

#[test]
fn test_alpn_skips_unsupported_preference() {
    assert_eq!(negotiate(&["spdy/3", "h2"], &["h2", "http/1.1"]).as_deref(), Some("h2"));
}

#[test]
fn test_alpn_no_overlap_is_not_a_handshake_failure() {
    assert_eq!(negotiate(&["h2"], &["http/1.1"]), None);
}

#[test]
fn test_alpn_rejects_invalid_identifiers() {
    let too_long = "x".repeat(256);
    assert!(matches!(
        TlsConfig::client().unwrap().alpn(&["h2", ""]),
        Err(TlsError::InvalidConfig(_))
    ));
    assert!(matches!(
        TlsConfig::server().unwrap().alpn(&[too_long.as_str()]),
        Err(TlsError::InvalidConfig(_))
    ));
}
