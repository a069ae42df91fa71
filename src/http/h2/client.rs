//! HTTP/2 client
//!
//! A blocking, single-connection client: one request at a time, no server
//! push, no request bodies beyond what fits the peer's initial window.
//! That is all the protocol probe needs, and keeping it small keeps the
//! failure modes readable.

use super::error::{Error, Result};
use super::frames::{self, flags, setting, Frame, FrameType};
use super::{CONNECTION_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE};
use crate::http::{HttpSession, SessionOps};
use bytes::{Bytes, BytesMut};
use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};
use std::time::Duration;

/// HTTP/2 client
pub struct H2Client<S: SessionOps> {
    session: HttpSession<S>,
    authority: String,
    hpack_encoder: HpackEncoder<'static>,
    hpack_decoder: HpackDecoder<'static>,
    next_stream_id: u32,
    /// Largest frame the server accepts from us
    peer_max_frame_size: u32,
    /// Bytes received but not yet returned to the server's connection window
    unacked_connection_bytes: u32,
    connected: bool,
}

impl<S: SessionOps> H2Client<S> {
    /// Create a client for `authority` over an established session
    pub fn new(session: S, authority: impl Into<String>) -> Self {
        H2Client {
            session: HttpSession::new(session),
            authority: authority.into(),
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
            next_stream_id: 1,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            unacked_connection_bytes: 0,
            connected: false,
        }
    }

    /// Set the readiness timeout for every read and write
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.session.set_timeout(timeout);
    }

    /// Send the connection preface and exchange SETTINGS
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        let mut opening = BytesMut::from(CONNECTION_PREFACE);
        opening.extend_from_slice(&frames::encode_settings(&[
            (setting::ENABLE_PUSH, 0),
            (setting::INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE),
            (setting::MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE),
        ]));
        self.session.write_all(&opening)?;

        // The server's first frame must be a non-ACK SETTINGS (RFC 7540 3.5)
        let first = self.read_frame()?;
        if first.frame_type() != Some(FrameType::Settings) || first.has(flags::ACK) {
            return Err(Error::Protocol(format!(
                "server preface must be SETTINGS, got type 0x{:x}",
                first.header.kind
            )));
        }
        self.apply_settings(&first)?;

        self.connected = true;
        tracing::debug!(authority = %self.authority, "HTTP/2 connection established");
        Ok(())
    }

    /// Send a GET request
    pub fn get(&mut self, path: &str) -> Result<H2Response> {
        self.request("GET", path, &[])
    }

    /// Send a request without a body and wait for its response
    pub fn request(&mut self, method: &str, path: &str, headers: &[(&str, &str)]) -> Result<H2Response> {
        if !self.connected {
            self.connect()?;
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let mut fields: Vec<(&[u8], &[u8])> = vec![
            (&b":method"[..], method.as_bytes()),
            (&b":scheme"[..], &b"https"[..]),
            (&b":authority"[..], self.authority.as_bytes()),
            (&b":path"[..], path.as_bytes()),
        ];
        fields.extend(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        let block = self.hpack_encoder.encode(fields);

        let encoded =
            frames::encode_header_block(stream_id, &block, true, self.peer_max_frame_size as usize);
        self.session.write_all(&encoded)?;
        tracing::debug!(stream_id, method, path, "request sent");

        self.recv_response(stream_id)
    }

    /// Read frames until the response on `stream_id` is complete
    pub fn recv_response(&mut self, stream_id: u32) -> Result<H2Response> {
        let mut response = H2Response {
            stream_id,
            status: 0,
            headers: Vec::new(),
            body: Bytes::new(),
        };
        let mut body = BytesMut::new();
        let mut headers_received = false;
        let mut unacked_stream_bytes = 0u32;

        loop {
            let frame = self.read_frame()?;
            let frame_stream = frame.stream_id();

            match frame.frame_type() {
                Some(FrameType::Headers) => {
                    let (header_flags, block) =
                        frames::read_header_block(&mut self.session, &frame, DEFAULT_MAX_FRAME_SIZE)?;
                    // Decode even foreign blocks: HPACK state is connection-wide
                    let decoded = self
                        .hpack_decoder
                        .decode(&block)
                        .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

                    if frame_stream != stream_id {
                        continue;
                    }

                    if !headers_received {
                        for (name, value) in decoded {
                            let name = String::from_utf8_lossy(&name).into_owned();
                            let value = String::from_utf8_lossy(&value).into_owned();
                            if name == ":status" {
                                response.status = value.parse().map_err(|_| {
                                    Error::Protocol(format!("invalid :status {:?}", value))
                                })?;
                            } else {
                                response.headers.push((name, value));
                            }
                        }
                        if response.status == 0 {
                            return Err(Error::Protocol("response without :status".to_string()));
                        }
                        // 1xx responses are followed by the real header block
                        headers_received = response.status >= 200;
                        if !headers_received {
                            response.headers.clear();
                        }
                    }

                    if header_flags & flags::END_STREAM != 0 {
                        break;
                    }
                }
                Some(FrameType::Data) => {
                    if frame_stream != stream_id || !headers_received {
                        return Err(Error::UnexpectedFrame {
                            frame: FrameType::Data,
                            stream_id: frame_stream,
                        });
                    }

                    body.extend_from_slice(&frame.fragment()?);
                    // Padding counts against flow control too
                    let consumed = frame.header.length as u32;
                    unacked_stream_bytes += consumed;
                    self.unacked_connection_bytes += consumed;

                    if frame.has(flags::END_STREAM) {
                        break;
                    }
                    self.replenish_windows(stream_id, &mut unacked_stream_bytes)?;
                }
                Some(FrameType::Settings) => self.apply_settings(&frame)?,
                Some(FrameType::Ping) if !frame.has(flags::ACK) => {
                    let pong = frames::encode_ping_ack(&frame)?;
                    self.session.write_all(&pong)?;
                }
                Some(FrameType::Goaway) => {
                    let (last_stream_id, code, debug) = frames::decode_goaway(&frame)?;
                    // A graceful GOAWAY still lets streams up to last_stream_id finish
                    if code != super::ErrorCode::NoError || last_stream_id < stream_id {
                        return Err(Error::GoAway {
                            last_stream_id,
                            code,
                            debug,
                        });
                    }
                }
                Some(FrameType::RstStream) if frame_stream == stream_id => {
                    let code = frames::decode_rst_stream(&frame)?;
                    return Err(Error::Reset { stream_id, code });
                }
                Some(FrameType::PushPromise) => {
                    return Err(Error::Protocol("PUSH_PROMISE received with push disabled".to_string()));
                }
                Some(FrameType::Continuation) => {
                    return Err(Error::UnexpectedFrame {
                        frame: FrameType::Continuation,
                        stream_id: frame_stream,
                    });
                }
                // WINDOW_UPDATE, PRIORITY, PING ACK, foreign RST_STREAM and
                // unknown frame types carry nothing for a bodiless request
                _ => {}
            }
        }

        response.body = body.freeze();
        tracing::debug!(stream_id, status = response.status, bytes = response.body.len(), "response received");
        Ok(response)
    }

    /// Send GOAWAY and close the session
    pub fn close(&mut self) -> Result<()> {
        let last = self.next_stream_id.saturating_sub(2);
        let goaway = frames::encode_goaway(last, super::ErrorCode::NoError, "");
        // The peer may already be gone
        let _ = self.session.write_all(&goaway);
        self.session.close()?;
        Ok(())
    }

    /// Underlying session
    pub fn session(&self) -> &S {
        self.session.get_ref()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        frames::read_frame(&mut self.session, DEFAULT_MAX_FRAME_SIZE)
    }

    fn apply_settings(&mut self, frame: &Frame) -> Result<()> {
        if frame.has(flags::ACK) {
            return frames::decode_settings(frame).map(|_| ());
        }
        for (id, value) in frames::decode_settings(frame)? {
            if id == setting::MAX_FRAME_SIZE {
                self.peer_max_frame_size = value;
            }
        }
        self.session.write_all(&frames::encode_settings_ack())?;
        Ok(())
    }

    fn replenish_windows(&mut self, stream_id: u32, unacked_stream_bytes: &mut u32) -> Result<()> {
        let threshold = DEFAULT_INITIAL_WINDOW_SIZE / 2;
        let mut updates = BytesMut::new();

        if self.unacked_connection_bytes >= threshold {
            updates.extend_from_slice(&frames::encode_window_update(0, self.unacked_connection_bytes));
            self.unacked_connection_bytes = 0;
        }
        if *unacked_stream_bytes >= threshold {
            updates.extend_from_slice(&frames::encode_window_update(stream_id, *unacked_stream_bytes));
            *unacked_stream_bytes = 0;
        }

        if !updates.is_empty() {
            self.session.write_all(&updates)?;
        }
        Ok(())
    }
}

/// HTTP/2 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Response {
    pub stream_id: u32,
    pub status: u16,
    /// Regular header fields in arrival order
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl H2Response {
    /// Get status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the first value of a header (names are lower-case in HTTP/2)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get body as string
    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Protocol(format!("Invalid UTF-8 in body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::PollEvents;
    use crate::http::Error as SessionError;
    use std::collections::VecDeque;

    /// Scripted server: bytes to deliver and a record of what was written
    struct ScriptedSession {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl ScriptedSession {
        fn new(script: &[Bytes]) -> Self {
            ScriptedSession {
                input: script.iter().flat_map(|b| b.iter().copied()).collect(),
                output: Vec::new(),
            }
        }
    }

    impl SessionOps for ScriptedSession {
        fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> crate::http::Result<bool> {
            Ok(true)
        }

        fn read(&mut self, buf: &mut [u8]) -> crate::http::Result<usize> {
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> crate::http::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> crate::http::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> crate::http::Result<()> {
            Ok(())
        }
    }

    fn response_headers(status: &str, end_stream: bool) -> Bytes {
        let mut encoder = HpackEncoder::new();
        let block = encoder.encode(vec![
            (&b":status"[..], status.as_bytes()),
            (&b"content-type"[..], &b"text/html"[..]),
        ]);
        frames::encode_header_block(1, &block, end_stream, 16_384)
    }

    #[test]
    fn test_get_collects_multiple_data_frames() {
        let script = [
            frames::encode_settings(&[(setting::MAX_CONCURRENT_STREAMS, 100)]),
            frames::encode_settings_ack(),
            response_headers("200", false),
            frames::encode_frame(FrameType::Data, 0, 1, b"<h1>JSTL "),
            frames::encode_frame(FrameType::Data, flags::END_STREAM, 1, b"Example</h1>"),
        ];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");

        let response = client.get("/jsp/jstl.jsp").unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.body_string().unwrap(), "<h1>JSTL Example</h1>");

        let written = &client.session().output;
        assert!(written.starts_with(CONNECTION_PREFACE));
    }

    #[test]
    fn test_headers_only_response() {
        let script = [frames::encode_settings(&[]), response_headers("404", true)];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");

        let response = client.get("/missing").unwrap();
        assert_eq!(response.status(), 404);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_ping_is_answered() {
        let script = [
            frames::encode_settings(&[]),
            frames::encode_frame(FrameType::Ping, 0, 0, b"12345678"),
            response_headers("204", true),
        ];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");
        client.get("/").unwrap();

        let pong = frames::encode_frame(FrameType::Ping, flags::ACK, 0, b"12345678");
        let written = &client.session().output;
        assert!(written.windows(pong.len()).any(|w| w == &pong[..]));
    }

    #[test]
    fn test_reset_stream_is_reported() {
        let script = [
            frames::encode_settings(&[]),
            frames::encode_rst_stream(1, super::super::ErrorCode::RefusedStream),
        ];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");

        let err = client.get("/").unwrap_err();
        assert!(matches!(err, Error::Reset { stream_id: 1, .. }));
    }

    #[test]
    fn test_goaway_before_response() {
        let script = [
            frames::encode_settings(&[]),
            frames::encode_goaway(0, super::super::ErrorCode::InadequateSecurity, "tls"),
        ];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");

        let err = client.get("/").unwrap_err();
        assert!(matches!(err, Error::GoAway { last_stream_id: 0, .. }));
    }

    #[test]
    fn test_server_preface_must_be_settings() {
        let script = [frames::encode_frame(FrameType::Ping, 0, 0, b"12345678")];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");
        assert!(matches!(client.connect(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_eof_is_connection_closed() {
        let script = [frames::encode_settings(&[])];
        let mut client = H2Client::new(ScriptedSession::new(&script), "localhost");

        let err = client.get("/").unwrap_err();
        assert!(matches!(err, Error::Transport(SessionError::ConnectionClosed)));
    }
}
