//! HTTP/2 server connection
//!
//! Serves the loopback fixture: reads complete requests and writes
//! complete responses, honouring the client's flow-control windows.

use super::error::{Error, ErrorCode, Result};
use super::frames::{self, flags, setting, Frame, FrameType};
use super::{CONNECTION_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE};
use crate::http::{HttpSession, SessionOps};
use bytes::{Bytes, BytesMut};
use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};
use std::collections::HashMap;

/// Streams the server lets a client open at once
const MAX_CONCURRENT_STREAMS: u32 = 100;

/// HTTP/2 server side of one connection
pub struct H2Server<S: SessionOps> {
    session: HttpSession<S>,
    hpack_encoder: HpackEncoder<'static>,
    hpack_decoder: HpackDecoder<'static>,
    peer_max_frame_size: u32,
    peer_initial_window: i64,
    connection_window: i64,
    stream_windows: HashMap<u32, i64>,
    last_stream_id: u32,
}

/// A complete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Request {
    pub stream_id: u32,
    pub method: String,
    pub path: String,
    pub authority: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl<S: SessionOps> H2Server<S> {
    pub fn new(session: S) -> Self {
        H2Server {
            session: HttpSession::new(session),
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            peer_initial_window: i64::from(DEFAULT_INITIAL_WINDOW_SIZE),
            connection_window: i64::from(DEFAULT_INITIAL_WINDOW_SIZE),
            stream_windows: HashMap::new(),
            last_stream_id: 0,
        }
    }

    /// Read the client preface and send our SETTINGS
    pub fn accept(&mut self) -> Result<()> {
        let mut preface = [0u8; 24];
        self.session.read_exact(&mut preface)?;
        if preface[..] != CONNECTION_PREFACE[..] {
            return Err(Error::MissingPreface);
        }

        let settings = frames::encode_settings(&[
            (setting::MAX_CONCURRENT_STREAMS, MAX_CONCURRENT_STREAMS),
            (setting::ENABLE_PUSH, 0),
        ]);
        self.session.write_all(&settings)?;
        Ok(())
    }

    /// Wait for the next complete request; `None` once the client leaves
    pub fn receive_request(&mut self) -> Result<Option<H2Request>> {
        let mut pending: HashMap<u32, H2Request> = HashMap::new();

        loop {
            let frame = match frames::read_frame(&mut self.session, DEFAULT_MAX_FRAME_SIZE) {
                Ok(frame) => frame,
                Err(e) if e.is_connection_closed() => return Ok(None),
                Err(e) => return Err(e),
            };
            let stream_id = frame.stream_id();

            match frame.frame_type() {
                Some(FrameType::Headers) => {
                    if stream_id == 0 || stream_id % 2 == 0 {
                        return Err(Error::Protocol(format!("invalid client stream {}", stream_id)));
                    }
                    let (header_flags, block) =
                        frames::read_header_block(&mut self.session, &frame, DEFAULT_MAX_FRAME_SIZE)?;
                    let decoded = self
                        .hpack_decoder
                        .decode(&block)
                        .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

                    let request = request_from_fields(stream_id, decoded)?;
                    self.last_stream_id = self.last_stream_id.max(stream_id);
                    self.stream_windows.insert(stream_id, self.peer_initial_window);

                    if header_flags & flags::END_STREAM != 0 {
                        return Ok(Some(request));
                    }
                    pending.insert(stream_id, request);
                }
                Some(FrameType::Data) => {
                    let request = pending.get_mut(&stream_id).ok_or(Error::UnexpectedFrame {
                        frame: FrameType::Data,
                        stream_id,
                    })?;
                    let mut body = BytesMut::from(&request.body[..]);
                    body.extend_from_slice(&frame.fragment()?);
                    request.body = body.freeze();

                    if frame.header.length > 0 {
                        let consumed = frame.header.length as u32;
                        let mut updates = BytesMut::new();
                        updates.extend_from_slice(&frames::encode_window_update(0, consumed));
                        updates.extend_from_slice(&frames::encode_window_update(stream_id, consumed));
                        self.session.write_all(&updates)?;
                    }

                    if frame.has(flags::END_STREAM) {
                        if let Some(request) = pending.remove(&stream_id) {
                            return Ok(Some(request));
                        }
                    }
                }
                Some(FrameType::Goaway) => return Ok(None),
                _ => self.handle_control(&frame)?,
            }
        }
    }

    /// Send a complete response
    pub fn send_response(&mut self, stream_id: u32, status: u16, headers: &[(&str, &str)], body: &[u8]) -> Result<()> {
        let status = status.to_string();
        let mut fields: Vec<(&[u8], &[u8])> = vec![(&b":status"[..], status.as_bytes())];
        fields.extend(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        let block = self.hpack_encoder.encode(fields);

        let encoded = frames::encode_header_block(
            stream_id,
            &block,
            body.is_empty(),
            self.peer_max_frame_size as usize,
        );
        self.session.write_all(&encoded)?;

        let mut remaining = body;
        while !remaining.is_empty() {
            let window = self.wait_for_window(stream_id)?;
            let len = remaining
                .len()
                .min(self.peer_max_frame_size as usize)
                .min(window as usize);
            let (chunk, rest) = remaining.split_at(len);
            let end = if rest.is_empty() { flags::END_STREAM } else { 0 };
            self.session
                .write_all(&frames::encode_frame(FrameType::Data, end, stream_id, chunk))?;

            self.connection_window -= len as i64;
            if let Some(w) = self.stream_windows.get_mut(&stream_id) {
                *w -= len as i64;
            }
            remaining = rest;
        }

        self.stream_windows.remove(&stream_id);
        Ok(())
    }

    /// Refuse a stream
    pub fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<()> {
        self.stream_windows.remove(&stream_id);
        self.session.write_all(&frames::encode_rst_stream(stream_id, code))?;
        Ok(())
    }

    /// Send GOAWAY and close the session
    pub fn close(&mut self) -> Result<()> {
        let goaway = frames::encode_goaway(self.last_stream_id, ErrorCode::NoError, "");
        let _ = self.session.write_all(&goaway);
        self.session.close()?;
        Ok(())
    }

    /// Block until both windows allow at least one byte on `stream_id`
    fn wait_for_window(&mut self, stream_id: u32) -> Result<i64> {
        loop {
            let stream_window = self.stream_windows.get(&stream_id).copied().unwrap_or(0);
            let window = self.connection_window.min(stream_window);
            if window > 0 {
                return Ok(window);
            }
            let frame = frames::read_frame(&mut self.session, DEFAULT_MAX_FRAME_SIZE)?;
            match frame.frame_type() {
                Some(FrameType::RstStream) if frame.stream_id() == stream_id => {
                    let code = frames::decode_rst_stream(&frame)?;
                    return Err(Error::Reset { stream_id, code });
                }
                Some(FrameType::Goaway) => {
                    let (last_stream_id, code, debug) = frames::decode_goaway(&frame)?;
                    return Err(Error::GoAway { last_stream_id, code, debug });
                }
                _ => self.handle_control(&frame)?,
            }
        }
    }

    fn handle_control(&mut self, frame: &Frame) -> Result<()> {
        match frame.frame_type() {
            Some(FrameType::Settings) => {
                let params = frames::decode_settings(frame)?;
                if frame.has(flags::ACK) {
                    return Ok(());
                }
                for (id, value) in params {
                    match id {
                        setting::MAX_FRAME_SIZE => self.peer_max_frame_size = value,
                        setting::INITIAL_WINDOW_SIZE => {
                            let delta = i64::from(value) - self.peer_initial_window;
                            for window in self.stream_windows.values_mut() {
                                *window += delta;
                            }
                            self.peer_initial_window = i64::from(value);
                        }
                        _ => {}
                    }
                }
                self.session.write_all(&frames::encode_settings_ack())?;
            }
            Some(FrameType::Ping) if !frame.has(flags::ACK) => {
                let pong = frames::encode_ping_ack(frame)?;
                self.session.write_all(&pong)?;
            }
            Some(FrameType::WindowUpdate) => {
                let increment = i64::from(frames::decode_window_update(frame)?);
                if frame.stream_id() == 0 {
                    self.connection_window += increment;
                } else if let Some(window) = self.stream_windows.get_mut(&frame.stream_id()) {
                    *window += increment;
                }
            }
            Some(FrameType::Continuation) => {
                return Err(Error::UnexpectedFrame {
                    frame: FrameType::Continuation,
                    stream_id: frame.stream_id(),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

fn request_from_fields(stream_id: u32, fields: Vec<(Vec<u8>, Vec<u8>)>) -> Result<H2Request> {
    let mut method = None;
    let mut path = None;
    let mut authority = None;
    let mut headers = Vec::new();

    for (name, value) in fields {
        let name = String::from_utf8_lossy(&name).into_owned();
        let value = String::from_utf8_lossy(&value).into_owned();
        match name.as_str() {
            ":method" => method = Some(value),
            ":path" => path = Some(value),
            ":authority" => authority = Some(value),
            ":scheme" => {}
            _ => headers.push((name, value)),
        }
    }

    Ok(H2Request {
        stream_id,
        method: method.ok_or_else(|| Error::Protocol("request without :method".to_string()))?,
        path: path.ok_or_else(|| Error::Protocol("request without :path".to_string()))?,
        authority,
        headers,
        body: Bytes::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_fields() {
        let fields = vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":scheme".to_vec(), b"https".to_vec()),
            (b":authority".to_vec(), b"localhost".to_vec()),
            (b":path".to_vec(), b"/jsp/jstl.jsp".to_vec()),
            (b"accept".to_vec(), b"*/*".to_vec()),
        ];
        let request = request_from_fields(1, fields).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/jsp/jstl.jsp");
        assert_eq!(request.authority.as_deref(), Some("localhost"));
        assert_eq!(request.headers, vec![("accept".to_string(), "*/*".to_string())]);
    }

    #[test]
    fn test_request_requires_path() {
        let fields = vec![(b":method".to_vec(), b"GET".to_vec())];
        assert!(matches!(request_from_fields(1, fields), Err(Error::Protocol(_))));
    }
}
