//! HTTP/2 frame types and codec
//!
//! This module defines the frame layout specified in RFC 7540 Section 4
//! and the handful of payload encodings the probe and the fixture need.

use super::error::{Error, ErrorCode, Result};
use crate::http::{HttpSession, SessionOps};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest payload any peer may announce (2^24 - 1)
pub const MAX_ALLOWED_FRAME_SIZE: u32 = 0x00FF_FFFF;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame flag bits
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod setting {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    /// Raw type byte; unknown types must be ignored, not rejected
    pub kind: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Encode the 9-byte header
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0] = ((self.length >> 16) & 0xFF) as u8;
        header[1] = ((self.length >> 8) & 0xFF) as u8;
        header[2] = (self.length & 0xFF) as u8;
        header[3] = self.kind;
        header[4] = self.flags;
        header[5..].copy_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
        header
    }

    /// Decode the 9-byte header, dropping the reserved bit
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        FrameHeader {
            length: (usize::from(bytes[0]) << 16) | (usize::from(bytes[1]) << 8) | usize::from(bytes[2]),
            kind: bytes[3],
            flags: bytes[4],
            stream_id: u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x7FFF_FFFF,
        }
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.kind)
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// A complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn frame_type(&self) -> Option<FrameType> {
        self.header.frame_type()
    }

    pub fn stream_id(&self) -> u32 {
        self.header.stream_id
    }

    pub fn has(&self, flag: u8) -> bool {
        self.header.has(flag)
    }

    /// Data or header block fragment with padding and priority fields removed
    pub fn fragment(&self) -> Result<Bytes> {
        let mut payload = self.payload.clone();
        let mut pad_len = 0usize;

        if self.has(flags::PADDED) {
            if payload.is_empty() {
                return Err(Error::FrameSize("padded frame without pad length".to_string()));
            }
            pad_len = usize::from(payload.get_u8());
        }
        if self.frame_type() == Some(FrameType::Headers) && self.has(flags::PRIORITY) {
            if payload.len() < 5 {
                return Err(Error::FrameSize("HEADERS priority fields truncated".to_string()));
            }
            payload.advance(5);
        }
        if pad_len > payload.len() {
            return Err(Error::Protocol("padding exceeds frame payload".to_string()));
        }

        payload.truncate(payload.len() - pad_len);
        Ok(payload)
    }
}

/// Encode a frame with the given payload
pub fn encode_frame(kind: FrameType, frame_flags: u8, stream_id: u32, payload: &[u8]) -> Bytes {
    let header = FrameHeader {
        length: payload.len(),
        kind: kind as u8,
        flags: frame_flags,
        stream_id,
    };
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a SETTINGS frame carrying `params`
pub fn encode_settings(params: &[(u16, u32)]) -> Bytes {
    let mut payload = BytesMut::with_capacity(params.len() * 6);
    for (id, value) in params {
        payload.put_u16(*id);
        payload.put_u32(*value);
    }
    encode_frame(FrameType::Settings, 0, 0, &payload)
}

/// Encode a SETTINGS acknowledgement
pub fn encode_settings_ack() -> Bytes {
    encode_frame(FrameType::Settings, flags::ACK, 0, &[])
}

/// Decode a SETTINGS payload into (identifier, value) pairs
pub fn decode_settings(frame: &Frame) -> Result<Vec<(u16, u32)>> {
    if frame.stream_id() != 0 {
        return Err(Error::Protocol("SETTINGS frame must have stream ID 0".to_string()));
    }
    if frame.has(flags::ACK) {
        if !frame.payload.is_empty() {
            return Err(Error::FrameSize("SETTINGS ACK with payload".to_string()));
        }
        return Ok(Vec::new());
    }
    if frame.payload.len() % 6 != 0 {
        return Err(Error::FrameSize(format!(
            "SETTINGS payload length {} is not a multiple of 6",
            frame.payload.len()
        )));
    }

    let mut payload = frame.payload.clone();
    let mut params = Vec::with_capacity(payload.len() / 6);
    while payload.has_remaining() {
        let id = payload.get_u16();
        let value = payload.get_u32();
        if id == setting::MAX_FRAME_SIZE && !(16_384..=MAX_ALLOWED_FRAME_SIZE).contains(&value) {
            return Err(Error::Protocol(format!("invalid SETTINGS_MAX_FRAME_SIZE {}", value)));
        }
        if id == setting::INITIAL_WINDOW_SIZE && value > 0x7FFF_FFFF {
            return Err(Error::Protocol(format!("invalid SETTINGS_INITIAL_WINDOW_SIZE {}", value)));
        }
        params.push((id, value));
    }
    Ok(params)
}

/// Encode a WINDOW_UPDATE frame
pub fn encode_window_update(stream_id: u32, increment: u32) -> Bytes {
    encode_frame(FrameType::WindowUpdate, 0, stream_id, &(increment & 0x7FFF_FFFF).to_be_bytes())
}

/// Decode a WINDOW_UPDATE increment
pub fn decode_window_update(frame: &Frame) -> Result<u32> {
    if frame.payload.len() != 4 {
        return Err(Error::FrameSize("WINDOW_UPDATE must be 4 bytes".to_string()));
    }
    let mut payload = frame.payload.clone();
    Ok(payload.get_u32() & 0x7FFF_FFFF)
}

/// Encode the answer to a PING
pub fn encode_ping_ack(frame: &Frame) -> Result<Bytes> {
    if frame.payload.len() != 8 {
        return Err(Error::FrameSize("PING must be 8 bytes".to_string()));
    }
    Ok(encode_frame(FrameType::Ping, flags::ACK, 0, &frame.payload))
}

/// Encode a GOAWAY frame
pub fn encode_goaway(last_stream_id: u32, code: ErrorCode, debug: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(8 + debug.len());
    payload.put_u32(last_stream_id & 0x7FFF_FFFF);
    payload.put_u32(code.as_u32());
    payload.put_slice(debug.as_bytes());
    encode_frame(FrameType::Goaway, 0, 0, &payload)
}

/// Decode a GOAWAY frame into (last stream, code, debug text)
pub fn decode_goaway(frame: &Frame) -> Result<(u32, ErrorCode, String)> {
    if frame.payload.len() < 8 {
        return Err(Error::FrameSize("GOAWAY shorter than 8 bytes".to_string()));
    }
    let mut payload = frame.payload.clone();
    let last_stream_id = payload.get_u32() & 0x7FFF_FFFF;
    let code = ErrorCode::from_u32(payload.get_u32());
    Ok((last_stream_id, code, String::from_utf8_lossy(&payload).into_owned()))
}

/// Encode a RST_STREAM frame
pub fn encode_rst_stream(stream_id: u32, code: ErrorCode) -> Bytes {
    encode_frame(FrameType::RstStream, 0, stream_id, &code.as_u32().to_be_bytes())
}

/// Decode a RST_STREAM error code
pub fn decode_rst_stream(frame: &Frame) -> Result<ErrorCode> {
    if frame.payload.len() != 4 {
        return Err(Error::FrameSize("RST_STREAM must be 4 bytes".to_string()));
    }
    let mut payload = frame.payload.clone();
    Ok(ErrorCode::from_u32(payload.get_u32()))
}

/// Split a header block into HEADERS plus CONTINUATION frames
pub fn encode_header_block(stream_id: u32, block: &[u8], end_stream: bool, max_frame_size: usize) -> Bytes {
    let max = max_frame_size.max(1);
    let mut chunks = block.chunks(max).peekable();
    let mut buf = BytesMut::new();

    let first = chunks.next().unwrap_or(&[]);
    let mut first_flags = if end_stream { flags::END_STREAM } else { 0 };
    if chunks.peek().is_none() {
        first_flags |= flags::END_HEADERS;
    }
    buf.put(encode_frame(FrameType::Headers, first_flags, stream_id, first));

    while let Some(chunk) = chunks.next() {
        let cont_flags = if chunks.peek().is_none() { flags::END_HEADERS } else { 0 };
        buf.put(encode_frame(FrameType::Continuation, cont_flags, stream_id, chunk));
    }
    buf.freeze()
}

/// Read one frame, rejecting payloads above `max_frame_size`
pub fn read_frame<S: SessionOps>(session: &mut HttpSession<S>, max_frame_size: u32) -> Result<Frame> {
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    session.read_exact(&mut header_bytes)?;
    let header = FrameHeader::decode(&header_bytes);

    if header.length > max_frame_size as usize {
        return Err(Error::FrameSize(format!(
            "{} byte frame exceeds limit of {}",
            header.length, max_frame_size
        )));
    }

    let mut payload = vec![0u8; header.length];
    session.read_exact(&mut payload)?;

    Ok(Frame {
        header,
        payload: Bytes::from(payload),
    })
}

/// Gather a complete header block starting at a HEADERS frame
///
/// Returns the HEADERS frame flags and the concatenated block. The frames
/// that follow must be CONTINUATION frames on the same stream.
pub fn read_header_block<S: SessionOps>(
    session: &mut HttpSession<S>,
    first: &Frame,
    max_frame_size: u32,
) -> Result<(u8, Bytes)> {
    let mut block = BytesMut::from(&first.fragment()?[..]);
    let mut end_headers = first.has(flags::END_HEADERS);

    while !end_headers {
        let next = read_frame(session, max_frame_size)?;
        if next.frame_type() != Some(FrameType::Continuation) || next.stream_id() != first.stream_id() {
            return Err(Error::Protocol(format!(
                "expected CONTINUATION on stream {}, got type 0x{:x} on stream {}",
                first.stream_id(),
                next.header.kind,
                next.stream_id()
            )));
        }
        block.put_slice(&next.payload);
        end_headers = next.has(flags::END_HEADERS);
    }

    Ok((first.header.flags, block.freeze()))
}
