//! HTTP/2 error types
//!
//! This module defines error types for HTTP/2 operations, mapping to
//! the error codes defined in RFC 7540 Section 7.

use super::frames::FrameType;
use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the session layer beneath the frames
    #[error("Transport error: {0}")]
    Transport(#[from] crate::http::Error),

    /// Protocol error detected (RFC 7540 Section 7 - Error code 0x1)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame size error (RFC 7540 Section 7 - Error code 0x6)
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Compression error (RFC 7540 Section 7 - Error code 0x9)
    #[error("Compression error: {0}")]
    Compression(String),

    /// Frame arrived where the connection state does not allow it
    #[error("Unexpected {frame} frame on stream {stream_id}")]
    UnexpectedFrame { frame: FrameType, stream_id: u32 },

    /// Peer reset the stream
    #[error("Stream {stream_id} reset by peer: {code}")]
    Reset { stream_id: u32, code: ErrorCode },

    /// Peer shut the connection down before answering
    #[error("GOAWAY from peer (last stream {last_stream_id}): {code} {debug}")]
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug: String,
    },

    /// Client did not open with the connection preface
    #[error("Missing connection preface")]
    MissingPreface,
}

impl Error {
    /// True when the peer simply went away
    pub fn is_connection_closed(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Error::Transport(crate::http::Error::ConnectionClosed) => true,
            Error::Transport(crate::http::Error::Io(e)) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    /// Code outside the registry; peers must treat it as INTERNAL_ERROR
    Unknown(u32),
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::NoError => 0x0,
            ErrorCode::ProtocolError => 0x1,
            ErrorCode::InternalError => 0x2,
            ErrorCode::FlowControlError => 0x3,
            ErrorCode::SettingsTimeout => 0x4,
            ErrorCode::StreamClosed => 0x5,
            ErrorCode::FrameSizeError => 0x6,
            ErrorCode::RefusedStream => 0x7,
            ErrorCode::Cancel => 0x8,
            ErrorCode::CompressionError => 0x9,
            ErrorCode::ConnectError => 0xa,
            ErrorCode::EnhanceYourCalm => 0xb,
            ErrorCode::InadequateSecurity => 0xc,
            ErrorCode::Http11Required => 0xd,
            ErrorCode::Unknown(code) => code,
        }
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x2 => ErrorCode::InternalError,
            0x3 => ErrorCode::FlowControlError,
            0x4 => ErrorCode::SettingsTimeout,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            0xc => ErrorCode::InadequateSecurity,
            0xd => ErrorCode::Http11Required,
            other => ErrorCode::Unknown(other),
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
            ErrorCode::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::NoError.as_u32(), 0x0);
        assert_eq!(ErrorCode::Http11Required.as_u32(), 0xd);
        assert_eq!(ErrorCode::from_u32(0x1), ErrorCode::ProtocolError);
        assert_eq!(ErrorCode::from_u32(0xff), ErrorCode::Unknown(0xff));
        assert_eq!(ErrorCode::Unknown(0xff).as_u32(), 0xff);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorCode::Http11Required.to_string(), "HTTP_1_1_REQUIRED (0xd)");

        let err = Error::Reset {
            stream_id: 1,
            code: ErrorCode::RefusedStream,
        };
        assert_eq!(err.to_string(), "Stream 1 reset by peer: REFUSED_STREAM (0x7)");
    }

    #[test]
    fn test_connection_closed() {
        assert!(Error::Transport(crate::http::Error::ConnectionClosed).is_connection_closed());
        assert!(!Error::MissingPreface.is_connection_closed());
    }
}
