//! Error types and handling for the HTTP/3 wire layer.

use crate::transport::StreamNum;
use std::fmt;

/// Result type alias for H3 operations.
pub type H3Result<T> = Result<T, H3Error>;

/// HTTP/3 application error codes (RFC 9114 Section 8.1, RFC 9297).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum H3ErrorCode {
    /// H3_DATAGRAM_ERROR
    DatagramError = 0x33,
    /// H3_NO_ERROR
    NoError = 0x100,
    /// H3_GENERAL_PROTOCOL_ERROR
    GeneralProtocolError = 0x101,
    /// H3_INTERNAL_ERROR
    InternalError = 0x102,
    /// H3_STREAM_CREATION_ERROR
    StreamCreationError = 0x103,
    /// H3_CLOSED_CRITICAL_STREAM
    ClosedCriticalStream = 0x104,
    /// H3_FRAME_UNEXPECTED
    FrameUnexpected = 0x105,
    /// H3_FRAME_ERROR
    FrameError = 0x106,
    /// H3_EXCESSIVE_LOAD
    ExcessiveLoad = 0x107,
    /// H3_ID_ERROR
    IdError = 0x108,
    /// H3_SETTINGS_ERROR
    SettingsError = 0x109,
    /// H3_MISSING_SETTINGS
    MissingSettings = 0x10a,
    /// H3_REQUEST_REJECTED
    RequestRejected = 0x10b,
    /// H3_REQUEST_CANCELLED
    RequestCancelled = 0x10c,
    /// H3_REQUEST_INCOMPLETE
    RequestIncomplete = 0x10d,
    /// H3_MESSAGE_ERROR
    MessageError = 0x10e,
    /// H3_CONNECT_ERROR
    ConnectError = 0x10f,
    /// H3_VERSION_FALLBACK
    VersionFallback = 0x110,
}

impl From<H3ErrorCode> for u64 {
    fn from(code: H3ErrorCode) -> Self {
        code as u64
    }
}

impl TryFrom<u64> for H3ErrorCode {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Ok(match value {
            0x33 => H3ErrorCode::DatagramError,
            0x100 => H3ErrorCode::NoError,
            0x101 => H3ErrorCode::GeneralProtocolError,
            0x102 => H3ErrorCode::InternalError,
            0x103 => H3ErrorCode::StreamCreationError,
            0x104 => H3ErrorCode::ClosedCriticalStream,
            0x105 => H3ErrorCode::FrameUnexpected,
            0x106 => H3ErrorCode::FrameError,
            0x107 => H3ErrorCode::ExcessiveLoad,
            0x108 => H3ErrorCode::IdError,
            0x109 => H3ErrorCode::SettingsError,
            0x10a => H3ErrorCode::MissingSettings,
            0x10b => H3ErrorCode::RequestRejected,
            0x10c => H3ErrorCode::RequestCancelled,
            0x10d => H3ErrorCode::RequestIncomplete,
            0x10e => H3ErrorCode::MessageError,
            0x10f => H3ErrorCode::ConnectError,
            0x110 => H3ErrorCode::VersionFallback,
            other => return Err(other),
        })
    }
}

impl fmt::Display for H3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            H3ErrorCode::DatagramError => "H3_DATAGRAM_ERROR",
            H3ErrorCode::NoError => "H3_NO_ERROR",
            H3ErrorCode::GeneralProtocolError => "H3_GENERAL_PROTOCOL_ERROR",
            H3ErrorCode::InternalError => "H3_INTERNAL_ERROR",
            H3ErrorCode::StreamCreationError => "H3_STREAM_CREATION_ERROR",
            H3ErrorCode::ClosedCriticalStream => "H3_CLOSED_CRITICAL_STREAM",
            H3ErrorCode::FrameUnexpected => "H3_FRAME_UNEXPECTED",
            H3ErrorCode::FrameError => "H3_FRAME_ERROR",
            H3ErrorCode::ExcessiveLoad => "H3_EXCESSIVE_LOAD",
            H3ErrorCode::IdError => "H3_ID_ERROR",
            H3ErrorCode::SettingsError => "H3_SETTINGS_ERROR",
            H3ErrorCode::MissingSettings => "H3_MISSING_SETTINGS",
            H3ErrorCode::RequestRejected => "H3_REQUEST_REJECTED",
            H3ErrorCode::RequestCancelled => "H3_REQUEST_CANCELLED",
            H3ErrorCode::RequestIncomplete => "H3_REQUEST_INCOMPLETE",
            H3ErrorCode::MessageError => "H3_MESSAGE_ERROR",
            H3ErrorCode::ConnectError => "H3_CONNECT_ERROR",
            H3ErrorCode::VersionFallback => "H3_VERSION_FALLBACK",
        };
        f.write_str(name)
    }
}

/// Main error type for H3 operations.
#[derive(Debug, thiserror::Error)]
pub enum H3Error {
    /// I/O errors from the underlying stream, passed through unchanged
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Stream admission errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Connection-level terminal errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Frame parsing errors.
///
/// Every variant is fatal for the stream it was read from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("reserved frame type: {0:#x}")]
    ReservedFrameType(u64),

    #[error("{frame} frame: inconsistent length")]
    InconsistentLength { frame: &'static str },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("duplicate setting: {0:#x}")]
    DuplicateSetting(u64),

    #[error("invalid value for setting {id:#x}: {value}")]
    InvalidSettingValue { id: u64, value: u64 },

    #[error("Incomplete frame data")]
    Incomplete,
}

impl ParseError {
    /// The application error code a connection should be closed with.
    pub fn error_code(&self) -> H3ErrorCode {
        match self {
            ParseError::ReservedFrameType(_) => H3ErrorCode::FrameUnexpected,
            ParseError::InconsistentLength { .. } | ParseError::Incomplete => {
                H3ErrorCode::FrameError
            }
            ParseError::FrameTooLarge { .. } => H3ErrorCode::ExcessiveLoad,
            ParseError::DuplicateSetting(_) | ParseError::InvalidSettingValue { .. } => {
                H3ErrorCode::SettingsError
            }
        }
    }
}

/// Stream admission errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("too many open streams")]
    LimitReached,

    #[error("stream open cancelled")]
    Cancelled,

    #[error("{0}")]
    Closed(ConnectionError),

    #[error("peer attempted to open stream {0}")]
    PeerOpenedUnknown(StreamNum),

    #[error("tried to delete unknown outgoing stream {0}")]
    UnknownStream(StreamNum),
}

impl StreamError {
    /// Whether the peer caused this error by referencing a stream we never opened.
    pub fn is_peer_violation(&self) -> bool {
        matches!(self, StreamError::PeerOpenedUnknown(_))
    }

    /// Whether retrying the operation later may succeed.
    pub fn is_temporary(&self) -> bool {
        matches!(self, StreamError::LimitReached)
    }
}

/// Terminal connection errors, stored and handed to every stream on shutdown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Application error {code:#x}: {reason}")]
    Application { code: u64, reason: String },

    #[error("Connection closed locally: {0}")]
    LocalClose(String),

    #[error("Connection idle timeout")]
    IdleTimeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Build an application close from an HTTP/3 error code.
    pub fn application(code: H3ErrorCode, reason: impl Into<String>) -> Self {
        ConnectionError::Application {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl H3Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        H3Error::Config(msg.to_string())
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            H3Error::Stream(err) => err.is_temporary() || *err == StreamError::Cancelled,
            _ => false,
        }
    }

    /// Check if this error should trigger a connection close
    pub fn should_close_connection(&self) -> bool {
        match self {
            H3Error::Parse(_) => true,
            H3Error::Connection(_) => true,
            H3Error::Stream(err) => err.is_peer_violation(),
            _ => false,
        }
    }

    /// The application error code to close the connection with, if any.
    pub fn error_code(&self) -> Option<H3ErrorCode> {
        match self {
            H3Error::Parse(err) => Some(err.error_code()),
            H3Error::Stream(err) if err.is_peer_violation() => Some(H3ErrorCode::IdError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for code in [
            H3ErrorCode::DatagramError,
            H3ErrorCode::NoError,
            H3ErrorCode::FrameUnexpected,
            H3ErrorCode::SettingsError,
            H3ErrorCode::VersionFallback,
        ] {
            assert_eq!(H3ErrorCode::try_from(u64::from(code)), Ok(code));
        }
        assert_eq!(H3ErrorCode::try_from(0x1f), Err(0x1f));
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(u64::from(H3ErrorCode::FrameUnexpected), 0x105);
        assert_eq!(H3ErrorCode::FrameUnexpected.to_string(), "H3_FRAME_UNEXPECTED");
    }

    #[test]
    fn test_parse_error_codes() {
        assert_eq!(
            ParseError::ReservedFrameType(0x2).error_code(),
            H3ErrorCode::FrameUnexpected
        );
        assert_eq!(
            ParseError::DuplicateSetting(0x6).error_code(),
            H3ErrorCode::SettingsError
        );
        assert_eq!(
            ParseError::InconsistentLength { frame: "GOAWAY" }.error_code(),
            H3ErrorCode::FrameError
        );
        assert_eq!(
            ParseError::InconsistentLength { frame: "GOAWAY" }.to_string(),
            "GOAWAY frame: inconsistent length"
        );
    }

    #[test]
    fn test_stream_error_classification() {
        assert!(StreamError::PeerOpenedUnknown(StreamNum(7)).is_peer_violation());
        assert!(!StreamError::UnknownStream(StreamNum(7)).is_peer_violation());
        assert!(StreamError::LimitReached.is_temporary());
        assert!(!StreamError::Cancelled.is_temporary());
        assert_eq!(
            StreamError::PeerOpenedUnknown(StreamNum(7)).to_string(),
            "peer attempted to open stream 7"
        );
    }

    #[test]
    fn test_h3_error_helpers() {
        let err: H3Error = ParseError::DuplicateSetting(0x33).into();
        assert!(err.should_close_connection());
        assert_eq!(err.error_code(), Some(H3ErrorCode::SettingsError));

        let err: H3Error = StreamError::LimitReached.into();
        assert!(err.is_recoverable());
        assert!(!err.should_close_connection());
        assert_eq!(err.error_code(), None);

        let err: H3Error = StreamError::PeerOpenedUnknown(StreamNum(3)).into();
        assert!(err.should_close_connection());
        assert_eq!(err.error_code(), Some(H3ErrorCode::IdError));

        let err = H3Error::config("bad order");
        assert_eq!(err.to_string(), "Configuration error: bad order");
    }

    #[test]
    fn test_connection_error_application() {
        let err = ConnectionError::application(H3ErrorCode::NoError, "bye");
        assert_eq!(
            err,
            ConnectionError::Application {
                code: 0x100,
                reason: "bye".to_string()
            }
        );
        assert_eq!(err.to_string(), "Application error 0x100: bye");
    }
}
