//! QUIC stream identifiers and outgoing stream admission.

pub mod frames;
pub mod streams;

pub use frames::{ControlFrameQueue, StreamsBlockedFrame};
pub use streams::{OutgoingStream, OutgoingStreamsMap};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a QUIC stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    /// Bidirectional stream
    Bidi,
    /// Unidirectional stream
    Uni,
}

/// Which endpoint a stream or connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Perspective {
    Client,
    Server,
}

impl Perspective {
    /// The other endpoint.
    pub fn opposite(self) -> Self {
        match self {
            Perspective::Client => Perspective::Server,
            Perspective::Server => Perspective::Client,
        }
    }
}

/// A QUIC stream identifier as carried on the wire.
///
/// The two low bits encode initiator and direction (RFC 9000 Section 2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Determine the stream direction from the stream ID.
    pub fn stream_type(self) -> StreamType {
        if self.0 & 0x02 == 0 {
            StreamType::Bidi
        } else {
            StreamType::Uni
        }
    }

    /// Determine which endpoint opened the stream.
    pub fn initiator(self) -> Perspective {
        if self.0 & 0x01 == 0 {
            Perspective::Client
        } else {
            Perspective::Server
        }
    }

    /// The per-type stream number, counting from 1.
    pub fn num(self) -> StreamNum {
        StreamNum(self.0 / 4 + 1)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-type stream counter. The first stream of each type is number 1.
///
/// `StreamNum::INVALID` (0) stands for "no stream", e.g. a stream limit the
/// peer has not granted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamNum(pub u64);

impl StreamNum {
    /// No stream.
    pub const INVALID: StreamNum = StreamNum(0);

    /// Convert to the wire stream ID for the given direction and initiator.
    ///
    /// Returns `None` for `StreamNum::INVALID` and for numbers too large to
    /// have a stream ID.
    pub fn stream_id(self, stream_type: StreamType, initiator: Perspective) -> Option<StreamId> {
        if self == StreamNum::INVALID {
            return None;
        }
        let low_bits = match (stream_type, initiator) {
            (StreamType::Bidi, Perspective::Client) => 0,
            (StreamType::Bidi, Perspective::Server) => 1,
            (StreamType::Uni, Perspective::Client) => 2,
            (StreamType::Uni, Perspective::Server) => 3,
        };
        (self.0 - 1)
            .checked_mul(4)
            .and_then(|base| base.checked_add(low_bits))
            .map(StreamId)
    }

    pub(crate) fn next(self) -> StreamNum {
        StreamNum(self.0 + 1)
    }
}

impl fmt::Display for StreamNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
