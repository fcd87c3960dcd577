//! QUIC control frames emitted by the stream layer.

use crate::protocol::varint;
use crate::transport::{StreamNum, StreamType};
use bytes::BufMut;
use tokio::sync::mpsc;

/// STREAMS_BLOCKED frame type for bidirectional streams.
pub const FRAME_TYPE_STREAMS_BLOCKED_BIDI: u64 = 0x16;
/// STREAMS_BLOCKED frame type for unidirectional streams.
pub const FRAME_TYPE_STREAMS_BLOCKED_UNI: u64 = 0x17;

/// STREAMS_BLOCKED (RFC 9000 Section 19.14): tells the peer we would open
/// more streams of `stream_type` but are held at `stream_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamsBlockedFrame {
    pub stream_type: StreamType,
    pub stream_limit: StreamNum,
}

impl StreamsBlockedFrame {
    fn frame_type(&self) -> u64 {
        match self.stream_type {
            StreamType::Bidi => FRAME_TYPE_STREAMS_BLOCKED_BIDI,
            StreamType::Uni => FRAME_TYPE_STREAMS_BLOCKED_UNI,
        }
    }

    /// Append the wire encoding of this frame.
    pub fn append<B: BufMut>(&self, buf: &mut B) {
        varint::write(buf, self.frame_type());
        varint::write(buf, self.stream_limit.0);
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        varint::len(self.frame_type()) + varint::len(self.stream_limit.0)
    }
}

/// Outgoing queue for control frames.
///
/// Implementations only enqueue; sending happens later on the connection's
/// own schedule.
pub trait ControlFrameQueue: Send + Sync {
    fn queue_control_frame(&self, frame: StreamsBlockedFrame);
}

impl ControlFrameQueue for mpsc::UnboundedSender<StreamsBlockedFrame> {
    fn queue_control_frame(&self, frame: StreamsBlockedFrame) {
        if self.send(frame).is_err() {
            tracing::debug!("Control frame queue closed, dropping {:?}", frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_streams_blocked_encoding() {
        let frame = StreamsBlockedFrame {
            stream_type: StreamType::Bidi,
            stream_limit: StreamNum(100),
        };
        let mut buf = BytesMut::new();
        frame.append(&mut buf);
        assert_eq!(buf.as_ref(), &[0x16, 0x40, 0x64]);
        assert_eq!(frame.encoded_len(), buf.len());

        let frame = StreamsBlockedFrame {
            stream_type: StreamType::Uni,
            stream_limit: StreamNum::INVALID,
        };
        buf.clear();
        frame.append(&mut buf);
        assert_eq!(buf.as_ref(), &[0x17, 0x00]);
    }

    #[test]
    fn test_channel_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = StreamsBlockedFrame {
            stream_type: StreamType::Bidi,
            stream_limit: StreamNum(1),
        };
        tx.queue_control_frame(frame);
        assert_eq!(rx.try_recv().unwrap(), frame);

        // A closed receiver must not panic the sender side.
        drop(rx);
        tx.queue_control_frame(frame);
    }
}
