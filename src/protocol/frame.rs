//! HTTP/3 frame parsing and encoding (RFC 9114 Section 7).
//!
//! [`FrameParser`] reads frames from one stream. DATA and HEADERS payloads
//! are left in the source for the caller to consume; SETTINGS and GOAWAY are
//! buffered and decoded. Frame types this crate does not handle are skipped.

use crate::config::ParserConfig;
use crate::error::{ConnectionError, H3ErrorCode, H3Result, ParseError};
use crate::protocol::settings::SettingsFrame;
use crate::protocol::varint;
use crate::qlog::{FrameParsed, FrameSummary, NoopRecorder, RawInfo, Recorder};
use crate::transport::StreamId;
use bytes::BufMut;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// DATA frame type
pub const FRAME_TYPE_DATA: u64 = 0x0;
/// HEADERS frame type
pub const FRAME_TYPE_HEADERS: u64 = 0x1;
/// CANCEL_PUSH frame type
pub const FRAME_TYPE_CANCEL_PUSH: u64 = 0x3;
/// SETTINGS frame type
pub const FRAME_TYPE_SETTINGS: u64 = 0x4;
/// PUSH_PROMISE frame type
pub const FRAME_TYPE_PUSH_PROMISE: u64 = 0x5;
/// GOAWAY frame type
pub const FRAME_TYPE_GOAWAY: u64 = 0x7;
/// MAX_PUSH_ID frame type
pub const FRAME_TYPE_MAX_PUSH_ID: u64 = 0xd;

/// Frame type plus length, each at most 8 bytes.
pub const MAX_FRAME_HEADER_LEN: usize = 2 * varint::MAX_LEN;

/// HTTP/2 frame types that are reserved in HTTP/3 (RFC 9114 Section 11.2.1).
/// Receiving one is a connection error of type H3_FRAME_UNEXPECTED.
pub fn is_reserved_frame_type(frame_type: u64) -> bool {
    matches!(frame_type, 0x2 | 0x6 | 0x8 | 0x9)
}

/// A parsed HTTP/3 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Headers(HeadersFrame),
    Settings(SettingsFrame),
    GoAway(GoAwayFrame),
}

impl Frame {
    /// Append the wire encoding. For DATA and HEADERS only the header is
    /// written; the payload follows from the caller.
    pub fn append<B: BufMut>(&self, buf: &mut B) {
        match self {
            Frame::Data(frame) => frame.append(buf),
            Frame::Headers(frame) => frame.append(buf),
            Frame::Settings(frame) => frame.append(buf),
            Frame::GoAway(frame) => frame.append(buf),
        }
    }
}

/// DATA frame header. The payload stays in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame {
    pub length: u64,
}

impl DataFrame {
    pub fn append<B: BufMut>(&self, buf: &mut B) {
        varint::write(buf, FRAME_TYPE_DATA);
        varint::write(buf, self.length);
    }
}

/// HEADERS frame header. The QPACK-encoded field section stays in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersFrame {
    /// Payload length
    pub length: u64,
    /// Bytes taken by the frame type and length varints
    pub header_len: u64,
}

impl HeadersFrame {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            header_len: (varint::len(FRAME_TYPE_HEADERS) + varint::len(length)) as u64,
        }
    }

    pub fn append<B: BufMut>(&self, buf: &mut B) {
        varint::write(buf, FRAME_TYPE_HEADERS);
        varint::write(buf, self.length);
    }
}

/// GOAWAY frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub stream_id: StreamId,
}

impl GoAwayFrame {
    /// Panics if the stream ID is larger than [`varint::MAX`].
    pub fn append<B: BufMut>(&self, buf: &mut B) {
        varint::write(buf, FRAME_TYPE_GOAWAY);
        varint::write(buf, varint::len(self.stream_id.0) as u64);
        varint::write(buf, self.stream_id.0);
    }
}

/// Closes the connection when the parser hits a fatal frame.
pub trait ConnectionCloser: Send + Sync {
    fn close_with_error(&self, code: u64, reason: &str);
}

impl ConnectionCloser for mpsc::UnboundedSender<ConnectionError> {
    fn close_with_error(&self, code: u64, reason: &str) {
        let err = ConnectionError::Application {
            code,
            reason: reason.to_string(),
        };
        if self.send(err).is_err() {
            tracing::debug!("Connection already gone, dropping close with code {:#x}", code);
        }
    }
}

/// Reads HTTP/3 frames from a single stream.
pub struct FrameParser<R> {
    reader: R,
    stream_id: StreamId,
    closer: Arc<dyn ConnectionCloser>,
    recorder: Arc<dyn Recorder>,
    config: ParserConfig,
    /// Set once a reserved frame type was seen.
    terminated: Option<u64>,
}

impl<R: AsyncRead + Unpin> FrameParser<R> {
    /// Create a parser for the stream `stream_id`, reading from `reader`.
    pub fn new(reader: R, stream_id: StreamId, closer: Arc<dyn ConnectionCloser>) -> Self {
        Self {
            reader,
            stream_id,
            closer,
            recorder: Arc::new(NoopRecorder),
            config: ParserConfig::default(),
            terminated: None,
        }
    }

    /// Report a [`FrameParsed`] event for every frame header read.
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Access the source, e.g. to read a DATA payload.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next DATA, HEADERS, SETTINGS or GOAWAY frame.
    ///
    /// For DATA and HEADERS the caller must consume exactly `length` payload
    /// bytes from [`get_mut`](Self::get_mut) before calling this again.
    pub async fn parse_next(&mut self) -> H3Result<Frame> {
        if let Some(frame_type) = self.terminated {
            return Err(ParseError::ReservedFrameType(frame_type).into());
        }

        loop {
            let (frame_type, type_len) = varint::read(&mut self.reader).await?;
            let (length, length_len) = varint::read(&mut self.reader).await?;
            let header_len = (type_len + length_len) as u64;
            let raw = RawInfo {
                length: header_len + length,
                payload_length: length,
            };
            tracing::trace!(
                "Frame header on stream {}: type={:#x}, length={}",
                self.stream_id,
                frame_type,
                length
            );

            match frame_type {
                FRAME_TYPE_DATA => {
                    self.record(raw, FrameSummary::Data);
                    return Ok(Frame::Data(DataFrame { length }));
                }
                FRAME_TYPE_HEADERS => {
                    self.record(raw, FrameSummary::Headers);
                    return Ok(Frame::Headers(HeadersFrame { length, header_len }));
                }
                FRAME_TYPE_SETTINGS => {
                    let frame = self.read_settings(length).await?;
                    self.record(raw, frame.summary());
                    return Ok(Frame::Settings(frame));
                }
                FRAME_TYPE_GOAWAY => {
                    let frame = self.read_goaway(length).await?;
                    self.record(raw, FrameSummary::GoAway { id: frame.stream_id });
                    return Ok(Frame::GoAway(frame));
                }
                FRAME_TYPE_CANCEL_PUSH | FRAME_TYPE_PUSH_PROMISE | FRAME_TYPE_MAX_PUSH_ID => {
                    let summary = match frame_type {
                        FRAME_TYPE_CANCEL_PUSH => FrameSummary::CancelPush,
                        FRAME_TYPE_PUSH_PROMISE => FrameSummary::PushPromise,
                        _ => FrameSummary::MaxPushId,
                    };
                    self.record(raw, summary);
                    tracing::debug!("Skipping unsupported frame {:#x} ({} bytes)", frame_type, length);
                    self.skip(length).await?;
                }
                t if is_reserved_frame_type(t) => {
                    self.record(raw, FrameSummary::Reserved { raw_frame_type: t });
                    tracing::warn!(
                        "Received reserved frame type {:#x} on stream {}, closing connection",
                        t,
                        self.stream_id
                    );
                    self.terminated = Some(t);
                    self.closer
                        .close_with_error(H3ErrorCode::FrameUnexpected.into(), "");
                    return Err(ParseError::ReservedFrameType(t).into());
                }
                t => {
                    self.record(raw, FrameSummary::Unknown { raw_frame_type: t });
                    tracing::debug!("Skipping unknown frame {:#x} ({} bytes)", t, length);
                    self.skip(length).await?;
                }
            }
        }
    }

    async fn read_settings(&mut self, length: u64) -> H3Result<SettingsFrame> {
        let max = self.config.max_settings_frame_size;
        if length > max {
            return Err(ParseError::FrameTooLarge { size: length, max }.into());
        }
        let mut payload = vec![0u8; length as usize];
        self.reader.read_exact(&mut payload).await?;
        Ok(SettingsFrame::decode(&payload)?)
    }

    async fn read_goaway(&mut self, length: u64) -> H3Result<GoAwayFrame> {
        let (id, consumed) = varint::read(&mut self.reader).await?;
        if consumed as u64 != length {
            return Err(ParseError::InconsistentLength { frame: "GOAWAY" }.into());
        }
        Ok(GoAwayFrame {
            stream_id: StreamId(id),
        })
    }

    async fn skip(&mut self, length: u64) -> io::Result<()> {
        let mut payload = (&mut self.reader).take(length);
        let skipped = tokio::io::copy(&mut payload, &mut tokio::io::sink()).await?;
        if skipped < length {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    fn record(&self, raw: RawInfo, frame: FrameSummary) {
        self.recorder.record_event(FrameParsed {
            stream_id: self.stream_id,
            raw,
            frame,
        });
    }
}

impl<R> std::fmt::Debug for FrameParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameParser")
            .field("stream_id", &self.stream_id)
            .field("config", &self.config)
            .field("terminated", &self.terminated)
            .finish()
    }
}
