//! qlog events for parsed HTTP/3 frames.
//!
//! The frame parser reports one [`FrameParsed`] event per frame header it
//! reads, including frames it skips or rejects. Events go to a [`Recorder`];
//! [`NoopRecorder`] discards them and [`TracingRecorder`] forwards them to
//! `tracing`.

use crate::transport::StreamId;
use serde::Serialize;
use std::collections::BTreeMap;

/// qlog event schema URI for the HTTP/3 events defined here.
pub const EVENT_SCHEMA: &str = "urn:ietf:params:qlog:events:http3-12";

/// Byte accounting for a parsed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawInfo {
    /// Frame header plus payload, in bytes.
    pub length: u64,
    /// Declared payload length.
    pub payload_length: u64,
}

/// Frame-specific part of a [`FrameParsed`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "frame_type", rename_all = "snake_case")]
pub enum FrameSummary {
    Data,
    Headers,
    Settings {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_field_section_size: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        datagram: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        extended_connect: Option<bool>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        other: BTreeMap<u64, u64>,
    },
    #[serde(rename = "goaway")]
    GoAway {
        id: StreamId,
    },
    CancelPush,
    PushPromise,
    MaxPushId,
    Reserved {
        raw_frame_type: u64,
    },
    Unknown {
        raw_frame_type: u64,
    },
}

/// The `http3:frame_parsed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameParsed {
    pub stream_id: StreamId,
    pub raw: RawInfo,
    pub frame: FrameSummary,
}

impl FrameParsed {
    /// qlog event name.
    pub const NAME: &'static str = "http3:frame_parsed";
}

/// Sink for parser events.
pub trait Recorder: Send + Sync {
    fn record_event(&self, event: FrameParsed);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record_event(&self, _event: FrameParsed) {}
}

/// Emits every event as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record_event(&self, event: FrameParsed) {
        tracing::debug!(
            target: "h3_wire::qlog",
            stream_id = event.stream_id.0,
            length = event.raw.length,
            payload_length = event.raw.payload_length,
            "{}: {:?}",
            FrameParsed::NAME,
            event.frame
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_event_serialization() {
        let mut other = BTreeMap::new();
        other.insert(0x1, 4096);
        let event = FrameParsed {
            stream_id: StreamId(3),
            raw: RawInfo {
                length: 12,
                payload_length: 10,
            },
            frame: FrameSummary::Settings {
                max_field_section_size: Some(1024),
                datagram: Some(true),
                extended_connect: None,
                other,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "stream_id": 3,
                "raw": { "length": 12, "payload_length": 10 },
                "frame": {
                    "frame_type": "settings",
                    "max_field_section_size": 1024,
                    "datagram": true,
                    "other": { "1": 4096 },
                }
            })
        );
    }

    #[test]
    fn test_goaway_and_reserved_event_serialization() {
        let event = FrameParsed {
            stream_id: StreamId(2),
            raw: RawInfo {
                length: 3,
                payload_length: 1,
            },
            frame: FrameSummary::GoAway { id: StreamId(8) },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap()["frame"],
            json!({ "frame_type": "goaway", "id": 8 })
        );

        let frame = FrameSummary::Reserved { raw_frame_type: 2 };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "frame_type": "reserved", "raw_frame_type": 2 })
        );
    }

    #[test]
    fn test_recorders_accept_events() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let event = FrameParsed {
            stream_id: StreamId(0),
            raw: RawInfo {
                length: 2,
                payload_length: 0,
            },
            frame: FrameSummary::Data,
        };
        NoopRecorder.record_event(event.clone());
        TracingRecorder.record_event(event);
    }
}
