//! HTTP/3 wire format.

pub mod frame;
pub mod settings;
pub mod varint;

pub use frame::{ConnectionCloser, DataFrame, Frame, FrameParser, GoAwayFrame, HeadersFrame};
pub use settings::SettingsFrame;
