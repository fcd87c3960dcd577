//! # h3-wire - HTTP/3 framing and QUIC outgoing stream admission
//!
//! Building blocks for an HTTP/3 connection layered on QUIC.
//!
//! ## Features
//!
//! - **Frame parsing**: DATA, HEADERS, SETTINGS and GOAWAY, with unknown and
//!   unsupported frames skipped and reserved HTTP/2 frame types rejected
//! - **Settings**: parse, serialize, GREASE and wire-order reproduction
//! - **Stream admission**: open outgoing streams under the peer's stream
//!   limit, with fair blocking opens and STREAMS_BLOCKED signaling
//! - **qlog**: one `http3:frame_parsed` event per frame header read
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use h3_wire::protocol::{Frame, FrameParser};
//! use h3_wire::transport::StreamId;
//! use h3_wire::{ConnectionError, H3Result};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! async fn read_control_stream<R>(stream: R) -> H3Result<()>
//! where
//!     R: tokio::io::AsyncRead + Unpin,
//! {
//!     let (close_tx, _close_rx) = mpsc::unbounded_channel::<ConnectionError>();
//!     let mut parser = FrameParser::new(stream, StreamId(3), Arc::new(close_tx));
//!     loop {
//!         match parser.parse_next().await? {
//!             Frame::Settings(settings) => println!("peer settings: {:?}", settings),
//!             Frame::GoAway(goaway) => {
//!                 println!("goaway: {:?}", goaway);
//!                 return Ok(());
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod qlog;
pub mod transport;

// Re-export main types for convenience
pub use config::{ParserConfig, SettingsConfig};
pub use error::{ConnectionError, H3Error, H3ErrorCode, H3Result, ParseError, StreamError};
pub use protocol::{Frame, FrameParser, SettingsFrame};
pub use transport::{OutgoingStream, OutgoingStreamsMap, StreamId, StreamNum, StreamType};
