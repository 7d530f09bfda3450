//! Length-prefixed message framing over simulated channels.
//!
//! A [`MessageQueue`] wraps one [`Channel`](simsock_transport::Channel) and
//! turns its byte stream into discrete messages. Every message is framed as
//! a 4-byte big-endian payload length followed by the payload.
//!
//! No partial reads, no buffer management in user code: listeners only ever
//! see complete payloads.

pub mod codec;
pub mod error;
pub mod queue;

mod reader;
mod writer;

pub use bytes::Bytes;
pub use codec::{decode_header, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use queue::{MessageQueue, QueueEvent};
