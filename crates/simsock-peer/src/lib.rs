//! Message-level ports on top of simulated brokers.
//!
//! A [`QueueBroker`] binds listeners to ports and connects to other queue
//! brokers; every connection it hands out is a framed
//! [`MessageQueue`](simsock_frame::MessageQueue). A one-byte control frame
//! opens every connection so that `unbind` can stop a port's accept loop
//! with a poison pill sent to itself.

pub mod broker;
mod connector;
pub mod control;
pub mod error;
pub mod handshake;
mod listener;

pub use broker::QueueBroker;
pub use control::{Marker, REGULAR_MARKER, UNBIND_MARKER};
pub use error::{PeerError, Result};
pub use handshake::{announce, await_marker};
