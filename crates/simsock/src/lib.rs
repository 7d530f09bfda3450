//! Deterministic in-process socket simulation.
//!
//! simsock gives code socket semantics (bind, accept, connect, backpressure,
//! FIFO delivery, graceful disconnect) without touching the operating
//! system's network stack. Every callback runs on one executor thread, in
//! post order, which keeps protocol tests reproducible.
//!
//! # Crate Structure
//!
//! - [`transport`]: Executor, brokers, registry and full-duplex byte channels
//! - [`frame`]: Length-prefixed message queues over channels
//! - [`peer`]: Port bind/unbind/connect at message level (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use simsock_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use simsock_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use simsock_peer::*;
}
