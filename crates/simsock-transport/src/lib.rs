//! In-process socket simulation.
//!
//! Brokers are named endpoints registered in a shared [`Registry`]. A broker
//! accepts on numbered ports; another broker connects to a name and port.
//! Each match yields a pair of linked [`Channel`]s carrying bytes in both
//! directions through bounded ring buffers.
//!
//! Everything is callback driven: listeners run on a single [`Executor`]
//! thread, in the order their events were posted. No call here blocks.
//!
//! This is the lowest layer of simsock. Message framing lives in
//! `simsock-frame`; port binding on top of framed queues in `simsock-peer`.

pub mod broker;
pub mod channel;
pub mod config;
pub mod error;
pub mod executor;
pub mod registry;
pub mod ring;
pub mod sync;

pub use broker::Broker;
pub use channel::{Channel, ReadCompletion, WriteCompletion};
pub use config::{ChannelConfig, DEFAULT_BUFFER_CAPACITY};
pub use error::{Result, TransportError};
pub use executor::Executor;
pub use registry::Registry;
pub use ring::RingBuffer;
