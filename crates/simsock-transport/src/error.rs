/// Errors that can occur in simulated transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A broker with this name is already registered.
    #[error("broker name not unique: {0}")]
    NameConflict(String),

    /// An accept is already pending on the port.
    #[error("accept already pending on {broker}:{port}")]
    PortConflict { broker: String, port: u16 },

    /// The requested buffer region does not fit the buffer.
    #[error("invalid buffer region (offset {offset}, length {length}, buffer {capacity} bytes)")]
    InvalidArgument {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    /// The channel is disconnected and no longer accepts requests.
    #[error("channel on port {port} is disconnected")]
    Disconnected { port: u16 },

    /// No broker is registered under the remote name.
    #[error("no broker named {0}")]
    RemoteNotFound(String),

    /// Push into a full ring buffer.
    #[error("ring buffer full")]
    BufferFull,

    /// Pull from an empty ring buffer.
    #[error("ring buffer empty")]
    BufferEmpty,

    /// The executor has been shut down.
    #[error("executor shut down")]
    Shutdown,

    /// Failed to start the executor thread.
    #[error("failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
