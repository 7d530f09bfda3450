use simsock_transport::TransportError;

/// Errors that can occur while framing messages over a channel.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The queue was closed before the operation could complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying channel rejected a request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
