/// Errors that can occur in queue broker operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] simsock_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] simsock_frame::FrameError),

    /// A listener is already installed on the port.
    #[error("port {port} already bound")]
    AlreadyBound { port: u16 },

    /// No listener is installed on the port.
    #[error("port {port} not bound")]
    NotBound { port: u16 },

    /// The remote broker does not exist.
    #[error("connection to {name}:{port} refused")]
    Refused { name: String, port: u16 },

    /// The first frame on a connection was not a control marker.
    #[error("unexpected control marker {0:02x?}")]
    UnexpectedMarker(Vec<u8>),
}

pub type Result<T> = std::result::Result<T, PeerError>;
