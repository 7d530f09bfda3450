use crate::error::{PeerError, Result};

/// First frame from a client closing its own port: a poison pill.
pub const UNBIND_MARKER: u8 = 0x00;
/// First frame from a regular client.
pub const REGULAR_MARKER: u8 = 0x01;

/// Kind of connection, announced in the first frame on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Self-connection that stops the accept loop of an unbinding port.
    Unbind,
    /// Connection to hand to the bound listener.
    Regular,
}

impl Marker {
    /// The single-byte payload carrying this marker.
    pub fn byte(self) -> u8 {
        match self {
            Self::Unbind => UNBIND_MARKER,
            Self::Regular => REGULAR_MARKER,
        }
    }

    /// Classify a first-frame payload. Anything but one known byte is rejected.
    pub fn classify(payload: &[u8]) -> Result<Self> {
        match payload {
            [UNBIND_MARKER] => Ok(Self::Unbind),
            [REGULAR_MARKER] => Ok(Self::Regular),
            other => Err(PeerError::UnexpectedMarker(other.to_vec())),
        }
    }
}
