use std::fmt;

use simsock_frame::FrameError;
use simsock_peer::PeerError;
use simsock_transport::TransportError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match err {
        TransportError::Spawn(_) | TransportError::Shutdown => INTERNAL,
        TransportError::InvalidArgument { .. } => USAGE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::AlreadyBound { .. } | PeerError::NotBound { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        PeerError::Refused { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        PeerError::UnexpectedMarker(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_codes() {
        let err = transport_error("accept", TransportError::PortConflict {
            broker: "server".to_string(),
            port: 80,
        });
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("accept: "));

        assert_eq!(transport_error("post", TransportError::Shutdown).code, INTERNAL);
    }

    #[test]
    fn frame_errors_map_to_codes() {
        let err = frame_error("send", FrameError::PayloadTooLarge { size: 10, max: 5 });
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(frame_error("send", FrameError::ConnectionClosed).code, FAILURE);
    }

    #[test]
    fn peer_errors_unwrap_nested_layers() {
        let err = peer_error(
            "connect",
            PeerError::Transport(TransportError::RemoteNotFound("server".to_string())),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = peer_error("bind", PeerError::AlreadyBound { port: 80 });
        assert_eq!(err.code, USAGE);
        assert_eq!(err.message, "bind: port 80 already bound");

        let err = peer_error("accept", PeerError::UnexpectedMarker(vec![0x02]));
        assert_eq!(err.code, DATA_INVALID);
    }
}
