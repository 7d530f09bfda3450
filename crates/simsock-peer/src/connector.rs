use simsock_frame::MessageQueue;
use simsock_transport::TransportError;
use tracing::{debug, warn};

use crate::broker::QueueBroker;
use crate::control::Marker;
use crate::error::{PeerError, Result};
use crate::handshake;

impl QueueBroker {
    /// Connect to `port` on the queue broker registered as `remote`.
    ///
    /// Once an accept matches, the connection is announced as a regular
    /// client and `listener` receives the queue. If `remote` does not exist,
    /// `listener` receives [`PeerError::Refused`] and the lookup error is
    /// returned.
    pub fn connect<F>(&self, remote: &str, port: u16, listener: F) -> Result<()>
    where
        F: FnOnce(Result<MessageQueue>) + Send + 'static,
    {
        // Brokers are never unregistered, so a name found here still resolves below.
        if !self.broker.registry().contains(remote) {
            let refused = PeerError::Refused {
                name: remote.to_string(),
                port,
            };
            debug!(broker = self.name(), remote, port, "connection refused");
            self.post("refused", move || listener(Err(refused)));
            return Err(TransportError::RemoteNotFound(remote.to_string()).into());
        }

        let this = self.clone();
        self.broker.connect(remote, port, move |channel| {
            let queue = this.wrap(channel);
            let result = match handshake::announce(&queue, Marker::Regular) {
                Ok(()) => Ok(queue),
                Err(err) => {
                    warn!(broker = this.name(), port, error = %err, "client marker not sent");
                    Err(err)
                }
            };
            this.post("connected", move || listener(result));
        })?;
        Ok(())
    }
}
