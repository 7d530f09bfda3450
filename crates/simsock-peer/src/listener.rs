use std::sync::Arc;

use simsock_frame::MessageQueue;
use simsock_transport::Channel;
use tracing::{debug, info, warn};

use crate::broker::{PortEntry, QueueBroker};
use crate::control::Marker;
use crate::error::{PeerError, Result};
use crate::handshake;

impl QueueBroker {
    /// Bind `listener` to `port`.
    ///
    /// The listener receives one [`MessageQueue`] per regular client, on the
    /// executor. Fails with [`PeerError::AlreadyBound`] if a listener is
    /// already installed. Binding a port that is still unbinding reuses its
    /// accept loop.
    pub fn bind<F>(&self, port: u16, listener: F) -> Result<()>
    where
        F: Fn(MessageQueue) + Send + Sync + 'static,
    {
        let mut ports = self.ports();
        if let Some(entry) = ports.get_mut(&port) {
            if entry.listener.is_some() {
                return Err(PeerError::AlreadyBound { port });
            }
            entry.listener = Some(Arc::new(listener));
            info!(broker = self.name(), port, "port rebound before unbind completed");
            return Ok(());
        }

        ports.insert(
            port,
            PortEntry {
                listener: Some(Arc::new(listener)),
                retired: None,
                pending_pills: 0,
            },
        );
        if let Err(err) = self.arm(port) {
            ports.remove(&port);
            return Err(err);
        }

        info!(broker = self.name(), port, "port bound");
        Ok(())
    }

    /// Remove the listener from `port` and stop its accept loop.
    ///
    /// Returns once the poison pill is on its way; the loop stops when the
    /// pill arrives. Clients matched ahead of the pill still reach the
    /// unbound listener, and queues it already received stay open. Fails
    /// with [`PeerError::NotBound`] if no listener is installed.
    pub fn unbind(&self, port: u16) -> Result<()> {
        let mut ports = self.ports();
        let Some(entry) = ports.get_mut(&port) else {
            return Err(PeerError::NotBound { port });
        };
        let Some(listener) = entry.listener.take() else {
            return Err(PeerError::NotBound { port });
        };
        entry.pending_pills += 1;

        let this = self.clone();
        let connected = self
            .broker
            .connect(self.name(), port, move |channel| this.send_pill(channel));
        if let Err(err) = connected {
            entry.listener = Some(listener);
            entry.pending_pills -= 1;
            return Err(err.into());
        }
        entry.retired = Some(listener);

        info!(broker = self.name(), port, "port unbinding");
        Ok(())
    }

    /// Install a one-shot acceptor that classifies the next connection.
    fn arm(&self, port: u16) -> Result<()> {
        let this = self.clone();
        self.broker
            .accept(port, move |channel| this.on_accepted(port, channel))?;
        Ok(())
    }

    fn on_accepted(&self, port: u16, channel: Channel) {
        let queue = self.wrap(channel);
        let this = self.clone();
        handshake::await_marker(&queue, move |queue, marker| {
            this.on_marker(port, queue, marker)
        });
    }

    fn on_marker(&self, port: u16, queue: MessageQueue, marker: Result<Marker>) {
        let mut ports = self.ports();
        let Some(entry) = ports.get_mut(&port) else {
            queue.close();
            return;
        };

        match marker {
            Ok(Marker::Unbind) => {
                queue.close();
                entry.pending_pills = entry.pending_pills.saturating_sub(1);
                if entry.listener.is_none() && entry.pending_pills == 0 {
                    ports.remove(&port);
                    info!(broker = self.name(), port, "port unbound");
                    return;
                }
            }
            Ok(Marker::Regular) => match entry.listener.as_ref().or(entry.retired.as_ref()) {
                Some(listener) => {
                    let listener = Arc::clone(listener);
                    debug!(broker = self.name(), port, remote = queue.remote_name(), "client accepted");
                    self.post("accepted", move || listener(queue));
                }
                None => {
                    warn!(broker = self.name(), port, remote = queue.remote_name(), "no listener for accepted client");
                    queue.close();
                }
            },
            Err(err) => {
                warn!(broker = self.name(), port, remote = queue.remote_name(), error = %err, "dropping connection without a valid marker");
                queue.close();
            }
        }

        if let Err(err) = self.arm(port) {
            warn!(broker = self.name(), port, error = %err, "accept loop stopped");
            ports.remove(&port);
        }
    }

    fn send_pill(&self, channel: Channel) {
        let pill = self.wrap(channel);
        if let Err(err) = handshake::announce(&pill, Marker::Unbind) {
            warn!(broker = self.name(), port = pill.port(), error = %err, "poison pill not sent");
            return;
        }
        // Tidied up once the accept loop closes its end.
        pill.start_read_payload(|_| {});
    }
}
