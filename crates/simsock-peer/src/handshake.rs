use simsock_frame::MessageQueue;

use crate::control::Marker;
use crate::error::{PeerError, Result};

/// Client side: announce the kind of connection as the first frame.
pub fn announce(queue: &MessageQueue, marker: Marker) -> Result<()> {
    queue.send(&[marker.byte()])?;
    Ok(())
}

/// Server side: read the first frame and classify it.
///
/// `done` runs on the executor with the queue and the marker, or the reason
/// no valid marker arrived.
pub fn await_marker<F>(queue: &MessageQueue, done: F)
where
    F: FnOnce(MessageQueue, Result<Marker>) + Send + 'static,
{
    let handle = queue.clone();
    queue.start_read_payload(move |result| {
        let marker = result
            .map_err(PeerError::from)
            .and_then(|payload| Marker::classify(&payload));
        done(handle, marker);
    });
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use simsock_frame::{Bytes, FrameConfig, FrameError, QueueEvent};
    use simsock_transport::{Broker, Channel, Executor, Registry};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn queue_pair() -> (Executor, MessageQueue, MessageQueue) {
        let executor = Executor::spawn("handshake-test").unwrap();
        let registry = Registry::new();
        let server = Broker::new("server", &registry, executor.clone()).unwrap();
        let client = Broker::new("client", &registry, executor.clone()).unwrap();

        let (accepted_tx, accepted_rx) = mpsc::channel::<Channel>();
        let (connected_tx, connected_rx) = mpsc::channel::<Channel>();
        server
            .accept(1, move |ch| accepted_tx.send(ch).unwrap())
            .unwrap();
        client
            .connect("server", 1, move |ch| connected_tx.send(ch).unwrap())
            .unwrap();

        let wrap = |ch| MessageQueue::new(ch, executor.clone(), FrameConfig::default());
        let server_queue = wrap(accepted_rx.recv_timeout(WAIT).unwrap());
        let client_queue = wrap(connected_rx.recv_timeout(WAIT).unwrap());
        (executor, server_queue, client_queue)
    }

    #[test]
    fn announced_marker_is_classified() {
        let (executor, server, client) = queue_pair();
        let (tx, rx) = mpsc::channel();

        await_marker(&server, move |_, marker| tx.send(marker.unwrap()).unwrap());
        announce(&client, Marker::Regular).unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Marker::Regular);
        executor.shutdown();
    }

    #[test]
    fn data_after_marker_stays_for_the_listener() {
        let (executor, server, client) = queue_pair();
        announce(&client, Marker::Regular).unwrap();
        client.send(b"payload").unwrap();

        let (tx, rx) = mpsc::channel();
        await_marker(&server, move |queue, marker| {
            assert_eq!(marker.unwrap(), Marker::Regular);
            queue.set_listener(move |event| {
                let _ = tx.send(event);
            });
        });

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            QueueEvent::Received(Bytes::from_static(b"payload"))
        );
        executor.shutdown();
    }

    #[test]
    fn garbage_first_frame_is_rejected() {
        let (executor, server, client) = queue_pair();
        let (tx, rx) = mpsc::channel();

        await_marker(&server, move |_, marker| tx.send(marker).unwrap());
        client.send(b"GET / HTTP/1.1").unwrap();

        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(PeerError::UnexpectedMarker(_))
        ));
        executor.shutdown();
    }

    #[test]
    fn close_before_marker_is_reported() {
        let (executor, server, client) = queue_pair();
        let (tx, rx) = mpsc::channel();

        await_marker(&server, move |_, marker| tx.send(marker).unwrap());
        client.close();

        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(PeerError::Frame(FrameError::ConnectionClosed))
        ));
        executor.shutdown();
    }
}
