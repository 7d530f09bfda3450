use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::channel::{self, Channel};
use crate::config::ChannelConfig;
use crate::error::{Result, TransportError};
use crate::executor::Executor;
use crate::registry::Registry;
use crate::sync::lock;

type AcceptListener = Box<dyn FnOnce(Channel) + Send + 'static>;
type ConnectListener = Box<dyn FnOnce(Channel) + Send + 'static>;

/// Named rendezvous point that pairs `accept` and `connect` calls.
///
/// Each `accept` is one-shot: it matches exactly one connection. Connectors
/// arriving before an accept wait in a FIFO queue per port. A match creates
/// two linked [`Channel`]s and posts both callbacks to the accepting broker's
/// executor, so brokers that talk to each other should share one executor.
#[derive(Clone)]
pub struct Broker {
    shared: Arc<BrokerShared>,
    registry: Registry,
}

pub(crate) struct BrokerShared {
    name: String,
    executor: Executor,
    config: ChannelConfig,
    ports: Mutex<PortMaps>,
}

#[derive(Default)]
struct PortMaps {
    accepts: HashMap<u16, AcceptListener>,
    connects: HashMap<u16, VecDeque<Connector>>,
}

struct Connector {
    name: String,
    listener: ConnectListener,
}

impl Broker {
    /// Create a broker and register it under `name`.
    pub fn new(name: impl Into<String>, registry: &Registry, executor: Executor) -> Result<Self> {
        Self::with_config(name, registry, executor, ChannelConfig::default())
    }

    /// Create a broker with explicit channel configuration.
    pub fn with_config(
        name: impl Into<String>,
        registry: &Registry,
        executor: Executor,
        config: ChannelConfig,
    ) -> Result<Self> {
        let shared = Arc::new(BrokerShared {
            name: name.into(),
            executor,
            config,
            ports: Mutex::new(PortMaps::default()),
        });
        registry.register(Arc::clone(&shared))?;
        info!(broker = %shared.name, "broker registered");

        Ok(Self {
            shared,
            registry: registry.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn executor(&self) -> &Executor {
        &self.shared.executor
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Accept one connection on `port`.
    ///
    /// If connectors are already waiting, the oldest is matched immediately;
    /// otherwise the listener waits for the next `connect`. Fails with
    /// [`TransportError::PortConflict`] if an accept is already pending.
    pub fn accept<F>(&self, port: u16, listener: F) -> Result<()>
    where
        F: FnOnce(Channel) + Send + 'static,
    {
        let shared = &self.shared;
        let mut ports = lock(&shared.ports);
        if ports.accepts.contains_key(&port) {
            return Err(TransportError::PortConflict {
                broker: shared.name.clone(),
                port,
            });
        }

        match ports.pop_connector(port) {
            Some(connector) => {
                let (accepted, connected) = channel::pair(
                    port,
                    &shared.name,
                    &connector.name,
                    &shared.config,
                    shared.executor.clone(),
                );
                debug!(broker = %shared.name, port, remote = %connector.name, "accept matched waiting connector");

                let on_connected = connector.listener;
                shared
                    .executor
                    .post_or_log("accepted", move || listener(accepted));
                shared
                    .executor
                    .post_or_log("connected", move || on_connected(connected));
            }
            None => {
                ports.accepts.insert(port, Box::new(listener));
                debug!(broker = %shared.name, port, "accept pending");
            }
        }
        Ok(())
    }

    /// Connect to `port` on the broker registered as `remote`.
    ///
    /// Returns [`TransportError::RemoteNotFound`] synchronously if no such
    /// broker exists; no callback is made in that case. `Ok` only means the
    /// name resolved: the listener runs once an accept matches.
    pub fn connect<F>(&self, remote: &str, port: u16, listener: F) -> Result<()>
    where
        F: FnOnce(Channel) + Send + 'static,
    {
        let target = self
            .registry
            .lookup(remote)
            .ok_or_else(|| TransportError::RemoteNotFound(remote.to_string()))?;

        let mut ports = lock(&target.ports);
        match ports.accepts.remove(&port) {
            Some(on_accepted) => {
                let (accepted, connected) = channel::pair(
                    port,
                    &target.name,
                    &self.shared.name,
                    &target.config,
                    target.executor.clone(),
                );
                debug!(broker = %self.shared.name, port, remote, "connect matched pending accept");

                target
                    .executor
                    .post_or_log("connected", move || listener(connected));
                target
                    .executor
                    .post_or_log("accepted", move || on_accepted(accepted));
            }
            None => {
                ports.connects.entry(port).or_default().push_back(Connector {
                    name: self.shared.name.clone(),
                    listener: Box::new(listener),
                });
                debug!(broker = %self.shared.name, port, remote, "connect queued");
            }
        }
        Ok(())
    }

    /// Whether an accept is waiting on `port`.
    pub fn has_pending_accept(&self, port: u16) -> bool {
        lock(&self.shared.ports).accepts.contains_key(&port)
    }

    /// Number of connectors waiting on `port`.
    pub fn pending_connects(&self, port: u16) -> usize {
        lock(&self.shared.ports)
            .connects
            .get(&port)
            .map_or(0, VecDeque::len)
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.shared.name)
            .finish()
    }
}

impl BrokerShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl PortMaps {
    fn pop_connector(&mut self, port: u16) -> Option<Connector> {
        let queue = self.connects.get_mut(&port)?;
        let connector = queue.pop_front();
        if queue.is_empty() {
            self.connects.remove(&port);
        }
        connector
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup() -> (Executor, Registry) {
        (Executor::spawn("broker-test").unwrap(), Registry::new())
    }

    #[test]
    fn duplicate_name_rejected() {
        let (executor, registry) = setup();
        let _a = Broker::new("A", &registry, executor.clone()).unwrap();
        let err = Broker::new("A", &registry, executor.clone()).unwrap_err();
        assert!(matches!(err, TransportError::NameConflict(name) if name == "A"));
        assert_eq!(registry.names(), vec!["A".to_string()]);
        executor.shutdown();
    }

    #[test]
    fn connect_to_unknown_name_fails_synchronously() {
        let (executor, registry) = setup();
        let client = Broker::new("client", &registry, executor.clone()).unwrap();
        let (tx, rx) = mpsc::channel();

        let err = client
            .connect("nobody", 100, move |_| tx.send(()).unwrap())
            .unwrap_err();
        assert!(matches!(err, TransportError::RemoteNotFound(name) if name == "nobody"));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        executor.shutdown();
    }

    #[test]
    fn second_pending_accept_is_port_conflict() {
        let (executor, registry) = setup();
        let server = Broker::new("server", &registry, executor.clone()).unwrap();

        server.accept(100, |_| {}).unwrap();
        let err = server.accept(100, |_| {}).unwrap_err();
        assert!(matches!(err, TransportError::PortConflict { port: 100, .. }));
        server.accept(101, |_| {}).unwrap();
        executor.shutdown();
    }

    #[test]
    fn accept_then_connect_posts_connected_first() {
        let (executor, registry) = setup();
        let server = Broker::new("server", &registry, executor.clone()).unwrap();
        let client = Broker::new("client", &registry, executor.clone()).unwrap();
        let (tx, rx) = mpsc::channel();

        let accepted_tx = tx.clone();
        server
            .accept(100, move |ch| {
                accepted_tx
                    .send(("accepted", ch.remote_name().to_string()))
                    .unwrap()
            })
            .unwrap();
        client
            .connect("server", 100, move |ch| {
                tx.send(("connected", ch.remote_name().to_string())).unwrap()
            })
            .unwrap();

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            ("connected", "server".to_string())
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            ("accepted", "client".to_string())
        );
        assert!(!server.has_pending_accept(100));
        executor.shutdown();
    }

    #[test]
    fn connect_then_accept_posts_accepted_first() {
        let (executor, registry) = setup();
        let server = Broker::new("server", &registry, executor.clone()).unwrap();
        let client = Broker::new("client", &registry, executor.clone()).unwrap();
        let (tx, rx) = mpsc::channel();

        let connected_tx = tx.clone();
        client
            .connect("server", 100, move |_| connected_tx.send("connected").unwrap())
            .unwrap();
        assert_eq!(server.pending_connects(100), 1);

        server
            .accept(100, move |_| tx.send("accepted").unwrap())
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "accepted");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "connected");
        assert_eq!(server.pending_connects(100), 0);
        executor.shutdown();
    }

    #[test]
    fn waiting_connectors_are_matched_fifo() {
        let (executor, registry) = setup();
        let server = Broker::new("S", &registry, executor.clone()).unwrap();
        let x = Broker::new("X", &registry, executor.clone()).unwrap();
        let y = Broker::new("Y", &registry, executor.clone()).unwrap();

        x.connect("S", 100, |_| {}).unwrap();
        y.connect("S", 100, |_| {}).unwrap();
        assert_eq!(server.pending_connects(100), 2);

        let (tx, rx) = mpsc::channel();
        for _ in 0..2 {
            let tx = tx.clone();
            server
                .accept(100, move |ch| tx.send(ch.remote_name().to_string()).unwrap())
                .unwrap();
        }

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "X");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "Y");
        executor.shutdown();
    }

    #[test]
    fn concurrent_connects_and_accepts_pair_each_connector_once() {
        const CLIENTS: usize = 16;
        let (executor, registry) = setup();
        let server = Broker::new("server", &registry, executor.clone()).unwrap();
        let (accepted_tx, accepted) = mpsc::channel();
        let (connected_tx, connected) = mpsc::channel();

        let connectors: Vec<_> = (0..CLIENTS)
            .map(|i| {
                let registry = registry.clone();
                let executor = executor.clone();
                let connected_tx = connected_tx.clone();
                std::thread::spawn(move || {
                    let client = Broker::new(format!("client-{i:02}"), &registry, executor).unwrap();
                    client
                        .connect("server", 100, move |ch| {
                            connected_tx.send(ch.local_name().to_string()).unwrap()
                        })
                        .unwrap();
                })
            })
            .collect();

        let acceptor = {
            let server = server.clone();
            std::thread::spawn(move || {
                let mut armed = 0;
                while armed < CLIENTS {
                    // Only this thread installs acceptors, so reading the queue
                    // length first cannot report a stale overlap.
                    let waiting = server.pending_connects(100);
                    let pending = server.has_pending_accept(100);
                    assert!(waiting == 0 || !pending, "acceptor pending with {waiting} connectors waiting");

                    let accepted_tx = accepted_tx.clone();
                    let armed_now = server.accept(100, move |ch| {
                        accepted_tx.send(ch.remote_name().to_string()).unwrap()
                    });
                    match armed_now {
                        Ok(()) => armed += 1,
                        Err(TransportError::PortConflict { .. }) => std::thread::yield_now(),
                        Err(err) => panic!("unexpected accept error: {err}"),
                    }
                }
            })
        };

        for connector in connectors {
            connector.join().unwrap();
        }
        acceptor.join().unwrap();

        let expected: Vec<String> = (0..CLIENTS).map(|i| format!("client-{i:02}")).collect();
        let mut from_server: Vec<String> = (0..CLIENTS)
            .map(|_| accepted.recv_timeout(WAIT).unwrap())
            .collect();
        let mut from_clients: Vec<String> = (0..CLIENTS)
            .map(|_| connected.recv_timeout(WAIT).unwrap())
            .collect();
        from_server.sort();
        from_clients.sort();
        assert_eq!(from_server, expected);
        assert_eq!(from_clients, expected);

        assert!(accepted.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!server.has_pending_accept(100));
        assert_eq!(server.pending_connects(100), 0);
        executor.shutdown();
    }

    #[test]
    fn brokers_exchange_bytes_over_matched_channels() {
        let (executor, registry) = setup();
        let server = Broker::new("A", &registry, executor.clone()).unwrap();
        let client = Broker::new("B", &registry, executor.clone()).unwrap();
        let (tx, rx) = mpsc::channel::<Channel>();

        let accepted_tx = tx.clone();
        server
            .accept(100, move |ch| accepted_tx.send(ch).unwrap())
            .unwrap();
        client
            .connect("A", 100, move |ch| tx.send(ch).unwrap())
            .unwrap();

        let connected = rx.recv_timeout(WAIT).unwrap();
        let accepted = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(connected.local_name(), "B");
        assert_eq!(accepted.local_name(), "A");

        connected
            .write(Bytes::from_static(b"PING"), 0, 4, |_| {})
            .unwrap();
        let (read_tx, read_rx) = mpsc::channel();
        accepted
            .read(BytesMut::zeroed(32), 0, 32, move |c| {
                read_tx.send(c.bytes().to_vec()).unwrap()
            })
            .unwrap();
        assert_eq!(read_rx.recv_timeout(WAIT).unwrap(), b"PING");
        executor.shutdown();
    }

    #[test]
    fn channel_uses_accepting_broker_config() {
        let (executor, registry) = setup();
        let server = Broker::with_config(
            "server",
            &registry,
            executor.clone(),
            ChannelConfig { buffer_capacity: 4 },
        )
        .unwrap();
        let client = Broker::new("client", &registry, executor.clone()).unwrap();
        let (tx, rx) = mpsc::channel::<Channel>();

        server.accept(7, |_| {}).unwrap();
        client
            .connect("server", 7, move |ch| tx.send(ch).unwrap())
            .unwrap();
        let channel = rx.recv_timeout(WAIT).unwrap();

        let (written_tx, written_rx) = mpsc::channel();
        channel
            .write(Bytes::from_static(b"abcdef"), 0, 6, move |c| {
                written_tx.send(c.written()).unwrap()
            })
            .unwrap();
        assert_eq!(written_rx.recv_timeout(WAIT).unwrap(), 3);
        executor.shutdown();
    }
}
