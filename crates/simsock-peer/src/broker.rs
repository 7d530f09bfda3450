use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use simsock_frame::{FrameConfig, MessageQueue};
use simsock_transport::sync::lock;
use simsock_transport::{Broker, Executor, Registry};
use tracing::debug;

use crate::error::Result;

pub(crate) type BindListener = Arc<dyn Fn(MessageQueue) + Send + Sync + 'static>;

/// Message-level broker: binds ports to listeners that receive
/// [`MessageQueue`]s, and connects to other queue brokers.
///
/// Every connection starts with a one-byte control frame. Regular clients
/// announce themselves with [`REGULAR_MARKER`](crate::REGULAR_MARKER);
/// [`unbind`](Self::unbind) connects to its own port and sends
/// [`UNBIND_MARKER`](crate::UNBIND_MARKER) to stop the accept loop.
#[derive(Clone)]
pub struct QueueBroker {
    pub(crate) broker: Broker,
    pub(crate) frame_config: FrameConfig,
    pub(crate) ports: Arc<Mutex<HashMap<u16, PortEntry>>>,
}

/// State of a port whose accept loop is alive.
///
/// `listener` is `None` while the port is unbinding. `retired` keeps the
/// last unbound listener until the loop stops, for clients matched before
/// the poison pill.
pub(crate) struct PortEntry {
    pub(crate) listener: Option<BindListener>,
    pub(crate) retired: Option<BindListener>,
    pub(crate) pending_pills: usize,
}

impl QueueBroker {
    /// Create a queue broker on top of a new [`Broker`] registered as `name`.
    pub fn new(name: impl Into<String>, registry: &Registry, executor: Executor) -> Result<Self> {
        Ok(Self::from_broker(Broker::new(name, registry, executor)?))
    }

    /// Wrap an existing broker. Its ports should not be used directly afterwards.
    pub fn from_broker(broker: Broker) -> Self {
        Self {
            broker,
            frame_config: FrameConfig::default(),
            ports: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the frame configuration used for every queue this broker creates.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    pub fn name(&self) -> &str {
        self.broker.name()
    }

    /// The underlying byte-level broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn frame_config(&self) -> &FrameConfig {
        &self.frame_config
    }

    /// Whether a listener is installed on `port`.
    pub fn is_bound(&self, port: u16) -> bool {
        self.ports()
            .get(&port)
            .is_some_and(|entry| entry.listener.is_some())
    }

    /// Whether the accept loop on `port` is still alive. Stays true after
    /// `unbind` until the poison pill has been consumed.
    pub fn is_listening(&self, port: u16) -> bool {
        self.ports().contains_key(&port)
    }

    pub(crate) fn ports(&self) -> MutexGuard<'_, HashMap<u16, PortEntry>> {
        lock(&self.ports)
    }

    pub(crate) fn wrap(&self, channel: simsock_transport::Channel) -> MessageQueue {
        MessageQueue::new(
            channel,
            self.broker.executor().clone(),
            self.frame_config.clone(),
        )
    }

    pub(crate) fn post<F>(&self, what: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.broker.executor().post(task).is_err() {
            debug!(broker = self.name(), what, "dropped task posted after shutdown");
        }
    }
}

impl std::fmt::Debug for QueueBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<u16> = self
            .ports()
            .iter()
            .filter(|(_, entry)| entry.listener.is_some())
            .map(|(port, _)| *port)
            .collect();
        bound.sort_unstable();
        f.debug_struct("QueueBroker")
            .field("name", &self.name())
            .field("bound", &bound)
            .finish()
    }
}
