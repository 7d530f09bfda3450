use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use simsock_transport::sync::lock;
use simsock_transport::{Channel, Executor};
use tracing::debug;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::reader;

type Listener = Arc<dyn Fn(QueueEvent) + Send + Sync + 'static>;
type PayloadWaiter = Box<dyn FnOnce(Result<Bytes>) + Send + 'static>;

/// Event delivered to a message queue listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// One complete message arrived.
    Received(Bytes),
    /// The queue closed. Delivered at most once.
    Closed,
}

/// Message-oriented view of a [`Channel`].
///
/// Each message travels as a 4-byte big-endian length followed by the
/// payload. Sends are queued and written one frame at a time; the receive
/// loop started by [`set_listener`](Self::set_listener) reassembles frames
/// from however many partial channel reads it takes.
///
/// Cloning yields another handle to the same queue. Dropping handles does
/// not close the channel; call [`close`](Self::close).
#[derive(Clone)]
pub struct MessageQueue {
    pub(crate) shared: Arc<QueueShared>,
}

pub(crate) struct QueueShared {
    pub(crate) channel: Channel,
    pub(crate) executor: Executor,
    pub(crate) config: FrameConfig,
    listener: Mutex<Option<Listener>>,
    closed_notified: AtomicBool,
    payload_waiter: Mutex<Option<PayloadWaiter>>,
    pub(crate) outgoing: Mutex<Outgoing>,
}

#[derive(Default)]
pub(crate) struct Outgoing {
    pub(crate) frames: VecDeque<Bytes>,
    pub(crate) writing: bool,
}

impl MessageQueue {
    /// Wrap a connected channel. `executor` must be the one driving it.
    pub fn new(channel: Channel, executor: Executor, config: FrameConfig) -> Self {
        let shared = Arc::new(QueueShared {
            channel,
            executor,
            config,
            listener: Mutex::new(None),
            closed_notified: AtomicBool::new(false),
            payload_waiter: Mutex::new(None),
            outgoing: Mutex::new(Outgoing::default()),
        });

        let weak: Weak<QueueShared> = Arc::downgrade(&shared);
        shared.channel.on_disconnected(move || {
            if let Some(shared) = weak.upgrade() {
                shared.close();
            }
        });

        Self { shared }
    }

    /// Install the listener for received messages and close notification.
    ///
    /// The first call starts the receive loop. Later calls replace the
    /// callback; events already posted go to whichever listener is installed
    /// when they run. The listener is dropped after it sees
    /// [`QueueEvent::Closed`], so it may hold a clone of this queue.
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(QueueEvent) + Send + Sync + 'static,
    {
        let first = lock(&self.shared.listener)
            .replace(Arc::new(listener))
            .is_none();

        if self.closed() {
            self.shared.notify_closed();
        } else if first {
            debug!(port = self.port(), remote = self.remote_name(), "receive loop started");
            reader::receive_loop(Arc::clone(&self.shared));
        }
    }

    /// Read exactly one message, outside of the receive loop.
    ///
    /// The listener gets `Err(FrameError::ConnectionClosed)` if the queue
    /// closes first. Do not combine with [`set_listener`](Self::set_listener)
    /// on the same queue.
    pub fn start_read_payload<F>(&self, listener: F)
    where
        F: FnOnce(Result<Bytes>) + Send + 'static,
    {
        if self.closed() {
            self.shared
                .post("payload waiter", move || listener(Err(FrameError::ConnectionClosed)));
            return;
        }
        *lock(&self.shared.payload_waiter) = Some(Box::new(listener));

        let shared = Arc::clone(&self.shared);
        reader::read_frame(Arc::clone(&self.shared), move |result| {
            let waiter = lock(&shared.payload_waiter).take();
            let failed = result.is_err();
            if let Some(waiter) = waiter {
                shared.post("payload waiter", move || waiter(result));
            }
            if failed {
                shared.close();
            }
        });
    }

    /// Close the queue. Idempotent.
    ///
    /// Disconnects the channel and, if a listener is installed, posts
    /// [`QueueEvent::Closed`] once.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn closed(&self) -> bool {
        self.shared.channel.disconnected()
    }

    /// Name of the broker at the other end.
    pub fn remote_name(&self) -> &str {
        self.shared.channel.remote_name()
    }

    /// Name of the broker owning this end, i.e. the broker whose accept or
    /// connect produced the wrapped channel.
    pub fn local_name(&self) -> &str {
        self.shared.channel.local_name()
    }

    pub fn port(&self) -> u16 {
        self.shared.channel.port()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("port", &self.port())
            .field("local", &self.local_name())
            .field("remote", &self.remote_name())
            .field("closed", &self.closed())
            .finish()
    }
}

impl QueueShared {
    pub(crate) fn close(self: &Arc<Self>) {
        self.channel.disconnect();
        lock(&self.outgoing).frames.clear();

        let waiter = lock(&self.payload_waiter).take();
        if let Some(waiter) = waiter {
            self.post("payload waiter", move || waiter(Err(FrameError::ConnectionClosed)));
        }

        self.notify_closed();
    }

    /// Post `Closed` once, if a listener is installed.
    fn notify_closed(self: &Arc<Self>) {
        if lock(&self.listener).is_none() {
            return;
        }
        if self.closed_notified.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(port = self.channel.port(), remote = self.channel.remote_name(), "queue closed");
        self.dispatch(QueueEvent::Closed);
    }

    /// Post an event to whichever listener is installed when it runs.
    ///
    /// `Closed` is the last event, so the listener is released with it.
    pub(crate) fn dispatch(self: &Arc<Self>, event: QueueEvent) {
        let shared = Arc::clone(self);
        self.post("queue event", move || {
            let listener = match event {
                QueueEvent::Closed => lock(&shared.listener).take(),
                QueueEvent::Received(_) => lock(&shared.listener).clone(),
            };
            if let Some(listener) = listener {
                listener(event);
            }
        });
    }

    pub(crate) fn post<F>(&self, what: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.executor.post(task).is_err() {
            debug!(executor = self.executor.name(), what, "dropped task posted after shutdown");
        }
    }
}
