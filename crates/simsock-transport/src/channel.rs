use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::config::ChannelConfig;
use crate::error::{Result, TransportError};
use crate::executor::Executor;
use crate::ring::RingBuffer;
use crate::sync::lock;

type ReadListener = Box<dyn FnOnce(ReadCompletion) + Send + 'static>;
type WriteListener = Box<dyn FnOnce(WriteCompletion) + Send + 'static>;
type Observer = Box<dyn FnOnce() + Send + 'static>;

/// One endpoint of a full-duplex byte stream between two brokers.
///
/// Both endpoints of a connection share a single link holding the two ring
/// buffers (one per direction) and both endpoints' request queues. A
/// `Channel` is a cheap handle: the link plus which side of it this is.
///
/// Reads and writes are queued and served in FIFO order by drain tasks on
/// the executor; their completions are posted there as well. A drain moves
/// whatever is available, so a completion may report fewer bytes than
/// requested.
#[derive(Clone)]
pub struct Channel {
    link: Arc<Link>,
    side: Side,
}

/// Result of a read, handed to the read listener.
#[derive(Debug)]
pub struct ReadCompletion {
    buf: BytesMut,
    offset: usize,
    requested: usize,
    read: usize,
}

/// Result of a write, handed to the write listener.
#[derive(Debug)]
pub struct WriteCompletion {
    buf: Bytes,
    offset: usize,
    requested: usize,
    written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Acceptor,
    Connector,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

struct Link {
    port: u16,
    names: [String; 2],
    /// `buffers[i]` carries bytes flowing towards side `i`.
    buffers: [Mutex<RingBuffer>; 2],
    ends: [End; 2],
    executor: Executor,
}

struct End {
    disconnected: AtomicBool,
    reads: Mutex<Pending<ReadRequest>>,
    writes: Mutex<Pending<WriteRequest>>,
    observers: Mutex<Vec<Observer>>,
}

struct Pending<R> {
    queue: VecDeque<R>,
    draining: bool,
}

struct ReadRequest {
    buf: BytesMut,
    offset: usize,
    length: usize,
    listener: ReadListener,
}

struct WriteRequest {
    buf: Bytes,
    offset: usize,
    length: usize,
    listener: WriteListener,
}

/// Create both endpoints of a connection on `port`.
///
/// The first channel belongs to the accepting broker, the second to the
/// connecting one.
pub(crate) fn pair(
    port: u16,
    acceptor: &str,
    connector: &str,
    config: &ChannelConfig,
    executor: Executor,
) -> (Channel, Channel) {
    let link = Arc::new(Link {
        port,
        names: [acceptor.to_string(), connector.to_string()],
        buffers: [
            Mutex::new(RingBuffer::new(config.buffer_capacity)),
            Mutex::new(RingBuffer::new(config.buffer_capacity)),
        ],
        ends: [End::new(), End::new()],
        executor,
    });

    (
        Channel {
            link: Arc::clone(&link),
            side: Side::Acceptor,
        },
        Channel {
            link,
            side: Side::Connector,
        },
    )
}

impl Channel {
    /// Port this channel was established on.
    pub fn port(&self) -> u16 {
        self.link.port
    }

    /// Name of the broker owning this endpoint.
    pub fn local_name(&self) -> &str {
        &self.link.names[self.side.index()]
    }

    /// Name of the broker owning the other endpoint.
    pub fn remote_name(&self) -> &str {
        &self.link.names[self.side.peer().index()]
    }

    /// Queue a read of up to `length` bytes into `buf[offset..offset + length]`.
    ///
    /// The listener receives the buffer back together with the number of bytes
    /// actually read, which is at least 1 for a non-empty request. If the
    /// channel disconnects before the request is served, it is dropped without
    /// calling the listener.
    pub fn read<F>(&self, buf: BytesMut, offset: usize, length: usize, listener: F) -> Result<()>
    where
        F: FnOnce(ReadCompletion) + Send + 'static,
    {
        check_region(offset, length, buf.len())?;
        if self.disconnected() {
            return Err(TransportError::Disconnected { port: self.port() });
        }

        let mut reads = lock(&self.end().reads);
        reads.queue.push_back(ReadRequest {
            buf,
            offset,
            length,
            listener: Box::new(listener),
        });
        if !reads.draining {
            reads.draining = true;
            self.schedule(Direction::Read);
        }
        Ok(())
    }

    /// Queue a write of `buf[offset..offset + length]`.
    ///
    /// The listener receives the buffer back together with the number of bytes
    /// actually written; the caller resubmits the remainder if it was partial.
    /// If the channel disconnects before the request is served, it is dropped
    /// without calling the listener.
    pub fn write<F>(&self, buf: Bytes, offset: usize, length: usize, listener: F) -> Result<()>
    where
        F: FnOnce(WriteCompletion) + Send + 'static,
    {
        check_region(offset, length, buf.len())?;
        if self.disconnected() {
            return Err(TransportError::Disconnected { port: self.port() });
        }

        let mut writes = lock(&self.end().writes);
        writes.queue.push_back(WriteRequest {
            buf,
            offset,
            length,
            listener: Box::new(listener),
        });
        if !writes.draining {
            writes.draining = true;
            self.schedule(Direction::Write);
        }
        Ok(())
    }

    /// Disconnect this endpoint. Idempotent.
    ///
    /// Queued requests on this endpoint are dropped. The peer keeps reading
    /// what is already buffered and disconnects itself once it runs dry.
    pub fn disconnect(&self) {
        self.mark_disconnected();
    }

    pub fn disconnected(&self) -> bool {
        self.end().disconnected.load(Ordering::SeqCst)
    }

    /// Run `observer` on the executor once this endpoint is disconnected.
    pub fn on_disconnected<F>(&self, observer: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut observers = lock(&self.end().observers);
        if self.disconnected() {
            drop(observers);
            self.link
                .executor
                .post_or_log("disconnect observer", observer);
        } else {
            observers.push(Box::new(observer));
        }
    }

    fn end(&self) -> &End {
        &self.link.ends[self.side.index()]
    }

    fn peer_end(&self) -> &End {
        &self.link.ends[self.side.peer().index()]
    }

    fn inbound(&self) -> &Mutex<RingBuffer> {
        &self.link.buffers[self.side.index()]
    }

    fn outbound(&self) -> &Mutex<RingBuffer> {
        &self.link.buffers[self.side.peer().index()]
    }

    fn peer(&self) -> Channel {
        Channel {
            link: Arc::clone(&self.link),
            side: self.side.peer(),
        }
    }

    fn schedule(&self, direction: Direction) {
        let channel = self.clone();
        match direction {
            Direction::Read => self
                .link
                .executor
                .post_or_log("read drain", move || channel.drain_reads()),
            Direction::Write => self
                .link
                .executor
                .post_or_log("write drain", move || channel.drain_writes()),
        }
    }

    /// Post a wake-up for one direction of `target`.
    fn notify(&self, target: Channel, direction: Direction) {
        self.link
            .executor
            .post_or_log("buffer notification", move || target.wake(direction));
    }

    /// Re-arm a direction after a buffer transition or a disconnect.
    fn wake(&self, direction: Direction) {
        let end = self.end();
        let mut pending = match direction {
            Direction::Read => PendingGuard::Read(lock(&end.reads)),
            Direction::Write => PendingGuard::Write(lock(&end.writes)),
        };
        if pending.has_queued() && !pending.draining() {
            pending.set_draining(true);
            self.schedule(direction);
        }
    }

    fn drain_reads(&self) {
        let mut reads = lock(&self.end().reads);
        if self.disconnected() {
            reads.discard();
            return;
        }
        let Some(mut request) = reads.queue.pop_front() else {
            reads.draining = false;
            return;
        };

        let mut inbound = lock(self.inbound());
        if request.length > 0 && inbound.is_empty() {
            drop(inbound);
            reads.queue.push_front(request);
            if self.peer_end().disconnected.load(Ordering::SeqCst) {
                reads.discard();
                drop(reads);
                self.mark_disconnected();
            } else {
                reads.draining = false;
            }
            return;
        }

        let was_full = inbound.is_full();
        let start = request.offset;
        let read = inbound.pull_into(&mut request.buf[start..start + request.length]);
        let now_empty = inbound.is_empty();
        drop(inbound);

        trace!(port = self.port(), read, "read drained");
        let listener = request.listener;
        let completion = ReadCompletion {
            buf: request.buf,
            offset: request.offset,
            requested: request.length,
            read,
        };
        self.link
            .executor
            .post_or_log("read completion", move || listener(completion));

        if was_full && read > 0 {
            self.notify(self.peer(), Direction::Write);
        }

        if now_empty && self.peer_end().disconnected.load(Ordering::SeqCst) {
            reads.discard();
            drop(reads);
            self.mark_disconnected();
        } else if !now_empty && !reads.queue.is_empty() {
            self.schedule(Direction::Read);
        } else {
            reads.draining = false;
        }
    }

    fn drain_writes(&self) {
        let mut writes = lock(&self.end().writes);
        if self.disconnected() {
            writes.discard();
            return;
        }
        let Some(request) = writes.queue.pop_front() else {
            writes.draining = false;
            return;
        };

        if request.length > 0 && lock(self.outbound()).is_full() {
            writes.queue.push_front(request);
            writes.draining = false;
            return;
        }

        if self.peer_end().disconnected.load(Ordering::SeqCst) && lock(self.inbound()).is_empty() {
            drop(request);
            writes.discard();
            drop(writes);
            self.mark_disconnected();
            return;
        }

        let mut outbound = lock(self.outbound());
        let was_empty = outbound.is_empty();
        let start = request.offset;
        let written = outbound.push_slice(&request.buf[start..start + request.length]);
        let now_full = outbound.is_full();
        drop(outbound);

        trace!(port = self.port(), written, "write drained");
        let listener = request.listener;
        let completion = WriteCompletion {
            buf: request.buf,
            offset: request.offset,
            requested: request.length,
            written,
        };
        self.link
            .executor
            .post_or_log("write completion", move || listener(completion));

        if was_empty && written > 0 {
            self.notify(self.peer(), Direction::Read);
        }

        if !now_full && !writes.queue.is_empty() {
            self.schedule(Direction::Write);
        } else {
            writes.draining = false;
        }
    }

    fn mark_disconnected(&self) {
        if self.end().disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            port = self.port(),
            local = self.local_name(),
            remote = self.remote_name(),
            "channel disconnected"
        );

        let observers = std::mem::take(&mut *lock(&self.end().observers));
        for observer in observers {
            self.link
                .executor
                .post_or_log("disconnect observer", observer);
        }

        self.notify(self.clone(), Direction::Read);
        self.notify(self.clone(), Direction::Write);
        self.notify(self.peer(), Direction::Read);
        self.notify(self.peer(), Direction::Write);
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("port", &self.port())
            .field("local", &self.local_name())
            .field("remote", &self.remote_name())
            .field("disconnected", &self.disconnected())
            .finish()
    }
}

impl ReadCompletion {
    /// The bytes that were read.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.read]
    }

    /// Number of bytes read.
    pub fn read(&self) -> usize {
        self.read
    }

    /// Number of bytes the request asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Offset of the request within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Take back the destination buffer.
    pub fn into_buffer(self) -> BytesMut {
        self.buf
    }
}

impl WriteCompletion {
    /// Number of bytes written.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes of the request that were not written.
    pub fn remaining(&self) -> usize {
        self.requested - self.written
    }

    /// True when only part of the request was written.
    pub fn is_partial(&self) -> bool {
        self.written < self.requested
    }

    /// Take back the source buffer.
    pub fn into_buffer(self) -> Bytes {
        self.buf
    }
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Acceptor => 0,
            Side::Connector => 1,
        }
    }

    fn peer(self) -> Side {
        match self {
            Side::Acceptor => Side::Connector,
            Side::Connector => Side::Acceptor,
        }
    }
}

impl End {
    fn new() -> Self {
        Self {
            disconnected: AtomicBool::new(false),
            reads: Mutex::new(Pending::new()),
            writes: Mutex::new(Pending::new()),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<R> Pending<R> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            draining: false,
        }
    }

    /// Drop every queued request without completing it.
    fn discard(&mut self) {
        if !self.queue.is_empty() {
            debug!(dropped = self.queue.len(), "discarding requests on disconnected channel");
        }
        self.queue.clear();
        self.draining = false;
    }
}

enum PendingGuard<'a> {
    Read(std::sync::MutexGuard<'a, Pending<ReadRequest>>),
    Write(std::sync::MutexGuard<'a, Pending<WriteRequest>>),
}

impl PendingGuard<'_> {
    fn has_queued(&self) -> bool {
        match self {
            PendingGuard::Read(p) => !p.queue.is_empty(),
            PendingGuard::Write(p) => !p.queue.is_empty(),
        }
    }

    fn draining(&self) -> bool {
        match self {
            PendingGuard::Read(p) => p.draining,
            PendingGuard::Write(p) => p.draining,
        }
    }

    fn set_draining(&mut self, draining: bool) {
        match self {
            PendingGuard::Read(p) => p.draining = draining,
            PendingGuard::Write(p) => p.draining = draining,
        }
    }
}

fn check_region(offset: usize, length: usize, capacity: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(TransportError::InvalidArgument {
            offset,
            length,
            capacity,
        }),
    }
}
