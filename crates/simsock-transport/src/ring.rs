use crate::error::{Result, TransportError};

/// Fixed-capacity FIFO byte buffer.
///
/// One slot is kept free to tell "full" from "empty", so a buffer created
/// with `capacity` holds at most `capacity - 1` bytes.
#[derive(Debug)]
pub struct RingBuffer {
    bytes: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl RingBuffer {
    /// Create a buffer with `capacity` slots. Capacities below 2 are raised to 2.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity.max(2)].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Number of slots, including the sentinel slot.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes currently stored.
    pub fn len(&self) -> usize {
        (self.head + self.bytes.len() - self.tail) % self.bytes.len()
    }

    /// Bytes that can still be pushed.
    pub fn free(&self) -> usize {
        self.bytes.len() - 1 - self.len()
    }

    pub fn is_full(&self) -> bool {
        self.next(self.head) == self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        let next = self.next(self.head);
        if next == self.tail {
            return Err(TransportError::BufferFull);
        }
        self.bytes[self.head] = byte;
        self.head = next;
        Ok(())
    }

    /// Remove the oldest byte.
    pub fn pull(&mut self) -> Result<u8> {
        if self.is_empty() {
            return Err(TransportError::BufferEmpty);
        }
        let byte = self.bytes[self.tail];
        self.tail = self.next(self.tail);
        Ok(byte)
    }

    /// Push as many bytes of `src` as fit. Returns the count pushed.
    pub fn push_slice(&mut self, src: &[u8]) -> usize {
        let mut pushed = 0;
        for &byte in src {
            if self.push(byte).is_err() {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Pull up to `dst.len()` bytes. Returns the count pulled.
    pub fn pull_into(&mut self, dst: &mut [u8]) -> usize {
        let mut pulled = 0;
        for slot in dst.iter_mut() {
            match self.pull() {
                Ok(byte) => *slot = byte,
                Err(_) => break,
            }
            pulled += 1;
        }
        pulled
    }

    fn next(&self, index: usize) -> usize {
        (index + 1) % self.bytes.len()
    }
}
