use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use simsock_transport::sync::lock;
use tracing::{debug, trace};

use crate::codec::encode_frame;
use crate::error::{FrameError, Result};
use crate::queue::{MessageQueue, QueueShared};

impl MessageQueue {
    /// Frame `payload` and queue it for transmission.
    ///
    /// `Ok` means the frame was accepted, not that it reached the peer.
    /// Frames go out in call order; partial channel writes are resumed
    /// without further calls.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let max = self.shared.config.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        if self.closed() {
            self.close();
            return Err(FrameError::ConnectionClosed);
        }

        let mut frame = BytesMut::new();
        encode_frame(payload, &mut frame)?;

        let mut outgoing = lock(&self.shared.outgoing);
        if outgoing.writing {
            outgoing.frames.push_back(frame.freeze());
            return Ok(());
        }
        outgoing.writing = true;
        drop(outgoing);

        write_frame(Arc::clone(&self.shared), frame.freeze(), 0);
        Ok(())
    }
}

/// Write `frame[offset..]`, resubmitting until the whole frame is out.
fn write_frame(shared: Arc<QueueShared>, frame: Bytes, offset: usize) {
    let length = frame.len() - offset;
    let next = Arc::clone(&shared);
    let submitted = shared.channel.write(frame, offset, length, move |completion| {
        let offset = completion.offset() + completion.written();
        let frame = completion.into_buffer();
        if offset < frame.len() {
            trace!(port = next.channel.port(), offset, total = frame.len(), "partial frame write");
            write_frame(next, frame, offset);
        } else {
            frame_sent(next);
        }
    });

    if let Err(err) = submitted {
        debug!(port = shared.channel.port(), error = %err, "write not submitted");
        shared.close();
    }
}

fn frame_sent(shared: Arc<QueueShared>) {
    let mut outgoing = lock(&shared.outgoing);
    match outgoing.frames.pop_front() {
        Some(frame) => {
            drop(outgoing);
            write_frame(shared, frame, 0);
        }
        None => outgoing.writing = false,
    }
}
