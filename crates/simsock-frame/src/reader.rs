use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{decode_header, HEADER_SIZE};
use crate::error::Result;
use crate::queue::{QueueEvent, QueueShared};

/// Receive frames until the channel goes away, dispatching each payload.
pub(crate) fn receive_loop(shared: Arc<QueueShared>) {
    let next = Arc::clone(&shared);
    read_frame(shared, move |result| match result {
        Ok(payload) => {
            trace!(port = next.channel.port(), len = payload.len(), "message received");
            next.dispatch(QueueEvent::Received(payload));
            receive_loop(next);
        }
        Err(err) => {
            warn!(port = next.channel.port(), remote = next.channel.remote_name(), error = %err, "closing queue");
            next.close();
        }
    });
}

/// Read one complete frame and hand its payload to `done`.
///
/// `done` runs on the executor. It is not called if the channel disconnects
/// mid-frame; closing the queue reports that instead.
pub(crate) fn read_frame<F>(shared: Arc<QueueShared>, done: F)
where
    F: FnOnce(Result<Bytes>) + Send + 'static,
{
    read_exact(shared, BytesMut::zeroed(HEADER_SIZE), 0, move |shared, header| {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&header);
        let length = match decode_header(&raw, shared.config.max_payload_size) {
            Ok(length) => length,
            Err(err) => return done(Err(err)),
        };

        if length == 0 {
            return done(Ok(Bytes::new()));
        }
        read_exact(shared, BytesMut::zeroed(length), 0, move |_, payload| {
            done(Ok(payload.freeze()))
        });
    });
}

/// Fill `buf[filled..]` through as many channel reads as it takes.
fn read_exact<F>(shared: Arc<QueueShared>, buf: BytesMut, filled: usize, done: F)
where
    F: FnOnce(Arc<QueueShared>, BytesMut) + Send + 'static,
{
    if filled == buf.len() {
        return done(shared, buf);
    }

    let remaining = buf.len() - filled;
    let next = Arc::clone(&shared);
    let submitted = shared.channel.read(buf, filled, remaining, move |completion| {
        let filled = filled + completion.read();
        read_exact(next, completion.into_buffer(), filled, done);
    });

    if let Err(err) = submitted {
        debug!(port = shared.channel.port(), error = %err, "read not submitted");
        shared.close();
    }
}
