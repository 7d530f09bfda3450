/// Default ring-buffer capacity per channel direction.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Configuration for channels created by a broker.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Slots in each direction's ring buffer (one slot stays free).
    pub buffer_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}
