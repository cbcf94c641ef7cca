use bytes::BytesMut;

use crate::channel::ChannelConfig;

/// Per-burst receive buffer sizing, consumed by the read loop.
///
/// Call order within a burst: `reset`, then per iteration exactly one
/// `allocate` followed by `attempted_bytes_read` and `last_bytes_read`
/// before `continue_reading` is consulted, then `read_complete` once the
/// burst ends. A last-read value of zero or below is the loop's stop
/// signal. Buffers that were allocated but never delivered downstream
/// come back through `retire`.
pub trait RecvAlloc {
    fn reset(&mut self, config: &ChannelConfig);

    /// Allocates the buffer for the next read attempt
    fn allocate(&mut self) -> BytesMut;

    /// Records how many bytes the next read will attempt
    fn attempted_bytes_read(&mut self, bytes: usize);

    /// Records how many bytes the last read actually produced, negative
    /// when no datagram was available
    fn last_bytes_read(&mut self, bytes: isize);

    /// The value most recently passed to [`last_bytes_read`](Self::last_bytes_read)
    fn last_read(&self) -> isize;

    fn inc_messages_read(&mut self, count: usize);

    /// Whether the current burst should attempt another read
    fn continue_reading(&self) -> bool;

    /// The burst is over; adjust state for the next one
    fn read_complete(&mut self);

    /// Takes back a buffer that will not be delivered downstream
    fn retire(&mut self, buf: BytesMut) {
        drop(buf);
    }
}

// Capacity steps: 16 byte increments up to 512, then doubling up to 4 MiB.
const STEP_ENTRIES: usize = 32;
const DOUBLING_ENTRIES: usize = 13;
const SIZE_TABLE: [usize; STEP_ENTRIES + DOUBLING_ENTRIES] = size_table();

const fn size_table() -> [usize; STEP_ENTRIES + DOUBLING_ENTRIES] {
    let mut table = [0; STEP_ENTRIES + DOUBLING_ENTRIES];
    let mut i = 0;
    while i < STEP_ENTRIES {
        table[i] = 16 * (i + 1);
        i += 1;
    }
    let mut size = 1024;
    while i < table.len() {
        table[i] = size;
        size <<= 1;
        i += 1;
    }
    table
}

/// Largest table index whose entry is `<= size` (the smallest entry for
/// sizes below the table floor)
fn size_table_index(size: usize) -> usize {
    match SIZE_TABLE.iter().rposition(|&entry| entry <= size) {
        Some(i) => i,
        None => 0,
    }
}

const INDEX_INCREMENT: usize = 4;
const INDEX_DECREMENT: usize = 1;

/// Feedback-driven buffer sizing: grows eagerly while reads fill the
/// buffer completely, shrinks only after two consecutive reads that
/// would have fit a smaller step.
pub struct AdaptiveRecvAlloc {
    min_index: usize,
    max_index: usize,
    index: usize,
    next_capacity: usize,
    decrease_pending: bool,
    attempted: usize,
    last: isize,
    total_bytes: usize,
    messages: usize,
    max_messages: usize,
    auto_continue: bool,
}

impl AdaptiveRecvAlloc {
    pub fn new() -> Self {
        let config = ChannelConfig::default();
        let index = size_table_index(config.recv_initial);
        Self {
            min_index: size_table_index(config.recv_min),
            max_index: size_table_index(config.recv_max),
            index,
            next_capacity: SIZE_TABLE[index],
            decrease_pending: false,
            attempted: 0,
            last: 0,
            total_bytes: 0,
            messages: 0,
            max_messages: config.max_messages_per_read,
            auto_continue: config.auto_read,
        }
    }

    /// Capacity the next [`allocate`](RecvAlloc::allocate) will use
    pub fn next_capacity(&self) -> usize {
        self.next_capacity
    }

    fn record(&mut self, actual: usize) {
        let shrink_step = SIZE_TABLE[self.index.saturating_sub(INDEX_DECREMENT).max(self.min_index)];
        if actual <= shrink_step {
            if self.decrease_pending {
                self.index = self.index.saturating_sub(INDEX_DECREMENT).max(self.min_index);
                self.next_capacity = SIZE_TABLE[self.index];
                self.decrease_pending = false;
            } else {
                self.decrease_pending = true;
            }
        } else if actual >= self.next_capacity {
            self.index = (self.index + INDEX_INCREMENT).min(self.max_index);
            self.next_capacity = SIZE_TABLE[self.index];
            self.decrease_pending = false;
        }
    }
}

impl Default for AdaptiveRecvAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl RecvAlloc for AdaptiveRecvAlloc {
    fn reset(&mut self, config: &ChannelConfig) {
        self.min_index = size_table_index(config.recv_min);
        self.max_index = size_table_index(config.recv_max);
        self.index = self.index.clamp(self.min_index, self.max_index);
        self.next_capacity = SIZE_TABLE[self.index];
        self.max_messages = config.max_messages_per_read;
        self.auto_continue = config.auto_read;
        self.attempted = 0;
        self.last = 0;
        self.total_bytes = 0;
        self.messages = 0;
    }

    fn allocate(&mut self) -> BytesMut {
        BytesMut::with_capacity(self.next_capacity)
    }

    fn attempted_bytes_read(&mut self, bytes: usize) {
        self.attempted = bytes;
    }

    fn last_bytes_read(&mut self, bytes: isize) {
        // A read that filled the whole buffer may be the head of a larger
        // backlog; grow immediately rather than waiting for read_complete.
        if bytes > 0 && bytes as usize == self.attempted {
            self.record(bytes as usize);
        }
        self.last = bytes;
        if bytes > 0 {
            self.total_bytes += bytes as usize;
        }
    }

    fn last_read(&self) -> isize {
        self.last
    }

    fn inc_messages_read(&mut self, count: usize) {
        self.messages += count;
    }

    fn continue_reading(&self) -> bool {
        self.auto_continue && self.messages < self.max_messages && self.total_bytes > 0
    }

    fn read_complete(&mut self) {
        self.record(self.total_bytes);
    }
}

/// Constant-capacity sizing, for callers that know their datagram size
pub struct FixedRecvAlloc {
    capacity: usize,
    last: isize,
    total_bytes: usize,
    messages: usize,
    max_messages: usize,
    auto_continue: bool,
}

impl FixedRecvAlloc {
    pub fn new(capacity: usize) -> Self {
        let config = ChannelConfig::default();
        Self {
            capacity,
            last: 0,
            total_bytes: 0,
            messages: 0,
            max_messages: config.max_messages_per_read,
            auto_continue: config.auto_read,
        }
    }
}

impl RecvAlloc for FixedRecvAlloc {
    fn reset(&mut self, config: &ChannelConfig) {
        self.max_messages = config.max_messages_per_read;
        self.auto_continue = config.auto_read;
        self.last = 0;
        self.total_bytes = 0;
        self.messages = 0;
    }

    fn allocate(&mut self) -> BytesMut {
        BytesMut::with_capacity(self.capacity)
    }

    fn attempted_bytes_read(&mut self, _bytes: usize) {}

    fn last_bytes_read(&mut self, bytes: isize) {
        self.last = bytes;
        if bytes > 0 {
            self.total_bytes += bytes as usize;
        }
    }

    fn last_read(&self) -> isize {
        self.last
    }

    fn inc_messages_read(&mut self, count: usize) {
        self.messages += count;
    }

    fn continue_reading(&self) -> bool {
        self.auto_continue && self.messages < self.max_messages && self.total_bytes > 0
    }

    fn read_complete(&mut self) {}
}
