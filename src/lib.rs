//! Event-driven UDP datagram channel with vectorized writes and GSO.
//!
//! The channel is driven by an external reactor: it performs non-blocking
//! I/O when told the socket is ready, and never blocks or schedules work
//! itself. One [`DatagramChannel::read_ready`] call drains a burst of
//! datagrams, sized by a pluggable [`RecvAlloc`] heuristic and delivered
//! through a [`PacketSink`]. Outbound messages are normalized by
//! [`DatagramChannel::filter_outbound`] and written by
//! [`DatagramChannel::write`], which picks between single-buffer and
//! scatter-gather native calls. A [`SegmentedPacket`] requests generic
//! segmentation offload, letting one send call emit many fixed-size
//! packets from one payload.
use std::{
    net::{IpAddr, Ipv6Addr, SocketAddr},
    time::{Duration, Instant},
};

use tracing::warn;

mod alloc;
mod buf;
mod channel;
#[cfg(unix)]
mod cmsg;
mod error;
mod packet;
mod read;
mod sink;
mod sys;
mod write;

#[cfg(test)]
pub(crate) mod test_util;

pub use alloc::{AdaptiveRecvAlloc, FixedRecvAlloc, RecvAlloc};
pub use buf::SendBuf;
pub use channel::{ChannelConfig, DatagramChannel};
pub use error::{translate_read_error, TransportError};
pub use packet::{DatagramPacket, Outbound, SegmentedPacket};
pub use sink::PacketSink;
pub use sys::{SocketOps, UdpSocketState, MAX_SEND_REGIONS};

/// Per-datagram metadata reported by the kernel on receive.
#[derive(Debug, Copy, Clone)]
pub struct RecvMeta {
    /// Number of payload bytes received
    pub len: usize,
    /// Source address of the datagram
    pub remote: SocketAddr,
    /// Destination IP address the datagram was sent to, when the platform
    /// reports it
    pub local_ip: Option<IpAddr>,
}

impl Default for RecvMeta {
    /// Constructs a value with arbitrary fields, intended to be overwritten
    fn default() -> Self {
        Self {
            len: 0,
            remote: SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
            local_ip: None,
        }
    }
}

/// Log at most 1 IO error per minute
const IO_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Logs a warning message when a native send fails
///
/// Logging will only be performed if at least [`IO_ERROR_LOG_INTERVAL`]
/// has elapsed since the last error was logged.
fn log_send_error(last_send_error: &mut Instant, err: impl core::fmt::Debug, len: usize) {
    let now = Instant::now();
    if now.saturating_duration_since(*last_send_error) > IO_ERROR_LOG_INTERVAL {
        *last_send_error = now;
        warn!("send error: {:?}, payload len: {}", err, len);
    }
}
