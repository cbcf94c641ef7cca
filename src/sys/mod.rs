use std::{io, io::IoSlice, net::SocketAddr};

use crate::RecvMeta;

#[cfg(unix)]
#[path = "unix.rs"]
mod platform;

// No GSO, no pktinfo
#[cfg(not(unix))]
#[path = "fallback.rs"]
mod platform;

pub use platform::UdpSocketState;

/// Most regions one vectorized native call accepts. Payloads above this
/// are coalesced by the outbound filter.
pub const MAX_SEND_REGIONS: usize = platform::MAX_SEND_REGIONS;

/// The native calls the channel is built on, one implementation per
/// platform.
///
/// Every call is non-blocking. An empty receive queue and a full send
/// buffer are results, not failures: `recv_from` reports `Ok(None)`,
/// the send calls surface `WouldBlock` for the engine to turn into a
/// not-consumed result.
pub trait SocketOps {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn connect(&mut self, addr: SocketAddr) -> io::Result<()>;

    fn disconnect(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;

    /// Largest segment count a segmented send may carry, 1 without GSO
    fn max_gso_segments(&self) -> usize;

    /// Connected-mode read into `buf`
    fn recv_connected(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Unconnected receive; `Ok(None)` when no datagram is queued
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<RecvMeta>>;

    /// Single-region connected write
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Single-region addressed send
    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Vectorized connected write over every region in `bufs`, optionally
    /// segmented by the OS into `segment_size` packets
    fn sendv(&mut self, bufs: &[IoSlice<'_>], segment_size: Option<usize>) -> io::Result<usize>;

    /// Vectorized addressed send
    fn sendv_to(
        &mut self,
        bufs: &[IoSlice<'_>],
        addr: SocketAddr,
        segment_size: Option<usize>,
    ) -> io::Result<usize>;
}
