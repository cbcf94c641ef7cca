use std::{
    io,
    marker::PhantomData,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    thread::{self, ThreadId},
    time::Instant,
};

use tracing::debug;

use crate::{
    error::TransportError,
    packet::Outbound,
    sys::{SocketOps, UdpSocketState, MAX_SEND_REGIONS},
};

/// Tunables consumed by the channel and its receive sizing.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Re-arm read interest after each completed burst
    pub auto_read: bool,
    /// Upper bound on datagrams delivered per readiness notification
    pub max_messages_per_read: usize,
    /// Smallest receive buffer capacity the sizer may pick
    pub recv_min: usize,
    /// Receive buffer capacity before any feedback has arrived
    pub recv_initial: usize,
    /// Largest receive buffer capacity the sizer may pick
    pub recv_max: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            auto_read: true,
            max_messages_per_read: 16,
            recv_min: 64,
            recv_initial: 2048,
            recv_max: 65536,
        }
    }
}

/// A non-blocking datagram channel driven by readiness notifications.
///
/// All operations must run on the channel's owning thread; there is no
/// internal locking (the type is deliberately `!Sync`). Debug builds
/// assert the calling thread on every I/O entry point.
pub struct DatagramChannel<S> {
    pub(crate) socket: S,
    pub(crate) config: ChannelConfig,
    pub(crate) connected: bool,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) read_suspended: bool,
    pub(crate) read_interest: bool,
    pub(crate) read_pending: bool,
    pub(crate) max_gso_segments: usize,
    pub(crate) last_send_error: Instant,
    owner: ThreadId,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl DatagramChannel<UdpSocketState> {
    /// Binds a fresh socket and wraps it in a channel
    pub fn bind(addr: SocketAddr, config: ChannelConfig) -> io::Result<Self> {
        Self::new(UdpSocketState::bind(addr)?, config)
    }
}

impl<S: SocketOps> DatagramChannel<S> {
    /// Wraps an already-bound socket
    pub fn new(socket: S, config: ChannelConfig) -> io::Result<Self> {
        let local = socket.local_addr().ok();
        let max_gso_segments = socket.max_gso_segments();
        let now = Instant::now();
        Ok(Self {
            socket,
            config,
            connected: false,
            local,
            remote: None,
            read_suspended: false,
            read_interest: true,
            read_pending: false,
            max_gso_segments,
            last_send_error: now
                .checked_sub(2 * crate::IO_ERROR_LOG_INTERVAL)
                .unwrap_or(now),
            owner: thread::current().id(),
            _not_sync: PhantomData,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ChannelConfig {
        &mut self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The socket's bound address, cached at construction and refreshed
    /// on connect
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Largest segment count a [`SegmentedPacket`](crate::SegmentedPacket)
    /// may request on this socket
    pub fn max_gso_segments(&self) -> usize {
        self.max_gso_segments
    }

    /// Associates the socket with `remote`; subsequent reads use the
    /// connected fast path and cached addresses
    pub fn connect(&mut self, remote: SocketAddr) -> io::Result<()> {
        self.assert_owning_thread();
        self.socket.connect(remote)?;
        self.local = self.socket.local_addr().ok().or(self.local);
        self.remote = Some(remote);
        self.connected = true;
        debug!(%remote, "datagram channel connected");
        Ok(())
    }

    /// Dissolves the association and resets the cached addresses
    pub fn disconnect(&mut self) -> io::Result<()> {
        self.assert_owning_thread();
        self.socket.disconnect()?;
        self.connected = false;
        self.remote = None;
        self.local = self.socket.local_addr().ok();
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.assert_owning_thread();
        self.socket.close()?;
        self.connected = false;
        Ok(())
    }

    /// Consumer-driven backpressure: while suspended, readiness
    /// notifications are ignored and read interest is dropped
    pub fn set_read_suspended(&mut self, suspended: bool) {
        self.read_suspended = suspended;
    }

    /// Whether the reactor should keep read readiness armed
    pub fn read_interest(&self) -> bool {
        self.read_interest
    }

    /// Requests a read; the next readiness notification will deliver
    pub fn request_read(&mut self) {
        self.read_pending = true;
        self.read_interest = true;
    }

    /// Normalizes an outbound message into a shape one native call can
    /// consume, or rejects it.
    ///
    /// Payloads fragmented beyond the platform's vectorized-call limit
    /// are coalesced into a single region; everything else passes through
    /// untouched. Address-family mismatches and oversized segmented
    /// payloads are unsupported.
    pub fn filter_outbound(&self, msg: Outbound) -> Result<Outbound, TransportError> {
        match msg {
            Outbound::Buffer(payload) => {
                if payload.region_count() > MAX_SEND_REGIONS {
                    Ok(Outbound::Buffer(payload.coalesce()))
                } else {
                    Ok(Outbound::Buffer(payload))
                }
            }
            Outbound::Datagram { payload, recipient } => {
                self.check_family(recipient)?;
                if payload.region_count() > MAX_SEND_REGIONS {
                    Ok(Outbound::Datagram {
                        payload: payload.coalesce(),
                        recipient,
                    })
                } else {
                    Ok(Outbound::Datagram { payload, recipient })
                }
            }
            Outbound::Segmented(packet) => {
                self.check_family(packet.recipient())?;
                let limit = self.max_gso_segments * packet.segment_size();
                if packet.payload().remaining() > limit {
                    return Err(TransportError::UnsupportedMessage(format!(
                        "segmented payload of {} bytes exceeds {} segments of {}",
                        packet.payload().remaining(),
                        self.max_gso_segments,
                        packet.segment_size(),
                    )));
                }
                if packet.payload().region_count() > MAX_SEND_REGIONS {
                    let (payload, segment_size, recipient, sender) = packet.into_parts();
                    let coalesced = match sender {
                        Some(sender) => crate::SegmentedPacket::with_sender(
                            payload.coalesce(),
                            segment_size,
                            recipient,
                            sender,
                        )?,
                        None => {
                            crate::SegmentedPacket::new(payload.coalesce(), segment_size, recipient)?
                        }
                    };
                    Ok(Outbound::Segmented(coalesced))
                } else {
                    Ok(Outbound::Segmented(packet))
                }
            }
        }
    }

    fn check_family(&self, recipient: SocketAddr) -> Result<(), TransportError> {
        let Some(local) = self.local else {
            return Ok(());
        };
        // A v6 socket reaches v4 recipients through mapped addresses; a
        // v4 socket cannot reach v6 at all.
        if local.is_ipv4() && recipient.is_ipv6() {
            return Err(TransportError::UnsupportedMessage(format!(
                "recipient {recipient} does not match the socket's address family \
                 (expected: SendBuf, (SendBuf, SocketAddr), SegmentedPacket)",
            )));
        }
        Ok(())
    }

    pub(crate) fn assert_owning_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "channel accessed off its owning thread"
        );
    }

    /// Addresses for a connected-mode packet. Connected mode caches both
    /// ends; the unspecified fallbacks are unreachable in practice.
    pub(crate) fn cached_addrs(&self) -> (SocketAddr, SocketAddr) {
        let local = self
            .local
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0));
        let remote = self
            .remote
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0));
        (local, remote)
    }

    /// Local address for an unconnected-mode packet, preferring the
    /// kernel-reported destination IP
    pub(crate) fn resolve_local(&self, reported: Option<IpAddr>) -> SocketAddr {
        match (reported, self.local) {
            (Some(ip), Some(local)) => SocketAddr::new(ip, local.port()),
            (Some(ip), None) => SocketAddr::new(ip, 0),
            (None, Some(local)) => local,
            (None, None) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }
}

/// Multicast management is not supported by this binding; every
/// operation validates its arguments and reports unsupported without
/// touching channel state.
impl<S: SocketOps> DatagramChannel<S> {
    pub fn join_group(&self, group: IpAddr) -> Result<(), TransportError> {
        check_multicast(group)?;
        Err(multicast_not_supported())
    }

    pub fn join_group_on(
        &self,
        group: IpAddr,
        _interface: u32,
        source: Option<IpAddr>,
    ) -> Result<(), TransportError> {
        check_multicast(group)?;
        check_source(source)?;
        Err(multicast_not_supported())
    }

    pub fn leave_group(&self, group: IpAddr) -> Result<(), TransportError> {
        check_multicast(group)?;
        Err(multicast_not_supported())
    }

    pub fn leave_group_on(
        &self,
        group: IpAddr,
        _interface: u32,
        source: Option<IpAddr>,
    ) -> Result<(), TransportError> {
        check_multicast(group)?;
        check_source(source)?;
        Err(multicast_not_supported())
    }

    pub fn block_source(&self, group: IpAddr, source: IpAddr) -> Result<(), TransportError> {
        check_multicast(group)?;
        check_source(Some(source))?;
        Err(multicast_not_supported())
    }

    pub fn block_source_on(
        &self,
        group: IpAddr,
        _interface: u32,
        source: IpAddr,
    ) -> Result<(), TransportError> {
        check_multicast(group)?;
        check_source(Some(source))?;
        Err(multicast_not_supported())
    }
}

fn check_multicast(group: IpAddr) -> Result<(), TransportError> {
    if !group.is_multicast() {
        return Err(TransportError::InvalidArgument("group"));
    }
    Ok(())
}

fn check_source(source: Option<IpAddr>) -> Result<(), TransportError> {
    if source.map_or(false, |ip| ip.is_multicast()) {
        return Err(TransportError::InvalidArgument("source"));
    }
    Ok(())
}

fn multicast_not_supported() -> TransportError {
    TransportError::UnsupportedOperation("multicast is not supported")
}
