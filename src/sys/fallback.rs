use std::{
    io::{self, IoSlice},
    net::{SocketAddr, UdpSocket},
};

use super::SocketOps;
use crate::RecvMeta;

/// Vectorized sends degrade to one coalescing copy here, so there is no
/// point accepting large region counts
pub(crate) const MAX_SEND_REGIONS: usize = 16;

/// Portable socket state: no GSO, no per-packet destination reporting.
#[derive(Debug)]
pub struct UdpSocketState {
    socket: Option<UdpSocket>,
}

impl UdpSocketState {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::from_std(UdpSocket::bind(addr)?)
    }

    pub fn from_std(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: Some(socket),
        })
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn io(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
    }

    fn coalesce(bufs: &[IoSlice<'_>]) -> Vec<u8> {
        let mut flat = Vec::with_capacity(bufs.iter().map(|b| b.len()).sum());
        for buf in bufs {
            flat.extend_from_slice(buf);
        }
        flat
    }
}

impl SocketOps for UdpSocketState {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io()?.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.io()?.peer_addr()
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.io()?.connect(addr)
    }

    fn disconnect(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "disconnect is not supported on this platform",
        ))
    }

    fn close(&mut self) -> io::Result<()> {
        self.socket = None;
        Ok(())
    }

    fn max_gso_segments(&self) -> usize {
        1
    }

    fn recv_connected(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io()?.recv(buf)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<RecvMeta>> {
        match self.io()?.recv_from(buf) {
            Ok((len, remote)) => Ok(Some(RecvMeta {
                len,
                remote,
                local_ip: None,
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io()?.send(buf)
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.io()?.send_to(buf, addr)
    }

    fn sendv(&mut self, bufs: &[IoSlice<'_>], _segment_size: Option<usize>) -> io::Result<usize> {
        let flat = Self::coalesce(bufs);
        self.send(&flat)
    }

    fn sendv_to(
        &mut self,
        bufs: &[IoSlice<'_>],
        addr: SocketAddr,
        _segment_size: Option<usize>,
    ) -> io::Result<usize> {
        let flat = Self::coalesce(bufs);
        self.send_to(&flat, addr)
    }
}
