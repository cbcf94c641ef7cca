//! Scripted collaborators for exercising the channel without real
//! sockets.
use std::{
    collections::VecDeque,
    io::{self, IoSlice},
    net::SocketAddr,
};

use bytes::BytesMut;

use crate::{
    alloc::RecvAlloc, channel::ChannelConfig, error::TransportError, packet::DatagramPacket,
    sink::PacketSink, sys::SocketOps, RecvMeta,
};

/// One recorded outbound native call
#[derive(Debug)]
pub(crate) enum SendCall {
    Send {
        len: usize,
    },
    SendTo {
        len: usize,
        addr: SocketAddr,
    },
    Sendv {
        regions: usize,
        len: usize,
        segment_size: Option<usize>,
    },
    SendvTo {
        regions: usize,
        len: usize,
        segment_size: Option<usize>,
        addr: SocketAddr,
    },
}

/// One scripted inbound event
#[derive(Debug)]
pub(crate) enum RecvScript {
    /// Delivered through `recv_from`
    Datagram { payload: Vec<u8>, meta: RecvMeta },
    /// Delivered through `recv_connected`
    Connected { payload: Vec<u8> },
    Error(io::Error),
}

/// Socket double: sends are recorded and answered from a result queue,
/// receives replay a script. An exhausted script reports an empty queue.
pub(crate) struct MockSocket {
    pub local: SocketAddr,
    pub peer: Option<SocketAddr>,
    pub open: bool,
    pub max_gso: usize,
    pub send_results: VecDeque<io::Result<usize>>,
    pub send_calls: Vec<SendCall>,
    pub recv_script: VecDeque<RecvScript>,
    pub recv_calls: usize,
}

impl MockSocket {
    pub fn bound(local: &str) -> Self {
        Self {
            local: local.parse().unwrap(),
            peer: None,
            open: true,
            max_gso: 64,
            send_results: VecDeque::new(),
            send_calls: Vec::new(),
            recv_script: VecDeque::new(),
            recv_calls: 0,
        }
    }

    fn pop_send_result(&mut self, full_len: usize) -> io::Result<usize> {
        self.send_results.pop_front().unwrap_or(Ok(full_len))
    }
}

impl SocketOps for MockSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn connect(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.peer = Some(addr);
        Ok(())
    }

    fn disconnect(&mut self) -> io::Result<()> {
        self.peer = None;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }

    fn max_gso_segments(&self) -> usize {
        self.max_gso
    }

    fn recv_connected(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_calls += 1;
        match self.recv_script.pop_front() {
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Some(RecvScript::Connected { payload }) => {
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                Ok(n)
            }
            Some(RecvScript::Error(e)) => Err(e),
            Some(other) => panic!("unconnected event in a connected read: {other:?}"),
        }
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<RecvMeta>> {
        self.recv_calls += 1;
        match self.recv_script.pop_front() {
            None => Ok(None),
            Some(RecvScript::Datagram { payload, meta }) => {
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                Ok(Some(meta))
            }
            Some(RecvScript::Error(e)) => Err(e),
            Some(other) => panic!("connected event in an unconnected read: {other:?}"),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_calls.push(SendCall::Send { len: buf.len() });
        self.pop_send_result(buf.len())
    }

    fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.send_calls.push(SendCall::SendTo {
            len: buf.len(),
            addr,
        });
        self.pop_send_result(buf.len())
    }

    fn sendv(&mut self, bufs: &[IoSlice<'_>], segment_size: Option<usize>) -> io::Result<usize> {
        let len = bufs.iter().map(|b| b.len()).sum();
        self.send_calls.push(SendCall::Sendv {
            regions: bufs.len(),
            len,
            segment_size,
        });
        self.pop_send_result(len)
    }

    fn sendv_to(
        &mut self,
        bufs: &[IoSlice<'_>],
        addr: SocketAddr,
        segment_size: Option<usize>,
    ) -> io::Result<usize> {
        let len = bufs.iter().map(|b| b.len()).sum();
        self.send_calls.push(SendCall::SendvTo {
            regions: bufs.len(),
            len,
            segment_size,
            addr,
        });
        self.pop_send_result(len)
    }
}

/// Sink that keeps everything it is given
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub packets: Vec<DatagramPacket>,
    pub read_completes: usize,
    pub errors: Vec<TransportError>,
}

impl PacketSink for RecordingSink {
    fn on_packet(&mut self, packet: DatagramPacket) {
        self.packets.push(packet);
    }

    fn on_read_complete(&mut self) {
        self.read_completes += 1;
    }

    fn on_error(&mut self, error: TransportError) {
        self.errors.push(error);
    }
}

/// Fixed-capacity allocation handle that counts buffer hand-offs, for
/// asserting that every allocation is either delivered or retired
pub(crate) struct CountingAlloc {
    capacity: usize,
    pub allocated: usize,
    pub retired: usize,
    last: isize,
    total_bytes: usize,
    messages: usize,
    max_messages: usize,
    auto_continue: bool,
}

impl CountingAlloc {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            allocated: 0,
            retired: 0,
            last: 0,
            total_bytes: 0,
            messages: 0,
            max_messages: 16,
            auto_continue: true,
        }
    }
}

impl RecvAlloc for CountingAlloc {
    fn reset(&mut self, config: &ChannelConfig) {
        self.max_messages = config.max_messages_per_read;
        self.auto_continue = config.auto_read;
        self.last = 0;
        self.total_bytes = 0;
        self.messages = 0;
    }

    fn allocate(&mut self) -> BytesMut {
        self.allocated += 1;
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

    fn retire(&mut self, buf: BytesMut) {
        self.retired += 1;
        drop(buf);
    }
}
