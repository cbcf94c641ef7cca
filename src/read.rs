use std::{io, net::SocketAddr};

use bytes::BytesMut;
use tracing::trace;

use crate::{
    alloc::RecvAlloc, channel::DatagramChannel, error::translate_read_error,
    packet::DatagramPacket, sink::PacketSink, sys::SocketOps,
};

impl<S: SocketOps> DatagramChannel<S> {
    /// Drains one burst of datagrams in response to a readiness
    /// notification.
    ///
    /// Packets are delivered through `sink` as they arrive, followed by
    /// exactly one read-complete signal and, if the burst ended on a
    /// fault, the terminating error. Buffers that never reach delivery
    /// are handed back to `alloc` on every exit path.
    pub fn read_ready<A: RecvAlloc, P: PacketSink>(&mut self, alloc: &mut A, sink: &mut P) {
        self.assert_owning_thread();
        if self.read_suspended {
            self.read_interest = false;
            return;
        }
        alloc.reset(&self.config);
        trace!(connected = self.connected, "read burst start");

        let mut error = None;
        loop {
            let mut buf = alloc.allocate();
            let writable = buf.capacity() - buf.len();
            alloc.attempted_bytes_read(writable);

            let packet = if self.connected {
                match self.read_connected(&mut buf, writable) {
                    Ok(n) => {
                        alloc.last_bytes_read(n);
                        if n <= 0 {
                            // Nothing was read, give the buffer back.
                            alloc.retire(buf);
                            break;
                        }
                        let (local, remote) = self.cached_addrs();
                        DatagramPacket::new(buf, local, remote)
                    }
                    Err(e) => {
                        alloc.retire(buf);
                        error = Some(translate_read_error(e, true));
                        break;
                    }
                }
            } else {
                match self.read_unconnected(&mut buf, writable) {
                    Ok(Some((n, local, remote))) => {
                        alloc.last_bytes_read(n as isize);
                        DatagramPacket::new(buf, local, remote)
                    }
                    Ok(None) => {
                        alloc.last_bytes_read(-1);
                        alloc.retire(buf);
                        break;
                    }
                    Err(e) => {
                        alloc.retire(buf);
                        error = Some(translate_read_error(e, false));
                        break;
                    }
                }
            };

            alloc.inc_messages_read(1);
            self.read_pending = false;
            trace!(
                len = packet.payload().len(),
                remote = %packet.remote_addr(),
                "datagram received"
            );
            sink.on_packet(packet);

            // Continuation is the handle's call alone; a partial read is
            // fine as long as something was read.
            if !alloc.continue_reading() {
                break;
            }
        }

        alloc.read_complete();
        sink.on_read_complete();

        match error {
            Some(error) => sink.on_error(error),
            None => {
                if self.config.auto_read {
                    self.read_interest = true;
                }
            }
        }

        self.read_ready_finally();
    }

    /// Connected-mode read into `buf`'s writable tail. Returns the
    /// no-data sentinel for an empty queue; real faults stay errors.
    fn read_connected(&mut self, buf: &mut BytesMut, writable: usize) -> io::Result<isize> {
        let len = buf.len();
        buf.resize(len + writable, 0);
        match self.socket.recv_connected(&mut buf[len..]) {
            Ok(n) => {
                buf.truncate(len + n);
                Ok(n as isize)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                buf.truncate(len);
                Ok(-1)
            }
            Err(e) => {
                buf.truncate(len);
                Err(e)
            }
        }
    }

    /// Unconnected receive-with-address. `Ok(None)` means no datagram
    /// was queued.
    fn read_unconnected(
        &mut self,
        buf: &mut BytesMut,
        writable: usize,
    ) -> io::Result<Option<(usize, SocketAddr, SocketAddr)>> {
        let len = buf.len();
        buf.resize(len + writable, 0);
        let result = self.socket.recv_from(&mut buf[len..]);
        match result {
            Ok(Some(meta)) => {
                buf.truncate(len + meta.len);
                let local = self.resolve_local(meta.local_ip);
                Ok(Some((meta.len, local, meta.remote)))
            }
            Ok(None) => {
                buf.truncate(len);
                Ok(None)
            }
            Err(e) => {
                buf.truncate(len);
                Err(e)
            }
        }
    }

    /// Runs on every exit path of `read_ready`: drop read interest when
    /// neither auto-read nor an outstanding read request wants more data.
    fn read_ready_finally(&mut self) {
        if !self.config.auto_read && !self.read_pending {
            self.read_interest = false;
        }
    }
}
